//! Consistent-hash bucketing
//!
//! Maps `(feature, context key)` onto a stable 0-99 bucket, then onto a
//! percentage decision or one of N weighted variants. Nothing is stored in
//! advance; the same context always lands in the same bucket.

use crate::error::{FeatureError, FeatureResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of buckets.
pub const BUCKETS: u32 = 100;

/// Stable hash-based bucketer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bucketer;

impl Bucketer {
    /// 32-bit hash of `feature|context_key`.
    ///
    /// First four bytes (big-endian) of the SHA-256 digest, so the value is
    /// identical across runs, builds and platforms.
    pub fn hash(feature: &str, context_key: &str) -> u32 {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(feature.as_bytes());
        hasher.update(b"|");
        hasher.update(context_key.as_bytes());
        let digest = hasher.finalize();

        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Bucket (0-99) for a feature and context key
    pub fn bucket(feature: &str, context_key: &str) -> u8 {
        (Self::hash(feature, context_key) % BUCKETS) as u8
    }

    /// Whether the context falls inside a percentage rollout
    pub fn in_rollout(feature: &str, context_key: &str, percentage: u8) -> bool {
        Self::bucket(feature, context_key) < percentage
    }

    /// Variant assigned to the context
    pub fn variant<'a>(feature: &str, context_key: &str, weights: &'a VariantWeights) -> &'a str {
        weights.select(Self::bucket(feature, context_key))
    }
}

/// Ordered variant weight table.
///
/// Weights sum to exactly 100 and the table is never empty. Both are checked
/// when the table is built, never during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantWeights {
    variants: Vec<(String, u32)>,
}

impl VariantWeights {
    /// Build a table, keeping the given order.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagpole_core::VariantWeights;
    ///
    /// let weights = VariantWeights::new("checkout", [("control", 50), ("variant-a", 50)]);
    /// assert!(weights.is_ok());
    ///
    /// let weights = VariantWeights::new("checkout", [("a", 60), ("b", 50)]);
    /// assert!(weights.is_err());
    /// ```
    pub fn new<I, K>(feature: &str, weights: I) -> FeatureResult<Self>
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        let variants: Vec<(String, u32)> = weights
            .into_iter()
            .map(|(name, weight)| (name.into(), weight))
            .collect();

        if variants.is_empty() {
            return Err(FeatureError::invalid_weights(feature, "table is empty"));
        }

        let mut seen = HashSet::new();
        for (name, _) in &variants {
            if !seen.insert(name.as_str()) {
                return Err(FeatureError::invalid_weights(
                    feature,
                    format!("variant '{}' listed twice", name),
                ));
            }
        }

        let total: u64 = variants.iter().map(|(_, w)| u64::from(*w)).sum();
        if total != u64::from(BUCKETS) {
            return Err(FeatureError::invalid_weights(
                feature,
                format!("weights sum to {}, expected {}", total, BUCKETS),
            ));
        }

        Ok(Self { variants })
    }

    /// First variant whose cumulative weight exceeds `bucket`
    pub fn select(&self, bucket: u8) -> &str {
        let bucket = u32::from(bucket);
        let mut cumulative = 0;

        for (name, weight) in &self.variants {
            cumulative += weight;
            if bucket < cumulative {
                return name;
            }
        }

        // Unreachable for buckets below 100; the table always sums to 100
        self.variants
            .last()
            .map(|(name, _)| name.as_str())
            .unwrap_or_default()
    }

    /// Variant names in table order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variants.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}
