//! Per unit-of-work resolution cache
//!
//! Memoizes `(feature, context key) -> FeatureValue` for one request or job.
//! There is no TTL and no locking: the cache belongs to exactly one
//! [`FeatureResolver`](crate::FeatureResolver) and is flushed at unit-of-work
//! boundaries by the embedding application.

use crate::value::FeatureValue;
use std::collections::HashMap;

/// Resolution cache keyed by feature, then context key.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    entries: HashMap<String, HashMap<String, FeatureValue>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feature: &str, context_key: &str) -> Option<&FeatureValue> {
        self.entries.get(feature)?.get(context_key)
    }

    pub fn contains(&self, feature: &str, context_key: &str) -> bool {
        self.get(feature, context_key).is_some()
    }

    pub fn put(&mut self, feature: &str, context_key: &str, value: FeatureValue) {
        self.entries
            .entry(feature.to_string())
            .or_default()
            .insert(context_key.to_string(), value);
    }

    /// Evict one (feature, context key) entry
    pub fn forget(&mut self, feature: &str, context_key: &str) {
        if let Some(values) = self.entries.get_mut(feature) {
            values.remove(context_key);
        }
    }

    /// Evict every entry of one feature
    pub fn forget_feature(&mut self, feature: &str) {
        self.entries.remove(feature);
    }

    /// Evict everything
    pub fn flush(&mut self) {
        self.entries.clear();
    }

    /// Number of cached (feature, context) pairs
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let mut cache = ResolutionCache::new();
        cache.put("new-ui", "User|1", FeatureValue::on());

        assert_eq!(cache.get("new-ui", "User|1"), Some(&FeatureValue::on()));
        assert!(cache.get("new-ui", "User|2").is_none());
        assert!(cache.get("other", "User|1").is_none());
    }

    #[test]
    fn test_forget_feature_is_scoped() {
        let mut cache = ResolutionCache::new();
        cache.put("a", "User|1", FeatureValue::on());
        cache.put("a", "User|2", FeatureValue::Inactive);
        cache.put("b", "User|1", FeatureValue::on());

        cache.forget_feature("a");

        assert!(!cache.contains("a", "User|1"));
        assert!(!cache.contains("a", "User|2"));
        assert!(cache.contains("b", "User|1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_flush() {
        let mut cache = ResolutionCache::new();
        cache.put("a", "1", FeatureValue::Undefined);
        cache.put("b", "1", FeatureValue::on());
        cache.flush();
        assert!(cache.is_empty());
    }
}
