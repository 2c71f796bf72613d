//! Error types for feature resolution.

use thiserror::Error;

/// Result type for feature operations.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Feature resolution errors.
///
/// Configuration errors are raised when a definition or resolver is built,
/// never while a feature is being resolved.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Variant weights are empty, duplicated or do not sum to 100
    #[error("Invalid variant weights for '{feature}': {reason}")]
    InvalidVariantWeights {
        /// Feature the table was registered for
        feature: String,
        /// What was wrong with the table
        reason: String,
    },

    /// Rollout percentage above 100
    #[error("Invalid rollout percentage for '{feature}': {percentage}")]
    InvalidPercentage {
        /// Feature the rollout was registered for
        feature: String,
        /// Offending percentage
        percentage: u8,
    },

    /// Two entity kinds map onto the same stored alias
    #[error("Conflicting key mapping: {0}")]
    ConflictingKeyMapping(String),

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The context cannot be turned into a stable key
    #[error("Unserializable context: {0}")]
    UnserializableContext(String),

    /// No context was given and no default context could be determined
    #[error("No evaluation context available")]
    MissingContext,

    /// The feature has no variant table
    #[error("Feature '{0}' is not a variant feature")]
    NotAVariant(String),

    /// The feature is inactive or holds a non-variant value for this context
    #[error("No variant available for feature '{0}'")]
    VariantUnavailable(String),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FeatureError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new unserializable context error
    pub fn unserializable<S: Into<String>>(msg: S) -> Self {
        Self::UnserializableContext(msg.into())
    }

    /// Create an invalid variant weights error
    pub fn invalid_weights(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVariantWeights {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error comes from definition-time configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidVariantWeights { .. }
                | Self::InvalidPercentage { .. }
                | Self::ConflictingKeyMapping(_)
                | Self::Config(_)
        )
    }

    /// Check if this error is an identity error
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::UnserializableContext(_) | Self::MissingContext)
    }

    /// Check if this error wraps an unsupported store operation
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_unsupported())
    }
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row for (feature, key) already exists
    #[error("Value for '{feature}' already stored for '{key}'")]
    Conflict {
        /// Feature name
        feature: String,
        /// Serialized context key
        key: String,
    },

    /// The backend cannot perform this operation
    #[error("Operation '{operation}' is not supported by the {store} store")]
    Unsupported {
        /// Operation name
        operation: &'static str,
        /// Store type name
        store: &'static str,
    },

    /// Backend failure
    #[error("Feature store error: {0}")]
    Backend(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Redis connection error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Database error
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Create a new conflict error
    pub fn conflict(feature: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Conflict {
            feature: feature.into(),
            key: key.into(),
        }
    }

    /// Create a new unsupported operation error
    pub fn unsupported(operation: &'static str, store: &'static str) -> Self {
        Self::Unsupported { operation, store }
    }

    /// Create a new backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Check if this is a first-write conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this is an unsupported operation
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(FeatureError::invalid_weights("x", "sum is 110").is_configuration());
        assert!(FeatureError::config("bad").is_configuration());
        assert!(!FeatureError::MissingContext.is_configuration());
        assert!(FeatureError::MissingContext.is_identity());
    }

    #[test]
    fn test_store_conflict() {
        let error = StoreError::conflict("new-ui", "User|1");
        assert!(error.is_conflict());
        assert!(!error.is_unsupported());
        assert!(error.to_string().contains("User|1"));
    }

    #[test]
    fn test_unsupported_is_distinguishable() {
        let error: FeatureError = StoreError::unsupported("list_stored", "redis").into();
        assert!(error.is_unsupported());
        assert_eq!(
            error.to_string(),
            "Operation 'list_stored' is not supported by the redis store"
        );
    }
}
