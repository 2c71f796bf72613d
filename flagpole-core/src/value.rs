//! Feature values
//!
//! Resolvers and stores deal in plain JSON payloads. The engine lifts those
//! into a tri-state [`FeatureValue`] so that "never defined" stays observable
//! next to "explicitly off".

use serde::{Deserialize, Serialize};

/// Opaque serializable payload carried by an active feature.
pub type Payload = serde_json::Value;

/// Result of evaluating a feature for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "payload", rename_all = "lowercase")]
pub enum FeatureValue {
    /// Feature is on, with its payload (`true`, a variant name, any JSON)
    Active(Payload),
    /// Feature is explicitly off
    Inactive,
    /// Feature was never defined nor stored
    Undefined,
}

impl FeatureValue {
    /// Lift a stored or resolved payload. `false` and `null` are inactive.
    pub fn from_payload(payload: Payload) -> Self {
        match payload {
            Payload::Null | Payload::Bool(false) => Self::Inactive,
            other => Self::Active(other),
        }
    }

    /// Active with a `true` payload
    pub fn on() -> Self {
        Self::Active(Payload::Bool(true))
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub fn is_inactive(&self) -> bool {
        !self.is_active()
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Payload of an active value
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Active(p) => Some(p),
            _ => None,
        }
    }

    /// Boolean view. Inactive and undefined are both `false`.
    pub fn as_bool(&self) -> bool {
        self.is_active()
    }

    /// String payload of an active value
    pub fn as_str(&self) -> Option<&str> {
        self.payload().and_then(|p| p.as_str())
    }

    /// Payload to persist. Undefined values are never stored.
    pub fn into_stored(self) -> Option<Payload> {
        match self {
            Self::Active(p) => Some(p),
            Self::Inactive => Some(Payload::Bool(false)),
            Self::Undefined => None,
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        if value { Self::on() } else { Self::Inactive }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload() {
        assert_eq!(FeatureValue::from_payload(json!(false)), FeatureValue::Inactive);
        assert_eq!(FeatureValue::from_payload(Payload::Null), FeatureValue::Inactive);
        assert_eq!(FeatureValue::from_payload(json!(true)), FeatureValue::on());
        assert_eq!(
            FeatureValue::from_payload(json!("blue")).as_str(),
            Some("blue")
        );
        // Zero and empty strings are still explicit values
        assert!(FeatureValue::from_payload(json!(0)).is_active());
    }

    #[test]
    fn test_undefined_is_falsy_but_distinct() {
        let value = FeatureValue::Undefined;
        assert!(!value.as_bool());
        assert!(value.is_inactive());
        assert!(value.is_undefined());
        assert!(!FeatureValue::Inactive.is_undefined());
    }

    #[test]
    fn test_into_stored() {
        assert_eq!(FeatureValue::Inactive.into_stored(), Some(json!(false)));
        assert_eq!(FeatureValue::Undefined.into_stored(), None);
        assert_eq!(
            FeatureValue::Active(json!({"limit": 5})).into_stored(),
            Some(json!({"limit": 5}))
        );
    }
}
