//! Evaluation contexts
//!
//! A [`Context`] is the entity a feature is evaluated against: a user, a
//! team, a tenant or any other identifier. The [`ContextSerializer`] turns a
//! context into the stable string used as cache and storage key.

use crate::error::{FeatureError, FeatureResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

/// Key used for the absent/`null` context.
pub const NULL_CONTEXT_KEY: &str = "__flagpole_null__";

/// Entity kind used for group contexts.
pub const GROUP_KIND: &str = "group";

/// Percent-encode the characters that delimit key segments.
fn escape(part: &str) -> String {
    if !part.contains(['%', '|', '@', ';', '=', '{', '}']) {
        return part.to_string();
    }
    let mut escaped = String::with_capacity(part.len() + 8);
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '|' => escaped.push_str("%7C"),
            '@' => escaped.push_str("%40"),
            ';' => escaped.push_str("%3B"),
            '=' => escaped.push_str("%3D"),
            '{' => escaped.push_str("%7B"),
            '}' => escaped.push_str("%7D"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Records with a structural identity (a model with a primary key).
pub trait Entity {
    /// Logical kind, e.g. `User`
    fn entity_type(&self) -> &str;

    /// Primary key
    fn entity_key(&self) -> String;
}

/// Values that know how to produce their own context identifier.
pub trait ContextSerialize {
    /// Stable identifier for this value
    fn context_identifier(&self) -> FeatureResult<String>;
}

/// Identity part of a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// No context
    Null,
    /// Plain string or number
    Scalar(String),
    /// Record with a kind and primary key
    Entity { kind: String, key: String },
    /// Identifier produced by [`ContextSerialize`]
    Custom(String),
}

/// Structured constraints attached to a context (e.g. the active tenant).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scope {
    kind: String,
    constraints: BTreeMap<String, Value>,
}

impl Scope {
    /// Create a new scope of the given kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            constraints: BTreeMap::new(),
        }
    }

    /// Add a constraint. `null` values count as undefined and are left out of the key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn constraints(&self) -> &BTreeMap<String, Value> {
        &self.constraints
    }

    /// Canonical form, constraints ordered by key. Values are JSON encoded.
    fn canonical(&self) -> String {
        let pairs: Vec<String> = self
            .constraints
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{}={}", escape(k), v))
            .collect();

        format!("@{}{{{}}}", escape(&self.kind), pairs.join(";"))
    }
}

/// Evaluation context.
///
/// Immutable once constructed; [`Context::with_scope`] returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    identity: Identity,
    scope: Option<Scope>,
}

impl Context {
    /// The absent context
    pub fn null() -> Self {
        Self::from_identity(Identity::Null)
    }

    /// String or numeric identifier
    ///
    /// Separator characters (`|`, `@`, `%` and the scope delimiters) are
    /// percent-encoded in the key, so a scalar never collides with an entity,
    /// group or scoped key.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagpole_core::{Context, ContextSerializer};
    ///
    /// let context = Context::scalar(42);
    /// assert_eq!(ContextSerializer::new().serialize(&context, None), "42");
    /// ```
    pub fn scalar(id: impl fmt::Display) -> Self {
        Self::from_identity(Identity::Scalar(id.to_string()))
    }

    /// Record identified by kind and primary key
    pub fn entity(kind: impl Into<String>, key: impl fmt::Display) -> Self {
        Self::from_identity(Identity::Entity {
            kind: kind.into(),
            key: key.to_string(),
        })
    }

    /// Context standing for a whole group
    pub fn group(name: impl fmt::Display) -> Self {
        Self::entity(GROUP_KIND, name)
    }

    /// Context for an [`Entity`]
    pub fn of<E: Entity + ?Sized>(entity: &E) -> Self {
        Self::entity(entity.entity_type(), entity.entity_key())
    }

    /// Context for a value implementing [`ContextSerialize`]
    pub fn from_serializable<S: ContextSerialize + ?Sized>(value: &S) -> FeatureResult<Self> {
        let identifier = value.context_identifier()?;
        if identifier.is_empty() {
            return Err(FeatureError::unserializable(
                "serializable context produced an empty identifier",
            ));
        }
        Ok(Self::from_identity(Identity::Custom(identifier)))
    }

    /// Context from a loosely typed JSON value.
    ///
    /// Only `null`, strings and numbers have a stable identity. Booleans,
    /// arrays and objects are rejected.
    pub fn from_value(value: Value) -> FeatureResult<Self> {
        match value {
            Value::Null => Ok(Self::null()),
            Value::String(s) => Ok(Self::scalar(s)),
            Value::Number(n) => Ok(Self::scalar(n)),
            Value::Bool(b) => Err(FeatureError::unserializable(format!(
                "boolean `{}` has no identity",
                b
            ))),
            Value::Array(_) => Err(FeatureError::unserializable(
                "arrays have no stable identity",
            )),
            Value::Object(_) => Err(FeatureError::unserializable(
                "objects without identity cannot be serialized",
            )),
        }
    }

    fn from_identity(identity: Identity) -> Self {
        Self {
            identity,
            scope: None,
        }
    }

    /// New context with the given scope attached
    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            identity: self.identity.clone(),
            scope: Some(scope),
        }
    }

    /// New context without scope
    pub fn without_scope(&self) -> Self {
        Self::from_identity(self.identity.clone())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.identity == Identity::Null
    }
}

impl From<&str> for Context {
    fn from(id: &str) -> Self {
        Self::scalar(id)
    }
}

impl From<String> for Context {
    fn from(id: String) -> Self {
        Self::from_identity(Identity::Scalar(id))
    }
}

impl From<i64> for Context {
    fn from(id: i64) -> Self {
        Self::scalar(id)
    }
}

impl From<u64> for Context {
    fn from(id: u64) -> Self {
        Self::scalar(id)
    }
}

impl TryFrom<Value> for Context {
    type Error = FeatureError;

    fn try_from(value: Value) -> FeatureResult<Self> {
        Self::from_value(value)
    }
}

/// Turns contexts into stable cache/storage keys.
///
/// Entity kinds can be mapped onto shorter stored aliases so that renaming a
/// type does not orphan stored values.
#[derive(Debug, Clone, Default)]
pub struct ContextSerializer {
    aliases: BTreeMap<String, String>,
}

impl ContextSerializer {
    /// Serializer without kind aliases
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with kind aliases.
    ///
    /// Fails with [`FeatureError::ConflictingKeyMapping`] when two kinds share an
    /// alias or an alias is empty.
    pub fn with_aliases(aliases: BTreeMap<String, String>) -> FeatureResult<Self> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();


        for (kind, alias) in &aliases {
            if alias.is_empty() {
                return Err(FeatureError::ConflictingKeyMapping(format!(
                    "kind '{}' maps to an empty alias",
                    kind
                )));
            }
            match owners.entry(alias.as_str()) {
                Entry::Occupied(existing) => {
                    return Err(FeatureError::ConflictingKeyMapping(format!(
                        "'{}' and '{}' both map to '{}'",
                        existing.get(),
                        kind,
                        alias
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(kind.as_str());
                }
            }
        }

        Ok(Self { aliases })
    }

    /// Stored name of an entity kind
    pub fn kind_alias<'a>(&'a self, kind: &'a str) -> &'a str {
        self.aliases.get(kind).map(String::as_str).unwrap_or(kind)
    }

    /// Serialize a context, folding in its scope or else the ambient scope.
    ///
    /// Identical `(identity, scope)` pairs always produce the same key.
    pub fn serialize(&self, context: &Context, ambient: Option<&Scope>) -> String {
        let mut key = match context.identity() {
            Identity::Null => NULL_CONTEXT_KEY.to_string(),
            Identity::Scalar(id) => escape(id),
            Identity::Entity { kind, key } => {
                format!("{}|{}", escape(self.kind_alias(kind)), escape(key))
            }
            Identity::Custom(id) => escape(id),
        };

        if let Some(scope) = context.scope().or(ambient) {
            key.push_str(&scope.canonical());
        }

        key
    }
}
