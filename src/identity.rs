//! Resource identities.
//!
//! An [`Identity`] is the canonical `(resource type, primary key)` pair. Two
//! fragments with equal identities denote the same logical resource no matter
//! how many include paths discovered them. Equality and hashing cover both
//! halves of the pair, so `articles#1` and `comments#1` never collide.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Resource type tag (e.g. `"articles"`).
///
/// Backed by an `Arc<str>` so identities stay cheap to clone while being
/// copied into fragments, lookup plans and relationship slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(Arc<str>);

impl ResourceType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResourceType {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// Opaque primary key value.
///
/// The derived ordering only exists so sets of identities iterate
/// deterministically; nothing in the engine depends on keys being numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// Integer key (serial / bigserial columns)
    Int(i64),
    /// UUID key
    Uuid(Uuid),
    /// Any other textual key
    Str(String),
}

impl PrimaryKey {
    /// Read a key out of a JSON value.
    ///
    /// Integers become [`PrimaryKey::Int`]; strings become [`PrimaryKey::Uuid`]
    /// when they parse as a UUID and [`PrimaryKey::Str`] otherwise. Anything
    /// else (null, floats, objects) is not a key.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(PrimaryKey::Int),
            serde_json::Value::String(s) => Some(match Uuid::parse_str(s) {
                Ok(uuid) => PrimaryKey::Uuid(uuid),
                Err(_) => PrimaryKey::Str(s.clone()),
            }),
            _ => None,
        }
    }

    /// JSON form of the key, as a store row would hold it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PrimaryKey::Int(i) => serde_json::Value::from(*i),
            PrimaryKey::Uuid(u) => serde_json::Value::String(u.to_string()),
            PrimaryKey::Str(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Bindable SQL value for statement building.
    pub fn to_sql_value(&self) -> sea_query::Value {
        match self {
            PrimaryKey::Int(i) => sea_query::Value::BigInt(Some(*i)),
            PrimaryKey::Uuid(u) => sea_query::Value::Uuid(Some(*u)),
            PrimaryKey::Str(s) => sea_query::Value::String(Some(s.clone())),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(i) => write!(f, "{i}"),
            PrimaryKey::Uuid(u) => write!(f, "{u}"),
            PrimaryKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        PrimaryKey::Int(value)
    }
}

impl From<i32> for PrimaryKey {
    fn from(value: i32) -> Self {
        PrimaryKey::Int(i64::from(value))
    }
}

impl From<Uuid> for PrimaryKey {
    fn from(value: Uuid) -> Self {
        PrimaryKey::Uuid(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::Str(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        PrimaryKey::Str(value)
    }
}

/// Canonical `(type, primary key)` pair identifying one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(rename = "id")]
    pub key: PrimaryKey,
}

impl Identity {
    pub fn new(resource_type: impl Into<ResourceType>, key: impl Into<PrimaryKey>) -> Self {
        Self {
            resource_type: resource_type.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.resource_type, self.key)
    }
}
