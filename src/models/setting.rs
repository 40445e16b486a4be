//! Typed key/value runtime settings.

use serde::{Deserialize, Serialize};

/// A typed setting value. The type tag is stored alongside the encoded
/// value so reads round-trip without guessing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SettingValue {
    /// Plain string.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
}

impl SettingValue {
    /// Stable type tag stored in the database.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Json(_) => "json",
        }
    }

    /// Encode to the stored text form.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(n) => n.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Decode from a stored (tag, text) pair. Returns `None` when the text
    /// does not parse as the tagged type.
    #[must_use]
    pub fn decode(type_tag: &str, raw: &str) -> Option<Self> {
        match type_tag {
            "str" => Some(Self::Str(raw.to_string())),
            "int" => raw.parse().ok().map(Self::Int),
            "float" => raw.parse().ok().map(Self::Float),
            "bool" => raw.parse().ok().map(Self::Bool),
            "json" => serde_json::from_str(raw).ok().map(Self::Json),
            _ => None,
        }
    }

    /// The value as a float, accepting `Int` for convenience.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// The value as an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}
