use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SgValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<SgValue>),
    Map(BTreeMap<String, SgValue>),
}

impl SgValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

impl fmt::Display for SgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => write!(f, "{}", value),
            Self::String(value) => write!(f, "{:?}", value),
            Self::Array(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<f64> for SgValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for SgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for SgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_deserialize_maps_json_shapes() {
        let parsed: Vec<SgValue> =
            serde_json::from_str(r#"[null, true, 1.5, "x", [1], {"a": 2}]"#).expect("values");
        assert_eq!(parsed[0], SgValue::Null);
        assert_eq!(parsed[1].as_bool(), Some(true));
        assert_eq!(parsed[2].as_number(), Some(1.5));
        assert_eq!(parsed[3].as_string(), Some("x"));
        assert_eq!(parsed[4].type_name(), "array");
        assert_eq!(parsed[5].type_name(), "map");
    }

    #[test]
    fn display_renders_nested_values() {
        let value = SgValue::Array(vec![SgValue::from(1.0), SgValue::from("a"), SgValue::Null]);
        assert_eq!(value.to_string(), "[1, \"a\", null]");
    }
}
