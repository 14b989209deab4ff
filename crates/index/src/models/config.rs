use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;

/// A per-user configuration value.
///
/// Stored as a `kind` tag next to its textual encoding, so values come back
/// with the type they were written with.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Number(f64),
    Bool(bool),
    Json(serde_json::Value),
}

impl ConfigValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
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

    pub(crate) fn encode(&self) -> Result<String> {
        Ok(match self {
            Self::String(value) => value.clone(),
            Self::Number(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Json(value) => serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData("json value"))?,
        })
    }

    pub(crate) fn decode(kind: &str, value: String) -> Result<Self> {
        Ok(match kind {
            "string" => Self::String(value),
            "number" => Self::Number(value.parse::<f64>().or_raise(|| ErrorKind::InvalidData("number value"))?),
            "bool" => Self::Bool(value.parse::<bool>().or_raise(|| ErrorKind::InvalidData("bool value"))?),
            "json" => Self::Json(serde_json::from_str(&value).or_raise(|| ErrorKind::InvalidData("json value"))?),
            _ => exn::bail!(ErrorKind::InvalidData("config kind")),
        })
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ConfigRow {
    kind: String,
    value: String,
}

impl TryFrom<ConfigRow> for ConfigValue {
    type Error = Error;
    fn try_from(row: ConfigRow) -> Result<Self> {
        Self::decode(&row.kind, row.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ConfigValue::from("ghp_token"), "string", "ghp_token")]
    #[case(ConfigValue::Number(2.5), "number", "2.5")]
    #[case(ConfigValue::Bool(true), "bool", "true")]
    #[case(ConfigValue::Json(serde_json::json!({"a": [1, 2]})), "json", r#"{"a":[1,2]}"#)]
    fn test_encoding(#[case] value: ConfigValue, #[case] kind: &str, #[case] encoded: &str) {
        assert_eq!(value.kind(), kind);
        assert_eq!(value.encode().unwrap(), encoded);
        assert_eq!(ConfigValue::decode(kind, encoded.to_string()).unwrap(), value);
    }

    #[test]
    fn test_decode_rejects_mismatched_kind() {
        let err = ConfigValue::decode("bool", "maybe".to_string()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("bool value")));
        let err = ConfigValue::decode("number", "ten".to_string()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("number value")));
        assert_eq!(ConfigValue::decode("number", "-1e3".to_string()).unwrap(), ConfigValue::Number(-1000.0));
        let err = ConfigValue::decode("blob", String::new()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("config kind")));
    }

    #[test]
    fn test_accessors_are_typed() {
        let value = ConfigValue::from("cdn.example.com");
        assert_eq!(value.as_str(), Some("cdn.example.com"));
        assert_eq!(value.as_bool(), None);
        assert_eq!(ConfigValue::Number(3.0).as_f64(), Some(3.0));
    }
}
