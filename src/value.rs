use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Result};
use serde_json::Value as Json;

/// Dynamic value produced by evaluation.
///
/// `Unknown` marks a value that cannot be determined statically (an unset
/// variable, say). It survives merges and lookups and turns into `null` at
/// the `hcl`/JSON boundaries.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(hcl::Number),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Unknown,
}

impl Value {
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Unknown => "unknown",
        }
    }

    pub fn to_hcl(&self) -> hcl::Value {
        match self {
            Value::Null | Value::Unknown => hcl::Value::Null,
            Value::Bool(b) => hcl::Value::Bool(*b),
            Value::Number(n) => hcl::Value::Number(n.clone()),
            Value::String(s) => hcl::Value::String(s.clone()),
            Value::List(items) => hcl::Value::Array(items.iter().map(Value::to_hcl).collect()),
            Value::Object(map) => hcl::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_hcl()))
                    .collect::<hcl::Map<_, _>>(),
            ),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null | Value::Unknown => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(n),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_toml(value: &toml::Value) -> Result<Self> {
        Ok(match value {
            toml::Value::String(s) => Value::String(s.clone()),
            toml::Value::Integer(i) => Value::Number(hcl::Number::from(*i)),
            toml::Value::Float(f) => Value::Number(
                hcl::Number::from_f64(*f).ok_or_else(|| anyhow!("invalid float {f}"))?,
            ),
            toml::Value::Boolean(b) => Value::Bool(*b),
            toml::Value::Array(arr) => {
                Value::List(arr.iter().map(Value::from_toml).collect::<Result<_>>()?)
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Value::from_toml(v)?)))
                    .collect::<Result<_>>()?,
            ),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        })
    }
}

fn number_to_json(n: &hcl::Number) -> Json {
    if let Some(i) = n.as_i64() {
        Json::from(i)
    } else if let Some(u) = n.as_u64() {
        Json::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

impl From<hcl::Value> for Value {
    fn from(value: hcl::Value) -> Self {
        match value {
            hcl::Value::Null => Value::Null,
            hcl::Value::Bool(b) => Value::Bool(b),
            hcl::Value::Number(n) => Value::Number(n),
            hcl::Value::String(s) => Value::String(s),
            hcl::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            hcl::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Json> for Value {
    fn from(value: Json) -> Self {
        match value {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Number(hcl::Number::from(i))
                } else if let Some(u) = n.as_u64() {
                    Value::Number(hcl::Number::from(u))
                } else {
                    n.as_f64()
                        .and_then(hcl::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(hcl::Number::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => f.write_str("(unknown)"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
