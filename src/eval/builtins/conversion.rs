use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::{Map, Value};

use super::{kind, value_to_string};

/// Distinct elements in sorted order
pub fn create_toset_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let items = match &args[0] {
                Value::Array(items) => items.clone(),
                Value::Null => Vec::new(),
                other => return Err(format!("cannot convert {} to set", kind(other))),
            };
            let mut result: Vec<Value> = Vec::new();
            for v in items {
                if !result.contains(&v) {
                    result.push(v);
                }
            }
            result.sort_by(|a, b| match (a.as_str(), b.as_str()) {
                (Some(sa), Some(sb)) => sa.cmp(sb),
                _ => a.to_string().cmp(&b.to_string()),
            });
            Ok(Value::from(result))
        })
}

pub fn create_tolist_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Array(items) => Ok(Value::from(items.clone())),
            other => Err(format!("cannot convert {} to list", kind(other))),
        })
}

pub fn create_tomap_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Object(map) => Ok(Value::Object(map.clone())),
            Value::Null => Ok(Value::Object(Map::new())),
            other => Err(format!("cannot convert {} to map", kind(other))),
        })
}

pub fn create_tostring_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Null => Ok(Value::Null),
            other => value_to_string(other).map(Value::from),
        })
}

pub fn create_tonumber_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::Null => Ok(Value::Null),
            Value::String(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(Value::from(i))
                } else {
                    s.parse::<f64>()
                        .ok()
                        .and_then(hcl::Number::from_f64)
                        .map(Value::Number)
                        .ok_or_else(|| format!("cannot convert \"{s}\" to number"))
                }
            }
            other => Err(format!("cannot convert {} to number", kind(other))),
        })
}

pub fn create_tobool_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::Bool(b) => Ok(Value::from(*b)),
            Value::Null => Ok(Value::Null),
            Value::String(s) if s == "true" => Ok(Value::from(true)),
            Value::String(s) if s == "false" => Ok(Value::from(false)),
            other => Err(format!("cannot convert {other} to bool")),
        })
}

#[cfg(test)]
mod tests {
    use super::super::eval_str;
    use super::*;

    #[test]
    fn test_toset_sorts_and_dedupes() {
        let expected = Value::from(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(eval_str("toset([\"b\", \"a\", \"b\"])").unwrap(), expected);
    }

    #[test]
    fn test_tostring_and_tonumber() {
        assert_eq!(eval_str("tostring(42)").unwrap(), Value::from("42"));
        assert_eq!(eval_str("tonumber(\"7\")").unwrap(), Value::from(7));
        assert!(eval_str("tonumber(\"seven\")").is_err());
    }

    #[test]
    fn test_tobool_function() {
        assert_eq!(eval_str("tobool(\"true\")").unwrap(), Value::from(true));
        assert!(eval_str("tobool(\"yes\")").is_err());
    }

    #[test]
    fn test_tomap_rejects_lists() {
        assert!(eval_str("tomap([1])").is_err());
    }
}
