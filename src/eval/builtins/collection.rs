use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::{Map, Value};

use super::{array_arg, int_arg, kind, object_arg, str_arg};

/// Length of a string, list or object
pub fn create_length_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => return Err(format!("cannot take the length of {}", kind(other))),
            };
            Ok(Value::from(len as i64))
        })
}

/// Concatenate multiple lists into a single list
pub fn create_concat_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .variadic_param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = Vec::new();
            for idx in 0..args.len() {
                result.extend(array_arg(&args, idx)?.iter().cloned());
            }
            Ok(Value::from(result))
        })
}

/// Flatten nested lists into a single level list
pub fn create_flatten_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            fn flatten(values: &[Value], out: &mut Vec<Value>) {
                for v in values {
                    match v {
                        Value::Array(inner) => flatten(inner, out),
                        other => out.push(other.clone()),
                    }
                }
            }

            let mut result = Vec::new();
            flatten(array_arg(&args, 0)?, &mut result);
            Ok(Value::from(result))
        })
}

/// Remove duplicate values from a list preserving the first occurrence
pub fn create_distinct_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = Vec::new();
            for v in array_arg(&args, 0)? {
                if !result.contains(v) {
                    result.push(v.clone());
                }
            }
            Ok(Value::from(result))
        })
}

pub fn create_contains_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Any)
        .build(|args: FuncArgs| Ok(Value::from(array_arg(&args, 0)?.contains(&args[1]))))
}

/// Keys of an object in lexical order
pub fn create_keys_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut keys: Vec<&String> = object_arg(&args, 0)?.keys().collect();
            keys.sort();
            Ok(Value::from(
                keys.into_iter().map(|k| Value::from(k.as_str())).collect::<Vec<_>>(),
            ))
        })
}

/// Values of an object, ordered by key
pub fn create_values_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut entries: Vec<(&String, &Value)> = object_arg(&args, 0)?.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Ok(Value::from(
                entries.into_iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            ))
        })
}

/// `lookup(map, key, default)`
pub fn create_lookup_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let map = object_arg(&args, 0)?;
            let key = str_arg(&args, 1)?;
            match (map.get(key), args.get(2)) {
                (Some(v), _) => Ok(v.clone()),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(format!("lookup failed to find key \"{key}\"")),
            }
        })
}

/// Shallow merge of objects, later arguments win
pub fn create_merge_func() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let mut result = Map::new();
            for arg in args.iter() {
                match arg {
                    Value::Object(map) => {
                        for (k, v) in map {
                            result.insert(k.clone(), v.clone());
                        }
                    }
                    Value::Null => {}
                    other => return Err(format!("merge expects objects, got {}", kind(other))),
                }
            }
            Ok(Value::Object(result))
        })
}

/// `element(list, index)` wraps around the end of the list
pub fn create_element_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            let idx = int_arg(&args, 1)?;
            if arr.is_empty() {
                return Err("cannot use element function with an empty list".to_string());
            }
            if idx < 0 {
                return Err("element index must not be negative".to_string());
            }
            Ok(arr[idx as usize % arr.len()].clone())
        })
}

/// Return a slice of the list from start (inclusive) to end (exclusive)
pub fn create_slice_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            let len = arr.len() as i64;
            let start = int_arg(&args, 1)?;
            let end = int_arg(&args, 2)?;

            if start < 0 || end > len || start > end {
                return Err(format!("invalid slice bounds {start}..{end} for length {len}"));
            }

            Ok(Value::from(arr[start as usize..end as usize].to_vec()))
        })
}

/// Reverse the order of elements in a list
pub fn create_reverse_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let result: Vec<Value> = array_arg(&args, 0)?.iter().cloned().rev().collect();
            Ok(Value::from(result))
        })
}

/// Sort a list of strings lexically
pub fn create_sort_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result = array_arg(&args, 0)?.clone();
            result.sort_by(|a, b| match (a.as_str(), b.as_str()) {
                (Some(sa), Some(sb)) => sa.cmp(sb),
                _ => a.to_string().cmp(&b.to_string()),
            });
            Ok(Value::from(result))
        })
}

/// First argument that is neither null nor an empty string
pub fn create_coalesce_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            Ok(args
                .iter()
                .find(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .unwrap_or(Value::Null))
        })
}

/// Drop null and empty-string elements
pub fn create_compact_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let result: Vec<Value> = array_arg(&args, 0)?
                .iter()
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .collect();
            Ok(Value::from(result))
        })
}

/// `zipmap(keys, values)`
pub fn create_zipmap_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let keys = array_arg(&args, 0)?;
            let values = array_arg(&args, 1)?;
            if keys.len() != values.len() {
                return Err("zipmap needs lists of the same length".to_string());
            }
            let mut result = Map::new();
            for (k, v) in keys.iter().zip(values) {
                let key = k
                    .as_str()
                    .ok_or_else(|| format!("zipmap keys must be strings, got {}", kind(k)))?;
                result.insert(key.to_string(), v.clone());
            }
            Ok(Value::Object(result))
        })
}

#[cfg(test)]
mod tests {
    use super::super::eval_str;
    use super::*;

    fn list(values: Vec<Value>) -> Value {
        Value::from(values)
    }

    #[test]
    fn test_length_function() {
        assert_eq!(eval_str("length(\"abc\")").unwrap(), Value::from(3));
        assert_eq!(eval_str("length([1, 2])").unwrap(), Value::from(2));
        assert_eq!(eval_str("length({a = 1})").unwrap(), Value::from(1));
    }

    #[test]
    fn test_concat_function() {
        let expected = list(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(eval_str("concat([1,2], [3])").unwrap(), expected);
    }

    #[test]
    fn test_flatten_function() {
        let expected = list(vec![1, 2, 3, 4].into_iter().map(Value::from).collect());
        assert_eq!(eval_str("flatten([[1,2],[3,[4]]])").unwrap(), expected);
    }

    #[test]
    fn test_distinct_function() {
        let expected = list(vec![1, 2, 3].into_iter().map(Value::from).collect());
        assert_eq!(eval_str("distinct([1,2,2,3])").unwrap(), expected);
    }

    #[test]
    fn test_keys_and_values_sorted() {
        assert_eq!(
            eval_str("keys({b = 1, a = 2})").unwrap(),
            list(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            eval_str("values({b = 1, a = 2})").unwrap(),
            list(vec![Value::from(2), Value::from(1)])
        );
    }

    #[test]
    fn test_lookup_with_default() {
        assert_eq!(eval_str("lookup({a = \"x\"}, \"a\", \"d\")").unwrap(), Value::from("x"));
        assert_eq!(eval_str("lookup({a = \"x\"}, \"b\", \"d\")").unwrap(), Value::from("d"));
        assert!(eval_str("lookup({a = \"x\"}, \"b\")").is_err());
    }

    #[test]
    fn test_merge_later_wins() {
        let merged = eval_str("merge({a = 1, b = 1}, {b = 2})").unwrap();
        let obj = merged.as_object().unwrap();
        assert_eq!(obj.get("a"), Some(&Value::from(1)));
        assert_eq!(obj.get("b"), Some(&Value::from(2)));
    }

    #[test]
    fn test_element_wraps() {
        assert_eq!(eval_str("element([\"a\", \"b\"], 3)").unwrap(), Value::from("b"));
    }

    #[test]
    fn test_slice_function() {
        let expected = list(vec![Value::from(2), Value::from(3)]);
        assert_eq!(eval_str("slice([1,2,3,4,5], 1, 3)").unwrap(), expected);
        assert!(eval_str("slice([1,2], 1, 5)").is_err());
    }

    #[test]
    fn test_coalesce_and_compact() {
        assert_eq!(eval_str("coalesce(null, \"\", \"first\")").unwrap(), Value::from("first"));
        assert_eq!(
            eval_str("compact([\"a\", \"\", null, \"b\"])").unwrap(),
            list(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_zipmap_function() {
        let zipped = eval_str("zipmap([\"a\", \"b\"], [1, 2])").unwrap();
        assert_eq!(zipped.as_object().unwrap().get("b"), Some(&Value::from(2)));
    }
}
