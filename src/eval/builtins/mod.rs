// Built-in functions available to configuration expressions, by category

pub mod collection;
pub mod conversion;
pub mod crypto;
pub mod encoding;
pub mod numeric;
pub mod string;

use hcl::eval::{Context, FuncArgs};
use hcl::{Map, Number, Value};

/// Create a context with all built-in functions
pub fn create_context() -> Context<'static> {
    let mut ctx = Context::new();

    // String functions
    ctx.declare_func("upper", string::create_upper_func());
    ctx.declare_func("lower", string::create_lower_func());
    ctx.declare_func("title", string::create_title_func());
    ctx.declare_func("trimspace", string::create_trimspace_func());
    ctx.declare_func("trim", string::create_trim_func());
    ctx.declare_func("trimprefix", string::create_trimprefix_func());
    ctx.declare_func("trimsuffix", string::create_trimsuffix_func());
    ctx.declare_func("replace", string::create_replace_func());
    ctx.declare_func("substr", string::create_substr_func());
    ctx.declare_func("startswith", string::create_startswith_func());
    ctx.declare_func("endswith", string::create_endswith_func());
    ctx.declare_func("strcontains", string::create_strcontains_func());
    ctx.declare_func("format", string::create_format_func());
    ctx.declare_func("join", string::create_join_func());
    ctx.declare_func("split", string::create_split_func());

    // Collection functions
    ctx.declare_func("length", collection::create_length_func());
    ctx.declare_func("concat", collection::create_concat_func());
    ctx.declare_func("flatten", collection::create_flatten_func());
    ctx.declare_func("distinct", collection::create_distinct_func());
    ctx.declare_func("contains", collection::create_contains_func());
    ctx.declare_func("keys", collection::create_keys_func());
    ctx.declare_func("values", collection::create_values_func());
    ctx.declare_func("lookup", collection::create_lookup_func());
    ctx.declare_func("merge", collection::create_merge_func());
    ctx.declare_func("element", collection::create_element_func());
    ctx.declare_func("slice", collection::create_slice_func());
    ctx.declare_func("reverse", collection::create_reverse_func());
    ctx.declare_func("sort", collection::create_sort_func());
    ctx.declare_func("coalesce", collection::create_coalesce_func());
    ctx.declare_func("compact", collection::create_compact_func());
    ctx.declare_func("zipmap", collection::create_zipmap_func());

    // Conversion functions
    ctx.declare_func("toset", conversion::create_toset_func());
    ctx.declare_func("tolist", conversion::create_tolist_func());
    ctx.declare_func("tomap", conversion::create_tomap_func());
    ctx.declare_func("tostring", conversion::create_tostring_func());
    ctx.declare_func("tonumber", conversion::create_tonumber_func());
    ctx.declare_func("tobool", conversion::create_tobool_func());

    // Numeric functions
    ctx.declare_func("min", numeric::create_min_func());
    ctx.declare_func("max", numeric::create_max_func());
    ctx.declare_func("abs", numeric::create_abs_func());
    ctx.declare_func("ceil", numeric::create_ceil_func());
    ctx.declare_func("floor", numeric::create_floor_func());

    // Encoding functions
    ctx.declare_func("jsonencode", encoding::create_jsonencode_func());
    ctx.declare_func("base64encode", encoding::create_base64encode_func());
    ctx.declare_func("base64decode", encoding::create_base64decode_func());

    // Cryptographic functions
    ctx.declare_func("md5", crypto::create_md5_func());
    ctx.declare_func("sha256", crypto::create_sha256_func());
    ctx.declare_func("sha512", crypto::create_sha512_func());

    ctx
}

pub(crate) fn str_arg(args: &FuncArgs, idx: usize) -> Result<&str, String> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {} must be a string", idx + 1))
}

pub(crate) fn int_arg(args: &FuncArgs, idx: usize) -> Result<i64, String> {
    args.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("argument {} must be a whole number", idx + 1))
}

pub(crate) fn array_arg(args: &FuncArgs, idx: usize) -> Result<&Vec<Value>, String> {
    args.get(idx)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("argument {} must be a list", idx + 1))
}

pub(crate) fn object_arg(args: &FuncArgs, idx: usize) -> Result<&Map<String, Value>, String> {
    args.get(idx)
        .and_then(Value::as_object)
        .ok_or_else(|| format!("argument {} must be an object", idx + 1))
}

/// Renders a primitive the way string interpolation does.
pub(crate) fn value_to_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("cannot convert {} to string", kind(other))),
    }
}

pub(crate) fn number_value(f: f64) -> Result<Value, String> {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("{f} is not a finite number"))
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
pub(crate) fn eval_str(expr_str: &str) -> Result<Value, String> {
    use hcl::eval::Evaluate;

    let ctx = create_context();
    let body: hcl::Body = hcl::from_str(&format!("test = {}", expr_str)).unwrap();
    let expr = body
        .attributes()
        .find(|a| a.key() == "test")
        .unwrap()
        .expr();
    expr.evaluate(&ctx).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_functions_registered() {
        let functions = [
            "upper", "lower", "title", "trimspace", "trim", "trimprefix", "trimsuffix",
            "replace", "substr", "startswith", "endswith", "strcontains", "format", "join",
            "split", "length", "concat", "flatten", "distinct", "contains", "keys", "values",
            "lookup", "merge", "element", "slice", "reverse", "sort", "coalesce", "compact",
            "zipmap", "toset", "tolist", "tomap", "tostring", "tonumber", "tobool", "min",
            "max", "abs", "ceil", "floor", "jsonencode", "base64encode", "base64decode", "md5",
            "sha256", "sha512",
        ];

        for func_name in functions {
            // Argument errors are fine, an undefined function is not
            if let Err(err) = eval_str(&format!("{}(\"test\")", func_name)) {
                assert!(
                    !err.contains("undefined function"),
                    "{func_name} not registered: {err}"
                );
            }
        }
    }

    #[test]
    fn test_number_value_prefers_integers() {
        assert_eq!(number_value(3.0).unwrap(), Value::from(3));
        assert_eq!(number_value(2.5).unwrap(), Value::Number(Number::from_f64(2.5).unwrap()));
    }
}
