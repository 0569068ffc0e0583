use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use regex::Regex;

use super::{array_arg, int_arg, str_arg, value_to_string};

/// String manipulation functions
pub fn create_upper_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_uppercase())))
}

pub fn create_lower_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_lowercase())))
}

pub fn create_title_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let mut out = String::new();
            let mut at_word_start = true;
            for c in str_arg(&args, 0)?.chars() {
                if at_word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.push(c);
                }
                at_word_start = !c.is_alphanumeric();
            }
            Ok(Value::from(out))
        })
}

pub fn create_trimspace_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.trim())))
}

/// `trim(str, cutset)` removes any of the cutset characters from both ends
pub fn create_trim_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let cutset: Vec<char> = str_arg(&args, 1)?.chars().collect();
            Ok(Value::from(
                str_arg(&args, 0)?.trim_matches(|c: char| cutset.contains(&c)),
            ))
        })
}

pub fn create_trimprefix_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let prefix = str_arg(&args, 1)?;
            Ok(Value::from(s.strip_prefix(prefix).unwrap_or(s)))
        })
}

pub fn create_trimsuffix_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let suffix = str_arg(&args, 1)?;
            Ok(Value::from(s.strip_suffix(suffix).unwrap_or(s)))
        })
}

/// `replace(str, search, replacement)`; a search wrapped in slashes is a regex
pub fn create_replace_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let search = str_arg(&args, 1)?;
            let replacement = str_arg(&args, 2)?;
            if search.len() > 1 && search.starts_with('/') && search.ends_with('/') {
                let re = Regex::new(&search[1..search.len() - 1]).map_err(|e| e.to_string())?;
                Ok(Value::from(re.replace_all(s, replacement).into_owned()))
            } else {
                Ok(Value::from(s.replace(search, replacement)))
            }
        })
}

/// `substr(str, offset, length)`; a length of -1 takes the rest
pub fn create_substr_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let chars: Vec<char> = str_arg(&args, 0)?.chars().collect();
            let offset = int_arg(&args, 1)?;
            let length = int_arg(&args, 2)?;
            let len = chars.len() as i64;
            let start = if offset < 0 { len.saturating_add(offset) } else { offset }.clamp(0, len);
            let end = if length < 0 { len } else { start.saturating_add(length).min(len) };
            Ok(Value::from(
                chars[start as usize..end as usize].iter().collect::<String>(),
            ))
        })
}

pub fn create_startswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            Ok(Value::from(str_arg(&args, 0)?.starts_with(str_arg(&args, 1)?)))
        })
}

pub fn create_endswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            Ok(Value::from(str_arg(&args, 0)?.ends_with(str_arg(&args, 1)?)))
        })
}

pub fn create_strcontains_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.contains(str_arg(&args, 1)?))))
}

/// `format(spec, args...)` supporting `%s`, `%d`, `%v` and `%%`
pub fn create_format_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let spec = str_arg(&args, 0)?;
            let mut rest = args.iter().skip(1);
            let mut out = String::new();
            let mut chars = spec.chars();
            while let Some(c) = chars.next() {
                if c != '%' {
                    out.push(c);
                    continue;
                }
                match chars.next() {
                    Some('%') => out.push('%'),
                    Some(verb @ ('s' | 'd' | 'v')) => {
                        let arg = rest
                            .next()
                            .ok_or_else(|| format!("not enough arguments for %{verb}"))?;
                        if verb == 'd' && arg.as_i64().is_none() {
                            return Err(format!("%d requires a whole number, got {arg}"));
                        }
                        out.push_str(&value_to_string(arg)?);
                    }
                    Some(other) => return Err(format!("unsupported format verb %{other}")),
                    None => return Err("format string ends with %".to_string()),
                }
            }
            Ok(Value::from(out))
        })
}

pub fn create_join_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .variadic_param(ParamType::Any) // Use Any for list-like values
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let mut parts = Vec::new();
            for idx in 1..args.len() {
                for v in array_arg(&args, idx)? {
                    parts.push(value_to_string(v)?);
                }
            }
            Ok(Value::from(parts.join(separator)))
        })
}

pub fn create_split_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let s = str_arg(&args, 1)?;
            let parts: Vec<Value> = s.split(separator).map(Value::from).collect();
            Ok(Value::from(parts))
        })
}
