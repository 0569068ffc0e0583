use base64::{engine::general_purpose, Engine as _};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

use super::str_arg;

pub fn create_jsonencode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            serde_json::to_string(&args[0])
                .map(Value::from)
                .map_err(|e| e.to_string())
        })
}

/// Base64 encoding/decoding functions
pub fn create_base64encode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let encoded = general_purpose::STANDARD.encode(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(encoded))
        })
}

pub fn create_base64decode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            match general_purpose::STANDARD.decode(str_arg(&args, 0)?) {
                Ok(decoded_bytes) => match String::from_utf8(decoded_bytes) {
                    Ok(decoded_string) => Ok(Value::from(decoded_string)),
                    Err(_) => Err("Invalid UTF-8 in decoded data".to_string()),
                },
                Err(_) => Err("Invalid base64 string".to_string()),
            }
        })
}
