use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use sha2::{Digest, Sha256, Sha512};

use super::str_arg;

/// Hex digests of a string
pub fn create_md5_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let digest = md5::compute(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(format!("{:x}", digest)))
        })
}

pub fn create_sha256_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let mut hasher = Sha256::new();
            hasher.update(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(format!("{:x}", hasher.finalize())))
        })
}

pub fn create_sha512_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let mut hasher = Sha512::new();
            hasher.update(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(format!("{:x}", hasher.finalize())))
        })
}

#[cfg(test)]
mod tests {
    use super::super::eval_str;
    use super::*;

    #[test]
    fn test_md5_function() {
        assert_eq!(
            eval_str("md5(\"hello world\")").unwrap(),
            Value::from("5eb63bbbe01eeed093cb22bb8f5acdc3")
        );
    }

    #[test]
    fn test_sha256_function() {
        assert_eq!(
            eval_str("sha256(\"hello world\")").unwrap(),
            Value::from("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
    }

    #[test]
    fn test_sha512_length() {
        let digest = eval_str("sha512(\"x\")").unwrap();
        assert_eq!(digest.as_str().unwrap().len(), 128);
    }
}
