use hcl::eval::{FuncArgs, FuncDef, ParamType};

use super::number_value;

fn numbers(args: &FuncArgs) -> Result<Vec<f64>, String> {
    args.iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| format!("expected a number, got {v}"))
        })
        .collect()
}

/// Numeric functions
pub fn create_min_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let min = numbers(&args)?.into_iter().fold(f64::INFINITY, f64::min);
            number_value(min)
        })
}

pub fn create_max_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let max = numbers(&args)?.into_iter().fold(f64::NEG_INFINITY, f64::max);
            number_value(max)
        })
}

pub fn create_abs_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| number_value(numbers(&args)?[0].abs()))
}

pub fn create_ceil_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| number_value(numbers(&args)?[0].ceil()))
}

pub fn create_floor_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| number_value(numbers(&args)?[0].floor()))
}
