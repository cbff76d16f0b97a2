//! Arithmetic operations: `+ - * / % int`, per spec §4.10.
//!
//! `+ - * /` are variadic and accumulate left to right in IEEE-754 double;
//! unary `-` negates, unary `/` reciprocates. `%` takes exactly two
//! arguments. `int` truncates toward zero within ±1e16; larger magnitudes
//! pass through unchanged (already beyond integer precision at this scale).

use super::{args_vec, expect_arity, expect_number};
use crate::error::{LispError, LispResult};
use crate::eval::Primitive;
use crate::memory::Memory;
use crate::value::Value;

fn add(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    let mut sum = 0.0;
    for a in &args {
        sum += expect_number("+", *a)?;
    }
    Ok(Value::number(sum))
}

fn sub(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    if args.is_empty() {
        return Err(LispError::BadArguments("- requires at least one argument".to_string()));
    }
    let first = expect_number("-", args[0])?;
    if args.len() == 1 {
        return Ok(Value::number(-first));
    }
    let mut result = first;
    for a in &args[1..] {
        result -= expect_number("-", *a)?;
    }
    Ok(Value::number(result))
}

fn mul(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    let mut product = 1.0;
    for a in &args {
        product *= expect_number("*", *a)?;
    }
    Ok(Value::number(product))
}

fn div(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    if args.is_empty() {
        return Err(LispError::BadArguments("/ requires at least one argument".to_string()));
    }
    let first = expect_number("/", args[0])?;
    if args.len() == 1 {
        return Ok(Value::number(1.0 / first));
    }
    let mut result = first;
    for a in &args[1..] {
        result /= expect_number("/", *a)?;
    }
    Ok(Value::number(result))
}

fn modulo(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("%", &args, 2)?;
    let a = expect_number("%", args[0])?;
    let b = expect_number("%", args[1])?;
    Ok(Value::number(a % b))
}

fn int(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("int", &args, 1)?;
    let n = expect_number("int", args[0])?;
    let truncated = if n.abs() <= 1e16 { n.trunc() } else { n };
    Ok(Value::number(truncated))
}

pub fn register(prims: &mut Vec<Primitive>) {
    prims.push(Primitive { name: "+", func: add });
    prims.push(Primitive { name: "-", func: sub });
    prims.push(Primitive { name: "*", func: mul });
    prims.push(Primitive { name: "/", func: div });
    prims.push(Primitive { name: "%", func: modulo });
    prims.push(Primitive { name: "int", func: int });
}
