//! `throw`, per spec §7: raises `LispError::Thrown(code)`, unwinding to the
//! nearest enclosing `catch`, which turns it into an `(ERR . code)` pair
//! (see `eval.rs`'s `eval_catch`). `error?`/`error-code` let a caller inspect
//! what `catch` handed back without re-deriving the pair shape by hand.

use super::{args_vec, expect_arity, expect_number};
use crate::error::{LispError, LispResult};
use crate::eval::Primitive;
use crate::memory::Memory;
use crate::value::Value;

fn throw(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("throw", &args, 1)?;
    let code = expect_number("throw", args[0])?;
    Err(LispError::Thrown(code as i64))
}

fn is_err_pair(mem: &Memory, v: Value) -> bool {
    if !v.is_cons() {
        return false;
    }
    let idx = v.ordinal() as usize;
    let head = mem.car(idx);
    head.is_atom() && mem.entry_bytes(head.ordinal() as usize) == b"ERR"
}

fn error_p(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("error?", &args, 1)?;
    Ok(if is_err_pair(mem, args[0]) { Value::number(1.0) } else { Value::NIL })
}

fn error_code(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("error-code", &args, 1)?;
    if !is_err_pair(mem, args[0]) {
        return Err(LispError::BadArguments("error-code: not an error pair".to_string()));
    }
    let idx = args[0].ordinal() as usize;
    Ok(mem.cdr(idx))
}

pub fn register(prims: &mut Vec<Primitive>) {
    prims.push(Primitive { name: "throw", func: throw });
    prims.push(Primitive { name: "error?", func: error_p });
    prims.push(Primitive { name: "error-code", func: error_code });
}
