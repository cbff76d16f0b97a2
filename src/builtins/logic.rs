//! `not`, per spec §4.10. `and`/`or` are short-circuiting special forms
//! handled directly in the evaluator, not ordinary primitives — see
//! `eval.rs`'s `dispatch_special_form`.

use super::{args_vec, expect_arity};
use crate::error::LispResult;
use crate::eval::Primitive;
use crate::memory::Memory;
use crate::value::Value;

fn not(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("not", &args, 1)?;
    if args[0].is_truthy() {
        Ok(Value::NIL)
    } else {
        Ok(Value::number(1.0))
    }
}

pub fn register(prims: &mut Vec<Primitive>) {
    prims.push(Primitive { name: "not", func: not });
}
