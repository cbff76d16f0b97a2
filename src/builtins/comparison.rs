//! Relational operators: `eq? < > <= >=`, per spec §4.10.
//!
//! `eq?` is bit equality on the encoding, with one refinement: two Strings
//! compare by byte content rather than ordinal (so a freshly copied string
//! with the same bytes as another is still `eq?`). `<` orders two Numbers by
//! IEEE `<`, two Atoms or two Strings lexicographically by bytes, and
//! anything else by its raw tag-ordinal bit pattern — a total order, so `<`
//! is enough to derive `> <= >=` without a separate comparator per kind.

use super::{args_vec, expect_arity};
use crate::error::LispResult;
use crate::eval::Primitive;
use crate::memory::Memory;
use crate::value::Value;

fn bytes_of(mem: &Memory, v: Value) -> Option<&[u8]> {
    if v.is_atom() || v.is_string() {
        Some(mem.entry_bytes(v.ordinal() as usize))
    } else {
        None
    }
}

fn is_truthy_value(b: bool) -> Value {
    if b {
        Value::number(1.0)
    } else {
        Value::NIL
    }
}

fn value_eq(mem: &Memory, a: Value, b: Value) -> bool {
    if a.is_string() && b.is_string() {
        return mem.entry_bytes(a.ordinal() as usize) == mem.entry_bytes(b.ordinal() as usize);
    }
    a == b
}

/// A total order over any two `Value`s, per spec §4.10's `<` rule.
fn less_than(mem: &Memory, a: Value, b: Value) -> bool {
    if a.is_number() && b.is_number() {
        return a.as_number() < b.as_number();
    }
    if a.tag() == b.tag() {
        if let (Some(ba), Some(bb)) = (bytes_of(mem, a), bytes_of(mem, b)) {
            return ba < bb;
        }
    }
    a.to_bits() < b.to_bits()
}

fn eq(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("eq?", &args, 2)?;
    Ok(is_truthy_value(value_eq(mem, args[0], args[1])))
}

fn lt(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("<", &args, 2)?;
    Ok(is_truthy_value(less_than(mem, args[0], args[1])))
}

fn gt(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity(">", &args, 2)?;
    Ok(is_truthy_value(less_than(mem, args[1], args[0])))
}

fn le(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("<=", &args, 2)?;
    Ok(is_truthy_value(!less_than(mem, args[1], args[0])))
}

fn ge(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity(">=", &args, 2)?;
    Ok(is_truthy_value(!less_than(mem, args[0], args[1])))
}

pub fn register(prims: &mut Vec<Primitive>) {
    prims.push(Primitive { name: "eq?", func: eq });
    prims.push(Primitive { name: "<", func: lt });
    prims.push(Primitive { name: ">", func: gt });
    prims.push(Primitive { name: "<=", func: le });
    prims.push(Primitive { name: ">=", func: ge });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader;

    fn call(mem: &mut Memory, f: fn(&mut Memory, Value, Value) -> LispResult<Value>, src: &str) -> LispResult<Value> {
        let list = reader::read(mem, src).unwrap().unwrap().0;
        f(mem, list, Value::NIL)
    }

    #[test]
    fn eq_is_bit_equal_for_numbers() {
        let mut mem = Memory::new(16, 256);
        assert!(call(&mut mem, eq, "(1 1)").unwrap().is_truthy());
        assert!(!call(&mut mem, eq, "(1 2)").unwrap().is_truthy());
        assert!(!call(&mut mem, eq, "(0.0 -0.0)").unwrap().is_truthy());
    }

    #[test]
    fn eq_compares_strings_by_content() {
        let mut mem = Memory::new(16, 256);
        assert!(call(&mut mem, eq, "(\"ab\" \"ab\")").unwrap().is_truthy());
        assert!(!call(&mut mem, eq, "(\"ab\" \"ac\")").unwrap().is_truthy());
    }

    #[test]
    fn eq_interned_atoms_are_equal() {
        let mut mem = Memory::new(16, 256);
        assert!(call(&mut mem, eq, "(foo foo)").unwrap().is_truthy());
    }

    #[test]
    fn lt_orders_numbers() {
        let mut mem = Memory::new(16, 256);
        assert!(call(&mut mem, lt, "(1 2)").unwrap().is_truthy());
        assert!(!call(&mut mem, lt, "(2 1)").unwrap().is_truthy());
    }

    #[test]
    fn lt_orders_atoms_lexicographically() {
        let mut mem = Memory::new(16, 256);
        assert!(call(&mut mem, lt, "(abc abd)").unwrap().is_truthy());
    }

    #[test]
    fn gt_le_ge_derive_from_lt() {
        let mut mem = Memory::new(16, 256);
        assert!(call(&mut mem, gt, "(3 2)").unwrap().is_truthy());
        assert!(call(&mut mem, le, "(2 2)").unwrap().is_truthy());
        assert!(call(&mut mem, ge, "(2 2)").unwrap().is_truthy());
    }
}
