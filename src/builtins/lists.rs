//! Pair/list operations: `cons car cdr list length set-car! set-cdr!`, per
//! spec §4.10. `car`/`cdr`/`set-car!`/`set-cdr!` fail with `not-a-pair` on
//! anything that isn't a Cons; `cons` allocates, so it retries through
//! `gc::collect` like the evaluator's own allocation helpers.

use super::{args_vec, expect_arity, expect_pair};
use crate::error::LispResult;
use crate::eval::{gc_alloc_pair_pub, Primitive};
use crate::memory::Memory;
use crate::value::Value;

fn cons(mem: &mut Memory, args: Value, global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("cons", &args, 2)?;
    let idx = gc_alloc_pair_pub(mem, global_env)?;
    mem.set_car(idx, args[0]);
    mem.set_cdr(idx, args[1]);
    Ok(Value::cons(idx as u64))
}

fn car(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("car", &args, 1)?;
    let idx = expect_pair("car", args[0])?;
    Ok(mem.car(idx))
}

fn cdr(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("cdr", &args, 1)?;
    let idx = expect_pair("cdr", args[0])?;
    Ok(mem.cdr(idx))
}

fn list(mem: &mut Memory, args: Value, global_env: Value) -> LispResult<Value> {
    let items = args_vec(mem, args);
    let mut result = Value::NIL;
    for v in items.into_iter().rev() {
        let idx = gc_alloc_pair_pub(mem, global_env)?;
        mem.set_car(idx, v);
        mem.set_cdr(idx, result);
        result = Value::cons(idx as u64);
    }
    Ok(result)
}

fn length(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("length", &args, 1)?;
    let mut n = 0.0;
    let mut cur = args[0];
    while cur.is_cons() {
        n += 1.0;
        cur = mem.cdr(cur.ordinal() as usize);
    }
    Ok(Value::number(n))
}

fn set_car(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("set-car!", &args, 2)?;
    let idx = expect_pair("set-car!", args[0])?;
    mem.set_car(idx, args[1]);
    Ok(args[0])
}

fn set_cdr(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let args = args_vec(mem, args);
    expect_arity("set-cdr!", &args, 2)?;
    let idx = expect_pair("set-cdr!", args[0])?;
    mem.set_cdr(idx, args[1]);
    Ok(args[0])
}

pub fn register(prims: &mut Vec<Primitive>) {
    prims.push(Primitive { name: "cons", func: cons });
    prims.push(Primitive { name: "car", func: car });
    prims.push(Primitive { name: "cdr", func: cdr });
    prims.push(Primitive { name: "list", func: list });
    prims.push(Primitive { name: "length", func: length });
    prims.push(Primitive { name: "set-car!", func: set_car });
    prims.push(Primitive { name: "set-cdr!", func: set_cdr });
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
    fn cons_builds_a_pair() {
        let mut mem = Memory::new(16, 256);
        let p = call(&mut mem, cons, "(1 2)").unwrap();
        assert!(p.is_cons());
        assert_eq!(mem.car(p.ordinal() as usize).as_number(), 1.0);
        assert_eq!(mem.cdr(p.ordinal() as usize).as_number(), 2.0);
    }

    #[test]
    fn car_and_cdr_reject_non_pairs() {
        let mut mem = Memory::new(16, 256);
        assert!(call(&mut mem, car, "(1)").is_err());
        assert!(call(&mut mem, cdr, "(1)").is_err());
    }

    #[test]
    fn list_builds_a_proper_list() {
        let mut mem = Memory::new(16, 256);
        let l = call(&mut mem, list, "(1 2 3)").unwrap();
        let len_args = {
            let idx = gc_alloc_pair_pub(&mut mem, Value::NIL).unwrap();
            mem.set_car(idx, l);
            mem.set_cdr(idx, Value::NIL);
            Value::cons(idx as u64)
        };
        assert_eq!(length(&mut mem, len_args, Value::NIL).unwrap().as_number(), 3.0);
    }

    #[test]
    fn set_car_and_set_cdr_mutate_in_place() {
        let mut mem = Memory::new(16, 256);
        let p = call(&mut mem, cons, "(1 2)").unwrap();
        let idx = p.ordinal() as usize;
        let set_args = {
            let a = gc_alloc_pair_pub(&mut mem, Value::NIL).unwrap();
            mem.set_car(a, Value::number(9.0));
            mem.set_cdr(a, Value::NIL);
            let b = gc_alloc_pair_pub(&mut mem, Value::NIL).unwrap();
            mem.set_car(b, p);
            mem.set_cdr(b, Value::cons(a as u64));
            Value::cons(b as u64)
        };
        set_car(&mut mem, set_args, Value::NIL).unwrap();
        assert_eq!(mem.car(idx).as_number(), 9.0);
    }
}
