//! Association-list environment: a Cons-pair list of `(name . value)`
//! entries with shared-tail lexical scoping, per spec §3.4/§4.7.
//!
//! An environment is not a distinct type — it is an ordinary `Value`, either
//! `Nil` (empty) or a `Cons` whose car is an entry pair and whose cdr is the
//! rest of the list. This lets closures capture an environment simply by
//! storing it in their `scope` slot like any other field the GC walks.

use crate::error::{LispError, LispResult};
use crate::memory::Memory;
use crate::value::Value;

fn atom_text(mem: &Memory, name: Value) -> String {
    String::from_utf8_lossy(mem.entry_bytes(name.ordinal() as usize)).into_owned()
}

/// The value of the first entry whose car matches `name` by bit-equality,
/// walking `env` head to tail. `None` if no entry matches.
pub fn assoc(mem: &Memory, name: Value, env: Value) -> Option<Value> {
    let mut cur = env;
    while cur.is_cons() {
        let idx = cur.ordinal() as usize;
        let entry = mem.car(idx);
        if entry.is_cons() {
            let entry_idx = entry.ordinal() as usize;
            if mem.car(entry_idx) == name {
                return Some(mem.cdr(entry_idx));
            }
        }
        cur = mem.cdr(idx);
    }
    None
}

/// `assoc`, failing with `unbound-symbol` rather than returning `None`.
pub fn lookup(mem: &Memory, name: Value, env: Value) -> LispResult<Value> {
    assoc(mem, name, env).ok_or_else(|| LispError::UnboundSymbol(atom_text(mem, name)))
}

/// Prepend a new `(name . value)` entry onto `env`, returning the extended
/// list. Used both by `define` (called with the *global* environment) and by
/// parameter/`let`/`let*`/`letrec*` binding (called with the current
/// environment) — the two differ only in which `env` the caller passes in,
/// never in this primitive.
///
/// `None` means the pool has no free pairs; the caller (`interpreter.rs`)
/// runs the collector and retries.
pub fn extend(mem: &mut Memory, name: Value, value: Value, env: Value) -> Option<Value> {
    let entry_idx = mem.raw_allocate_pair()?;
    mem.set_car(entry_idx, name);
    mem.set_cdr(entry_idx, value);
    let entry_val = Value::cons(entry_idx as u64);

    let list_idx = match mem.raw_allocate_pair() {
        Some(idx) => idx,
        None => return None,
    };
    mem.set_car(list_idx, entry_val);
    mem.set_cdr(list_idx, env);
    Some(Value::cons(list_idx as u64))
}

/// Mutate the cdr of the first entry in `env` whose car matches `name`,
/// searching innermost to outermost. Fails with `unbound-symbol` if absent
/// (spec §4.7: "setq ... mutates the cdr of the first matching entry").
pub fn setq(mem: &mut Memory, name: Value, value: Value, env: Value) -> LispResult<()> {
    let mut cur = env;
    while cur.is_cons() {
        let idx = cur.ordinal() as usize;
        let entry = mem.car(idx);
        if entry.is_cons() {
            let entry_idx = entry.ordinal() as usize;
            if mem.car(entry_idx) == name {
                mem.set_cdr(entry_idx, value);
                return Ok(());
            }
        }
        cur = mem.cdr(idx);
    }
    Err(LispError::UnboundSymbol(atom_text(mem, name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intern(mem: &mut Memory, s: &str) -> Value {
        let off = mem
            .find_heap_entry(s.as_bytes())
            .unwrap_or_else(|| mem.raw_allocate_bytes(s.as_bytes()).unwrap());
        Value::atom(off as u64)
    }

    #[test]
    fn define_and_lookup() {
        let mut mem = Memory::new(16, 64);
        let x = intern(&mut mem, "x");
        let env = extend(&mut mem, x, Value::number(42.0), Value::NIL).unwrap();
        assert_eq!(lookup(&mem, x, env).unwrap().as_number(), 42.0);
    }

    #[test]
    fn unbound_symbol_fails() {
        let mut mem = Memory::new(16, 64);
        let y = intern(&mut mem, "y");
        assert!(matches!(lookup(&mem, y, Value::NIL), Err(LispError::UnboundSymbol(_))));
    }

    #[test]
    fn shadowing_prefers_innermost() {
        let mut mem = Memory::new(16, 64);
        let x = intern(&mut mem, "x");
        let outer = extend(&mut mem, x, Value::number(1.0), Value::NIL).unwrap();
        let inner = extend(&mut mem, x, Value::number(2.0), outer).unwrap();
        assert_eq!(lookup(&mem, x, inner).unwrap().as_number(), 2.0);
        // The outer list is untouched: looking it up directly still sees 1.0.
        assert_eq!(lookup(&mem, x, outer).unwrap().as_number(), 1.0);
    }

    #[test]
    fn shared_tail_sees_parent_bindings() {
        let mut mem = Memory::new(16, 64);
        let a = intern(&mut mem, "a");
        let b = intern(&mut mem, "b");
        let grandparent = extend(&mut mem, a, Value::number(1.0), Value::NIL).unwrap();
        let child = extend(&mut mem, b, Value::number(2.0), grandparent).unwrap();
        assert_eq!(lookup(&mem, a, child).unwrap().as_number(), 1.0);
        assert_eq!(lookup(&mem, b, child).unwrap().as_number(), 2.0);
    }

    #[test]
    fn setq_mutates_innermost_binding_in_place() {
        let mut mem = Memory::new(16, 64);
        let x = intern(&mut mem, "x");
        let outer = extend(&mut mem, x, Value::number(1.0), Value::NIL).unwrap();
        let inner = extend(&mut mem, x, Value::number(2.0), outer).unwrap();
        setq(&mut mem, x, Value::number(99.0), inner).unwrap();
        assert_eq!(lookup(&mem, x, inner).unwrap().as_number(), 99.0);
        // outer's own entry is untouched: the innermost shadowing entry was
        // the one mutated, not the shared tail.
        assert_eq!(lookup(&mem, x, outer).unwrap().as_number(), 1.0);
    }

    #[test]
    fn setq_on_unbound_name_fails() {
        let mut mem = Memory::new(16, 64);
        let z = intern(&mut mem, "z");
        assert!(matches!(setq(&mut mem, z, Value::number(1.0), Value::NIL), Err(LispError::UnboundSymbol(_))));
    }
}
