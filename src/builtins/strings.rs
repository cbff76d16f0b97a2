//! `string`, per spec §4.10: concatenates its arguments into one new
//! (non-interned) heap string. Atoms and strings contribute their raw bytes,
//! numbers contribute their printed form, and a list contributes each of its
//! elements as a single byte code — enough to build an arbitrary byte string
//! one code point at a time.

use super::args_vec;
use crate::error::LispResult;
use crate::eval::{gc_allocate_bytes_pub, Primitive};
use crate::memory::Memory;
use crate::value::Value;

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        format!("{n}")
    }
}

fn push_contribution(mem: &Memory, v: Value, out: &mut Vec<u8>) {
    if v.is_atom() || v.is_string() {
        out.extend_from_slice(mem.entry_bytes(v.ordinal() as usize));
    } else if v.is_number() {
        out.extend_from_slice(format_number(v.as_number()).as_bytes());
    } else if v.is_cons() || v.is_nil() {
        let mut cur = v;
        while cur.is_cons() {
            let idx = cur.ordinal() as usize;
            let elem = mem.car(idx);
            if elem.is_number() {
                out.push(elem.as_number() as u8);
            }
            cur = mem.cdr(idx);
        }
    }
}

fn string(mem: &mut Memory, args: Value, global_env: Value) -> LispResult<Value> {
    let items = args_vec(mem, args);
    let mut bytes = Vec::new();
    for v in items {
        push_contribution(mem, v, &mut bytes);
    }
    let off = gc_allocate_bytes_pub(mem, &bytes, global_env)?;
    Ok(Value::string(off as u64))
}

pub fn register(prims: &mut Vec<Primitive>) {
    prims.push(Primitive { name: "string", func: string });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader;

    fn call_str(mem: &mut Memory, src: &str) -> Vec<u8> {
        let args = reader::read(mem, src).unwrap().unwrap().0;
        let v = string(mem, args, Value::NIL).unwrap();
        mem.entry_bytes(v.ordinal() as usize).to_vec()
    }

    #[test]
    fn concatenates_atoms_and_strings() {
        let mut mem = Memory::new(16, 256);
        assert_eq!(call_str(&mut mem, "(foo \"bar\")"), b"foobar");
    }

    #[test]
    fn concatenates_numbers_by_printed_form() {
        let mut mem = Memory::new(16, 256);
        assert_eq!(call_str(&mut mem, "(1 2.5)"), b"12.5");
    }

    #[test]
    fn list_contributes_byte_codes() {
        let mut mem = Memory::new(16, 256);
        assert_eq!(call_str(&mut mem, "(((104 105)))"), b"hi");
    }
}
