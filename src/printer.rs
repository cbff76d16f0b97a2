//! Textual serializer, the `Reader`'s mirror image, per spec §4.6.
//!
//! Numbers print with full round-trip precision, atoms print as their raw
//! bytes, strings print quoted with escapes reversed, pairs print as
//! `(a b c)` or `(a b . d)`, and Nil prints as `()`. Primitive/Closure/Macro
//! print with a debugging marker only — spec is explicit that these are not
//! expected to round-trip.

use crate::memory::Memory;
use crate::value::{Tag, Value};
use std::fmt::Write as _;

pub fn print(mem: &Memory, v: Value) -> String {
    let mut out = String::new();
    write_value(mem, v, &mut out);
    out
}

fn write_value(mem: &Memory, v: Value, out: &mut String) {
    if v.is_number() {
        write_number(v.as_number(), out);
        return;
    }
    match v.tag() {
        Tag::Nil => out.push_str("()"),
        Tag::Atom => {
            let bytes = mem.entry_bytes(v.ordinal() as usize);
            out.push_str(&String::from_utf8_lossy(bytes));
        }
        Tag::String => write_string(mem.entry_bytes(v.ordinal() as usize), out),
        Tag::Cons => write_pair(mem, v, out),
        Tag::Primitive => {
            let _ = write!(out, "#<primitive:{}>", v.ordinal());
        }
        Tag::Closure => {
            let _ = write!(out, "#<closure:{}>", v.ordinal());
        }
        Tag::Macro => {
            let _ = write!(out, "#<macro:{}>", v.ordinal());
        }
    }
}

fn write_number(n: f64, out: &mut String) {
    if n.is_nan() {
        out.push_str("nan");
    } else if n.is_infinite() {
        out.push_str(if n > 0.0 { "inf" } else { "-inf" });
    } else {
        // `{}` already gives Rust's shortest round-tripping decimal for f64.
        let _ = write!(out, "{n}");
    }
}

fn write_string(bytes: &[u8], out: &mut String) {
    out.push('"');
    for &b in bytes {
        match b {
            b'\x07' => out.push_str("\\a"),
            b'\x08' => out.push_str("\\b"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\x0B' => out.push_str("\\v"),
            b'\x0C' => out.push_str("\\f"),
            b'\r' => out.push_str("\\r"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            _ => out.push(b as char),
        }
    }
    out.push('"');
}

fn write_pair(mem: &Memory, v: Value, out: &mut String) {
    out.push('(');
    let mut cur = v;
    let mut first = true;
    loop {
        let idx = cur.ordinal() as usize;
        if !first {
            out.push(' ');
        }
        first = false;
        write_value(mem, mem.car(idx), out);
        let rest = mem.cdr(idx);
        if rest.is_nil() {
            break;
        } else if rest.is_cons() {
            cur = rest;
        } else {
            out.push_str(" . ");
            write_value(mem, rest, out);
            break;
        }
    }
    out.push(')');
}
