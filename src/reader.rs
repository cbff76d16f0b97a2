//! S-expression reader, per spec §4.5/§6.1.
//!
//! Parsing is split in two: `nom` combinators turn source text into an
//! intermediate, allocation-free `Sexpr` tree, then `build` walks that tree
//! allocating atoms/strings/cons pairs into the memory region. Splitting it
//! this way means a parse can be retried for free after a GC pass if `build`
//! runs out of pool/heap space mid-allocation — the `Sexpr` owns its own
//! strings and holds no reference into `Memory`.

use crate::error::{LispError, LispResult};
use crate::memory::Memory;
use crate::value::Value;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace1, none_of},
    combinator::{opt, value},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};

#[derive(Debug, Clone)]
enum Sexpr {
    Number(f64),
    Atom(String),
    Str(String),
    List(Vec<Sexpr>, Option<Box<Sexpr>>),
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')' || c == '\'' || c == '"' || c == ';'
}

fn ws_and_comments(input: &str) -> IResult<&str, ()> {
    many0(alt((
        value((), multispace1),
        value((), preceded(char(';'), take_while(|c| c != '\n'))),
    )))
    .map(|_| ())
    .parse(input)
}

/// Everything else is read as a maximal run of non-delimiter bytes; spec
/// §4.5 classifies the whole token afterward rather than branching on the
/// first character, so number-vs-atom is decided by "does the token parse
/// as an IEEE double in full".
fn read_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !is_delimiter(c)).parse(input)
}

fn classify_token(tok: &str) -> Sexpr {
    if let Some(n) = parse_hex(tok) {
        return Sexpr::Number(n);
    }
    match tok.parse::<f64>() {
        Ok(n) => Sexpr::Number(n),
        Err(_) => Sexpr::Atom(tok.to_string()),
    }
}

/// `0x…`/`-0x…` hex integers, read as their numeric value (spec §4.5/§6.1).
fn parse_hex(tok: &str) -> Option<f64> {
    let (neg, rest) = match tok.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, tok),
    };
    let digits = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    let n = i64::from_str_radix(digits, 16).ok()?;
    Some(if neg { -(n as f64) } else { n as f64 })
}

fn parse_string(input: &str) -> IResult<&str, Sexpr> {
    let (mut input, _) = char('"')(input)?;
    let mut out = String::new();
    loop {
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('"')(input) {
            return Ok((rest, Sexpr::Str(out)));
        }
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('\\')(input) {
            let (rest, c) = none_of::<_, _, nom::error::Error<_>>("")(rest)?;
            out.push(match c {
                'a' => '\u{7}',
                'b' => '\u{8}',
                't' => '\t',
                'n' => '\n',
                'v' => '\u{B}',
                'f' => '\u{C}',
                'r' => '\r',
                '"' => '"',
                '\\' => '\\',
                other => other,
            });
            input = rest;
            continue;
        }
        let (rest, c) = none_of::<_, _, nom::error::Error<_>>("")(input)?;
        out.push(c);
        input = rest;
    }
}

fn parse_quote(input: &str) -> IResult<&str, Sexpr> {
    let (input, _) = char('\'')(input)?;
    let (input, expr) = parse_expr(input)?;
    Ok((input, Sexpr::List(vec![Sexpr::Atom("quote".to_string()), expr], None)))
}

fn parse_list(input: &str) -> IResult<&str, Sexpr> {
    let (input, _) = char('(')(input)?;
    let (mut input, _) = ws_and_comments(input)?;
    let mut items = Vec::new();
    let mut tail = None;

    loop {
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>(')')(input) {
            return Ok((rest, Sexpr::List(items, tail)));
        }
        if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('.')(input) {
            // A lone `.` introduces the dotted tail only if followed by a
            // delimiter; otherwise it is the start of an atom/number token
            // like `.5` or `...`.
            if rest.chars().next().map(is_delimiter).unwrap_or(true) {
                let (rest, _) = ws_and_comments(rest)?;
                let (rest, t) = parse_expr(rest)?;
                let (rest, _) = ws_and_comments(rest)?;
                let (rest, _) = char(')')(rest)?;
                return Ok((rest, Sexpr::List(items, Some(Box::new(t)))));
            }
        }
        let (rest, expr) = parse_expr(input)?;
        items.push(expr);
        let (rest, _) = ws_and_comments(rest)?;
        input = rest;
    }
}

fn parse_expr(input: &str) -> IResult<&str, Sexpr> {
    let (input, _) = ws_and_comments(input)?;
    alt((parse_quote, parse_list, parse_string, |i| {
        let (i, tok) = read_token(i)?;
        Ok((i, classify_token(tok)))
    }))
    .parse(input)
}

/// Read one expression from `input`, returning the unconsumed remainder.
/// `Ok(None)` means only whitespace/comments were left (clean EOF, per spec
/// §4.5: "End-of-file while reading... returns to the previous source,
/// without error").
fn read_sexpr(input: &str) -> LispResult<Option<(Sexpr, &str)>> {
    let (rest, _) = ws_and_comments(input).map_err(|e| LispError::Syntax(e.to_string()))?;
    if rest.is_empty() {
        return Ok(None);
    }
    if rest.starts_with(')') {
        return Err(LispError::Syntax("unexpected ')'".to_string()));
    }
    let (rest, expr) = parse_expr(rest).map_err(|e| LispError::Syntax(e.to_string()))?;
    Ok(Some((expr, rest)))
}

fn build(mem: &mut Memory, expr: &Sexpr) -> LispResult<Value> {
    match expr {
        Sexpr::Number(n) => Ok(Value::number(*n)),
        Sexpr::Atom(name) => {
            let off = match mem.find_heap_entry(name.as_bytes()) {
                Some(off) => off,
                None => mem.raw_allocate_bytes(name.as_bytes()).ok_or(LispError::OutOfMemory)?,
            };
            Ok(Value::atom(off as u64))
        }
        Sexpr::Str(s) => {
            let off = mem.raw_allocate_bytes(s.as_bytes()).ok_or(LispError::OutOfMemory)?;
            Ok(Value::string(off as u64))
        }
        Sexpr::List(items, tail) => {
            let mut acc = match tail {
                Some(t) => build(mem, t)?,
                None => Value::NIL,
            };
            for item in items.iter().rev() {
                let v = build(mem, item)?;
                let idx = mem.raw_allocate_pair().ok_or(LispError::OutOfMemory)?;
                mem.set_car(idx, v);
                mem.set_cdr(idx, acc);
                acc = Value::cons(idx as u64);
            }
            Ok(acc)
        }
    }
}

/// Read one expression, allocating it into `mem`. Returns `Ok(None)` at
/// clean end of input.
///
/// On `Err(LispError::OutOfMemory)`, the caller should run the collector and
/// call `read` again with the *same* `input` — nothing has been consumed
/// from the pure-parse stage, so this is safe to retry.
pub fn read<'a>(mem: &mut Memory, input: &'a str) -> LispResult<Option<(Value, &'a str)>> {
    match read_sexpr(input)? {
        None => Ok(None),
        Some((expr, rest)) => Ok(Some((build(mem, &expr)?, rest))),
    }
}
