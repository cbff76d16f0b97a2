//! The one-step evaluator with tail-call optimization, per spec §4.8/§4.9.
//!
//! `eval` pins the expression/environment pair being evaluated to two fixed
//! stack cells for the lifetime of the call, overwriting them in place as the
//! loop steps instead of pushing a fresh pair per iteration. A tail position
//! (closure application, `if`/`cond`/`begin`/`let`-family/`eval`) rewrites
//! those two cells and loops; a non-tail position (argument evaluation, a
//! special form's test expression, applying a primitive) recurses into
//! `eval` itself, which pins its own pair. This keeps both native and Lisp
//! stack use O(1) in the depth of a pure tail loop, while genuine recursion
//! still costs stack the way it should.
//!
//! Special forms (`quote`, `if`, `define`, `let` and friends, `catch`, ...)
//! are recognized by matching the head atom's text before it is looked up as
//! a value — they are not entries in the primitive table. Ordinary callable
//! primitives (`+`, `cons`, `car`, ...) are always Normal-mode: arguments are
//! evaluated left to right and handed to a plain function.

use crate::env;
use crate::error::{LispError, LispResult};
use crate::gc;
use crate::memory::Memory;
use crate::value::Value;

/// An entry in the primitive table: an ordinary (Normal-mode) builtin.
/// Built by `builtins::register` and bound into the global environment as
/// `Value::primitive(index)`. `func` receives the global environment
/// alongside the evaluated argument list so primitives that allocate
/// (`cons`, `string`, ...) can retry through `gc::collect` the same way the
/// evaluator's own allocation helpers do.
#[derive(Clone, Copy)]
pub struct Primitive {
    pub name: &'static str,
    pub func: fn(&mut Memory, Value, Value) -> LispResult<Value>,
}

/// Allocate a pair, retrying once after a collection. Exposed for primitives
/// that build pairs (`cons`, `list`, `string`'s list case) outside `eval.rs`.
pub fn gc_alloc_pair_pub(mem: &mut Memory, global_env: Value) -> LispResult<usize> {
    gc_alloc_pair(mem, global_env)
}

/// Allocate/intern a byte-string heap entry, retrying once after a
/// collection. Exposed for primitives that build strings/atoms.
pub fn gc_allocate_bytes_pub(mem: &mut Memory, bytes: &[u8], global_env: Value) -> LispResult<usize> {
    if let Some(off) = mem.raw_allocate_bytes(bytes) {
        return Ok(off);
    }
    gc::collect(mem, global_env);
    mem.raw_allocate_bytes(bytes).ok_or(LispError::StackOverflow)
}

/// Intern an atom, retrying once after a collection. Exposed for primitives
/// that build atoms (e.g. the `ERR` tag `catch`/`throw` wrap errors in).
pub fn gc_intern_pub(mem: &mut Memory, bytes: &[u8], global_env: Value) -> LispResult<Value> {
    gc_intern(mem, bytes, global_env)
}

/// Outcome of a special form: either a final value, or a rewritten
/// `(expr, env)` pair for the driving loop to continue with in tail
/// position.
enum Step {
    Done(Value),
    Tail(Value, Value),
}

/// Evaluate `expr` against `env`, returning its value. `global_env` is the
/// distinguished global-environment slot that `define` mutates in place and
/// that a closure built with an empty local scope resolves through
/// dynamically at call time.
pub fn eval(mem: &mut Memory, expr: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    let watermark = mem.stack_watermark();
    let expr_slot = gc_push(mem, expr, *global_env)?;
    let env_slot = gc_push(mem, env, *global_env)?;
    let result = run(mem, expr_slot, env_slot, global_env, prims);
    mem.unwind(watermark);
    result
}

fn run(mem: &mut Memory, expr_slot: usize, env_slot: usize, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    loop {
        let expr = mem.read_cell(expr_slot);
        let env = mem.read_cell(env_slot);

        if expr.is_atom() {
            return env::lookup(mem, expr, env);
        }
        if !expr.is_cons() {
            // Self-evaluating: Number, Nil, String, Primitive, Closure, Macro.
            return Ok(expr);
        }

        let idx = expr.ordinal() as usize;
        let head = mem.car(idx);
        let args = mem.cdr(idx);

        if head.is_atom() {
            if let Some(step) = dispatch_special_form(mem, head, args, env, global_env, prims)? {
                match step {
                    Step::Done(v) => return Ok(v),
                    Step::Tail(e, en) => {
                        mem.write_cell(expr_slot, e);
                        mem.write_cell(env_slot, en);
                        continue;
                    }
                }
            }
        }

        // General application: evaluate the head, then branch on its kind.
        let callee = eval(mem, head, env, global_env, prims)?;

        if callee.is_primitive() {
            let pidx = callee.ordinal() as usize;
            let prim = prims.get(pidx).ok_or_else(|| LispError::CannotApply("unknown primitive".to_string()))?;
            let evaluated = evlis(mem, args, env, global_env, prims)?;
            return (prim.func)(mem, evaluated, *global_env);
        }

        if callee.is_closure() {
            // `callee` is reachable only from this local, not from expr_slot/
            // env_slot/global_env — root it before bind_params evaluates
            // arguments (which can trigger gc::collect) so its backing pair
            // cells (and, transitively, params/body/scope) aren't swept and
            // reused out from under us. new_env gets the same treatment once
            // built, since it isn't reachable from anywhere else until it's
            // written into env_slot below.
            let frame = mem.stack_watermark();
            let callee_slot = gc_push(mem, callee, *global_env)?;
            let cidx = mem.read_cell(callee_slot).ordinal() as usize;
            let inner = mem.car(cidx);
            let scope = mem.cdr(cidx);
            let inner_idx = inner.ordinal() as usize;
            let params = mem.car(inner_idx);
            let body = mem.cdr(inner_idx);
            let base_env = if scope.is_nil() { *global_env } else { scope };
            let new_env = bind_params(mem, params, args, env, base_env, global_env, prims)?;
            let new_env_slot = gc_push(mem, new_env, *global_env)?;
            if body.is_nil() {
                mem.unwind(frame);
                return Ok(Value::NIL);
            }
            let (body_expr, body_env) = eval_body_tail(mem, body, mem.read_cell(new_env_slot), global_env, prims)?;
            mem.write_cell(expr_slot, body_expr);
            mem.write_cell(env_slot, body_env);
            mem.unwind(frame);
            continue;
        }

        if callee.is_macro() {
            let frame = mem.stack_watermark();
            let callee_slot = gc_push(mem, callee, *global_env)?;
            let midx = mem.read_cell(callee_slot).ordinal() as usize;
            let params = mem.car(midx);
            let body = mem.cdr(midx);
            let new_env = bind_params_raw(mem, params, args, *global_env, *global_env)?;
            let new_env_slot = gc_push(mem, new_env, *global_env)?;
            if body.is_nil() {
                mem.unwind(frame);
                return Ok(Value::NIL);
            }
            let (body_expr, body_env) = eval_body_tail(mem, body, mem.read_cell(new_env_slot), global_env, prims)?;
            mem.write_cell(expr_slot, body_expr);
            mem.write_cell(env_slot, body_env);
            mem.unwind(frame);
            continue;
        }

        return Err(LispError::CannotApply(crate::printer::print(mem, callee)));
    }
}

/// Recognize and execute a special form by the head atom's text. Returns
/// `Ok(None)` when `head` does not name one, so the caller falls through to
/// ordinary application.
fn dispatch_special_form(
    mem: &mut Memory,
    head: Value,
    args: Value,
    env: Value,
    global_env: &mut Value,
    prims: &[Primitive],
) -> LispResult<Option<Step>> {
    let bytes = mem.entry_bytes(head.ordinal() as usize);
    let name = match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => return Ok(None),
    };
    let step = match name {
        "quote" => Step::Done(first(mem, args)),
        "if" => eval_if(mem, args, env, global_env, prims)?,
        "cond" => eval_cond(mem, args, env, global_env, prims)?,
        "and" => Step::Done(eval_and(mem, args, env, global_env, prims)?),
        "or" => Step::Done(eval_or(mem, args, env, global_env, prims)?),
        "begin" => eval_begin(mem, args, env, global_env, prims)?,
        "while" => Step::Done(eval_while(mem, args, env, global_env, prims)?),
        "lambda" => Step::Done(make_closure(mem, args, env, *global_env)?),
        "macro" => Step::Done(make_macro(mem, args, *global_env)?),
        "define" => Step::Done(eval_define(mem, args, env, global_env, prims)?),
        "setq" => Step::Done(eval_setq(mem, args, env, global_env, prims)?),
        "let" => eval_let(mem, args, env, global_env, prims, LetKind::Parallel)?,
        "let*" => eval_let(mem, args, env, global_env, prims, LetKind::Sequential)?,
        "letrec" => eval_let(mem, args, env, global_env, prims, LetKind::Rec)?,
        "letrec*" => eval_let(mem, args, env, global_env, prims, LetKind::Rec)?,
        "catch" => Step::Done(eval_catch(mem, args, env, global_env, prims)?),
        "eval" => eval_eval_form(mem, args, env, global_env, prims)?,
        "apply" => eval_apply(mem, args, env, global_env, prims)?,
        "curry" => Step::Done(eval_curry(mem, args, env, global_env, prims)?),
        _ => return Ok(None),
    };
    Ok(Some(step))
}

// ---- GC-retrying allocation helpers ----

fn gc_push(mem: &mut Memory, v: Value, global_env: Value) -> LispResult<usize> {
    if let Some(slot) = mem.raw_push_value(v) {
        return Ok(slot);
    }
    gc::collect(mem, global_env);
    mem.raw_push_value(v).ok_or(LispError::StackOverflow)
}

fn gc_alloc_pair(mem: &mut Memory, global_env: Value) -> LispResult<usize> {
    if let Some(idx) = mem.raw_allocate_pair() {
        return Ok(idx);
    }
    gc::collect(mem, global_env);
    mem.raw_allocate_pair().ok_or(LispError::OutOfMemory)
}

fn gc_extend(mem: &mut Memory, name: Value, value: Value, env: Value, global_env: Value) -> LispResult<Value> {
    if let Some(e) = env::extend(mem, name, value, env) {
        return Ok(e);
    }
    gc::collect(mem, global_env);
    env::extend(mem, name, value, env).ok_or(LispError::OutOfMemory)
}

fn gc_intern(mem: &mut Memory, bytes: &[u8], global_env: Value) -> LispResult<Value> {
    if let Some(off) = mem.find_heap_entry(bytes) {
        return Ok(Value::atom(off as u64));
    }
    if let Some(off) = mem.raw_allocate_bytes(bytes) {
        return Ok(Value::atom(off as u64));
    }
    gc::collect(mem, global_env);
    if let Some(off) = mem.find_heap_entry(bytes) {
        return Ok(Value::atom(off as u64));
    }
    let off = mem.raw_allocate_bytes(bytes).ok_or(LispError::StackOverflow)?;
    Ok(Value::atom(off as u64))
}

// ---- small helpers on list structure ----

fn first(mem: &Memory, list: Value) -> Value {
    if list.is_cons() {
        mem.car(list.ordinal() as usize)
    } else {
        Value::NIL
    }
}

/// Evaluate every element but the last of a non-empty body list for effect,
/// then return `(last_expr, env)` for the caller to continue in tail
/// position. Precondition: `body` is a Cons.
fn eval_body_tail(mem: &mut Memory, mut body: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<(Value, Value)> {
    loop {
        let idx = body.ordinal() as usize;
        let item = mem.car(idx);
        let rest = mem.cdr(idx);
        if !rest.is_cons() {
            return Ok((item, env));
        }
        eval(mem, item, env, global_env, prims)?;
        body = rest;
    }
}

/// `evlis`: evaluate every element of `list` against `env`, producing a new
/// list of the values. An atom tail is itself evaluated to obtain the rest
/// of the list (spec §4.8); Nil produces Nil.
fn evlis(mem: &mut Memory, list: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    if list.is_nil() {
        return Ok(Value::NIL);
    }
    if !list.is_cons() {
        return eval(mem, list, env, global_env, prims);
    }

    let watermark = mem.stack_watermark();
    let base = watermark;
    let mut cur = list;
    let mut n = 0usize;
    while cur.is_cons() {
        let idx = cur.ordinal() as usize;
        let item_expr = mem.car(idx);
        let next = mem.cdr(idx);
        let v = match eval(mem, item_expr, env, global_env, prims) {
            Ok(v) => v,
            Err(e) => {
                mem.unwind(watermark);
                return Err(e);
            }
        };
        if let Err(e) = gc_push(mem, v, *global_env) {
            mem.unwind(watermark);
            return Err(e);
        }
        n += 1;
        cur = next;
    }

    // The n evaluated values now occupy cells [base-n, base); the most
    // recently evaluated (last arg) sits at base-n (top of stack).
    let acc_slot = match gc_push(mem, Value::NIL, *global_env) {
        Ok(s) => s,
        Err(e) => {
            mem.unwind(watermark);
            return Err(e);
        }
    };
    for k in 1..=n {
        let v_idx = base - k;
        let v = mem.read_cell(v_idx);
        let acc = mem.read_cell(acc_slot);
        let pair_idx = match gc_alloc_pair(mem, *global_env) {
            Ok(i) => i,
            Err(e) => {
                mem.unwind(watermark);
                return Err(e);
            }
        };
        mem.set_car(pair_idx, v);
        mem.set_cdr(pair_idx, acc);
        mem.write_cell(acc_slot, Value::cons(pair_idx as u64));
    }
    let result = mem.read_cell(acc_slot);
    mem.unwind(watermark);
    Ok(result)
}

/// Bind a closure's parameter list `v` against call arguments `x`
/// (evaluated against `caller_env`), extending `callee_env`, per §4.8.
fn bind_params(
    mem: &mut Memory,
    mut v: Value,
    mut x: Value,
    caller_env: Value,
    callee_env: Value,
    global_env: &mut Value,
    prims: &[Primitive],
) -> LispResult<Value> {
    let mut env = callee_env;
    loop {
        if v.is_cons() {
            if !x.is_cons() {
                return Err(LispError::BadArguments("too few arguments".to_string()));
            }
            let v_idx = v.ordinal() as usize;
            let x_idx = x.ordinal() as usize;
            let param = mem.car(v_idx);
            let arg_expr = mem.car(x_idx);
            let next_v = mem.cdr(v_idx);
            let next_x = mem.cdr(x_idx);
            let val = eval(mem, arg_expr, caller_env, global_env, prims)?;
            let watermark = mem.stack_watermark();
            let val_slot = gc_push(mem, val, *global_env)?;
            let env_slot = gc_push(mem, env, *global_env)?;
            let new_env = gc_extend(mem, param, mem.read_cell(val_slot), mem.read_cell(env_slot), *global_env)?;
            mem.unwind(watermark);
            env = new_env;
            v = next_v;
            x = next_x;
            continue;
        }
        if v.is_nil() {
            return Ok(env);
        }
        // Rest-parameter form: bind the evaluated remainder as a list.
        let rest_list = evlis(mem, x, caller_env, global_env, prims)?;
        let watermark = mem.stack_watermark();
        let rest_slot = gc_push(mem, rest_list, *global_env)?;
        let env_slot = gc_push(mem, env, *global_env)?;
        let new_env = gc_extend(mem, v, mem.read_cell(rest_slot), mem.read_cell(env_slot), *global_env)?;
        mem.unwind(watermark);
        return Ok(new_env);
    }
}

/// Bind a macro's parameter list against raw, unevaluated arguments.
fn bind_params_raw(mem: &mut Memory, mut v: Value, mut x: Value, env: Value, global_env: Value) -> LispResult<Value> {
    let mut env = env;
    loop {
        if v.is_cons() {
            if !x.is_cons() {
                return Err(LispError::BadArguments("too few arguments".to_string()));
            }
            let v_idx = v.ordinal() as usize;
            let x_idx = x.ordinal() as usize;
            let param = mem.car(v_idx);
            let raw_arg = mem.car(x_idx);
            env = gc_extend(mem, param, raw_arg, env, global_env)?;
            v = mem.cdr(v_idx);
            x = mem.cdr(x_idx);
            continue;
        }
        if v.is_nil() {
            return Ok(env);
        }
        return gc_extend(mem, v, x, env, global_env);
    }
}

// ---- special forms ----

fn eval_if(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Step> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("if requires a test and a then-branch".to_string()));
    }
    let idx = args.ordinal() as usize;
    let test_expr = mem.car(idx);
    let rest = mem.cdr(idx);
    if !rest.is_cons() {
        return Err(LispError::BadArguments("if requires a then-branch".to_string()));
    }
    let ridx = rest.ordinal() as usize;
    let then_expr = mem.car(ridx);
    let else_list = mem.cdr(ridx);

    let test_val = eval(mem, test_expr, env, global_env, prims)?;
    if test_val.is_truthy() {
        Ok(Step::Tail(then_expr, env))
    } else if !else_list.is_cons() {
        Ok(Step::Done(Value::NIL))
    } else {
        let (e, en) = eval_body_tail(mem, else_list, env, global_env, prims)?;
        Ok(Step::Tail(e, en))
    }
}

fn eval_cond(mem: &mut Memory, clauses: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Step> {
    let mut cur = clauses;
    while cur.is_cons() {
        let cidx = cur.ordinal() as usize;
        let clause = mem.car(cidx);
        if !clause.is_cons() {
            return Err(LispError::BadArguments("cond clause must be a list".to_string()));
        }
        let clidx = clause.ordinal() as usize;
        let test_expr = mem.car(clidx);
        let body = mem.cdr(clidx);
        let test_val = eval(mem, test_expr, env, global_env, prims)?;
        if test_val.is_truthy() {
            if !body.is_cons() {
                return Ok(Step::Done(test_val));
            }
            let (e, en) = eval_body_tail(mem, body, env, global_env, prims)?;
            return Ok(Step::Tail(e, en));
        }
        cur = mem.cdr(cidx);
    }
    Ok(Step::Done(Value::NIL))
}

fn eval_and(mem: &mut Memory, list: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    let mut cur = list;
    let mut result = Value::NIL;
    while cur.is_cons() {
        let idx = cur.ordinal() as usize;
        result = eval(mem, mem.car(idx), env, global_env, prims)?;
        if !result.is_truthy() {
            return Ok(Value::NIL);
        }
        cur = mem.cdr(idx);
    }
    Ok(result)
}

fn eval_or(mem: &mut Memory, list: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    let mut cur = list;
    while cur.is_cons() {
        let idx = cur.ordinal() as usize;
        let v = eval(mem, mem.car(idx), env, global_env, prims)?;
        if v.is_truthy() {
            return Ok(v);
        }
        cur = mem.cdr(idx);
    }
    Ok(Value::NIL)
}

fn eval_begin(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Step> {
    if !args.is_cons() {
        return Ok(Step::Done(Value::NIL));
    }
    let (e, en) = eval_body_tail(mem, args, env, global_env, prims)?;
    Ok(Step::Tail(e, en))
}

fn eval_while(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("while requires a test".to_string()));
    }
    let idx = args.ordinal() as usize;
    let test_expr = mem.car(idx);
    let body = mem.cdr(idx);
    let mut result = Value::NIL;
    loop {
        let t = eval(mem, test_expr, env, global_env, prims)?;
        if !t.is_truthy() {
            return Ok(result);
        }
        let mut cur = body;
        while cur.is_cons() {
            let cidx = cur.ordinal() as usize;
            result = eval(mem, mem.car(cidx), env, global_env, prims)?;
            cur = mem.cdr(cidx);
        }
    }
}

fn make_closure(mem: &mut Memory, args: Value, env: Value, global_env: Value) -> LispResult<Value> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("lambda requires a parameter list and body".to_string()));
    }
    let idx = args.ordinal() as usize;
    let params = mem.car(idx);
    let body = mem.cdr(idx);
    // Nil marks "no enclosing local scope": the call site re-resolves the
    // global environment dynamically instead of a fixed snapshot. A nested
    // closure instead captures `env` itself (a non-global, already-persistent
    // chain), which later top-level `define`s never mutate in place, giving
    // invariant 8's fixed-capture behavior for free.
    let scope = if env == global_env { Value::NIL } else { env };

    let watermark = mem.stack_watermark();
    let inner_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(inner_idx, params);
    mem.set_cdr(inner_idx, body);
    let inner_slot = gc_push(mem, Value::cons(inner_idx as u64), global_env)?;
    let scope_slot = gc_push(mem, scope, global_env)?;
    let outer_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(outer_idx, mem.read_cell(inner_slot));
    mem.set_cdr(outer_idx, mem.read_cell(scope_slot));
    mem.unwind(watermark);
    Ok(Value::closure(outer_idx as u64))
}

fn make_macro(mem: &mut Memory, args: Value, global_env: Value) -> LispResult<Value> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("macro requires a parameter list and body".to_string()));
    }
    let idx = args.ordinal() as usize;
    let params = mem.car(idx);
    let body = mem.cdr(idx);
    let pair_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(pair_idx, params);
    mem.set_cdr(pair_idx, body);
    Ok(Value::lisp_macro(pair_idx as u64))
}

fn eval_define(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("define requires a name and a value".to_string()));
    }
    let idx = args.ordinal() as usize;
    let name = mem.car(idx);
    let rest = mem.cdr(idx);
    let value = if rest.is_cons() {
        eval(mem, mem.car(rest.ordinal() as usize), env, global_env, prims)?
    } else {
        Value::NIL
    };
    let watermark = mem.stack_watermark();
    let value_slot = gc_push(mem, value, *global_env)?;
    let new_global = gc_extend(mem, name, mem.read_cell(value_slot), *global_env, *global_env)?;
    mem.unwind(watermark);
    *global_env = new_global;
    Ok(value)
}

fn eval_setq(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("setq requires a name and a value".to_string()));
    }
    let idx = args.ordinal() as usize;
    let name = mem.car(idx);
    let rest = mem.cdr(idx);
    let value = if rest.is_cons() {
        eval(mem, mem.car(rest.ordinal() as usize), env, global_env, prims)?
    } else {
        Value::NIL
    };
    env::setq(mem, name, value, env)?;
    Ok(value)
}

#[derive(Clone, Copy)]
enum LetKind {
    Parallel,
    Sequential,
    Rec,
}

fn binding_name_expr(mem: &Memory, pair: Value) -> LispResult<(Value, Value)> {
    if !pair.is_cons() {
        return Err(LispError::BadArguments("let binding must be (name expr)".to_string()));
    }
    let pidx = pair.ordinal() as usize;
    let name = mem.car(pidx);
    let rest = mem.cdr(pidx);
    let expr = if rest.is_cons() { mem.car(rest.ordinal() as usize) } else { Value::NIL };
    Ok((name, expr))
}

fn eval_let(
    mem: &mut Memory,
    args: Value,
    outer_env: Value,
    global_env: &mut Value,
    prims: &[Primitive],
    kind: LetKind,
) -> LispResult<Step> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("let requires a binding list".to_string()));
    }
    let idx = args.ordinal() as usize;
    let bindings = mem.car(idx);
    let body = mem.cdr(idx);

    let new_env = match kind {
        LetKind::Parallel => bind_let_parallel(mem, bindings, outer_env, global_env, prims)?,
        LetKind::Sequential => bind_let_star(mem, bindings, outer_env, global_env, prims)?,
        LetKind::Rec => bind_letrec(mem, bindings, outer_env, global_env, prims)?,
    };

    if !body.is_cons() {
        return Ok(Step::Done(Value::NIL));
    }
    let (e, en) = eval_body_tail(mem, body, new_env, global_env, prims)?;
    Ok(Step::Tail(e, en))
}

fn bind_let_parallel(mem: &mut Memory, bindings: Value, outer_env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    let mut cur = bindings;
    let mut new_env = outer_env;
    while cur.is_cons() {
        let cidx = cur.ordinal() as usize;
        let (name, expr) = binding_name_expr(mem, mem.car(cidx))?;
        let val = eval(mem, expr, outer_env, global_env, prims)?;
        new_env = gc_extend(mem, name, val, new_env, *global_env)?;
        cur = mem.cdr(cidx);
    }
    Ok(new_env)
}

fn bind_let_star(mem: &mut Memory, bindings: Value, outer_env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    let mut cur = bindings;
    let mut env = outer_env;
    while cur.is_cons() {
        let cidx = cur.ordinal() as usize;
        let (name, expr) = binding_name_expr(mem, mem.car(cidx))?;
        let val = eval(mem, expr, env, global_env, prims)?;
        env = gc_extend(mem, name, val, env, *global_env)?;
        cur = mem.cdr(cidx);
    }
    Ok(env)
}

/// `letrec`/`letrec*`: pre-bind every name to Nil, then evaluate each
/// initializer in the fully pre-bound environment and `set-cdr!` it in,
/// so mutually recursive definitions see one another (spec §4.9 note).
fn bind_letrec(mem: &mut Memory, bindings: Value, outer_env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    let mut env = outer_env;
    let mut cur = bindings;
    let mut names = Vec::new();
    let mut exprs = Vec::new();
    while cur.is_cons() {
        let cidx = cur.ordinal() as usize;
        let (name, expr) = binding_name_expr(mem, mem.car(cidx))?;
        env = gc_extend(mem, name, Value::NIL, env, *global_env)?;
        names.push(name);
        exprs.push(expr);
        cur = mem.cdr(cidx);
    }
    for (name, expr) in names.into_iter().zip(exprs.into_iter()) {
        let val = eval(mem, expr, env, global_env, prims)?;
        env::setq(mem, name, val, env)?;
    }
    Ok(env)
}

/// `(catch body...)`: evaluates `body` as a sequence; an error anywhere in
/// it is intercepted and replaced by `(ERR . n)` rather than propagating.
fn eval_catch(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    let watermark = mem.stack_watermark();
    let outcome = eval_sequence(mem, args, env, global_env, prims);
    match outcome {
        Ok(v) => Ok(v),
        Err(e) => {
            mem.unwind(watermark);
            let code = e.code().unwrap_or(0);
            let err_atom = gc_intern(mem, b"ERR", *global_env)?;
            let atom_slot = gc_push(mem, err_atom, *global_env)?;
            let pair_idx = gc_alloc_pair(mem, *global_env)?;
            mem.set_car(pair_idx, mem.read_cell(atom_slot));
            mem.set_cdr(pair_idx, Value::number(code as f64));
            mem.unwind(watermark);
            Ok(Value::cons(pair_idx as u64))
        }
    }
}

fn eval_sequence(mem: &mut Memory, list: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    if !list.is_cons() {
        return Ok(Value::NIL);
    }
    let (last_expr, last_env) = eval_body_tail(mem, list, env, global_env, prims)?;
    eval(mem, last_expr, last_env, global_env, prims)
}

fn eval_eval_form(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Step> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("eval requires an expression".to_string()));
    }
    let idx = args.ordinal() as usize;
    let expr_form = mem.car(idx);
    let rest = mem.cdr(idx);
    let evaluated_expr = eval(mem, expr_form, env, global_env, prims)?;
    let target_env = if rest.is_cons() {
        eval(mem, mem.car(rest.ordinal() as usize), env, global_env, prims)?
    } else {
        env
    };
    Ok(Step::Tail(evaluated_expr, target_env))
}

/// `(apply f arg-list)`: evaluate `f` and `arg-list`, then call `f` with
/// `arg-list`'s elements as already-evaluated arguments (spec invariant 9's
/// supplemental `curry`/`apply` pair — not in spec §4.9's table, added as an
/// ordinary evaluator-level operation since applying a Closure requires the
/// same tail-position handling as a direct call).
fn eval_apply(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Step> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("apply requires a function and an argument list".to_string()));
    }
    let idx = args.ordinal() as usize;
    let f_expr = mem.car(idx);
    let rest = mem.cdr(idx);
    if !rest.is_cons() {
        return Err(LispError::BadArguments("apply requires an argument list".to_string()));
    }
    let list_expr = mem.car(rest.ordinal() as usize);

    let callee = eval(mem, f_expr, env, global_env, prims)?;
    let arg_values = eval(mem, list_expr, env, global_env, prims)?;

    // `callee` and `arg_values` are reachable only from these locals, not
    // from expr_slot/env_slot/global_env, so they're pinned to the stack
    // before any further call that can trigger `gc::collect` (bind_params_values'
    // gc_extend, or a closure body's own evaluation).
    let frame = mem.stack_watermark();
    let callee_slot = gc_push(mem, callee, *global_env)?;
    let arg_values_slot = gc_push(mem, arg_values, *global_env)?;

    if callee.is_primitive() {
        let pidx = callee.ordinal() as usize;
        let prim = prims.get(pidx).ok_or_else(|| LispError::CannotApply("unknown primitive".to_string()))?;
        let result = (prim.func)(mem, mem.read_cell(arg_values_slot), *global_env)?;
        mem.unwind(frame);
        return Ok(Step::Done(result));
    }
    if callee.is_closure() {
        let cidx = mem.read_cell(callee_slot).ordinal() as usize;
        let inner = mem.car(cidx);
        let scope = mem.cdr(cidx);
        let inner_idx = inner.ordinal() as usize;
        let params = mem.car(inner_idx);
        let body = mem.cdr(inner_idx);
        let base_env = if scope.is_nil() { *global_env } else { scope };
        let new_env = bind_params_values(mem, params, mem.read_cell(arg_values_slot), base_env, *global_env)?;
        let new_env_slot = gc_push(mem, new_env, *global_env)?;
        if body.is_nil() {
            mem.unwind(frame);
            return Ok(Step::Done(Value::NIL));
        }
        let (e, en) = eval_body_tail(mem, body, mem.read_cell(new_env_slot), global_env, prims)?;
        mem.unwind(frame);
        return Ok(Step::Tail(e, en));
    }
    mem.unwind(frame);
    Err(LispError::CannotApply(crate::printer::print(mem, callee)))
}

/// Bind a closure's parameter list against an already-evaluated argument
/// list (as opposed to `bind_params`, which evaluates each argument
/// expression itself). Used by `apply`.
fn bind_params_values(mem: &mut Memory, mut v: Value, mut values: Value, callee_env: Value, global_env: Value) -> LispResult<Value> {
    let mut env = callee_env;
    loop {
        if v.is_cons() {
            if !values.is_cons() {
                return Err(LispError::BadArguments("too few arguments".to_string()));
            }
            let v_idx = v.ordinal() as usize;
            let val_idx = values.ordinal() as usize;
            let param = mem.car(v_idx);
            let val = mem.car(val_idx);
            env = gc_extend(mem, param, val, env, global_env)?;
            v = mem.cdr(v_idx);
            values = mem.cdr(val_idx);
            continue;
        }
        if v.is_nil() {
            return Ok(env);
        }
        return gc_extend(mem, v, values, env, global_env);
    }
}

/// `(curry f a1 a2 ...)`: returns a new Closure which, called with further
/// arguments, calls `f` with `a1 a2 ... ` followed by those arguments (spec
/// invariant 9: `((curry + 1) 2 3)` evaluates to 6). Built as an ordinary
/// Closure whose body quotes the captured values and drives `apply`/`cons`
/// at call time, rather than as a distinct value kind.
fn eval_curry(mem: &mut Memory, args: Value, env: Value, global_env: &mut Value, prims: &[Primitive]) -> LispResult<Value> {
    if !args.is_cons() {
        return Err(LispError::BadArguments("curry requires a function".to_string()));
    }
    let idx = args.ordinal() as usize;
    let f_expr = mem.car(idx);
    let fixed_exprs = mem.cdr(idx);
    let f_val = eval(mem, f_expr, env, global_env, prims)?;

    let watermark = mem.stack_watermark();
    let f_slot = gc_push(mem, f_val, *global_env)?;
    let mut fixed = Vec::new();
    let mut cur = fixed_exprs;
    while cur.is_cons() {
        let cidx = cur.ordinal() as usize;
        let v = eval(mem, mem.car(cidx), env, global_env, prims)?;
        fixed.push(v);
        cur = mem.cdr(cidx);
    }

    let rest_sym = gc_intern(mem, b"%curried-rest", *global_env)?;
    let cons_sym = gc_intern(mem, b"cons", *global_env)?;
    let apply_sym = gc_intern(mem, b"apply", *global_env)?;
    let quote_sym = gc_intern(mem, b"quote", *global_env)?;

    let mut chain = rest_sym;
    for v in fixed.into_iter().rev() {
        let quoted = two_list(mem, quote_sym, v, *global_env)?;
        chain = three_list(mem, cons_sym, quoted, chain, *global_env)?;
    }
    let quoted_f = two_list(mem, quote_sym, mem.read_cell(f_slot), *global_env)?;
    let apply_call = three_list(mem, apply_sym, quoted_f, chain, *global_env)?;
    let body_idx = gc_alloc_pair(mem, *global_env)?;
    mem.set_car(body_idx, apply_call);
    mem.set_cdr(body_idx, Value::NIL);
    let body = Value::cons(body_idx as u64);

    let inner_idx = gc_alloc_pair(mem, *global_env)?;
    mem.set_car(inner_idx, rest_sym);
    mem.set_cdr(inner_idx, body);
    let outer_idx = gc_alloc_pair(mem, *global_env)?;
    mem.set_car(outer_idx, Value::cons(inner_idx as u64));
    mem.set_cdr(outer_idx, Value::NIL);
    mem.unwind(watermark);
    Ok(Value::closure(outer_idx as u64))
}

fn two_list(mem: &mut Memory, a: Value, b: Value, global_env: Value) -> LispResult<Value> {
    let watermark = mem.stack_watermark();
    let a_slot = gc_push(mem, a, global_env)?;
    let b_slot = gc_push(mem, b, global_env)?;
    let tail_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(tail_idx, mem.read_cell(b_slot));
    mem.set_cdr(tail_idx, Value::NIL);
    let head_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(head_idx, mem.read_cell(a_slot));
    mem.set_cdr(head_idx, Value::cons(tail_idx as u64));
    mem.unwind(watermark);
    Ok(Value::cons(head_idx as u64))
}

fn three_list(mem: &mut Memory, a: Value, b: Value, c: Value, global_env: Value) -> LispResult<Value> {
    let watermark = mem.stack_watermark();
    let a_slot = gc_push(mem, a, global_env)?;
    let b_slot = gc_push(mem, b, global_env)?;
    let c_slot = gc_push(mem, c, global_env)?;
    let tail_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(tail_idx, mem.read_cell(c_slot));
    mem.set_cdr(tail_idx, Value::NIL);
    let mid_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(mid_idx, mem.read_cell(b_slot));
    mem.set_cdr(mid_idx, Value::cons(tail_idx as u64));
    let head_idx = gc_alloc_pair(mem, global_env)?;
    mem.set_car(head_idx, mem.read_cell(a_slot));
    mem.set_cdr(head_idx, Value::cons(mid_idx as u64));
    mem.unwind(watermark);
    Ok(Value::cons(head_idx as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader;

    fn setup() -> (Memory, Value) {
        (Memory::new(256, 4096), Value::NIL)
    }

    fn eval_str(mem: &mut Memory, global_env: &mut Value, src: &str) -> LispResult<Value> {
        let (form, _) = reader::read(mem, src).unwrap().expect("non-empty input");
        eval(mem, form, *global_env, global_env, &[])
    }

    fn setup_with_builtins() -> (Memory, Value, Vec<Primitive>) {
        let mut mem = Memory::new(256, 4096);
        let prims = crate::builtins::register();
        let mut global_env = Value::NIL;
        for (i, prim) in prims.iter().enumerate() {
            let name = gc_intern(&mut mem, prim.name.as_bytes(), global_env).unwrap();
            global_env = env::extend(&mut mem, name, Value::primitive(i as u64), global_env).unwrap();
        }
        (mem, global_env, prims)
    }

    fn eval_str_with_prims(mem: &mut Memory, global_env: &mut Value, prims: &[Primitive], src: &str) -> LispResult<Value> {
        let (form, _) = reader::read(mem, src).unwrap().expect("non-empty input");
        eval(mem, form, *global_env, global_env, prims)
    }

    #[test]
    fn self_evaluating_values_return_themselves() {
        let (mut mem, mut genv) = setup();
        assert_eq!(eval_str(&mut mem, &mut genv, "42").unwrap().as_number(), 42.0);
        assert!(eval_str(&mut mem, &mut genv, "()").unwrap().is_nil());
    }

    #[test]
    fn quote_returns_argument_unevaluated() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(&mut mem, &mut genv, "'(a b c)").unwrap();
        assert!(v.is_cons());
    }

    #[test]
    fn define_and_lookup_symbol() {
        let (mut mem, mut genv) = setup();
        eval_str(&mut mem, &mut genv, "(define x 10)").unwrap();
        let v = eval_str(&mut mem, &mut genv, "x").unwrap();
        assert_eq!(v.as_number(), 10.0);
    }

    #[test]
    fn if_picks_the_right_branch() {
        let (mut mem, mut genv) = setup();
        assert_eq!(eval_str(&mut mem, &mut genv, "(if 1 2 3)").unwrap().as_number(), 2.0);
        assert_eq!(eval_str(&mut mem, &mut genv, "(if () 2 3)").unwrap().as_number(), 3.0);
        assert!(eval_str(&mut mem, &mut genv, "(if () 2)").unwrap().is_nil());
    }

    #[test]
    fn lambda_application_binds_parameters() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(&mut mem, &mut genv, "((lambda (a b) (if a b a)) () 5)").unwrap();
        assert_eq!(v.as_number(), 5.0);
    }

    #[test]
    fn closure_captures_lexical_environment() {
        let (mut mem, mut genv) = setup();
        eval_str(&mut mem, &mut genv, "(define adder (lambda (x) (lambda (y) x)))").unwrap();
        eval_str(&mut mem, &mut genv, "(define get3 (adder 3))").unwrap();
        let v = eval_str(&mut mem, &mut genv, "(get3 999)").unwrap();
        assert_eq!(v.as_number(), 3.0);
    }

    #[test]
    fn rest_parameter_collects_remaining_args() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(&mut mem, &mut genv, "((lambda args args) 1 2 3)").unwrap();
        assert!(v.is_cons());
        let idx = v.ordinal() as usize;
        assert_eq!(mem.car(idx).as_number(), 1.0);
    }

    #[test]
    fn too_few_arguments_is_bad_arguments() {
        let (mut mem, mut genv) = setup();
        let err = eval_str(&mut mem, &mut genv, "((lambda (a b) a) 1)").unwrap_err();
        assert!(matches!(err, LispError::BadArguments(_)));
    }

    #[test]
    fn tail_recursive_loop_completes() {
        let (mut mem, mut genv) = setup();
        eval_str(&mut mem, &mut genv, "(define loop (lambda (n) (if n (loop ()) 'done)))").unwrap();
        let v = eval_str(&mut mem, &mut genv, "(loop 1)").unwrap();
        let bytes = mem.entry_bytes(v.ordinal() as usize);
        assert_eq!(bytes, b"done");
    }

    #[test]
    fn while_loops_until_test_is_falsy() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(&mut mem, &mut genv, "(while () 1)").unwrap();
        assert!(v.is_nil());
    }

    #[test]
    fn and_or_short_circuit() {
        let (mut mem, mut genv) = setup();
        assert!(eval_str(&mut mem, &mut genv, "(and 1 () 3)").unwrap().is_nil());
        assert_eq!(eval_str(&mut mem, &mut genv, "(or () () 5)").unwrap().as_number(), 5.0);
    }

    #[test]
    fn let_star_sees_earlier_bindings_let_does_not() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(&mut mem, &mut genv, "(let* ((x 1) (y x)) y)").unwrap();
        assert_eq!(v.as_number(), 1.0);
        let err = eval_str(&mut mem, &mut genv, "(let ((x 1) (y x)) y)");
        assert!(err.is_err());
    }

    #[test]
    fn letrec_supports_mutual_definition_before_use() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(
            &mut mem,
            &mut genv,
            "(letrec ((even? (lambda (n) (if n (odd? ()) 't))) (odd? (lambda (n) ()))) (even? 1))",
        )
        .unwrap();
        assert!(v.is_nil());
    }

    #[test]
    fn setq_mutates_existing_binding() {
        let (mut mem, mut genv) = setup();
        eval_str(&mut mem, &mut genv, "(define x 1)").unwrap();
        eval_str(&mut mem, &mut genv, "(setq x 2)").unwrap();
        assert_eq!(eval_str(&mut mem, &mut genv, "x").unwrap().as_number(), 2.0);
    }

    #[test]
    fn setq_on_unbound_name_errors() {
        let (mut mem, mut genv) = setup();
        assert!(eval_str(&mut mem, &mut genv, "(setq nope 1)").is_err());
    }

    #[test]
    fn macro_binds_arguments_unevaluated() {
        let (mut mem, mut genv) = setup();
        eval_str(&mut mem, &mut genv, "(define m (macro (x) (quote (quote ok))))").unwrap();
        let v = eval_str(&mut mem, &mut genv, "(m (anything unevaluated))").unwrap();
        let bytes = mem.entry_bytes(v.ordinal() as usize);
        assert_eq!(bytes, b"ok");
    }

    #[test]
    fn catch_converts_an_error_into_an_err_pair() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(&mut mem, &mut genv, "(catch undefined-name)").unwrap();
        assert!(v.is_cons());
        let idx = v.ordinal() as usize;
        let head = mem.car(idx);
        assert_eq!(mem.entry_bytes(head.ordinal() as usize), b"ERR");
        assert_eq!(mem.cdr(idx).as_number(), 3.0); // unbound-symbol
    }

    #[test]
    fn eval_form_reevaluates_a_quoted_expression() {
        let (mut mem, mut genv) = setup();
        let v = eval_str(&mut mem, &mut genv, "(eval (quote (if 1 2 3)))").unwrap();
        assert_eq!(v.as_number(), 2.0);
    }

    #[test]
    fn cannot_apply_non_callable_head() {
        let (mut mem, mut genv) = setup();
        let err = eval_str(&mut mem, &mut genv, "(1 2 3)").unwrap_err();
        assert!(matches!(err, LispError::CannotApply(_)));
    }

    #[test]
    fn apply_calls_a_primitive_with_an_evaluated_argument_list() {
        let (mut mem, mut genv, prims) = setup_with_builtins();
        let v = eval_str_with_prims(&mut mem, &mut genv, &prims, "(apply + (list 1 2 3))").unwrap();
        assert_eq!(v.as_number(), 6.0);
    }

    #[test]
    fn apply_calls_a_closure_in_tail_position() {
        let (mut mem, mut genv, prims) = setup_with_builtins();
        eval_str_with_prims(&mut mem, &mut genv, &prims, "(define sq (lambda (n) (* n n)))").unwrap();
        let v = eval_str_with_prims(&mut mem, &mut genv, &prims, "(apply sq (list 7))").unwrap();
        assert_eq!(v.as_number(), 49.0);
    }

    #[test]
    fn curry_supplies_fixed_leading_arguments() {
        let (mut mem, mut genv, prims) = setup_with_builtins();
        let v = eval_str_with_prims(&mut mem, &mut genv, &prims, "((curry + 1) 2 3)").unwrap();
        assert_eq!(v.as_number(), 6.0);
    }
}
