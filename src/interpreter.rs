//! Embedding surface, per spec §6.3: a host constructs one `Interpreter`
//! with a chosen pool/heap size, then drives it through `atom`/`string`/
//! `cons`, `push`/`pop`/`unwind`, and `eval` without touching `Memory` or
//! the evaluator's internals directly.

use crate::config::MemoryConfig;
use crate::env;
use crate::error::LispResult;
use crate::eval::{self, Primitive};
use crate::gc;
use crate::memory::Memory;
use crate::reader;
use crate::value::Value;
use crate::{builtins, printer};

pub struct Interpreter {
    pub mem: Memory,
    global_env: Value,
    prims: Vec<Primitive>,
}

impl Interpreter {
    pub fn new(config: MemoryConfig) -> Self {
        let mem = Memory::new(config.pool_cells, config.total_cells);
        let prims = builtins::register();
        let mut interp = Interpreter { mem, global_env: Value::NIL, prims };
        interp.bind_primitives();
        interp
    }

    fn bind_primitives(&mut self) {
        for (idx, prim) in self.prims.iter().enumerate() {
            let name = eval::gc_intern_pub(&mut self.mem, prim.name.as_bytes(), self.global_env)
                .expect("interning a primitive name during startup cannot fail");
            self.global_env = env::extend(&mut self.mem, name, Value::primitive(idx as u64), self.global_env)
                .expect("binding the primitive table during startup cannot exhaust the pool");
        }
    }

    pub fn global_env(&self) -> Value {
        self.global_env
    }

    /// Intern an atom with the given bytes, retrying through GC on exhaustion.
    pub fn atom(&mut self, bytes: &[u8]) -> LispResult<Value> {
        eval::gc_intern_pub(&mut self.mem, bytes, self.global_env)
    }

    /// Allocate a fresh (non-interned) string with the given bytes.
    pub fn string(&mut self, bytes: &[u8]) -> LispResult<Value> {
        let off = eval::gc_allocate_bytes_pub(&mut self.mem, bytes, self.global_env)?;
        Ok(Value::string(off as u64))
    }

    /// Allocate a pair `(car . cdr)`, retrying through GC on exhaustion.
    pub fn cons(&mut self, car: Value, cdr: Value) -> LispResult<Value> {
        let idx = eval::gc_alloc_pair_pub(&mut self.mem, self.global_env)?;
        self.mem.set_car(idx, car);
        self.mem.set_cdr(idx, cdr);
        Ok(Value::cons(idx as u64))
    }

    pub fn pair(&self, v: Value) -> bool {
        v.is_cons()
    }

    /// Push a value onto the evaluation stack, returning its slot index.
    pub fn push(&mut self, v: Value) -> LispResult<usize> {
        self.mem.raw_push_value(v).ok_or(crate::error::LispError::StackOverflow)
    }

    pub fn pop(&mut self) -> Value {
        self.mem.pop()
    }

    pub fn unwind(&mut self, watermark: usize) {
        self.mem.unwind(watermark)
    }

    pub fn eval(&mut self, expr: Value, env: Value) -> LispResult<Value> {
        eval::eval(&mut self.mem, expr, env, &mut self.global_env, &self.prims)
    }

    /// Read and evaluate every top-level form in `source` against the global
    /// environment, discarding all but the last result.
    pub fn eval_source(&mut self, source: &str) -> LispResult<Value> {
        let mut rest = source;
        let mut last = Value::NIL;
        while let Some((expr, remaining)) = reader::read(&mut self.mem, rest)? {
            last = self.eval(expr, self.global_env)?;
            rest = remaining;
        }
        Ok(last)
    }

    pub fn print(&self, v: Value) -> String {
        printer::print(&self.mem, v)
    }

    pub fn collect_garbage(&mut self) {
        gc::collect(&mut self.mem, self.global_env);
    }

    pub fn free_pair_count(&self) -> usize {
        self.mem.free_pair_count()
    }

    pub fn hp(&self) -> usize {
        self.mem.hp()
    }
}
