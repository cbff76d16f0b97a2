//! Console output: `print` and `println`. Not named in spec §4.10's table
//! but required by the worked examples in §8.2 for visible program output;
//! both print every argument's textual form (via `printer::print`) with no
//! separator, `println` appending a trailing newline. Return the last
//! argument, or Nil when called with none, so output calls can sit in
//! argument position without disturbing surrounding expressions.

use super::args_vec;
use crate::error::LispResult;
use crate::eval::Primitive;
use crate::memory::Memory;
use crate::printer;
use crate::value::Value;

fn print(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let items = args_vec(mem, args);
    let mut last = Value::NIL;
    for v in &items {
        print!("{}", printer::print(mem, *v));
        last = *v;
    }
    Ok(last)
}

fn println(mem: &mut Memory, args: Value, _global_env: Value) -> LispResult<Value> {
    let items = args_vec(mem, args);
    let mut last = Value::NIL;
    for v in &items {
        print!("{}", printer::print(mem, *v));
        last = *v;
    }
    println!();
    Ok(last)
}

pub fn register(prims: &mut Vec<Primitive>) {
    prims.push(Primitive { name: "print", func: print });
    prims.push(Primitive { name: "println", func: println });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader;

    #[test]
    fn print_returns_its_last_argument() {
        let mut mem = Memory::new(16, 256);
        let args = reader::read(&mut mem, "(1 2 3)").unwrap().unwrap().0;
        assert_eq!(print(&mut mem, args, Value::NIL).unwrap().as_number(), 3.0);
    }

    #[test]
    fn print_with_no_arguments_returns_nil() {
        let mut mem = Memory::new(16, 256);
        let args = reader::read(&mut mem, "()").unwrap().unwrap().0;
        assert!(print(&mut mem, args, Value::NIL).unwrap().is_nil());
    }
}
