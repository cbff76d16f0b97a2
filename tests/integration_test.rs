//! End-to-end scenarios exercising the reader, evaluator, and builtins
//! together, against the same spec §8.2 worked examples the unit tests
//! verify piecewise.

use nanlisp::config::MemoryConfig;
use nanlisp::interpreter::Interpreter;

fn fresh() -> Interpreter {
    Interpreter::new(MemoryConfig { pool_cells: 1 << 12, total_cells: 1 << 14 })
}

#[test]
fn arithmetic_and_comparison() {
    let mut interp = fresh();
    assert_eq!(interp.eval_source("(+ 1 2 3)").unwrap().as_number(), 6.0);
    assert!(interp.eval_source("(< \"abc\" \"abd\")").unwrap().is_truthy());
}

#[test]
fn car_and_cdr_on_dotted_pairs() {
    let mut interp = fresh();
    let a = interp.eval_source("(car '(a b c))").unwrap();
    assert_eq!(interp.print(a), "a");
    let d = interp.eval_source("(cdr '(a b . c))").unwrap();
    assert_eq!(interp.print(d), "(b . c)");
}

#[test]
fn lambda_application() {
    let mut interp = fresh();
    assert_eq!(interp.eval_source("((lambda (n) (* n n)) 7)").unwrap().as_number(), 49.0);
}

#[test]
fn let_star_sees_earlier_bindings() {
    let mut interp = fresh();
    assert_eq!(interp.eval_source("(let* (x 1) (y (+ x 1)) (+ x y))").unwrap().as_number(), 3.0);
}

#[test]
fn letrec_star_supports_recursive_definitions() {
    let mut interp = fresh();
    let src = "(letrec* (f (lambda (n) (if (eq? n 0) 1 (* n (f (- n 1)))))) (f 5))";
    assert_eq!(interp.eval_source(src).unwrap().as_number(), 120.0);
}

#[test]
fn catch_converts_a_thrown_error_into_an_err_pair() {
    let mut interp = fresh();
    let v = interp.eval_source("(catch (throw 42))").unwrap();
    assert_eq!(interp.print(v), "(ERR . 42)");
}

#[test]
fn eq_on_quoted_atoms() {
    let mut interp = fresh();
    assert!(interp.eval_source("(eq? 'foo 'foo)").unwrap().is_truthy());
}

#[test]
fn string_concatenation() {
    let mut interp = fresh();
    let v = interp.eval_source("(string 'hello \" \" \"world\")").unwrap();
    assert_eq!(interp.print(v), "\"hello world\"");
}

#[test]
fn closures_capture_mutable_upvalues() {
    let mut interp = fresh();
    interp.eval_source("(define acc (lambda (n) (lambda (m) (setq n (+ n m)) n)))").unwrap();
    interp.eval_source("(define a (acc 10))").unwrap();
    assert_eq!(interp.eval_source("(a 5)").unwrap().as_number(), 15.0);
    assert_eq!(interp.eval_source("(a 5)").unwrap().as_number(), 20.0);
}

#[test]
fn currying_supplies_fixed_arguments_ahead_of_a_call() {
    let mut interp = fresh();
    assert_eq!(interp.eval_source("((curry + 1) 2 3)").unwrap().as_number(), 6.0);
}

#[test]
fn lexical_scope_is_preserved_after_redefinition() {
    let mut interp = fresh();
    assert_eq!(interp.eval_source("(((lambda (x) (lambda (y) (+ x y))) 3) 4)").unwrap().as_number(), 7.0);
    interp.eval_source("(define adder (lambda (x) (lambda (y) (+ x y))))").unwrap();
    interp.eval_source("(define add3 (adder 3))").unwrap();
    interp.eval_source("(define + (lambda args 999))").unwrap();
    assert_eq!(interp.eval_source("(add3 4)").unwrap().as_number(), 7.0);
}

#[test]
fn tail_recursive_loop_runs_without_growing_native_stack() {
    let mut interp = fresh();
    let src = "(define loop (lambda (n) (if (eq? n 0) 'done (loop (- n 1)))))";
    interp.eval_source(src).unwrap();
    let v = interp.eval_source("(loop 50000)").unwrap();
    assert_eq!(interp.print(v), "done");
}

#[test]
fn garbage_collection_reclaims_dead_temporaries() {
    let mut interp = fresh();
    let before = interp.free_pair_count();
    let src = "(define build-and-drop (lambda (n) (if (eq? n 0) 'done (begin (cons n n) (build-and-drop (- n 1))))))";
    interp.eval_source(src).unwrap();
    interp.eval_source("(build-and-drop 2000)").unwrap();
    interp.collect_garbage();
    let after = interp.free_pair_count();
    assert!(before.abs_diff(after) < 200, "free pair count should return near its starting point, before={before} after={after}");
}
