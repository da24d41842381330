//! End-to-end source-to-stack-top scenarios and the quantified invariants
//! they're drawn from.
//!
//! Each case here drives the real Reader -> Compiler -> VM pipeline
//! through `kokoki_vm::eval` rather than poking any one stage directly,
//! the same "does the whole pipeline agree" style as the teacher's
//! `crates/compiler/tests/` integration suite.

use kokoki_core::Value;
use kokoki_vm::{Context, eval};

fn top_after(source: &str) -> Value {
    let mut ctx = Context::new();
    eval(&mut ctx, source).unwrap_or_else(|e| panic!("eval failed for {source:?}: {e}"));
    ctx.stack.pop().unwrap_or_else(|| panic!("empty stack after {source:?}"))
}

#[test]
fn comment_then_arithmetic() {
    assert_eq!(top_after("# comment\n 1 2 3 + +"), Value::Number(6.0));
}

#[test]
fn word_definition_squares() {
    assert_eq!(top_after(": sq dup * ; 9 sq"), Value::Number(81.0));
}

#[test]
fn if_else_picks_the_true_branch() {
    assert_eq!(
        top_after("1 2 < if \"small\" else \"big\" then"),
        Value::string(*b"small")
    );
}

#[test]
fn each_doubles_every_element() {
    let top = top_after("[1 2 3] [2 *] each");
    let Value::Array(handle) = top else { panic!("expected array") };
    assert_eq!(
        handle.borrow().as_slice(),
        &[Value::Number(2.0), Value::Number(4.0), Value::Number(6.0)]
    );
}

#[test]
fn ref_cell_update_through_quotation() {
    assert_eq!(top_after("@x 40 ! @x [2 +] !! @x ?"), Value::Number(42.0));
}

#[test]
fn cat_concatenates_strings() {
    assert_eq!(top_after("\"foo\" \"bar\" cat"), Value::string(*b"foobar"));
}

#[test]
fn filter_keeps_values_divisible_by_two() {
    let top = top_after("[1 2 3 6 8 41] [2 mod 0 =] filter");
    let Value::Array(handle) = top else { panic!("expected array") };
    assert_eq!(
        handle.borrow().as_slice(),
        &[Value::Number(2.0), Value::Number(6.0), Value::Number(8.0)]
    );
}

#[test]
fn move_on_a_short_stack_is_a_non_fatal_underflow() {
    match top_after("1 move") {
        Value::Error(msg) => assert!(msg.contains("Stack underflow!")),
        other => panic!("expected an underflow error, got {other:?}"),
    }
}

#[test]
fn copy_is_equal_but_independent() {
    let mut ctx = Context::new();
    eval(&mut ctx, "[1 2 3] copy").unwrap();
    let copied = ctx.stack.pop().unwrap();
    eval(&mut ctx, "[1 2 3]").unwrap();
    let original = ctx.stack.pop().unwrap();
    assert_eq!(copied, original);
    let (Value::Array(a), Value::Array(b)) = (&copied, &original) else {
        panic!("expected arrays");
    };
    assert!(!std::rc::Rc::ptr_eq(a, b));
}

#[test]
fn small_integers_compile_to_the_exact_same_value() {
    assert_eq!(top_after("32767"), Value::Number(32767.0));
    assert_eq!(top_after("-32768"), Value::Number(-32768.0));
    assert_eq!(top_after("40000"), Value::Number(40000.0));
}

#[test]
fn stack_manipulation_conserves_the_multiset_above_the_floor() {
    // rot/swap/over/nip/tuck/pick/move rearrange but never drop or
    // duplicate values beyond what each operation documents.
    assert_eq!(top_after("1 2 3 rot drop drop"), Value::Number(2.0));
    assert_eq!(top_after("1 2 swap drop"), Value::Number(2.0));
    assert_eq!(top_after("1 2 over drop drop"), Value::Number(1.0));
}

#[test]
fn definition_body_and_direct_evaluation_agree() {
    let mut ctx = Context::new();
    eval(&mut ctx, ": add3 1 2 3 + + + ;").unwrap();
    eval(&mut ctx, "5 add3").unwrap();
    let via_word = ctx.stack.pop().unwrap();

    let mut plain = Context::new();
    eval(&mut plain, "5 1 2 3 + + +").unwrap();
    let via_body = plain.stack.pop().unwrap();

    assert_eq!(via_word, via_body);
}

#[test]
fn reverse_is_its_own_inverse() {
    let top = top_after("[1 2 3] reverse reverse");
    let Value::Array(handle) = top else { panic!("expected array") };
    assert_eq!(
        handle.borrow().as_slice(),
        &[Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
    );
}

#[test]
fn growing_an_array_literal_by_one_element_grows_len_by_one() {
    assert_eq!(top_after("[1 2] len"), Value::Number(2.0));
    assert_eq!(top_after("[1 2 3] len"), Value::Number(3.0));
}

#[test]
fn top_level_eval_runs_the_nested_source_exactly_once() {
    // Regression test: `eval` used to leave the stack as [3, 3] here,
    // because the outer loop's continuation after `INVOKE` landed right
    // on the bytecode the native had just compiled and already run.
    let mut ctx = Context::new();
    eval(&mut ctx, "\"1 2 +\" eval").unwrap();
    assert_eq!(ctx.stack.pop(), Some(Value::Number(3.0)));
    assert_eq!(ctx.stack.depth(), 0);
}
