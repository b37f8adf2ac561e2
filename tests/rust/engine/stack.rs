use absint_domains::interval::IntervalValue;
use absint_engine::stack::{OperandStack, StackError, StackOp};

fn int(value: i32) -> IntervalValue {
    IntervalValue::int(value)
}

fn long(value: i64) -> IntervalValue {
    IntervalValue::long(value)
}

fn stack_of(values: &[IntervalValue]) -> OperandStack<IntervalValue> {
    let mut stack = OperandStack::new();
    for value in values {
        stack.push(value.clone());
    }
    stack
}

#[test]
fn dup2_x2_form_one_all_category_one() {
    let mut stack = stack_of(&[int(4), int(3), int(2), int(1)]);
    stack.apply(StackOp::Dup2X2).expect("form 1");
    assert_eq!(
        stack.values(),
        &[int(2), int(1), int(4), int(3), int(2), int(1)]
    );
}

#[test]
fn dup2_x2_form_two_category_two_on_top() {
    let mut stack = stack_of(&[int(3), int(2), long(1)]);
    stack.apply(StackOp::Dup2X2).expect("form 2");
    assert_eq!(stack.values(), &[long(1), int(3), int(2), long(1)]);
}

#[test]
fn dup2_x2_form_three_category_two_underneath() {
    let mut stack = stack_of(&[long(3), int(2), int(1)]);
    stack.apply(StackOp::Dup2X2).expect("form 3");
    assert_eq!(stack.values(), &[int(2), int(1), long(3), int(2), int(1)]);
}

#[test]
fn dup2_x2_form_four_both_category_two() {
    let mut stack = stack_of(&[long(2), long(1)]);
    stack.apply(StackOp::Dup2X2).expect("form 4");
    assert_eq!(stack.values(), &[long(1), long(2), long(1)]);
}

#[test]
fn dup_x2_handles_both_forms() {
    let mut narrow = stack_of(&[int(3), int(2), int(1)]);
    narrow.apply(StackOp::DupX2).expect("form 1");
    assert_eq!(narrow.values(), &[int(1), int(3), int(2), int(1)]);

    let mut wide = stack_of(&[long(2), int(1)]);
    wide.apply(StackOp::DupX2).expect("form 2");
    assert_eq!(wide.values(), &[int(1), long(2), int(1)]);
}

#[test]
fn dup2_x1_handles_both_forms() {
    let mut narrow = stack_of(&[int(3), int(2), int(1)]);
    narrow.apply(StackOp::Dup2X1).expect("form 1");
    assert_eq!(narrow.values(), &[int(2), int(1), int(3), int(2), int(1)]);

    let mut wide = stack_of(&[int(2), long(1)]);
    wide.apply(StackOp::Dup2X1).expect("form 2");
    assert_eq!(wide.values(), &[long(1), int(2), long(1)]);
}

#[test]
fn pop2_and_dup2_treat_a_long_as_one_group() {
    let mut stack = stack_of(&[int(7), long(1)]);
    stack.apply(StackOp::Dup2).expect("dup2");
    assert_eq!(stack.values(), &[int(7), long(1), long(1)]);
    stack.apply(StackOp::Pop2).expect("pop2");
    stack.apply(StackOp::Pop2).expect("pop2");
    assert_eq!(stack.values(), &[int(7)]);
}

#[test]
fn swap_and_dup_x1_reorder_category_one_values() {
    let mut stack = stack_of(&[int(2), int(1)]);
    stack.apply(StackOp::Swap).expect("swap");
    assert_eq!(stack.values(), &[int(1), int(2)]);
    stack.apply(StackOp::DupX1).expect("dup_x1");
    assert_eq!(stack.values(), &[int(2), int(1), int(2)]);
}

#[test]
fn category_one_shuffles_reject_category_two_values() {
    let mut stack = stack_of(&[long(1)]);
    assert_eq!(
        stack.apply(StackOp::Dup),
        Err(StackError::Category { op: "dup", depth: 0 })
    );
    assert_eq!(
        stack.apply(StackOp::Pop),
        Err(StackError::Category { op: "pop", depth: 0 })
    );

    let mut mixed = stack_of(&[long(2), int(1)]);
    assert_eq!(
        mixed.apply(StackOp::Swap),
        Err(StackError::Category { op: "swap", depth: 1 })
    );
    // pop2 must not split a long from the int above it.
    let mut split = stack_of(&[long(2), int(1)]);
    assert_eq!(
        split.apply(StackOp::Pop2),
        Err(StackError::Category { op: "pop2", depth: 1 })
    );
}

#[test]
fn underflow_reports_what_was_needed() {
    let mut stack = stack_of(&[int(1)]);
    assert_eq!(
        stack.apply(StackOp::DupX1),
        Err(StackError::Underflow {
            op: "dup_x1",
            needed: 2,
            available: 1,
        })
    );
    assert_eq!(stack.values(), &[int(1)]);

    let mut empty: OperandStack<IntervalValue> = OperandStack::new();
    assert!(matches!(
        empty.pop(),
        Err(StackError::Underflow { available: 0, .. })
    ));
}

#[test]
fn pop_many_returns_values_bottom_first() {
    let mut stack = stack_of(&[int(1), int(2), int(3)]);
    let popped = stack.pop_many("allocate", 2).expect("two values");
    assert_eq!(popped, vec![int(2), int(3)]);
    assert_eq!(stack.len(), 1);
}
