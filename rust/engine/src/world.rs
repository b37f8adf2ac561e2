//! Abstract machine state contract.
//!
//! A [`World`] is the state at one program point.  The interpreter owns the
//! control flow; the World owns everything else: one transition per opcode
//! family, the branch-feasibility policy consulted after every conditional
//! branch or switch, and the join used to merge terminal states.
//!
//! [`BaselineWorld`] is the no-op implementation.  It tracks nothing, asks
//! for every branch, and joins by keeping its own state, which is only
//! useful for exploring pure control flow.  `MinimalWorld` in
//! [`crate::minimal_world`] is the refining implementation.

use std::fmt::Debug;

use thiserror::Error;

use crate::bytecode::MemberRef;
use crate::descriptor::MethodDescriptor;
use crate::instruction::{
    Allocation, BranchTest, FieldAccess, InvokeKind, Literal, MonitorOp, Terminal, TypeCheck,
};
use crate::stack::{StackError, StackOp};
use crate::value::{ArithmeticOp, Comparison, Conversion, NumericKind, ValueError, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("cannot join stacks of depth {left} and {right}")]
    StackShape { left: usize, right: usize },
}

pub type WorldResult<T> = Result<T, WorldError>;

pub trait World: Clone + Debug {
    fn push_literal(&mut self, literal: &Literal) -> WorldResult<()>;
    fn load_local(&mut self, kind: ValueKind, index: u16) -> WorldResult<()>;
    fn store_local(&mut self, kind: ValueKind, index: u16) -> WorldResult<()>;
    fn increment_local(&mut self, index: u16, delta: i32) -> WorldResult<()>;
    fn load_array(&mut self, element: ValueKind) -> WorldResult<()>;
    fn store_array(&mut self, element: ValueKind) -> WorldResult<()>;
    fn shuffle(&mut self, op: StackOp) -> WorldResult<()>;
    fn arithmetic(&mut self, op: ArithmeticOp, kind: NumericKind) -> WorldResult<()>;
    fn negate(&mut self, kind: NumericKind) -> WorldResult<()>;
    fn convert(&mut self, conversion: Conversion) -> WorldResult<()>;
    fn compare(&mut self, comparison: Comparison) -> WorldResult<()>;

    /// Pops the branch operands and records which outcomes are feasible.
    fn evaluate_branch(&mut self, test: BranchTest) -> WorldResult<()>;
    /// Pops the switch selector and records the candidate selector values.
    fn evaluate_switch(&mut self) -> WorldResult<()>;

    fn get_static(&mut self, access: &FieldAccess) -> WorldResult<()>;
    fn put_static(&mut self, access: &FieldAccess) -> WorldResult<()>;
    fn get_field(&mut self, access: &FieldAccess) -> WorldResult<()>;
    fn put_field(&mut self, access: &FieldAccess) -> WorldResult<()>;
    fn invoke(
        &mut self,
        kind: InvokeKind,
        method: &MemberRef,
        descriptor: &MethodDescriptor,
    ) -> WorldResult<()>;
    fn allocate(&mut self, allocation: &Allocation) -> WorldResult<()>;
    fn array_length(&mut self) -> WorldResult<()>;
    fn type_check(&mut self, check: &TypeCheck) -> WorldResult<()>;
    fn monitor(&mut self, op: MonitorOp) -> WorldResult<()>;

    /// `jsr`: `return_to` is the offset after the jump instruction.
    fn enter_subroutine(&mut self, return_to: usize) -> WorldResult<()>;
    /// `ret`: `index` is the local holding the return address.
    fn exit_subroutine(&mut self, index: u16) -> WorldResult<()>;
    fn terminate(&mut self, terminal: Terminal) -> WorldResult<()>;

    /// Whether a backward branch may be followed when both of its outcomes
    /// are feasible.
    fn is_looping_valid(&self) -> bool;
    fn all_branches_need_to_be_evaluated(&self) -> bool;
    fn should_evaluate_then(&self) -> bool;
    /// Feasibility of the last evaluated branch's outcomes, independent of
    /// the exploration policy.
    fn then_feasible(&self) -> bool;
    fn else_feasible(&self) -> bool;
    /// Selector values to explore when not every switch case is required.
    fn switch_candidates(&self) -> Vec<i64>;

    /// Path join.  Must be idempotent, commutative and return a state that
    /// subsumes both inputs.
    fn combine_with(&self, other: &Self) -> WorldResult<Self>;

    fn stack_depth(&self) -> usize;
}

/// World that ignores values entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineWorld;

impl World for BaselineWorld {
    fn push_literal(&mut self, _literal: &Literal) -> WorldResult<()> {
        Ok(())
    }

    fn load_local(&mut self, _kind: ValueKind, _index: u16) -> WorldResult<()> {
        Ok(())
    }

    fn store_local(&mut self, _kind: ValueKind, _index: u16) -> WorldResult<()> {
        Ok(())
    }

    fn increment_local(&mut self, _index: u16, _delta: i32) -> WorldResult<()> {
        Ok(())
    }

    fn load_array(&mut self, _element: ValueKind) -> WorldResult<()> {
        Ok(())
    }

    fn store_array(&mut self, _element: ValueKind) -> WorldResult<()> {
        Ok(())
    }

    fn shuffle(&mut self, _op: StackOp) -> WorldResult<()> {
        Ok(())
    }

    fn arithmetic(&mut self, _op: ArithmeticOp, _kind: NumericKind) -> WorldResult<()> {
        Ok(())
    }

    fn negate(&mut self, _kind: NumericKind) -> WorldResult<()> {
        Ok(())
    }

    fn convert(&mut self, _conversion: Conversion) -> WorldResult<()> {
        Ok(())
    }

    fn compare(&mut self, _comparison: Comparison) -> WorldResult<()> {
        Ok(())
    }

    fn evaluate_branch(&mut self, _test: BranchTest) -> WorldResult<()> {
        Ok(())
    }

    fn evaluate_switch(&mut self) -> WorldResult<()> {
        Ok(())
    }

    fn get_static(&mut self, _access: &FieldAccess) -> WorldResult<()> {
        Ok(())
    }

    fn put_static(&mut self, _access: &FieldAccess) -> WorldResult<()> {
        Ok(())
    }

    fn get_field(&mut self, _access: &FieldAccess) -> WorldResult<()> {
        Ok(())
    }

    fn put_field(&mut self, _access: &FieldAccess) -> WorldResult<()> {
        Ok(())
    }

    fn invoke(
        &mut self,
        _kind: InvokeKind,
        _method: &MemberRef,
        _descriptor: &MethodDescriptor,
    ) -> WorldResult<()> {
        Ok(())
    }

    fn allocate(&mut self, _allocation: &Allocation) -> WorldResult<()> {
        Ok(())
    }

    fn array_length(&mut self) -> WorldResult<()> {
        Ok(())
    }

    fn type_check(&mut self, _check: &TypeCheck) -> WorldResult<()> {
        Ok(())
    }

    fn monitor(&mut self, _op: MonitorOp) -> WorldResult<()> {
        Ok(())
    }

    fn enter_subroutine(&mut self, _return_to: usize) -> WorldResult<()> {
        Ok(())
    }

    fn exit_subroutine(&mut self, _index: u16) -> WorldResult<()> {
        Ok(())
    }

    fn terminate(&mut self, _terminal: Terminal) -> WorldResult<()> {
        Ok(())
    }

    fn is_looping_valid(&self) -> bool {
        false
    }

    fn all_branches_need_to_be_evaluated(&self) -> bool {
        true
    }

    fn should_evaluate_then(&self) -> bool {
        false
    }

    fn then_feasible(&self) -> bool {
        true
    }

    fn else_feasible(&self) -> bool {
        true
    }

    fn switch_candidates(&self) -> Vec<i64> {
        Vec::new()
    }

    // Keeps `self`; not a sound join for anything that carries state.
    fn combine_with(&self, _other: &Self) -> WorldResult<Self> {
        Ok(*self)
    }

    fn stack_depth(&self) -> usize {
        0
    }
}
