//! Refining World over a pluggable value domain.
//!
//! `MinimalWorld` keeps an operand stack, a sparse locals map and
//! field/static maps keyed by `owner/name:descriptor`.  Locals and statics
//! are materialized through the [`ValueFactory`] on first read.  Conditional
//! branches are refined by testing each outcome's truth region against the
//! operands; the interpreter forks only when both outcomes survive.
//!
//! Method calls are never followed: an invoke pops its arguments and pushes
//! an unconstrained result.  Fields are tracked per field identity only, with
//! no notion of which object they belong to.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::trace;

use crate::bytecode::{Constant, MemberRef};
use crate::descriptor::MethodDescriptor;
use crate::factory::ValueFactory;
use crate::instruction::{
    Allocation, BranchTest, Condition, FieldAccess, InvokeKind, Literal, MonitorOp, Terminal,
    TypeCheck,
};
use crate::stack::{OperandStack, StackOp};
use crate::value::{
    AbstractValue, ArithmeticOp, Comparison, Conversion, NumericKind, ValueError, ValueKind,
};
use crate::world::{World, WorldError, WorldResult};

/// Largest selector concretization enumerated into switch candidates.
pub const MAX_SWITCH_CANDIDATES: usize = 1_024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BranchFlags {
    then: bool,
    otherwise: bool,
}

impl BranchFlags {
    fn join(self, other: Self) -> Self {
        Self {
            then: self.then || other.then,
            otherwise: self.otherwise || other.otherwise,
        }
    }
}

#[derive(Debug)]
pub struct MinimalWorld<F: ValueFactory> {
    stack: OperandStack<F::Value>,
    locals: BTreeMap<u16, F::Value>,
    fields: BTreeMap<String, F::Value>,
    statics: BTreeMap<String, F::Value>,
    factory: Rc<F>,
    flags: BranchFlags,
    evaluate_all: bool,
    looping_valid: bool,
    switch_candidates: Vec<i64>,
    return_value: Option<F::Value>,
    thrown: Option<F::Value>,
}

impl<F: ValueFactory> Clone for MinimalWorld<F> {
    fn clone(&self) -> Self {
        Self {
            stack: self.stack.clone(),
            locals: self.locals.clone(),
            fields: self.fields.clone(),
            statics: self.statics.clone(),
            factory: Rc::clone(&self.factory),
            flags: self.flags,
            evaluate_all: self.evaluate_all,
            looping_valid: self.looping_valid,
            switch_candidates: self.switch_candidates.clone(),
            return_value: self.return_value.clone(),
            thrown: self.thrown.clone(),
        }
    }
}

impl<F: ValueFactory> PartialEq for MinimalWorld<F> {
    fn eq(&self, other: &Self) -> bool {
        self.stack == other.stack
            && self.locals == other.locals
            && self.fields == other.fields
            && self.statics == other.statics
            && self.flags == other.flags
            && self.evaluate_all == other.evaluate_all
            && self.looping_valid == other.looping_valid
            && self.switch_candidates == other.switch_candidates
            && self.return_value == other.return_value
            && self.thrown == other.thrown
    }
}

impl<F: ValueFactory> MinimalWorld<F> {
    pub fn new(factory: F) -> Self {
        Self::with_shared_factory(Rc::new(factory))
    }

    pub fn with_shared_factory(factory: Rc<F>) -> Self {
        Self {
            stack: OperandStack::new(),
            locals: BTreeMap::new(),
            fields: BTreeMap::new(),
            statics: BTreeMap::new(),
            factory,
            flags: BranchFlags::default(),
            evaluate_all: false,
            looping_valid: false,
            switch_candidates: Vec::new(),
            return_value: None,
            thrown: None,
        }
    }

    /// Entry state for a method: the receiver (unless static) and every
    /// parameter are materialized through the factory.
    pub fn for_method(factory: F, descriptor: &MethodDescriptor, is_static: bool) -> Self {
        let mut world = Self::new(factory);
        let mut slot = 0u16;
        if !is_static {
            let receiver = world.factory.local_value(0, ValueKind::Reference);
            world.locals.insert(0, receiver);
            slot = 1;
        }
        for kind in &descriptor.parameters {
            let value = world.factory.local_value(slot, *kind);
            world.locals.insert(slot, value);
            slot += kind.category().slots() as u16;
        }
        world
    }

    /// Forces every branch and switch case to be explored regardless of
    /// feasibility.
    pub fn exhaustive(mut self) -> Self {
        self.evaluate_all = true;
        self
    }

    pub fn with_looping(mut self, valid: bool) -> Self {
        self.looping_valid = valid;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn stack(&self) -> &OperandStack<F::Value> {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut OperandStack<F::Value> {
        &mut self.stack
    }

    pub fn local(&self, index: u16) -> Option<&F::Value> {
        self.locals.get(&index)
    }

    pub fn set_local(&mut self, index: u16, value: F::Value) {
        self.locals.insert(index, value);
    }

    pub fn field(&self, key: &str) -> Option<&F::Value> {
        self.fields.get(key)
    }

    pub fn static_field(&self, key: &str) -> Option<&F::Value> {
        self.statics.get(key)
    }

    /// Value popped by the return instruction that ended this path.
    pub fn return_value(&self) -> Option<&F::Value> {
        self.return_value.as_ref()
    }

    pub fn thrown(&self) -> Option<&F::Value> {
        self.thrown.as_ref()
    }

    fn read_local(&mut self, index: u16, kind: ValueKind) -> WorldResult<F::Value> {
        if let Some(value) = self.locals.get(&index) {
            if value.category() != kind.category() {
                return Err(ValueError::KindMismatch {
                    op: "load",
                    left: kind,
                    right: value.kind(),
                }
                .into());
            }
            return Ok(value.clone());
        }
        let value = self.factory.local_value(index, kind);
        self.locals.insert(index, value.clone());
        Ok(value)
    }

    fn write_local(&mut self, index: u16, value: F::Value) {
        if value.category().slots() == 2 {
            if let Some(next) = index.checked_add(1) {
                self.locals.remove(&next);
            }
        }
        if let Some(previous) = index.checked_sub(1) {
            if self.locals.get(&previous).map_or(false, |v| v.category().slots() == 2) {
                self.locals.remove(&previous);
            }
        }
        self.locals.insert(index, value);
    }

    fn pop_arguments(&mut self, parameters: &[ValueKind]) -> WorldResult<()> {
        for kind in parameters.iter().rev() {
            let value = self.stack.pop()?;
            if value.category() != kind.category() {
                return Err(ValueError::KindMismatch {
                    op: "invoke",
                    left: *kind,
                    right: value.kind(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn zero_test(&self, value: &F::Value, condition: Condition) -> WorldResult<BranchFlags> {
        if value.is_bottom() {
            return Ok(BranchFlags::default());
        }
        let zero = self.factory.int(0);
        let equal = !value.intersection(&zero)?.is_bottom();
        let differ = !value.minus(&zero)?.is_bottom();
        Ok(match Ordered::of(condition) {
            Some(ordered) => ordered_test(ordered, bounds(value)?, (0, 0)),
            None => equality_flags(condition, equal, differ),
        })
    }

    fn compare_test(
        &self,
        left: &F::Value,
        right: &F::Value,
        condition: Condition,
    ) -> WorldResult<BranchFlags> {
        if left.is_bottom() || right.is_bottom() {
            return Ok(BranchFlags::default());
        }
        Ok(match Ordered::of(condition) {
            Some(ordered) => ordered_test(ordered, bounds(left)?, bounds(right)?),
            None => {
                let (equal, differ) = equality(left, right)?;
                equality_flags(condition, equal, differ)
            }
        })
    }
}

fn bounds<V: AbstractValue>(value: &V) -> WorldResult<(i64, i64)> {
    Ok((
        value.lowest_possible_integer()?,
        value.highest_possible_integer()?,
    ))
}

/// The four conditions decided by comparing range bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordered {
    Lt,
    Ge,
    Gt,
    Le,
}

impl Ordered {
    fn of(condition: Condition) -> Option<Self> {
        match condition {
            Condition::Lt => Some(Self::Lt),
            Condition::Ge => Some(Self::Ge),
            Condition::Gt => Some(Self::Gt),
            Condition::Le => Some(Self::Le),
            Condition::Eq | Condition::Ne => None,
        }
    }
}

/// Feasibility of `left <condition> right` for non-empty integer ranges.
fn ordered_test(condition: Ordered, left: (i64, i64), right: (i64, i64)) -> BranchFlags {
    let ((lo1, hi1), (lo2, hi2)) = (left, right);
    let (then, otherwise) = match condition {
        Ordered::Lt => (lo1 < hi2, hi1 >= lo2),
        Ordered::Ge => (hi1 >= lo2, lo1 < hi2),
        Ordered::Gt => (hi1 > lo2, lo1 <= hi2),
        Ordered::Le => (lo1 <= hi2, hi1 > lo2),
    };
    BranchFlags { then, otherwise }
}

/// Branch flags for `Eq`/`Ne` given whether the operands may be equal and
/// whether they may differ.
fn equality_flags(condition: Condition, equal: bool, differ: bool) -> BranchFlags {
    if condition == Condition::Ne {
        BranchFlags {
            then: differ,
            otherwise: equal,
        }
    } else {
        BranchFlags {
            then: equal,
            otherwise: differ,
        }
    }
}

/// Whether the operands may be equal and whether they may differ.
fn equality<V: AbstractValue>(left: &V, right: &V) -> WorldResult<(bool, bool)> {
    let may_equal = !left.intersection(right)?.is_bottom();
    let may_differ = match (
        left.make_concrete().single_value(),
        right.make_concrete().single_value(),
    ) {
        (Some(a), Some(b)) => a != b,
        _ => true,
    };
    Ok((may_equal, may_differ))
}

fn compatible<V: AbstractValue>(left: &V, right: &V) -> bool {
    let (a, b) = (left.kind(), right.kind());
    a == b || (a.is_integral() && b.is_integral() && a.category() == b.category())
}

/// Key-wise join.  A key missing on one side stands for the lazily
/// materialized value, supplied by `absent`.  Keys whose kinds disagree are
/// dropped so the next read materializes them again.
fn join_maps<K, V>(
    left: &BTreeMap<K, V>,
    right: &BTreeMap<K, V>,
    absent: impl Fn(&K, ValueKind) -> V,
) -> WorldResult<BTreeMap<K, V>>
where
    K: Ord + Clone,
    V: AbstractValue,
{
    let keys: BTreeSet<&K> = left.keys().chain(right.keys()).collect();
    let mut joined = BTreeMap::new();
    for key in keys {
        let value = match (left.get(key), right.get(key)) {
            (Some(a), Some(b)) if compatible(a, b) => a.union(b)?,
            (Some(_), Some(_)) => continue,
            (Some(only), None) | (None, Some(only)) => only.union(&absent(key, only.kind()))?,
            (None, None) => continue,
        };
        joined.insert(key.clone(), value);
    }
    Ok(joined)
}

fn join_optional<V: AbstractValue>(left: &Option<V>, right: &Option<V>) -> WorldResult<Option<V>> {
    Ok(match (left, right) {
        (Some(a), Some(b)) => Some(a.union(b)?),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (None, None) => None,
    })
}

impl<F: ValueFactory> World for MinimalWorld<F> {
    fn push_literal(&mut self, literal: &Literal) -> WorldResult<()> {
        let factory = &self.factory;
        let value = match literal {
            Literal::Null => factory.null(),
            Literal::Int(v) => factory.int(*v),
            Literal::Short(v) => factory.short(*v),
            Literal::Long(v) => factory.long(*v),
            Literal::Float(v) => factory.float(*v),
            Literal::Double(v) => factory.double(*v),
            Literal::Pooled {
                constant,
                wide: false,
            } => match constant {
                Constant::Integer(v) => factory.int(*v),
                Constant::Float(v) => factory.float(*v),
                Constant::String(s) => factory.string(s),
                Constant::Class(_) => factory.unconstrained(ValueKind::Reference),
                other => {
                    return Err(ValueError::MalformedConstant {
                        op: "ldc",
                        constant: other.tag(),
                    }
                    .into())
                }
            },
            Literal::Pooled {
                constant,
                wide: true,
            } => match constant {
                Constant::Long(v) => factory.long(*v),
                Constant::Double(v) => factory.double(*v),
                other => {
                    return Err(ValueError::MalformedConstant {
                        op: "ldc2_w",
                        constant: other.tag(),
                    }
                    .into())
                }
            },
        };
        self.stack.push(value);
        Ok(())
    }

    fn load_local(&mut self, kind: ValueKind, index: u16) -> WorldResult<()> {
        let value = self.read_local(index, kind)?;
        self.stack.push(value);
        Ok(())
    }

    fn store_local(&mut self, kind: ValueKind, index: u16) -> WorldResult<()> {
        let value = self.stack.pop()?;
        if value.category() != kind.category() {
            return Err(ValueError::KindMismatch {
                op: "store",
                left: kind,
                right: value.kind(),
            }
            .into());
        }
        self.write_local(index, value);
        Ok(())
    }

    fn increment_local(&mut self, index: u16, delta: i32) -> WorldResult<()> {
        let current = self.read_local(index, ValueKind::Int)?;
        let delta = self.factory.int(delta);
        let updated = current.arithmetic(ArithmeticOp::Add, NumericKind::Int, &delta)?;
        self.write_local(index, updated);
        Ok(())
    }

    fn load_array(&mut self, element: ValueKind) -> WorldResult<()> {
        let index = self.stack.pop()?;
        let array = self.stack.pop()?;
        self.stack.push(array.load_from_array(&index, element)?);
        Ok(())
    }

    fn store_array(&mut self, _element: ValueKind) -> WorldResult<()> {
        let value = self.stack.pop()?;
        let index = self.stack.pop()?;
        let array = self.stack.pop()?;
        array.store_in_array(&index, &value)?;
        Ok(())
    }

    fn shuffle(&mut self, op: StackOp) -> WorldResult<()> {
        self.stack.apply(op)?;
        Ok(())
    }

    fn arithmetic(&mut self, op: ArithmeticOp, kind: NumericKind) -> WorldResult<()> {
        let rhs = self.stack.pop()?;
        let lhs = self.stack.pop()?;
        self.stack.push(lhs.arithmetic(op, kind, &rhs)?);
        Ok(())
    }

    fn negate(&mut self, kind: NumericKind) -> WorldResult<()> {
        let value = self.stack.pop()?;
        self.stack.push(value.negate(kind)?);
        Ok(())
    }

    fn convert(&mut self, conversion: Conversion) -> WorldResult<()> {
        let value = self.stack.pop()?;
        self.stack.push(value.convert(conversion)?);
        Ok(())
    }

    fn compare(&mut self, comparison: Comparison) -> WorldResult<()> {
        let rhs = self.stack.pop()?;
        let lhs = self.stack.pop()?;
        self.stack.push(lhs.compare(comparison, &rhs)?);
        Ok(())
    }

    fn evaluate_branch(&mut self, test: BranchTest) -> WorldResult<()> {
        let flags = match test {
            BranchTest::Zero(condition) => {
                let value = self.stack.pop()?;
                self.zero_test(&value, condition)?
            }
            BranchTest::IntCompare(condition) => {
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                self.compare_test(&left, &right, condition)?
            }
            BranchTest::RefCompare { equal } => {
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                let (may_equal, may_differ) = equality(&left, &right)?;
                if equal {
                    BranchFlags {
                        then: may_equal,
                        otherwise: may_differ,
                    }
                } else {
                    BranchFlags {
                        then: may_differ,
                        otherwise: may_equal,
                    }
                }
            }
            BranchTest::Null { is_null } => {
                let value = self.stack.pop()?;
                let null = self.factory.null();
                let may_be_null = !value.intersection(&null)?.is_bottom();
                let may_be_object = !value.minus(&null)?.is_bottom();
                if is_null {
                    BranchFlags {
                        then: may_be_null,
                        otherwise: may_be_object,
                    }
                } else {
                    BranchFlags {
                        then: may_be_object,
                        otherwise: may_be_null,
                    }
                }
            }
        };
        trace!(?test, then = flags.then, otherwise = flags.otherwise, "branch feasibility");
        self.flags = flags;
        Ok(())
    }

    fn evaluate_switch(&mut self) -> WorldResult<()> {
        let selector = self.stack.pop()?;
        match selector.make_concrete().integers(MAX_SWITCH_CANDIDATES) {
            Some(candidates) => {
                self.switch_candidates = candidates;
                self.flags = BranchFlags {
                    then: true,
                    otherwise: false,
                };
            }
            None => {
                self.switch_candidates.clear();
                self.flags = BranchFlags {
                    then: true,
                    otherwise: true,
                };
            }
        }
        Ok(())
    }

    fn get_static(&mut self, access: &FieldAccess) -> WorldResult<()> {
        let key = access.field.identity();
        let value = match self.statics.get(&key) {
            Some(value) => value.clone(),
            None => {
                let value = self.factory.static_value(&key, access.kind);
                self.statics.insert(key, value.clone());
                value
            }
        };
        self.stack.push(value);
        Ok(())
    }

    fn put_static(&mut self, access: &FieldAccess) -> WorldResult<()> {
        let value = self.stack.pop()?;
        self.statics.insert(access.field.identity(), value);
        Ok(())
    }

    fn get_field(&mut self, access: &FieldAccess) -> WorldResult<()> {
        self.stack.pop()?;
        let key = access.field.identity();
        let value = match self.fields.get(&key) {
            Some(value) => value.clone(),
            None => {
                let value = self.factory.unconstrained(access.kind);
                self.fields.insert(key, value.clone());
                value
            }
        };
        self.stack.push(value);
        Ok(())
    }

    fn put_field(&mut self, access: &FieldAccess) -> WorldResult<()> {
        let value = self.stack.pop()?;
        self.stack.pop()?;
        self.fields.insert(access.field.identity(), value);
        Ok(())
    }

    fn invoke(
        &mut self,
        kind: InvokeKind,
        method: &MemberRef,
        descriptor: &MethodDescriptor,
    ) -> WorldResult<()> {
        trace!(%method, ?kind, "call left uninterpreted");
        self.pop_arguments(&descriptor.parameters)?;
        if kind.has_receiver() {
            self.stack.pop()?;
        }
        if let Some(returns) = descriptor.returns {
            self.stack.push(self.factory.unconstrained(returns));
        }
        Ok(())
    }

    fn allocate(&mut self, allocation: &Allocation) -> WorldResult<()> {
        let counts = match allocation {
            Allocation::Object(_) => 0,
            Allocation::Array(_) | Allocation::ReferenceArray(_) => 1,
            Allocation::MultiArray { dimensions, .. } => usize::from(*dimensions),
        };
        self.stack.pop_many("allocate", counts)?;
        self.stack
            .push(self.factory.unconstrained(ValueKind::Reference));
        Ok(())
    }

    fn array_length(&mut self) -> WorldResult<()> {
        self.stack.pop()?;
        self.stack.push(self.factory.unconstrained(ValueKind::Int));
        Ok(())
    }

    fn type_check(&mut self, check: &TypeCheck) -> WorldResult<()> {
        match check {
            TypeCheck::Cast(_) => {
                let reference = self.stack.pop()?;
                self.stack.push(reference);
            }
            TypeCheck::InstanceOf(_) => {
                self.stack.pop()?;
                let result = self.factory.int(0).union(&self.factory.int(1))?;
                self.stack.push(result);
            }
        }
        Ok(())
    }

    fn monitor(&mut self, _op: MonitorOp) -> WorldResult<()> {
        self.stack.pop()?;
        Ok(())
    }

    fn enter_subroutine(&mut self, return_to: usize) -> WorldResult<()> {
        self.stack.push(self.factory.return_address(return_to));
        Ok(())
    }

    fn exit_subroutine(&mut self, index: u16) -> WorldResult<()> {
        match self.locals.get(&index) {
            Some(value) if value.kind() != ValueKind::ReturnAddress => {
                Err(ValueError::IncompatibleKind {
                    op: "ret",
                    kind: value.kind(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    fn terminate(&mut self, terminal: Terminal) -> WorldResult<()> {
        match terminal {
            Terminal::Return(Some(kind)) => {
                let value = self.stack.pop()?;
                if value.category() != kind.category() {
                    return Err(ValueError::KindMismatch {
                        op: "return",
                        left: kind,
                        right: value.kind(),
                    }
                    .into());
                }
                self.return_value = Some(value);
            }
            Terminal::Return(None) => {}
            Terminal::Throw => {
                self.thrown = Some(self.stack.pop()?);
            }
        }
        self.stack.clear();
        Ok(())
    }

    fn is_looping_valid(&self) -> bool {
        self.looping_valid
    }

    fn all_branches_need_to_be_evaluated(&self) -> bool {
        self.evaluate_all || (self.flags.then && self.flags.otherwise)
    }

    fn should_evaluate_then(&self) -> bool {
        self.flags.then
    }

    fn then_feasible(&self) -> bool {
        self.flags.then
    }

    fn else_feasible(&self) -> bool {
        self.flags.otherwise
    }

    fn switch_candidates(&self) -> Vec<i64> {
        self.switch_candidates.clone()
    }

    fn combine_with(&self, other: &Self) -> WorldResult<Self> {
        if self.stack.len() != other.stack.len() {
            return Err(WorldError::StackShape {
                left: self.stack.len(),
                right: other.stack.len(),
            });
        }
        let mut stack = OperandStack::new();
        for (left, right) in self.stack.values().iter().zip(other.stack.values()) {
            stack.push(left.union(right)?);
        }

        let factory = &self.factory;
        let locals = join_maps(&self.locals, &other.locals, |index, kind| {
            factory.local_value(*index, kind)
        })?;
        let statics = join_maps(&self.statics, &other.statics, |key, kind| {
            factory.static_value(key, kind)
        })?;
        let fields = join_maps(&self.fields, &other.fields, |_, kind| {
            factory.unconstrained(kind)
        })?;

        let mut switch_candidates = self.switch_candidates.clone();
        switch_candidates.extend(other.switch_candidates.iter().copied());
        switch_candidates.sort_unstable();
        switch_candidates.dedup();

        Ok(Self {
            stack,
            locals,
            fields,
            statics,
            factory: Rc::clone(&self.factory),
            flags: self.flags.join(other.flags),
            evaluate_all: self.evaluate_all || other.evaluate_all,
            looping_valid: self.looping_valid || other.looping_valid,
            switch_candidates,
            return_value: join_optional(&self.return_value, &other.return_value)?,
            thrown: join_optional(&self.thrown, &other.thrown)?,
        })
    }

    fn stack_depth(&self) -> usize {
        self.stack.len()
    }
}
