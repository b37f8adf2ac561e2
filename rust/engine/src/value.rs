//! Abstract value contract shared by every pluggable domain.
//!
//! The engine never inspects a value directly.  Everything it needs, from
//! lattice operations used by branch refinement to the per-kind arithmetic
//! mirroring the JVM instruction set, goes through [`AbstractValue`].  Values
//! are treated as immutable: every operation returns a fresh value.

use std::collections::BTreeSet;
use std::fmt::Debug;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operand-stack slot width of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    One,
    Two,
}

impl Category {
    pub const fn slots(self) -> usize {
        match self {
            Category::One => 1,
            Category::Two => 2,
        }
    }
}

/// Verification type of a value as seen by the instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Short,
    Byte,
    Char,
    Boolean,
    Reference,
    ReturnAddress,
}

impl ValueKind {
    pub const fn category(self) -> Category {
        match self {
            ValueKind::Long | ValueKind::Double => Category::Two,
            _ => Category::One,
        }
    }

    /// True for the kinds the JVM computes with as `int` or `long`.
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            ValueKind::Int
                | ValueKind::Long
                | ValueKind::Short
                | ValueKind::Byte
                | ValueKind::Char
                | ValueKind::Boolean
        )
    }

    pub const fn is_floating(self) -> bool {
        matches!(self, ValueKind::Float | ValueKind::Double)
    }
}

/// Primitive kind an arithmetic instruction operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumericKind {
    pub const fn value_kind(self) -> ValueKind {
        match self {
            NumericKind::Int => ValueKind::Int,
            NumericKind::Long => ValueKind::Long,
            NumericKind::Float => ValueKind::Float,
            NumericKind::Double => ValueKind::Double,
        }
    }
}

/// Binary arithmetic, bitwise and shift operators.
///
/// Shift operators take an `int` shift distance regardless of the kind of the
/// shifted value, as `lshl`/`lshr`/`lushr` do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl ArithmeticOp {
    pub const fn is_shift(self) -> bool {
        matches!(self, ArithmeticOp::Shl | ArithmeticOp::Shr | ArithmeticOp::Ushr)
    }
}

/// Primitive conversions (`i2l` .. `i2s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conversion {
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
}

impl Conversion {
    pub const fn source(self) -> NumericKind {
        match self {
            Conversion::I2L
            | Conversion::I2F
            | Conversion::I2D
            | Conversion::I2B
            | Conversion::I2C
            | Conversion::I2S => NumericKind::Int,
            Conversion::L2I | Conversion::L2F | Conversion::L2D => NumericKind::Long,
            Conversion::F2I | Conversion::F2L | Conversion::F2D => NumericKind::Float,
            Conversion::D2I | Conversion::D2L | Conversion::D2F => NumericKind::Double,
        }
    }

    pub const fn target(self) -> NumericKind {
        match self {
            Conversion::L2I
            | Conversion::F2I
            | Conversion::D2I
            | Conversion::I2B
            | Conversion::I2C
            | Conversion::I2S => NumericKind::Int,
            Conversion::I2L | Conversion::F2L | Conversion::D2L => NumericKind::Long,
            Conversion::I2F | Conversion::L2F | Conversion::D2F => NumericKind::Float,
            Conversion::I2D | Conversion::L2D | Conversion::F2D => NumericKind::Double,
        }
    }
}

/// Three-way comparisons pushing -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,
}

impl Comparison {
    pub const fn operand_kind(self) -> NumericKind {
        match self {
            Comparison::Lcmp => NumericKind::Long,
            Comparison::Fcmpl | Comparison::Fcmpg => NumericKind::Float,
            Comparison::Dcmpl | Comparison::Dcmpg => NumericKind::Double,
        }
    }

    /// Result pushed when either operand is NaN; `None` for `lcmp`.
    pub const fn nan_result(self) -> Option<i32> {
        match self {
            Comparison::Lcmp => None,
            Comparison::Fcmpl | Comparison::Dcmpl => Some(-1),
            Comparison::Fcmpg | Comparison::Dcmpg => Some(1),
        }
    }
}

/// A single runtime value denoted by an abstract value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConcreteValue {
    Int(i64),
    Float(OrderedFloat<f64>),
    Null,
    ReturnAddress(usize),
}

/// Concretization of an abstract value.
///
/// Integer ranges are kept lazy so that `[i32::MIN, i32::MAX]` costs nothing
/// to produce.  `Unbounded` covers sets the domain cannot (or will not)
/// enumerate, such as arbitrary non-null references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concretization {
    Values(BTreeSet<ConcreteValue>),
    Integers { low: i64, high: i64 },
    Unbounded,
}

impl Concretization {
    pub fn empty() -> Self {
        Concretization::Values(BTreeSet::new())
    }

    pub fn single(value: ConcreteValue) -> Self {
        Concretization::Values(BTreeSet::from([value]))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Concretization::Values(values) => values.is_empty(),
            Concretization::Integers { low, high } => low > high,
            Concretization::Unbounded => false,
        }
    }

    /// Number of denoted values, or `None` when unbounded.
    pub fn len(&self) -> Option<u128> {
        match self {
            Concretization::Values(values) => Some(values.len() as u128),
            Concretization::Integers { low, high } if low > high => Some(0),
            Concretization::Integers { low, high } => {
                Some((i128::from(*high) - i128::from(*low) + 1) as u128)
            }
            Concretization::Unbounded => None,
        }
    }

    pub fn contains(&self, value: &ConcreteValue) -> bool {
        match (self, value) {
            (Concretization::Values(values), _) => values.contains(value),
            (Concretization::Integers { low, high }, ConcreteValue::Int(v)) => low <= v && v <= high,
            (Concretization::Integers { .. }, _) => false,
            (Concretization::Unbounded, _) => true,
        }
    }

    /// The single denoted value, if there is exactly one.
    pub fn single_value(&self) -> Option<ConcreteValue> {
        match self {
            Concretization::Values(values) if values.len() == 1 => values.iter().next().cloned(),
            Concretization::Integers { low, high } if low == high => Some(ConcreteValue::Int(*low)),
            _ => None,
        }
    }

    /// Every denoted integer, provided there are at most `limit` of them and
    /// nothing else is denoted.
    pub fn integers(&self, limit: usize) -> Option<Vec<i64>> {
        match self {
            Concretization::Values(values) => {
                if values.len() > limit {
                    return None;
                }
                values
                    .iter()
                    .map(|value| match value {
                        ConcreteValue::Int(v) => Some(*v),
                        _ => None,
                    })
                    .collect()
            }
            Concretization::Integers { low, high } => match self.len() {
                Some(count) if count <= limit as u128 => Some((*low..=*high).collect()),
                _ => None,
            },
            Concretization::Unbounded => None,
        }
    }
}

/// Errors raised by domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("`{op}` is not defined for {kind:?} values")]
    IncompatibleKind { op: &'static str, kind: ValueKind },
    #[error("`{op}` cannot combine {left:?} with {right:?}")]
    KindMismatch {
        op: &'static str,
        left: ValueKind,
        right: ValueKind,
    },
    #[error("`{op}` cannot load a {constant} constant")]
    MalformedConstant {
        op: &'static str,
        constant: &'static str,
    },
    #[error("`{op}` has no answer for an empty value")]
    EmptyValue { op: &'static str },
}

pub type ValueResult<T> = Result<T, ValueError>;

/// Element of a pluggable abstract domain.
///
/// Implementations decide precision; the engine only relies on soundness:
/// every operation over-approximates the set of concrete results, and
/// `lowest_possible_integer`/`highest_possible_integer` bound every integer
/// the value denotes.
pub trait AbstractValue: Clone + Debug + PartialEq {
    fn kind(&self) -> ValueKind;

    fn category(&self) -> Category {
        self.kind().category()
    }

    fn subsumes(&self, other: &Self) -> ValueResult<bool>;
    fn union(&self, other: &Self) -> ValueResult<Self>;
    fn intersection(&self, other: &Self) -> ValueResult<Self>;
    fn minus(&self, other: &Self) -> ValueResult<Self>;
    fn is_top(&self) -> bool;
    fn is_bottom(&self) -> bool;

    /// Every denoted value is strictly lower than every value of `other`.
    fn is_value_lower_than(&self, other: &Self) -> ValueResult<bool>;
    fn is_value_lower_or_equal_to(&self, other: &Self) -> ValueResult<bool>;

    fn is_value_greater_than(&self, other: &Self) -> ValueResult<bool> {
        other.is_value_lower_than(self)
    }

    fn is_value_greater_or_equal_to(&self, other: &Self) -> ValueResult<bool> {
        other.is_value_lower_or_equal_to(self)
    }

    fn make_concrete(&self) -> Concretization;

    fn lowest_possible_integer(&self) -> ValueResult<i64>;
    fn highest_possible_integer(&self) -> ValueResult<i64>;

    /// `self <op> rhs` with the semantics of the `kind`-prefixed instruction.
    fn arithmetic(&self, op: ArithmeticOp, kind: NumericKind, rhs: &Self) -> ValueResult<Self>;
    fn negate(&self, kind: NumericKind) -> ValueResult<Self>;
    fn convert(&self, conversion: Conversion) -> ValueResult<Self>;
    /// `self` is the deeper operand (`value1` in instruction terms).
    fn compare(&self, comparison: Comparison, rhs: &Self) -> ValueResult<Self>;

    /// `self` is the array reference.
    fn load_from_array(&self, index: &Self, element: ValueKind) -> ValueResult<Self>;
    /// `self` is the array reference.  Domains that model array contents
    /// track the store behind the reference; the engine does not write back.
    fn store_in_array(&self, index: &Self, value: &Self) -> ValueResult<()>;
}
