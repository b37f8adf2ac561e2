//! Interval domain over JVM values.
//!
//! Integral kinds are tracked as closed ranges, floating kinds as ranges with
//! a NaN flag, references by nullness and return addresses as explicit sets.
//! Arithmetic follows the instruction set exactly on singletons and falls
//! back to the kind's full range whenever wrap-around is possible.

use std::collections::BTreeSet;

use absint_engine::value::{
    AbstractValue, ArithmeticOp, Comparison, ConcreteValue, Concretization, Conversion,
    NumericKind, ValueError, ValueKind, ValueResult,
};
use ordered_float::OrderedFloat;

use crate::range::{FloatRange, IntRange, Nullness};

/// Return addresses a value may hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Addresses {
    Known(BTreeSet<usize>),
    Any,
}

impl Addresses {
    fn covers(&self, other: &Addresses) -> bool {
        match (self, other) {
            (Addresses::Any, _) => true,
            (Addresses::Known(_), Addresses::Any) => false,
            (Addresses::Known(a), Addresses::Known(b)) => b.is_subset(a),
        }
    }

    fn join(&self, other: &Addresses) -> Addresses {
        match (self, other) {
            (Addresses::Known(a), Addresses::Known(b)) => Addresses::Known(a.union(b).copied().collect()),
            _ => Addresses::Any,
        }
    }

    fn meet(&self, other: &Addresses) -> Addresses {
        match (self, other) {
            (Addresses::Any, only) | (only, Addresses::Any) => only.clone(),
            (Addresses::Known(a), Addresses::Known(b)) => {
                Addresses::Known(a.intersection(b).copied().collect())
            }
        }
    }

    fn without(&self, other: &Addresses) -> Addresses {
        match (self, other) {
            (_, Addresses::Any) => Addresses::Known(BTreeSet::new()),
            (Addresses::Any, Addresses::Known(_)) => Addresses::Any,
            (Addresses::Known(a), Addresses::Known(b)) => {
                Addresses::Known(a.difference(b).copied().collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntervalValue {
    Integral { kind: ValueKind, range: IntRange },
    Floating { kind: ValueKind, range: FloatRange },
    Reference(Nullness),
    ReturnAddress(Addresses),
}

/// Full range of an integral kind.
pub fn full_range(kind: ValueKind) -> IntRange {
    match kind {
        ValueKind::Int => IntRange::new(i64::from(i32::MIN), i64::from(i32::MAX)),
        ValueKind::Long => IntRange::new(i64::MIN, i64::MAX),
        ValueKind::Short => IntRange::new(i64::from(i16::MIN), i64::from(i16::MAX)),
        ValueKind::Byte => IntRange::new(i64::from(i8::MIN), i64::from(i8::MAX)),
        ValueKind::Char => IntRange::new(0, i64::from(u16::MAX)),
        ValueKind::Boolean => IntRange::new(0, 1),
        _ => IntRange::EMPTY,
    }
}

impl IntervalValue {
    pub fn int(value: i32) -> Self {
        Self::int_range(value, value)
    }

    pub fn int_range(low: i32, high: i32) -> Self {
        IntervalValue::Integral {
            kind: ValueKind::Int,
            range: IntRange::new(i64::from(low), i64::from(high)),
        }
    }

    pub fn long(value: i64) -> Self {
        Self::long_range(value, value)
    }

    pub fn long_range(low: i64, high: i64) -> Self {
        IntervalValue::Integral {
            kind: ValueKind::Long,
            range: IntRange::new(low, high),
        }
    }

    pub fn float(value: f32) -> Self {
        IntervalValue::Floating {
            kind: ValueKind::Float,
            range: FloatRange::singleton(f64::from(value)),
        }
    }

    pub fn double(value: f64) -> Self {
        IntervalValue::Floating {
            kind: ValueKind::Double,
            range: FloatRange::singleton(value),
        }
    }

    pub fn double_range(low: f64, high: f64, nan: bool) -> Self {
        IntervalValue::Floating {
            kind: ValueKind::Double,
            range: FloatRange::new(Some((low, high)), nan),
        }
    }

    pub fn null() -> Self {
        IntervalValue::Reference(Nullness::Null)
    }

    pub fn non_null() -> Self {
        IntervalValue::Reference(Nullness::NonNull)
    }

    pub fn return_address(target: usize) -> Self {
        IntervalValue::ReturnAddress(Addresses::Known(BTreeSet::from([target])))
    }

    pub fn top(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Float | ValueKind::Double => IntervalValue::Floating {
                kind,
                range: FloatRange::full(),
            },
            ValueKind::Reference => IntervalValue::Reference(Nullness::MaybeNull),
            ValueKind::ReturnAddress => IntervalValue::ReturnAddress(Addresses::Any),
            integral => IntervalValue::Integral {
                kind: integral,
                range: full_range(integral),
            },
        }
    }

    pub fn bottom(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Float | ValueKind::Double => IntervalValue::Floating {
                kind,
                range: FloatRange::EMPTY,
            },
            ValueKind::Reference => IntervalValue::Reference(Nullness::Bottom),
            ValueKind::ReturnAddress => IntervalValue::ReturnAddress(Addresses::Known(BTreeSet::new())),
            integral => IntervalValue::Integral {
                kind: integral,
                range: IntRange::EMPTY,
            },
        }
    }

    /// Integer range of an operand the instruction reads as `expected`.
    fn integral_operand(&self, op: &'static str, expected: ValueKind) -> ValueResult<IntRange> {
        match self {
            IntervalValue::Integral { kind, range } if kind.category() == expected.category() => {
                Ok(*range)
            }
            other => Err(ValueError::KindMismatch {
                op,
                left: expected,
                right: other.kind(),
            }),
        }
    }

    fn floating_operand(&self, op: &'static str, expected: ValueKind) -> ValueResult<FloatRange> {
        match self {
            IntervalValue::Floating { kind, range } if *kind == expected => Ok(*range),
            other => Err(ValueError::KindMismatch {
                op,
                left: expected,
                right: other.kind(),
            }),
        }
    }

    fn nullness(&self, op: &'static str) -> ValueResult<Nullness> {
        match self {
            IntervalValue::Reference(nullness) => Ok(*nullness),
            other => Err(ValueError::IncompatibleKind {
                op,
                kind: other.kind(),
            }),
        }
    }

    fn integral(kind: ValueKind, range: IntRange) -> Self {
        IntervalValue::Integral { kind, range }
    }

    fn floating(kind: NumericKind, range: FloatRange) -> Self {
        let (kind, range) = match kind {
            NumericKind::Float => (ValueKind::Float, range.to_single()),
            _ => (ValueKind::Double, range),
        };
        IntervalValue::Floating { kind, range }
    }

    fn bounds(&self, op: &'static str) -> ValueResult<(i64, i64)> {
        match self {
            IntervalValue::Integral { range, .. } => {
                range.bounds().ok_or(ValueError::EmptyValue { op })
            }
            other => Err(ValueError::IncompatibleKind {
                op,
                kind: other.kind(),
            }),
        }
    }
}

enum Operands<'a> {
    Ints(ValueKind, IntRange, IntRange),
    Floats(ValueKind, FloatRange, FloatRange),
    Refs(Nullness, Nullness),
    Addresses(&'a Addresses, &'a Addresses),
}

fn operands<'a>(
    op: &'static str,
    left: &'a IntervalValue,
    right: &'a IntervalValue,
) -> ValueResult<Operands<'a>> {
    use IntervalValue::*;
    match (left, right) {
        (Integral { kind: k1, range: r1 }, Integral { kind: k2, range: r2 })
            if k1.category() == k2.category() =>
        {
            let kind = if k1 == k2 { *k1 } else { ValueKind::Int };
            Ok(Operands::Ints(kind, *r1, *r2))
        }
        (Floating { kind: k1, range: r1 }, Floating { kind: k2, range: r2 }) if k1 == k2 => {
            Ok(Operands::Floats(*k1, *r1, *r2))
        }
        (Reference(a), Reference(b)) => Ok(Operands::Refs(*a, *b)),
        (ReturnAddress(a), ReturnAddress(b)) => Ok(Operands::Addresses(a, b)),
        _ => Err(ValueError::KindMismatch {
            op,
            left: left.kind(),
            right: right.kind(),
        }),
    }
}

fn corners(values: [i128; 4], full: IntRange) -> IntRange {
    let low = values.iter().copied().min().unwrap_or_default();
    let high = values.iter().copied().max().unwrap_or_default();
    IntRange::from_wide(low, high, full)
}

/// Sub-ranges of `[low, high]` that exclude zero.
fn nonzero_parts(low: i128, high: i128) -> Vec<(i128, i128)> {
    let mut parts = Vec::new();
    if low <= -1 {
        parts.push((low, high.min(-1)));
    }
    if high >= 1 {
        parts.push((low.max(1), high));
    }
    parts
}

/// Smallest `2^k - 1` not below `value`.
fn all_ones(value: i64) -> i64 {
    if value <= 0 {
        0
    } else {
        (u64::MAX >> (value as u64).leading_zeros()) as i64
    }
}

fn integer_arithmetic(op: ArithmeticOp, left: IntRange, right: IntRange, wide: bool) -> IntRange {
    let full = full_range(if wide { ValueKind::Long } else { ValueKind::Int });
    let (Some((a, b)), Some((c, d))) = (left.bounds(), right.bounds()) else {
        return IntRange::EMPTY;
    };
    let (a, b, c, d) = (i128::from(a), i128::from(b), i128::from(c), i128::from(d));
    match op {
        ArithmeticOp::Add => IntRange::from_wide(a + c, b + d, full),
        ArithmeticOp::Sub => IntRange::from_wide(a - d, b - c, full),
        ArithmeticOp::Mul => corners([a * c, a * d, b * c, b * d], full),
        ArithmeticOp::Div => nonzero_parts(c, d)
            .into_iter()
            .fold(IntRange::EMPTY, |acc, (low, high)| {
                acc.hull(&corners([a / low, a / high, b / low, b / high], full))
            }),
        ArithmeticOp::Rem => {
            if nonzero_parts(c, d).is_empty() {
                return IntRange::EMPTY;
            }
            if a == b && c == d {
                return IntRange::from_wide(a % c, a % c, full);
            }
            let magnitude = c.abs().max(d.abs()) - 1;
            let low = if a >= 0 { 0 } else { a.max(-magnitude) };
            let high = if b <= 0 { 0 } else { b.min(magnitude) };
            IntRange::from_wide(low, high, full)
        }
        ArithmeticOp::Shl | ArithmeticOp::Shr | ArithmeticOp::Ushr => {
            shift(op, left, right, wide, full)
        }
        ArithmeticOp::And | ArithmeticOp::Or | ArithmeticOp::Xor => {
            bitwise(op, left, right, full)
        }
    }
}

fn shift(op: ArithmeticOp, left: IntRange, right: IntRange, wide: bool, full: IntRange) -> IntRange {
    if let (Some(value), Some(distance)) = (left.single(), right.single()) {
        let value = if wide {
            let distance = (distance & 0x3f) as u32;
            match op {
                ArithmeticOp::Shl => value.wrapping_shl(distance),
                ArithmeticOp::Shr => value >> distance,
                _ => ((value as u64) >> distance) as i64,
            }
        } else {
            let distance = (distance & 0x1f) as u32;
            let value = value as i32;
            i64::from(match op {
                ArithmeticOp::Shl => value.wrapping_shl(distance),
                ArithmeticOp::Shr => value >> distance,
                _ => ((value as u32) >> distance) as i32,
            })
        };
        return IntRange::singleton(value);
    }
    match (op, left.bounds()) {
        (ArithmeticOp::Shr, Some((low, high))) => IntRange::new(low.min(0), high.max(0)),
        (ArithmeticOp::Ushr, Some((low, high))) if low >= 0 => IntRange::new(0, high),
        _ => full,
    }
}

fn bitwise(op: ArithmeticOp, left: IntRange, right: IntRange, full: IntRange) -> IntRange {
    if let (Some(x), Some(y)) = (left.single(), right.single()) {
        return IntRange::singleton(match op {
            ArithmeticOp::And => x & y,
            ArithmeticOp::Or => x | y,
            _ => x ^ y,
        });
    }
    let (Some((a, b)), Some((c, d))) = (left.bounds(), right.bounds()) else {
        return IntRange::EMPTY;
    };
    match op {
        ArithmeticOp::And if a >= 0 && c >= 0 => IntRange::new(0, b.min(d)),
        ArithmeticOp::And if c >= 0 => IntRange::new(0, d),
        ArithmeticOp::And if a >= 0 => IntRange::new(0, b),
        ArithmeticOp::Or | ArithmeticOp::Xor if a >= 0 && c >= 0 => {
            IntRange::new(0, all_ones(b.max(d)))
        }
        _ => full,
    }
}

fn float_arithmetic(op: ArithmeticOp, left: FloatRange, right: FloatRange) -> FloatRange {
    if left.is_empty() || right.is_empty() {
        return FloatRange::EMPTY;
    }
    let nan_in = left.has_nan() || right.has_nan();
    let (Some((a, b)), Some((c, d))) = (left.bounds(), right.bounds()) else {
        return FloatRange::new(None, nan_in);
    };
    let infinite = |range: &FloatRange| {
        range.contains(f64::INFINITY) || range.contains(f64::NEG_INFINITY)
    };
    let corner_range = |values: [f64; 4], nan: bool| {
        let finite = values.iter().copied().filter(|v| !v.is_nan());
        let low = finite.clone().fold(f64::INFINITY, f64::min);
        let high = finite.fold(f64::NEG_INFINITY, f64::max);
        let nan = nan || values.iter().any(|v| v.is_nan());
        FloatRange::new(Some((low, high)), nan)
    };
    match op {
        ArithmeticOp::Add => corner_range([a + c, a + d, b + c, b + d], nan_in),
        ArithmeticOp::Sub => corner_range([a - c, a - d, b - c, b - d], nan_in),
        ArithmeticOp::Mul => {
            let nan = nan_in
                || (left.contains(0.0) && infinite(&right))
                || (right.contains(0.0) && infinite(&left));
            corner_range([a * c, a * d, b * c, b * d], nan)
        }
        ArithmeticOp::Div => {
            let nan = nan_in || (infinite(&left) && infinite(&right));
            if right.contains(0.0) {
                let bounds = Some((f64::NEG_INFINITY, f64::INFINITY));
                FloatRange::new(bounds, nan || left.contains(0.0))
            } else {
                corner_range([a / c, a / d, b / c, b / d], nan)
            }
        }
        _ => {
            let nan = nan_in || right.contains(0.0) || infinite(&left);
            if c == 0.0 && d == 0.0 {
                return FloatRange::new(None, true);
            }
            let magnitude = c.abs().max(d.abs());
            let low = if a < 0.0 { a.max(-magnitude) } else { 0.0 };
            let high = if b > 0.0 { b.min(magnitude) } else { 0.0 };
            FloatRange::new(Some((low, high)), nan)
        }
    }
}

/// Which of `<`, `==` and `>` may hold between two integer ranges.
fn orderings(left: (i64, i64), right: (i64, i64)) -> [bool; 3] {
    let ((a, b), (c, d)) = (left, right);
    [a < d, a <= d && c <= b, b > c]
}

fn comparison_result(outcomes: [bool; 3], nan_result: Option<i32>) -> IntRange {
    let mut result = IntRange::EMPTY;
    for (value, possible) in [-1, 0, 1].into_iter().zip(outcomes) {
        if possible {
            result = result.hull(&IntRange::singleton(value));
        }
    }
    if let Some(value) = nan_result {
        result = result.hull(&IntRange::singleton(i64::from(value)));
    }
    result
}

impl AbstractValue for IntervalValue {
    fn kind(&self) -> ValueKind {
        match self {
            IntervalValue::Integral { kind, .. } | IntervalValue::Floating { kind, .. } => *kind,
            IntervalValue::Reference(_) => ValueKind::Reference,
            IntervalValue::ReturnAddress(_) => ValueKind::ReturnAddress,
        }
    }

    fn subsumes(&self, other: &Self) -> ValueResult<bool> {
        Ok(match operands("subsumes", self, other)? {
            Operands::Ints(_, a, b) => a.covers(&b),
            Operands::Floats(_, a, b) => a.covers(&b),
            Operands::Refs(a, b) => a.covers(b),
            Operands::Addresses(a, b) => a.covers(b),
        })
    }

    fn union(&self, other: &Self) -> ValueResult<Self> {
        Ok(match operands("union", self, other)? {
            Operands::Ints(kind, a, b) => IntervalValue::Integral {
                kind,
                range: a.hull(&b),
            },
            Operands::Floats(kind, a, b) => IntervalValue::Floating {
                kind,
                range: a.hull(&b),
            },
            Operands::Refs(a, b) => IntervalValue::Reference(a.join(b)),
            Operands::Addresses(a, b) => IntervalValue::ReturnAddress(a.join(b)),
        })
    }

    fn intersection(&self, other: &Self) -> ValueResult<Self> {
        Ok(match operands("intersection", self, other)? {
            Operands::Ints(kind, a, b) => IntervalValue::Integral {
                kind,
                range: a.meet(&b),
            },
            Operands::Floats(kind, a, b) => IntervalValue::Floating {
                kind,
                range: a.meet(&b),
            },
            Operands::Refs(a, b) => IntervalValue::Reference(a.meet(b)),
            Operands::Addresses(a, b) => IntervalValue::ReturnAddress(a.meet(b)),
        })
    }

    fn minus(&self, other: &Self) -> ValueResult<Self> {
        Ok(match operands("minus", self, other)? {
            Operands::Ints(_, a, b) => IntervalValue::Integral {
                kind: self.kind(),
                range: a.without(&b),
            },
            Operands::Floats(kind, a, b) => IntervalValue::Floating {
                kind,
                range: a.without(&b),
            },
            Operands::Refs(a, b) => IntervalValue::Reference(a.without(b)),
            Operands::Addresses(a, b) => IntervalValue::ReturnAddress(a.without(b)),
        })
    }

    fn is_top(&self) -> bool {
        match self {
            IntervalValue::Integral { kind, range } => *range == full_range(*kind),
            IntervalValue::Floating { range, .. } => *range == FloatRange::full(),
            IntervalValue::Reference(nullness) => *nullness == Nullness::MaybeNull,
            IntervalValue::ReturnAddress(addresses) => *addresses == Addresses::Any,
        }
    }

    fn is_bottom(&self) -> bool {
        match self {
            IntervalValue::Integral { range, .. } => range.is_empty(),
            IntervalValue::Floating { range, .. } => range.is_empty(),
            IntervalValue::Reference(nullness) => *nullness == Nullness::Bottom,
            IntervalValue::ReturnAddress(Addresses::Known(targets)) => targets.is_empty(),
            IntervalValue::ReturnAddress(Addresses::Any) => false,
        }
    }

    fn is_value_lower_than(&self, other: &Self) -> ValueResult<bool> {
        match operands("is_value_lower_than", self, other)? {
            Operands::Ints(_, a, b) => Ok(match (a.bounds(), b.bounds()) {
                (Some((_, high)), Some((low, _))) => high < low,
                _ => true,
            }),
            Operands::Floats(_, a, b) => Ok(float_order(a, b, |x, y| x < y)),
            _ => Err(ValueError::IncompatibleKind {
                op: "is_value_lower_than",
                kind: self.kind(),
            }),
        }
    }

    fn is_value_lower_or_equal_to(&self, other: &Self) -> ValueResult<bool> {
        match operands("is_value_lower_or_equal_to", self, other)? {
            Operands::Ints(_, a, b) => Ok(match (a.bounds(), b.bounds()) {
                (Some((_, high)), Some((low, _))) => high <= low,
                _ => true,
            }),
            Operands::Floats(_, a, b) => Ok(float_order(a, b, |x, y| x <= y)),
            _ => Err(ValueError::IncompatibleKind {
                op: "is_value_lower_or_equal_to",
                kind: self.kind(),
            }),
        }
    }

    fn make_concrete(&self) -> Concretization {
        match self {
            IntervalValue::Integral { range, .. } => match range.bounds() {
                Some((low, high)) => Concretization::Integers { low, high },
                None => Concretization::empty(),
            },
            IntervalValue::Floating { range, .. } => {
                let mut values = BTreeSet::new();
                match range.bounds() {
                    Some((low, high)) if low == high => {
                        values.insert(ConcreteValue::Float(OrderedFloat(low)));
                    }
                    Some(_) => return Concretization::Unbounded,
                    None => {}
                }
                if range.has_nan() {
                    values.insert(ConcreteValue::Float(OrderedFloat(f64::NAN)));
                }
                Concretization::Values(values)
            }
            IntervalValue::Reference(Nullness::Bottom) => Concretization::empty(),
            IntervalValue::Reference(Nullness::Null) => Concretization::single(ConcreteValue::Null),
            IntervalValue::Reference(_) => Concretization::Unbounded,
            IntervalValue::ReturnAddress(Addresses::Known(targets)) => Concretization::Values(
                targets
                    .iter()
                    .map(|target| ConcreteValue::ReturnAddress(*target))
                    .collect(),
            ),
            IntervalValue::ReturnAddress(Addresses::Any) => Concretization::Unbounded,
        }
    }

    fn lowest_possible_integer(&self) -> ValueResult<i64> {
        Ok(self.bounds("lowest_possible_integer")?.0)
    }

    fn highest_possible_integer(&self) -> ValueResult<i64> {
        Ok(self.bounds("highest_possible_integer")?.1)
    }

    fn arithmetic(&self, op: ArithmeticOp, kind: NumericKind, rhs: &Self) -> ValueResult<Self> {
        match kind {
            NumericKind::Int | NumericKind::Long => {
                let result_kind = kind.value_kind();
                let left = self.integral_operand("arithmetic", result_kind)?;
                let right_kind = if op.is_shift() {
                    ValueKind::Int
                } else {
                    result_kind
                };
                let right = rhs.integral_operand("arithmetic", right_kind)?;
                let range = integer_arithmetic(op, left, right, kind == NumericKind::Long);
                Ok(Self::integral(result_kind, range))
            }
            NumericKind::Float | NumericKind::Double => {
                if !matches!(
                    op,
                    ArithmeticOp::Add
                        | ArithmeticOp::Sub
                        | ArithmeticOp::Mul
                        | ArithmeticOp::Div
                        | ArithmeticOp::Rem
                ) {
                    return Err(ValueError::IncompatibleKind {
                        op: "arithmetic",
                        kind: kind.value_kind(),
                    });
                }
                let left = self.floating_operand("arithmetic", kind.value_kind())?;
                let right = rhs.floating_operand("arithmetic", kind.value_kind())?;
                Ok(Self::floating(kind, float_arithmetic(op, left, right)))
            }
        }
    }

    fn negate(&self, kind: NumericKind) -> ValueResult<Self> {
        match kind {
            NumericKind::Int | NumericKind::Long => {
                let result_kind = kind.value_kind();
                let range = self.integral_operand("negate", result_kind)?;
                let negated = match range.bounds() {
                    Some((low, high)) => IntRange::from_wide(
                        -i128::from(high),
                        -i128::from(low),
                        full_range(result_kind),
                    ),
                    None => IntRange::EMPTY,
                };
                Ok(Self::integral(result_kind, negated))
            }
            NumericKind::Float | NumericKind::Double => {
                let range = self.floating_operand("negate", kind.value_kind())?;
                let bounds = range.bounds().map(|(low, high)| (-high, -low));
                Ok(Self::floating(kind, FloatRange::new(bounds, range.has_nan())))
            }
        }
    }

    fn convert(&self, conversion: Conversion) -> ValueResult<Self> {
        const OP: &str = "convert";
        let source = conversion.source().value_kind();
        let target = conversion.target();
        let converted = match conversion.source() {
            NumericKind::Int | NumericKind::Long => {
                let range = self.integral_operand(OP, source)?;
                let Some((low, high)) = range.bounds() else {
                    return Ok(Self::bottom(target.value_kind()));
                };
                let narrowed = |kind| {
                    Self::integral(
                        kind,
                        IntRange::from_wide(i128::from(low), i128::from(high), full_range(kind)),
                    )
                };
                match conversion {
                    Conversion::I2L => Self::integral(ValueKind::Long, range),
                    Conversion::L2I => narrowed(ValueKind::Int),
                    Conversion::I2B => narrowed(ValueKind::Byte),
                    Conversion::I2C => narrowed(ValueKind::Char),
                    Conversion::I2S => narrowed(ValueKind::Short),
                    Conversion::I2F | Conversion::L2F => {
                        let bounds = (f64::from(low as f32), f64::from(high as f32));
                        Self::floating(target, FloatRange::new(Some(bounds), false))
                    }
                    _ => {
                        let bounds = (low as f64, high as f64);
                        Self::floating(target, FloatRange::new(Some(bounds), false))
                    }
                }
            }
            NumericKind::Float | NumericKind::Double => {
                let range = self.floating_operand(OP, source)?;
                match target {
                    NumericKind::Int | NumericKind::Long => {
                        let kind = target.value_kind();
                        // Float-to-integer casts saturate and map NaN to zero.
                        let mut result = match (range.bounds(), target) {
                            (Some((low, high)), NumericKind::Int) => {
                                IntRange::new(i64::from(low as i32), i64::from(high as i32))
                            }
                            (Some((low, high)), _) => IntRange::new(low as i64, high as i64),
                            (None, _) => IntRange::EMPTY,
                        };
                        if range.has_nan() {
                            result = result.hull(&IntRange::singleton(0));
                        }
                        Self::integral(kind, result)
                    }
                    _ => Self::floating(target, range),
                }
            }
        };
        Ok(converted)
    }

    fn compare(&self, comparison: Comparison, rhs: &Self) -> ValueResult<Self> {
        const OP: &str = "compare";
        let operand = comparison.operand_kind().value_kind();
        let result = match comparison.operand_kind() {
            NumericKind::Long => {
                let left = self.integral_operand(OP, operand)?;
                let right = rhs.integral_operand(OP, operand)?;
                match (left.bounds(), right.bounds()) {
                    (Some(a), Some(b)) => comparison_result(orderings(a, b), None),
                    _ => IntRange::EMPTY,
                }
            }
            _ => {
                let left = self.floating_operand(OP, operand)?;
                let right = rhs.floating_operand(OP, operand)?;
                if left.is_empty() || right.is_empty() {
                    IntRange::EMPTY
                } else {
                    let outcomes = match (left.bounds(), right.bounds()) {
                        (Some((a, b)), Some((c, d))) => [a < d, a <= d && c <= b, b > c],
                        _ => [false; 3],
                    };
                    let nan = (left.has_nan() || right.has_nan())
                        .then(|| comparison.nan_result())
                        .flatten();
                    comparison_result(outcomes, nan)
                }
            }
        };
        Ok(Self::integral(ValueKind::Int, result))
    }

    fn load_from_array(&self, index: &Self, element: ValueKind) -> ValueResult<Self> {
        const OP: &str = "load_from_array";
        let nullness = self.nullness(OP)?;
        let index = index.integral_operand(OP, ValueKind::Int)?;
        let in_bounds = index.bounds().map_or(false, |(_, high)| high >= 0);
        if nullness.may_be_object() && in_bounds {
            Ok(Self::top(element))
        } else {
            Ok(Self::bottom(element))
        }
    }

    fn store_in_array(&self, index: &Self, _value: &Self) -> ValueResult<()> {
        const OP: &str = "store_in_array";
        self.nullness(OP)?;
        index.integral_operand(OP, ValueKind::Int)?;
        Ok(())
    }
}

/// Whether `order` holds between every pair of values.  NaN compares false
/// with everything.
fn float_order(left: FloatRange, right: FloatRange, order: impl Fn(f64, f64) -> bool) -> bool {
    if left.is_empty() || right.is_empty() {
        return true;
    }
    if left.has_nan() || right.has_nan() {
        return false;
    }
    match (left.bounds(), right.bounds()) {
        (Some((_, high)), Some((low, _))) => order(high, low),
        _ => true,
    }
}
