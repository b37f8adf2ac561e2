//! Bound primitives behind [`crate::interval::IntervalValue`].
//!
//! Integer ranges are computed in `i128` so that every `int` and `long`
//! operation can be evaluated on its bounds without overflowing; results that
//! leave the kind's range are widened by the caller.

use ordered_float::OrderedFloat;

/// Closed integer range; `None` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntRange {
    bounds: Option<(i64, i64)>,
}

impl IntRange {
    pub const EMPTY: IntRange = IntRange { bounds: None };

    pub fn new(low: i64, high: i64) -> Self {
        if low > high {
            Self::EMPTY
        } else {
            Self {
                bounds: Some((low, high)),
            }
        }
    }

    pub fn singleton(value: i64) -> Self {
        Self::new(value, value)
    }

    pub fn bounds(&self) -> Option<(i64, i64)> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn single(&self) -> Option<i64> {
        match self.bounds {
            Some((low, high)) if low == high => Some(low),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.bounds
            .map_or(false, |(low, high)| low <= value && value <= high)
    }

    pub fn covers(&self, other: &IntRange) -> bool {
        match (self.bounds, other.bounds) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some((a, b)), Some((c, d))) => a <= c && d <= b,
        }
    }

    pub fn hull(&self, other: &IntRange) -> IntRange {
        match (self.bounds, other.bounds) {
            (None, _) => *other,
            (_, None) => *self,
            (Some((a, b)), Some((c, d))) => IntRange::new(a.min(c), b.max(d)),
        }
    }

    pub fn meet(&self, other: &IntRange) -> IntRange {
        match (self.bounds, other.bounds) {
            (Some((a, b)), Some((c, d))) => IntRange::new(a.max(c), b.min(d)),
            _ => IntRange::EMPTY,
        }
    }

    /// Over-approximates `self \ other`; only trims when `other` covers an
    /// end of `self`.
    pub fn without(&self, other: &IntRange) -> IntRange {
        let (Some((a, b)), Some((c, d))) = (self.bounds, other.bounds) else {
            return *self;
        };
        if d < a || b < c {
            return *self;
        }
        match (c <= a, b <= d) {
            (true, true) => IntRange::EMPTY,
            (true, false) => IntRange::new(d + 1, b),
            (false, true) => IntRange::new(a, c - 1),
            (false, false) => *self,
        }
    }

    /// Builds a range from `i128` bounds, falling back to `full` when they do
    /// not fit inside it.
    pub fn from_wide(low: i128, high: i128, full: IntRange) -> IntRange {
        let Some((min, max)) = full.bounds else {
            return IntRange::EMPTY;
        };
        if low < i128::from(min) || high > i128::from(max) {
            full
        } else {
            IntRange::new(low as i64, high as i64)
        }
    }
}

/// Closed floating range plus a NaN flag.
///
/// Bounds may be infinite.  Zero signs are not distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatRange {
    bounds: Option<(OrderedFloat<f64>, OrderedFloat<f64>)>,
    nan: bool,
}

impl FloatRange {
    pub const EMPTY: FloatRange = FloatRange {
        bounds: None,
        nan: false,
    };

    pub fn new(bounds: Option<(f64, f64)>, nan: bool) -> Self {
        let bounds = bounds
            .filter(|(low, high)| low <= high)
            .map(|(low, high)| (OrderedFloat(low), OrderedFloat(high)));
        Self { bounds, nan }
    }

    pub fn full() -> Self {
        Self::new(Some((f64::NEG_INFINITY, f64::INFINITY)), true)
    }

    pub fn singleton(value: f64) -> Self {
        if value.is_nan() {
            Self::new(None, true)
        } else {
            Self::new(Some((value, value)), false)
        }
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds.map(|(low, high)| (low.0, high.0))
    }

    pub fn has_nan(&self) -> bool {
        self.nan
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none() && !self.nan
    }

    pub fn contains(&self, value: f64) -> bool {
        self.bounds()
            .map_or(false, |(low, high)| low <= value && value <= high)
    }

    pub fn covers(&self, other: &FloatRange) -> bool {
        let bounds = match (self.bounds, other.bounds) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some((a, b)), Some((c, d))) => a <= c && d <= b,
        };
        bounds && (self.nan || !other.nan)
    }

    pub fn hull(&self, other: &FloatRange) -> FloatRange {
        let bounds = match (self.bounds(), other.bounds()) {
            (None, bounds) | (bounds, None) => bounds,
            (Some((a, b)), Some((c, d))) => Some((a.min(c), b.max(d))),
        };
        FloatRange::new(bounds, self.nan || other.nan)
    }

    pub fn meet(&self, other: &FloatRange) -> FloatRange {
        let bounds = match (self.bounds(), other.bounds()) {
            (Some((a, b)), Some((c, d))) => Some((a.max(c), b.min(d))),
            _ => None,
        };
        FloatRange::new(bounds, self.nan && other.nan)
    }

    pub fn without(&self, other: &FloatRange) -> FloatRange {
        let bounds = match (self.bounds(), other.bounds()) {
            (Some((a, b)), Some((c, d))) if c <= a && b <= d => None,
            (bounds, _) => bounds,
        };
        FloatRange::new(bounds, self.nan && !other.nan)
    }

    /// Rounds the bounds to `f32` precision.
    pub fn to_single(self) -> FloatRange {
        let bounds = self
            .bounds()
            .map(|(low, high)| (f64::from(low as f32), f64::from(high as f32)));
        FloatRange::new(bounds, self.nan)
    }
}

/// Which of null and non-null references a value may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullness {
    Bottom,
    Null,
    NonNull,
    MaybeNull,
}

impl Nullness {
    fn from_bits(null: bool, object: bool) -> Self {
        match (null, object) {
            (false, false) => Nullness::Bottom,
            (true, false) => Nullness::Null,
            (false, true) => Nullness::NonNull,
            (true, true) => Nullness::MaybeNull,
        }
    }

    pub fn may_be_null(self) -> bool {
        matches!(self, Nullness::Null | Nullness::MaybeNull)
    }

    pub fn may_be_object(self) -> bool {
        matches!(self, Nullness::NonNull | Nullness::MaybeNull)
    }

    pub fn covers(self, other: Nullness) -> bool {
        (self.may_be_null() || !other.may_be_null())
            && (self.may_be_object() || !other.may_be_object())
    }

    pub fn join(self, other: Nullness) -> Nullness {
        Nullness::from_bits(
            self.may_be_null() || other.may_be_null(),
            self.may_be_object() || other.may_be_object(),
        )
    }

    pub fn meet(self, other: Nullness) -> Nullness {
        Nullness::from_bits(
            self.may_be_null() && other.may_be_null(),
            self.may_be_object() && other.may_be_object(),
        )
    }

    /// Null is a single value and can be removed exactly; a non-null part
    /// stands for many objects and is never removed.
    pub fn without(self, other: Nullness) -> Nullness {
        Nullness::from_bits(
            self.may_be_null() && !other.may_be_null(),
            self.may_be_object(),
        )
    }
}
