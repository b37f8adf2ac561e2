//! Lattice-law checks for [`AbstractValue`] implementations.
//!
//! Each check returns a [`LawResult`] rather than panicking so that property
//! tests can report the offending inputs alongside the diagnostic.

use std::fmt::Debug;

use absint_engine::value::{AbstractValue, ValueResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LawResult {
    pub ok: bool,
    pub message: Option<String>,
}

impl LawResult {
    pub const fn passed() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }

    fn from_check(check: ValueResult<LawResult>) -> Self {
        check.unwrap_or_else(|err| LawResult::failed(format!("domain operation failed: {err}")))
    }
}

/// `a ∪ b` subsumes both operands.
pub fn union_is_upper_bound<V: AbstractValue>(a: &V, b: &V) -> LawResult {
    LawResult::from_check((|| -> ValueResult<LawResult> {
        let joined = a.union(b)?;
        if joined.subsumes(a)? && joined.subsumes(b)? {
            Ok(LawResult::passed())
        } else {
            Ok(LawResult::failed(format!(
                "union {:?} of {:?} and {:?} does not cover both",
                joined, a, b
            )))
        }
    })())
}

/// `a ∩ b` is subsumed by both operands.
pub fn intersection_is_lower_bound<V: AbstractValue>(a: &V, b: &V) -> LawResult {
    LawResult::from_check((|| -> ValueResult<LawResult> {
        let met = a.intersection(b)?;
        if a.subsumes(&met)? && b.subsumes(&met)? {
            Ok(LawResult::passed())
        } else {
            Ok(LawResult::failed(format!(
                "intersection {:?} of {:?} and {:?} escapes an operand",
                met, a, b
            )))
        }
    })())
}

pub fn union_is_idempotent<V: AbstractValue>(a: &V) -> LawResult {
    LawResult::from_check(a.union(a).map(|joined| {
        if joined == *a {
            LawResult::passed()
        } else {
            LawResult::failed(format!("{:?} joined with itself became {:?}", a, joined))
        }
    }))
}

pub fn union_is_commutative<V: AbstractValue>(a: &V, b: &V) -> LawResult {
    LawResult::from_check((|| -> ValueResult<LawResult> {
        let left = a.union(b)?;
        let right = b.union(a)?;
        if left == right {
            Ok(LawResult::passed())
        } else {
            Ok(LawResult::failed(format!(
                "a ∪ b = {:?} but b ∪ a = {:?}",
                left, right
            )))
        }
    })())
}

/// A value is bottom exactly when it denotes nothing.
pub fn bottom_iff_empty<V: AbstractValue>(a: &V) -> LawResult {
    let empty = a.make_concrete().is_empty();
    if a.is_bottom() == empty {
        LawResult::passed()
    } else {
        LawResult::failed(format!(
            "{:?}: is_bottom = {}, concretization empty = {}",
            a,
            a.is_bottom(),
            empty
        ))
    }
}

/// Joining `values` in any of the given orders yields the same value.
pub fn join_order_invariance<V, Iter>(values: &[V], orders: Iter) -> LawResult
where
    V: AbstractValue + Debug,
    Iter: IntoIterator<Item = Vec<V>>,
{
    let fold = |values: &[V]| -> ValueResult<Option<V>> {
        let mut iter = values.iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        iter.try_fold(first.clone(), |acc, value| acc.union(value))
            .map(Some)
    };
    LawResult::from_check((|| -> ValueResult<LawResult> {
        let expected = fold(values)?;
        for (index, order) in orders.into_iter().enumerate() {
            let actual = fold(&order)?;
            if actual != expected {
                return Ok(LawResult::failed(format!(
                    "order {} changed the join: expected {:?}, received {:?}",
                    index, expected, actual
                )));
            }
        }
        Ok(LawResult::passed())
    })())
}
