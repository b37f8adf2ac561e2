//! Value construction contract for pluggable domains.

use std::fmt::Debug;

use crate::value::{AbstractValue, ValueKind};

/// Builds the abstract values a World needs.
///
/// The World owns the locals and statics maps; the factory decides what a
/// slot holds the first time it is read.
pub trait ValueFactory: Debug {
    type Value: AbstractValue;

    fn null(&self) -> Self::Value;
    fn int(&self, value: i32) -> Self::Value;
    fn long(&self, value: i64) -> Self::Value;
    fn float(&self, value: f32) -> Self::Value;
    fn double(&self, value: f64) -> Self::Value;
    fn short(&self, value: i16) -> Self::Value;
    fn string(&self, value: &str) -> Self::Value;
    fn return_address(&self, target: usize) -> Self::Value;

    /// Top element for `kind`.
    fn unconstrained(&self, kind: ValueKind) -> Self::Value;

    /// Value of local `index` on its first read.
    fn local_value(&self, index: u16, kind: ValueKind) -> Self::Value {
        let _ = index;
        self.unconstrained(kind)
    }

    /// Value of the static field identified by `key` on its first read.
    fn static_value(&self, key: &str, kind: ValueKind) -> Self::Value {
        let _ = key;
        self.unconstrained(kind)
    }
}
