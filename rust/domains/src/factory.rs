//! Factory producing [`IntervalValue`]s.

use std::collections::BTreeMap;

use absint_engine::factory::ValueFactory;
use absint_engine::value::{AbstractValue, ValueKind};
use tracing::warn;

use crate::interval::IntervalValue;
use crate::range::IntRange;

/// Interval factory with optional seeds for locals and statics.
///
/// Seeded slots are returned on first read instead of the top element, which
/// lets callers describe a method's precondition.
#[derive(Debug, Clone, Default)]
pub struct IntervalFactory {
    locals: BTreeMap<u16, IntervalValue>,
    statics: BTreeMap<String, IntervalValue>,
}

impl IntervalFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, index: u16, value: IntervalValue) -> Self {
        self.locals.insert(index, value);
        self
    }

    /// `key` is the field identity `owner/name:descriptor`.
    pub fn with_static(mut self, key: impl Into<String>, value: IntervalValue) -> Self {
        self.statics.insert(key.into(), value);
        self
    }

    fn seeded(seed: Option<&IntervalValue>, slot: &str, kind: ValueKind) -> IntervalValue {
        match seed {
            Some(value) if fits(value.kind(), kind) => value.clone(),
            Some(value) => {
                warn!(slot, seeded = ?value.kind(), requested = ?kind, "ignoring seed of the wrong kind");
                IntervalValue::top(kind)
            }
            None => IntervalValue::top(kind),
        }
    }
}

fn fits(seeded: ValueKind, requested: ValueKind) -> bool {
    seeded == requested
        || (seeded.is_integral()
            && requested.is_integral()
            && seeded.category() == requested.category())
}

impl ValueFactory for IntervalFactory {
    type Value = IntervalValue;

    fn null(&self) -> IntervalValue {
        IntervalValue::null()
    }

    fn int(&self, value: i32) -> IntervalValue {
        IntervalValue::int(value)
    }

    fn long(&self, value: i64) -> IntervalValue {
        IntervalValue::long(value)
    }

    fn float(&self, value: f32) -> IntervalValue {
        IntervalValue::float(value)
    }

    fn double(&self, value: f64) -> IntervalValue {
        IntervalValue::double(value)
    }

    fn short(&self, value: i16) -> IntervalValue {
        IntervalValue::Integral {
            kind: ValueKind::Short,
            range: IntRange::singleton(i64::from(value)),
        }
    }

    fn string(&self, _value: &str) -> IntervalValue {
        IntervalValue::non_null()
    }

    fn return_address(&self, target: usize) -> IntervalValue {
        IntervalValue::return_address(target)
    }

    fn unconstrained(&self, kind: ValueKind) -> IntervalValue {
        IntervalValue::top(kind)
    }

    fn local_value(&self, index: u16, kind: ValueKind) -> IntervalValue {
        Self::seeded(self.locals.get(&index), &format!("local {index}"), kind)
    }

    fn static_value(&self, key: &str, kind: ValueKind) -> IntervalValue {
        Self::seeded(self.statics.get(key), key, kind)
    }
}
