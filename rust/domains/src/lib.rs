//! Reference value domains for `absint_engine`.
//!
//! [`interval::IntervalValue`] tracks integer and floating ranges, reference
//! nullness and return-address sets; [`laws`] checks any domain against the
//! lattice laws the engine's joins depend on.

pub mod factory;
pub mod interval;
pub mod laws;
pub mod range;
