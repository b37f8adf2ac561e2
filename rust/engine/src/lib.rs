//! Abstract interpretation engine for JVM method bytecode.
//!
//! Values are supplied by an [`value::AbstractValue`] domain through a
//! [`factory::ValueFactory`]; machine state and branch policy live in a
//! [`world::World`]; [`interpreter::Interpreter`] drives the exploration.

pub mod assembler;
pub mod bytecode;
pub mod descriptor;
pub mod factory;
pub mod instruction;
pub mod interpreter;
pub mod limits;
pub mod minimal_world;
pub mod stack;
pub mod trace;
pub mod value;
pub mod world;
