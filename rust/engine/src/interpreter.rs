//! Fork/join exploration of one method body.
//!
//! The interpreter walks the code linearly from an entry offset, handing
//! every instruction to the [`World`] and steering control flow itself.  When
//! a conditional branch needs both outcomes, the "then" side is explored by a
//! nested call on a clone of the World while the original carries on down
//! the fall-through; recursion depth therefore grows with pending forks, not
//! with path length.  Every path ending in a return or throw contributes its
//! World to a shared terminal set, which is joined into one summary at the
//! end.
//!
//! Subroutine return addresses live on one stack owned by the interpreter,
//! not by the World.  Two forked paths that are both inside different
//! `jsr` subroutines at once will pop each other's addresses.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::bytecode::{BytecodeSource, DecodeError};
use crate::instruction::{decode, Instruction, Operation, SwitchTable};
use crate::limits::{ExplorationLimits, ForkGuard, LimitError};
use crate::trace::{ExplorationTrace, TraceCollector};
use crate::world::{World, WorldError};

/// Configuration controlling one exploration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub limits: ExplorationLimits,
    /// Keep a per-instruction step log in the trace.
    pub record_steps: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedInstruction {
    pub offset: usize,
    pub byte: u8,
    pub mnemonic: String,
}

/// How a single explored path ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEnd {
    /// A return or throw added the World to the terminal set.
    Terminal,
    /// A switch handed every continuation to nested explorations.
    Switched,
    /// An instruction without a transition abandoned the path.
    Unsupported,
    /// The path ran past the last instruction.
    FellOffEnd,
}

/// Result of [`Interpreter::interpret`].
#[derive(Debug, Clone)]
pub struct Exploration<W> {
    /// Join of every terminal World, or `None` when no path terminated.
    pub world: Option<W>,
    pub terminal_states: usize,
    pub unsupported: Vec<UnsupportedInstruction>,
    pub trace: ExplorationTrace,
}

/// Fatal conditions; any of them ends the whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Limit(#[from] LimitError),
    #[error("ret at offset {offset} has no pending jsr")]
    RetWithoutJsr { offset: usize },
}

impl EngineError {
    pub fn is_stack_error(&self) -> bool {
        matches!(
            self,
            EngineError::World(WorldError::Stack(_) | WorldError::StackShape { .. })
                | EngineError::RetWithoutJsr { .. }
        )
    }

    pub fn is_value_error(&self) -> bool {
        matches!(self, EngineError::World(WorldError::Value(_)))
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Fatal(#[from] EngineError),
    #[error("unsupported instruction `{}` at offset {}", .0.mnemonic, .0.offset)]
    Unsupported(UnsupportedInstruction),
    #[error("no explored path reached a return or throw")]
    NoTerminalState,
}

/// Explores `source` from offset 0 and returns the joined terminal World.
///
/// Fails if any path hit an instruction without a transition, since the
/// summary would then miss that path's behaviour.
pub fn analyze<S, W>(source: &S, world: W, config: InterpreterConfig) -> Result<W, AnalysisError>
where
    S: BytecodeSource + ?Sized,
    W: World,
{
    let exploration = Interpreter::with_config(source, config).interpret(world)?;
    if let Some(first) = exploration.unsupported.into_iter().next() {
        return Err(AnalysisError::Unsupported(first));
    }
    exploration.world.ok_or(AnalysisError::NoTerminalState)
}

/// Transient per-method interpreter.
pub struct Interpreter<'a, S: BytecodeSource + ?Sized, W: World> {
    source: &'a S,
    return_addresses: Vec<usize>,
    terminals: Vec<W>,
    unsupported: Vec<UnsupportedInstruction>,
    forks: ForkGuard,
    trace: TraceCollector,
}

impl<'a, S, W> Interpreter<'a, S, W>
where
    S: BytecodeSource + ?Sized,
    W: World,
{
    pub fn new(source: &'a S) -> Self {
        Self::with_config(source, InterpreterConfig::default())
    }

    pub fn with_config(source: &'a S, config: InterpreterConfig) -> Self {
        Self {
            source,
            return_addresses: Vec::new(),
            terminals: Vec::new(),
            unsupported: Vec::new(),
            forks: ForkGuard::new(config.limits),
            trace: TraceCollector::new(config.record_steps),
        }
    }

    /// Terminal Worlds collected so far, in collection order.
    pub fn terminal_states(&self) -> &[W] {
        &self.terminals
    }

    /// Runs every required path from the method entry and joins the
    /// terminal states.
    pub fn interpret(mut self, world: W) -> Result<Exploration<W>, EngineError> {
        self.interpret_from(world, 0)?;
        let joined = self.join_terminals()?;
        debug!(
            terminal_states = self.terminals.len(),
            unsupported = self.unsupported.len(),
            "exploration finished"
        );
        Ok(Exploration {
            world: joined,
            terminal_states: self.terminals.len(),
            unsupported: self.unsupported,
            trace: self.trace.finish(self.forks.metrics()),
        })
    }

    /// Explores one path starting at `offset`, forking as the World's
    /// branch policy requires.
    pub fn interpret_from(&mut self, mut world: W, mut offset: usize) -> Result<PathEnd, EngineError> {
        debug!(offset, fork_depth = self.forks.depth(), "exploring path");
        loop {
            if offset >= self.source.len() {
                warn!(offset, "path ran past the end of the code");
                self.trace.dead_path();
                return Ok(PathEnd::FellOffEnd);
            }

            let instruction = decode(self.source, offset)?;
            let Some(opcode) = instruction.opcode else {
                return Ok(self.abandon(&instruction));
            };
            self.trace
                .record_instruction(offset, opcode, world.stack_depth(), self.forks.depth());
            trace!(offset, mnemonic = opcode.mnemonic(), stack = world.stack_depth(), "step");
            let next = offset + instruction.length;

            match &instruction.operation {
                Operation::Goto(relative) => {
                    offset = self.target(&instruction, *relative)?;
                }
                Operation::Jsr(relative) => {
                    let entry = self.target(&instruction, *relative)?;
                    world.enter_subroutine(next)?;
                    self.return_addresses.push(next);
                    offset = entry;
                }
                Operation::Ret(index) => {
                    world.exit_subroutine(*index)?;
                    offset = self
                        .return_addresses
                        .pop()
                        .ok_or(EngineError::RetWithoutJsr { offset })?;
                }
                Operation::Branch {
                    test,
                    offset: relative,
                } => {
                    let target = self.target(&instruction, *relative)?;
                    world.evaluate_branch(*test)?;
                    offset = if *relative <= 0 {
                        self.loop_edge(&world, target, next)
                    } else {
                        self.forward_branch(&world, target, next)?
                    };
                }
                Operation::Switch(table) => {
                    world.evaluate_switch()?;
                    self.switch(world, &instruction, table)?;
                    return Ok(PathEnd::Switched);
                }
                Operation::Terminate(terminal) => {
                    world.terminate(*terminal)?;
                    debug!(offset, ?terminal, "path reached a terminal state");
                    self.trace.terminal();
                    self.terminals.push(world);
                    return Ok(PathEnd::Terminal);
                }
                Operation::Unsupported => return Ok(self.abandon(&instruction)),
                operation => {
                    apply(&mut world, operation)?;
                    offset = next;
                }
            }
        }
    }

    /// Backward branch: follow it when continuing the loop is the only
    /// feasible outcome, or when both are and the World allows looping.
    fn loop_edge(&mut self, world: &W, target: usize, next: usize) -> usize {
        let follow =
            world.then_feasible() && (!world.else_feasible() || world.is_looping_valid());
        if follow {
            debug!(target, "following loop back-edge");
            self.trace.back_edge();
            target
        } else {
            next
        }
    }

    fn forward_branch(&mut self, world: &W, target: usize, next: usize) -> Result<usize, EngineError> {
        if world.all_branches_need_to_be_evaluated() {
            debug!(target, "forking at conditional branch");
            self.fork(world.clone(), target)?;
            return Ok(next);
        }
        Ok(if world.should_evaluate_then() {
            target
        } else {
            next
        })
    }

    fn switch(
        &mut self,
        world: W,
        instruction: &Instruction,
        table: &SwitchTable,
    ) -> Result<(), EngineError> {
        let mut targets = BTreeSet::new();
        if world.all_branches_need_to_be_evaluated() {
            for (_, relative) in &table.cases {
                targets.insert(self.target(instruction, *relative)?);
            }
            targets.insert(self.target(instruction, table.default)?);
        } else {
            for value in world.switch_candidates() {
                targets.insert(self.target(instruction, table.offset_for(value))?);
            }
        }
        debug!(
            offset = instruction.offset,
            targets = targets.len(),
            "switch fan-out"
        );
        for target in targets {
            self.trace.switch_case();
            self.fork(world.clone(), target)?;
        }
        Ok(())
    }

    fn fork(&mut self, world: W, target: usize) -> Result<PathEnd, EngineError> {
        self.forks.enter()?;
        let end = self.interpret_from(world, target);
        self.forks.exit();
        end
    }

    fn target(&self, instruction: &Instruction, relative: i32) -> Result<usize, DecodeError> {
        let target = instruction.offset as i64 + i64::from(relative);
        if target < 0 || target as usize >= self.source.len() {
            return Err(DecodeError::BranchTarget {
                offset: instruction.offset,
                target,
            });
        }
        Ok(target as usize)
    }

    fn abandon(&mut self, instruction: &Instruction) -> PathEnd {
        warn!(
            offset = instruction.offset,
            mnemonic = instruction.mnemonic(),
            "no transition for instruction, abandoning path"
        );
        self.trace.unsupported();
        self.unsupported.push(UnsupportedInstruction {
            offset: instruction.offset,
            byte: instruction.byte,
            mnemonic: instruction.mnemonic().to_owned(),
        });
        PathEnd::Unsupported
    }

    fn join_terminals(&self) -> Result<Option<W>, EngineError> {
        let mut states = self.terminals.iter();
        let Some(first) = states.next() else {
            return Ok(None);
        };
        let mut joined = first.clone();
        for state in states {
            joined = joined.combine_with(state)?;
        }
        debug!(terminal_states = self.terminals.len(), "joined terminal states");
        Ok(Some(joined))
    }
}

/// Dispatches a straight-line operation to its World transition.
fn apply<W: World>(world: &mut W, operation: &Operation) -> Result<(), WorldError> {
    match operation {
        Operation::Nop => Ok(()),
        Operation::Push(literal) => world.push_literal(literal),
        Operation::Load { kind, index } => world.load_local(*kind, *index),
        Operation::Store { kind, index } => world.store_local(*kind, *index),
        Operation::Increment { index, delta } => world.increment_local(*index, *delta),
        Operation::ArrayLoad(element) => world.load_array(*element),
        Operation::ArrayStore(element) => world.store_array(*element),
        Operation::Stack(op) => world.shuffle(*op),
        Operation::Arithmetic(op, kind) => world.arithmetic(*op, *kind),
        Operation::Negate(kind) => world.negate(*kind),
        Operation::Convert(conversion) => world.convert(*conversion),
        Operation::Compare(comparison) => world.compare(*comparison),
        Operation::GetStatic(access) => world.get_static(access),
        Operation::PutStatic(access) => world.put_static(access),
        Operation::GetField(access) => world.get_field(access),
        Operation::PutField(access) => world.put_field(access),
        Operation::Invoke {
            kind,
            method,
            descriptor,
        } => world.invoke(*kind, method, descriptor),
        Operation::Allocate(allocation) => world.allocate(allocation),
        Operation::ArrayLength => world.array_length(),
        Operation::TypeCheck(check) => world.type_check(check),
        Operation::Monitor(op) => world.monitor(*op),
        // Control flow is driven by the interpreter loop.
        Operation::Branch { .. }
        | Operation::Goto(_)
        | Operation::Jsr(_)
        | Operation::Ret(_)
        | Operation::Switch(_)
        | Operation::Terminate(_)
        | Operation::Unsupported => Ok(()),
    }
}
