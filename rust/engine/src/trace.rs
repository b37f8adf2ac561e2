//! Exploration trace collection.
//!
//! The collector gathers lightweight telemetry while paths are explored so
//! that callers can see how much of the method was reached and how the
//! exploration branched without re-running it.  Per-step records are only
//! kept when requested; counters and coverage are always collected.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::bytecode::Opcode;
use crate::limits::ForkMetrics;

/// Trace emitted after exploration completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationTrace {
    pub steps: Vec<TraceStep>,
    /// Offsets of every instruction executed on some path, ascending.
    pub coverage: Vec<usize>,
    pub metrics: TraceMetrics,
}

/// Individual instruction execution event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub offset: usize,
    pub opcode: Opcode,
    pub stack_depth: usize,
    pub fork_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetrics {
    pub instructions: u64,
    pub unique_opcodes: Vec<Opcode>,
    pub back_edges: u64,
    pub switch_cases: u64,
    pub terminal_states: u64,
    pub unsupported_paths: u64,
    pub dead_paths: u64,
    pub forks: ForkMetrics,
}

#[derive(Debug, Default)]
pub struct TraceCollector {
    record_steps: bool,
    steps: Vec<TraceStep>,
    coverage: BTreeSet<usize>,
    instruction_count: u64,
    unique_opcodes: BTreeSet<Opcode>,
    back_edges: u64,
    switch_cases: u64,
    terminal_states: u64,
    unsupported_paths: u64,
    dead_paths: u64,
}

impl TraceCollector {
    pub fn new(record_steps: bool) -> Self {
        Self {
            record_steps,
            ..Self::default()
        }
    }

    pub fn record_instruction(
        &mut self,
        offset: usize,
        opcode: Opcode,
        stack_depth: usize,
        fork_depth: usize,
    ) {
        self.instruction_count += 1;
        self.unique_opcodes.insert(opcode);
        self.coverage.insert(offset);
        if self.record_steps {
            self.steps.push(TraceStep {
                offset,
                opcode,
                stack_depth,
                fork_depth,
            });
        }
    }

    pub fn back_edge(&mut self) {
        self.back_edges += 1;
    }

    pub fn switch_case(&mut self) {
        self.switch_cases += 1;
    }

    pub fn terminal(&mut self) {
        self.terminal_states += 1;
    }

    pub fn unsupported(&mut self) {
        self.unsupported_paths += 1;
    }

    pub fn dead_path(&mut self) {
        self.dead_paths += 1;
    }

    pub fn finish(self, forks: ForkMetrics) -> ExplorationTrace {
        ExplorationTrace {
            steps: self.steps,
            coverage: self.coverage.into_iter().collect(),
            metrics: TraceMetrics {
                instructions: self.instruction_count,
                unique_opcodes: self.unique_opcodes.into_iter().collect(),
                back_edges: self.back_edges,
                switch_cases: self.switch_cases,
                terminal_states: self.terminal_states,
                unsupported_paths: self.unsupported_paths,
                dead_paths: self.dead_paths,
                forks,
            },
        }
    }
}
