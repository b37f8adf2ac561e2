//! Fork-depth accounting for the exploration.
//!
//! Every forced fork (a conditional branch needing both outcomes, or a switch
//! case) is explored by a nested call, so the native stack grows with the
//! number of forks pending at once.  The guard records that depth and, when a
//! limit is configured, turns runaway forking into an error instead of a
//! stack overflow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Call-site configurable exploration limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationLimits {
    /// Pending forks allowed at once; `None` leaves the depth unbounded.
    pub max_fork_depth: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkMetrics {
    pub forks: u64,
    pub max_fork_depth: usize,
}

#[derive(Debug)]
pub struct ForkGuard {
    limits: ExplorationLimits,
    depth: usize,
    metrics: ForkMetrics,
}

impl ForkGuard {
    pub fn new(limits: ExplorationLimits) -> Self {
        Self {
            limits,
            depth: 0,
            metrics: ForkMetrics::default(),
        }
    }

    pub fn metrics(&self) -> ForkMetrics {
        self.metrics
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Call before descending into a forked path.
    pub fn enter(&mut self) -> Result<(), LimitError> {
        if let Some(limit) = self.limits.max_fork_depth {
            if self.depth >= limit {
                return Err(LimitError::ForkDepth { limit });
            }
        }
        self.depth += 1;
        self.metrics.forks += 1;
        if self.depth > self.metrics.max_fork_depth {
            self.metrics.max_fork_depth = self.depth;
        }
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error("fork depth limit exceeded (limit {limit})")]
    ForkDepth { limit: usize },
}
