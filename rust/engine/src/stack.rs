//! Operand stack with JVM slot-category discipline.
//!
//! Values are stored one entry per value regardless of width; the category of
//! each entry decides how the `*2` shuffles group them.  Shuffles that need
//! category-1 operands reject category-2 ones with a [`StackError`] instead of
//! splitting them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{AbstractValue, Category};

/// Stack manipulation instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("{op} needs {needed} value(s) but the stack holds {available}")]
    Underflow {
        op: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("{op} expects a category-1 value at depth {depth}")]
    Category { op: &'static str, depth: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperandStack<V> {
    values: Vec<V>,
}

impl<V> Default for OperandStack<V> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<V: AbstractValue> OperandStack<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bottom-first view of the stack.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn peek(&self) -> Option<&V> {
        self.values.last()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn push(&mut self, value: V) {
        self.values.push(value);
    }

    /// Removes the top value whatever its category.
    pub fn pop(&mut self) -> Result<V, StackError> {
        self.values.pop().ok_or(StackError::Underflow {
            op: "pop",
            needed: 1,
            available: 0,
        })
    }

    /// Removes `count` values, returned bottom-first.
    pub fn pop_many(&mut self, op: &'static str, count: usize) -> Result<Vec<V>, StackError> {
        self.require(op, count)?;
        let split = self.values.len() - count;
        Ok(self.values.split_off(split))
    }

    pub fn apply(&mut self, op: StackOp) -> Result<(), StackError> {
        match op {
            StackOp::Pop => self.pop1().map(drop),
            StackOp::Pop2 => self.pop2(),
            StackOp::Dup => self.dup(),
            StackOp::DupX1 => self.dup_x1(),
            StackOp::DupX2 => self.dup_x2(),
            StackOp::Dup2 => self.dup2(),
            StackOp::Dup2X1 => self.dup2_x1(),
            StackOp::Dup2X2 => self.dup2_x2(),
            StackOp::Swap => self.swap(),
        }
    }

    /// `pop`: removes one category-1 value.
    pub fn pop1(&mut self) -> Result<V, StackError> {
        self.require("pop", 1)?;
        self.expect_category1("pop", 0)?;
        self.pop()
    }

    /// `pop2`: one category-2 value or two category-1 values.
    pub fn pop2(&mut self) -> Result<(), StackError> {
        match self.category_at("pop2", 0)? {
            Category::Two => {
                self.pop()?;
            }
            Category::One => {
                self.require("pop2", 2)?;
                self.expect_category1("pop2", 1)?;
                self.values.truncate(self.values.len() - 2);
            }
        }
        Ok(())
    }

    pub fn dup(&mut self) -> Result<(), StackError> {
        self.require("dup", 1)?;
        self.expect_category1("dup", 0)?;
        let top = self.top_clone(0);
        self.values.push(top);
        Ok(())
    }

    /// ..., v2, v1 => ..., v1, v2, v1
    pub fn dup_x1(&mut self) -> Result<(), StackError> {
        self.require("dup_x1", 2)?;
        self.expect_category1("dup_x1", 0)?;
        self.expect_category1("dup_x1", 1)?;
        let top = self.top_clone(0);
        self.insert_below("dup_x1", 2, top)
    }

    /// ..., v3, v2, v1 => ..., v1, v3, v2, v1 when v2 and v3 are category 1,
    /// otherwise ..., v2, v1 => ..., v1, v2, v1 with v2 category 2.
    pub fn dup_x2(&mut self) -> Result<(), StackError> {
        self.require("dup_x2", 2)?;
        self.expect_category1("dup_x2", 0)?;
        let top = self.top_clone(0);
        match self.category_at("dup_x2", 1)? {
            Category::Two => self.insert_below("dup_x2", 2, top),
            Category::One => {
                self.require("dup_x2", 3)?;
                self.expect_category1("dup_x2", 2)?;
                self.insert_below("dup_x2", 3, top)
            }
        }
    }

    /// ..., v2, v1 => ..., v2, v1, v2, v1 for two category-1 values, or
    /// ..., v1 => ..., v1, v1 for one category-2 value.
    pub fn dup2(&mut self) -> Result<(), StackError> {
        let group = self.top_group("dup2")?;
        self.values.extend(group);
        Ok(())
    }

    /// Form 1: ..., v3, v2, v1 => ..., v2, v1, v3, v2, v1 (all category 1).
    /// Form 2: ..., v2, v1 => ..., v1, v2, v1 (v1 category 2, v2 category 1).
    pub fn dup2_x1(&mut self) -> Result<(), StackError> {
        let group = self.top_group("dup2_x1")?;
        let depth = group.len();
        self.require("dup2_x1", depth + 1)?;
        self.expect_category1("dup2_x1", depth)?;
        self.insert_group_below("dup2_x1", depth + 1, group)
    }

    /// Form 1: ..., v4, v3, v2, v1 => ..., v2, v1, v4, v3, v2, v1 (all category 1).
    /// Form 2: ..., v3, v2, v1 => ..., v1, v3, v2, v1 (v1 category 2).
    /// Form 3: ..., v3, v2, v1 => ..., v2, v1, v3, v2, v1 (v3 category 2).
    /// Form 4: ..., v2, v1 => ..., v1, v2, v1 (both category 2).
    pub fn dup2_x2(&mut self) -> Result<(), StackError> {
        let group = self.top_group("dup2_x2")?;
        let depth = group.len();
        let below = match self.category_at("dup2_x2", depth)? {
            Category::Two => 1,
            Category::One => {
                self.require("dup2_x2", depth + 2)?;
                self.expect_category1("dup2_x2", depth + 1)?;
                2
            }
        };
        self.insert_group_below("dup2_x2", depth + below, group)
    }

    pub fn swap(&mut self) -> Result<(), StackError> {
        self.require("swap", 2)?;
        self.expect_category1("swap", 0)?;
        self.expect_category1("swap", 1)?;
        let len = self.values.len();
        self.values.swap(len - 1, len - 2);
        Ok(())
    }

    /// The two-slot group on top: one category-2 value or two category-1
    /// values, bottom-first.
    fn top_group(&self, op: &'static str) -> Result<Vec<V>, StackError> {
        match self.category_at(op, 0)? {
            Category::Two => Ok(vec![self.top_clone(0)]),
            Category::One => {
                self.require(op, 2)?;
                self.expect_category1(op, 1)?;
                Ok(vec![self.top_clone(1), self.top_clone(0)])
            }
        }
    }

    fn require(&self, op: &'static str, needed: usize) -> Result<(), StackError> {
        if self.values.len() < needed {
            return Err(StackError::Underflow {
                op,
                needed,
                available: self.values.len(),
            });
        }
        Ok(())
    }

    fn category_at(&self, op: &'static str, depth: usize) -> Result<Category, StackError> {
        self.require(op, depth + 1)?;
        Ok(self.values[self.values.len() - 1 - depth].category())
    }

    fn expect_category1(&self, op: &'static str, depth: usize) -> Result<(), StackError> {
        match self.category_at(op, depth)? {
            Category::One => Ok(()),
            Category::Two => Err(StackError::Category { op, depth }),
        }
    }

    fn top_clone(&self, depth: usize) -> V {
        self.values[self.values.len() - 1 - depth].clone()
    }

    /// Inserts `value` so that `depth` existing entries sit above it.
    fn insert_below(&mut self, op: &'static str, depth: usize, value: V) -> Result<(), StackError> {
        self.insert_group_below(op, depth, vec![value])
    }

    fn insert_group_below(
        &mut self,
        op: &'static str,
        depth: usize,
        group: Vec<V>,
    ) -> Result<(), StackError> {
        self.require(op, depth)?;
        let at = self.values.len() - depth;
        self.values.splice(at..at, group);
        Ok(())
    }
}
