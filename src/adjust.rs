//! Adjustment methods: single lines, parametric networks and loop conditions.
//!
//! All three share the normal-equation [`kernel`]. Entry points:
//! - [`LineAdjuster`] for one line between two known benchmarks.
//! - [`ParametricAdjuster`] for networks of any shape with at least one fixed point.
//! - [`ConditionalAdjuster`] for networks described by explicit loops.

pub mod conditional;
pub mod kernel;
pub mod line;
pub mod parametric;

pub use conditional::{ConditionBuilder, ConditionalAdjuster, SignedConditions, UnsignedConditions};
pub use kernel::{
    distance_weights, AdjustmentKernel, ConditionalSolution, KernelParams, LinearSolution,
};
pub use line::{adjust_single_line, LineAdjuster, LineAdjustment, RunAverage};
pub use parametric::{simple_adjustment, ParametricAdjuster, ParametricParams};
