//! Non-fatal findings and per-run traces attached to adjustment results.

use serde::Serialize;
use std::fmt;

/// Matrix health metrics produced by the stability check.
///
/// For non-square input only `is_square` is meaningful; the remaining fields
/// keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StabilityInfo {
    pub label: String,
    pub rows: usize,
    pub cols: usize,
    pub is_square: bool,
    pub determinant: f64,
    pub is_singular: bool,
    pub condition_number: f64,
    pub is_ill_conditioned: bool,
    pub rank: usize,
}

impl StabilityInfo {
    pub fn is_rank_deficient(&self) -> bool {
        self.is_square && self.rank < self.rows
    }
}

/// Conditions the caller should know about that did not abort the run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentWarning {
    /// Condition number above the configured threshold.
    IllConditioned {
        label: String,
        condition_number: f64,
        threshold: f64,
    },
    RankDeficient {
        label: String,
        rank: usize,
        size: usize,
    },
    /// Iteration cap hit with corrections still above tolerance.
    NotConverged {
        iterations: usize,
        max_correction: f64,
        tolerance: f64,
    },
}

impl AdjustmentWarning {
    /// Warnings implied by a stability report.
    pub fn from_stability(info: &StabilityInfo, threshold: f64) -> Vec<AdjustmentWarning> {
        let mut out = Vec::new();
        if info.is_ill_conditioned {
            out.push(AdjustmentWarning::IllConditioned {
                label: info.label.clone(),
                condition_number: info.condition_number,
                threshold,
            });
        }
        if info.is_rank_deficient() {
            out.push(AdjustmentWarning::RankDeficient {
                label: info.label.clone(),
                rank: info.rank,
                size: info.rows,
            });
        }
        out
    }
}

impl fmt::Display for AdjustmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustmentWarning::IllConditioned {
                label,
                condition_number,
                threshold,
            } => write!(
                f,
                "{label} is ill-conditioned (cond={condition_number:.2e} > {threshold:.0e})"
            ),
            AdjustmentWarning::RankDeficient { label, rank, size } => {
                write!(f, "{label} is rank deficient (rank={rank}, size={size})")
            }
            AdjustmentWarning::NotConverged {
                iterations,
                max_correction,
                tolerance,
            } => write!(
                f,
                "not converged after {iterations} iterations (max correction {max_correction:.3e} m > {tolerance:.1e} m)"
            ),
        }
    }
}

/// Trace entry for one iteration of the parametric adjustment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IterationReport {
    pub iteration: usize,
    /// Largest absolute height correction applied in this iteration (m).
    pub max_correction: f64,
    pub sigma_0: f64,
}

/// Diagnostics attached to every [`AdjustmentResult`](crate::types::AdjustmentResult).
#[derive(Clone, Debug, Default, Serialize)]
pub struct AdjustmentDiagnostics {
    pub converged: bool,
    pub degrees_of_freedom: usize,
    /// Weighted residual sum of squares `vᵀPv`.
    pub vtpv: f64,
    pub iterations: Vec<IterationReport>,
    /// Stability report of the last normal matrix that was checked.
    pub stability: Option<StabilityInfo>,
    pub warnings: Vec<AdjustmentWarning>,
    pub elapsed_ms: f64,
}

impl AdjustmentDiagnostics {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Adds warnings that are not already present.
    pub(crate) fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = AdjustmentWarning>) {
        for w in warnings {
            if !self.warnings.contains(&w) {
                self.warnings.push(w);
            }
        }
    }
}

/// Topology summary of a leveling network.
#[derive(Clone, Debug, Serialize)]
pub struct NetworkSummary {
    pub num_points: usize,
    pub num_lines: usize,
    pub num_loops: usize,
    pub num_components: usize,
    /// Cycle-space dimension `E − V + C`.
    pub expected_loops: usize,
    pub points: Vec<String>,
}
