//! Iterative parametric (observation-equation) network adjustment.
//!
//! Each observation `i` from point `f` to point `t` contributes the equation
//!
//! ```text
//! H_t − H_f = dh_i + v_i,      weight p_i = 1 / d_i[km]
//! ```
//!
//! Unknown heights are ordered lexicographically by point id, which fixes the
//! column order of the design matrix. Fixed points carry no column and are
//! copied into the result unchanged.

use crate::adjust::kernel::{distance_weights, AdjustmentKernel, KernelParams, LinearSolution};
use crate::diagnostics::{AdjustmentDiagnostics, AdjustmentWarning, IterationReport};
use crate::error::AdjustmentError;
use crate::types::{residual_keys, AdjustmentResult, LevelingLine, MeasurementSummary};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

/// Parameters of the parametric adjuster.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametricParams {
    pub max_iterations: usize,
    /// Convergence threshold on the largest height correction (m).
    pub tolerance: f64,
    pub check_stability: bool,
    pub condition_threshold: f64,
    /// Return [`AdjustmentError::Convergence`] instead of a flagged result
    /// when the iteration cap is hit.
    pub fail_on_non_convergence: bool,
}

impl Default for ParametricParams {
    fn default() -> Self {
        let kernel = KernelParams::default();
        Self {
            max_iterations: 10,
            tolerance: 1e-6,
            check_stability: kernel.check_stability,
            condition_threshold: kernel.condition_threshold,
            fail_on_non_convergence: false,
        }
    }
}

impl ParametricParams {
    pub fn kernel_params(&self) -> KernelParams {
        KernelParams {
            condition_threshold: self.condition_threshold,
            check_stability: self.check_stability,
        }
    }
}

/// Least-squares adjuster for leveling networks of arbitrary topology.
#[derive(Clone, Debug, Default)]
pub struct ParametricAdjuster {
    params: ParametricParams,
    kernel: AdjustmentKernel,
}

impl ParametricAdjuster {
    pub fn new(params: ParametricParams) -> Self {
        let kernel = AdjustmentKernel::new(params.kernel_params());
        Self { params, kernel }
    }

    pub fn params(&self) -> &ParametricParams {
        &self.params
    }

    /// Adjusts `observations` holding `fixed_points` at their given heights.
    ///
    /// Unknown points start at `approximate_heights` when supplied, else at
    /// zero. The result's `converged` flag is false when `max_iterations`
    /// was reached with the largest correction still above `tolerance`.
    pub fn adjust(
        &self,
        observations: &[MeasurementSummary],
        fixed_points: &BTreeMap<String, f64>,
        approximate_heights: Option<&BTreeMap<String, f64>>,
    ) -> Result<AdjustmentResult, AdjustmentError> {
        let t0 = Instant::now();
        if observations.is_empty() {
            return Err(AdjustmentError::invalid_network("no observations provided"));
        }
        if fixed_points.is_empty() {
            return Err(AdjustmentError::invalid_network(
                "at least one fixed point is required",
            ));
        }

        let unknowns: Vec<&str> = observations
            .iter()
            .flat_map(|obs| [obs.from_point.as_str(), obs.to_point.as_str()])
            .filter(|id| !fixed_points.contains_key(*id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if unknowns.is_empty() {
            return Err(AdjustmentError::invalid_network(
                "all points are fixed, nothing to adjust",
            ));
        }
        let column: HashMap<&str, usize> =
            unknowns.iter().enumerate().map(|(j, id)| (*id, j)).collect();

        let n_obs = observations.len();
        let n_unknowns = unknowns.len();
        info!("parametric adjustment: {n_obs} observations, {n_unknowns} unknowns");

        let mut heights = fixed_points.clone();
        for id in &unknowns {
            let initial = approximate_heights
                .and_then(|approx| approx.get(*id))
                .copied()
                .unwrap_or(0.0);
            heights.insert((*id).to_string(), initial);
        }

        let a = design_matrix(observations, &column);
        let p = distance_weights(observations.iter().map(|obs| obs.distance));
        let max_iterations = self.params.max_iterations.max(1);

        let mut diagnostics = AdjustmentDiagnostics::default();
        let mut last: Option<LinearSolution> = None;
        let mut converged = false;
        let mut max_correction = f64::INFINITY;
        let mut iteration = 0;
        while iteration < max_iterations {
            iteration += 1;
            let l = reduced_observations(observations, &heights);
            let solution = self.kernel.run_linear_adjustment(&a, &l, &p)?;
            if let Some(info) = &solution.stability {
                diagnostics.extend_warnings(AdjustmentWarning::from_stability(
                    info,
                    self.params.condition_threshold,
                ));
            }

            max_correction = 0.0;
            for (j, id) in unknowns.iter().enumerate() {
                let dx = solution.x[j];
                if let Some(h) = heights.get_mut(*id) {
                    *h += dx;
                }
                max_correction = f64::max(max_correction, dx.abs());
            }
            debug!(
                "iteration {iteration}: max correction {max_correction:.3e} m, sigma_0 {:.4}",
                solution.sigma_0
            );
            diagnostics.iterations.push(IterationReport {
                iteration,
                max_correction,
                sigma_0: solution.sigma_0,
            });
            last = Some(solution);
            if max_correction < self.params.tolerance {
                converged = true;
                break;
            }
        }
        let Some(solution) = last else {
            return Err(AdjustmentError::invalid_network("no iteration was run"));
        };

        if converged {
            info!("converged after {iteration} iterations");
        } else {
            warn!(
                "no convergence after {iteration} iterations (max correction {max_correction:.3e} m)"
            );
            if self.params.fail_on_non_convergence {
                return Err(AdjustmentError::Convergence {
                    iterations: iteration,
                    max_correction,
                });
            }
            diagnostics.extend_warnings([AdjustmentWarning::NotConverged {
                iterations: iteration,
                max_correction,
                tolerance: self.params.tolerance,
            }]);
        }

        let residuals_m: Vec<f64> = observations
            .iter()
            .map(|obs| computed_dh(&heights, obs) - obs.height_diff)
            .collect();
        let vtpv: f64 = residuals_m
            .iter()
            .enumerate()
            .map(|(i, v)| p[(i, i)] * v * v)
            .sum();
        let dof = solution.degrees_of_freedom;
        let sigma_0 = (vtpv / dof as f64).max(0.0).sqrt();

        let mse_heights = unknowns
            .iter()
            .enumerate()
            .map(|(j, id)| {
                (
                    (*id).to_string(),
                    sigma_0 * solution.qxx[(j, j)].max(0.0).sqrt(),
                )
            })
            .collect();

        diagnostics.converged = converged;
        diagnostics.degrees_of_freedom = dof;
        diagnostics.vtpv = vtpv;
        diagnostics.stability = solution.stability;
        diagnostics.elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;

        let result = build_result(
            observations,
            &residuals_m,
            heights,
            mse_heights,
            iteration,
            sigma_0,
            converged,
            diagnostics,
        );
        info!(
            "parametric adjustment done: sigma_0={sigma_0:.5} dof={dof} K={:.3} elapsed_ms={:.3}",
            result.k_coefficient, result.diagnostics.elapsed_ms
        );
        Ok(result)
    }

    /// Adjusts lines directly; lines with `is_used == false` are skipped.
    pub fn adjust_from_lines(
        &self,
        lines: &[LevelingLine],
        fixed_points: &BTreeMap<String, f64>,
    ) -> Result<AdjustmentResult, AdjustmentError> {
        let observations: Vec<MeasurementSummary> = lines
            .iter()
            .filter(|line| line.is_used)
            .map(MeasurementSummary::from)
            .collect();
        self.adjust(&observations, fixed_points, None)
    }
}

/// Adjusted heights with default parameters.
pub fn simple_adjustment(
    observations: &[MeasurementSummary],
    fixed_points: &BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>, AdjustmentError> {
    ParametricAdjuster::default()
        .adjust(observations, fixed_points, None)
        .map(|result| result.adjusted_heights)
}

/// `+1` in the "to" column, `−1` in the "from" column; fixed points have none.
/// A point observed against itself gets a zero row.
fn design_matrix(observations: &[MeasurementSummary], column: &HashMap<&str, usize>) -> DMatrix<f64> {
    let mut a = DMatrix::zeros(observations.len(), column.len());
    for (i, obs) in observations.iter().enumerate() {
        if let Some(&j) = column.get(obs.to_point.as_str()) {
            a[(i, j)] += 1.0;
        }
        if let Some(&j) = column.get(obs.from_point.as_str()) {
            a[(i, j)] -= 1.0;
        }
    }
    a
}

fn computed_dh(heights: &BTreeMap<String, f64>, obs: &MeasurementSummary) -> f64 {
    let h = |id: &str| heights.get(id).copied().unwrap_or(0.0);
    h(&obs.to_point) - h(&obs.from_point)
}

/// `L = observed − computed` at the current heights.
fn reduced_observations(
    observations: &[MeasurementSummary],
    heights: &BTreeMap<String, f64>,
) -> DVector<f64> {
    DVector::from_iterator(
        observations.len(),
        observations
            .iter()
            .map(|obs| obs.height_diff - computed_dh(heights, obs)),
    )
}

/// Assembles an [`AdjustmentResult`] from residuals in meters.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_result(
    observations: &[MeasurementSummary],
    residuals_m: &[f64],
    adjusted_heights: BTreeMap<String, f64>,
    mse_heights: BTreeMap<String, f64>,
    iteration: usize,
    mse_unit_weight: f64,
    converged: bool,
    diagnostics: AdjustmentDiagnostics,
) -> AdjustmentResult {
    let residuals: BTreeMap<String, f64> = residual_keys(observations)
        .into_iter()
        .zip(residuals_m.iter().map(|v| v * 1000.0))
        .collect();
    let total_distance_km = observations.iter().map(|obs| obs.distance).sum::<f64>() / 1000.0;
    let total_diff_mm: f64 = residuals_m.iter().map(|v| (v * 1000.0).abs()).sum();
    let k_coefficient = if total_distance_km > 0.0 {
        total_diff_mm / total_distance_km.sqrt()
    } else {
        0.0
    };
    AdjustmentResult {
        iteration,
        mse_unit_weight,
        adjusted_heights,
        residuals,
        mse_heights,
        total_distance_km,
        total_diff_mm,
        k_coefficient,
        converged,
        diagnostics,
    }
}
