//! Conditional (condition-equation) adjustment over closed loops.
//!
//! Every loop gives one condition `Σ bᵢ·(dhᵢ + vᵢ) = 0`. How the coefficients
//! `bᵢ` are chosen is a [`ConditionBuilder`] policy:
//!
//! * [`UnsignedConditions`] uses `+1` for every line of a loop, whatever the
//!   direction the line was measured in. This is the default.
//! * [`SignedConditions`] follows the loop and uses `−1` for lines that are
//!   traversed against their measured direction.
//!
//! The unsigned policy only closes loops whose lines all point the same way
//! around the loop.

use crate::adjust::kernel::{distance_weights, AdjustmentKernel, KernelParams};
use crate::adjust::parametric::{build_result, ParametricAdjuster, ParametricParams};
use crate::diagnostics::{AdjustmentDiagnostics, AdjustmentWarning};
use crate::error::AdjustmentError;
use crate::types::{AdjustmentResult, LevelingLine, MeasurementSummary};
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;
use std::time::Instant;

/// Policy producing the condition coefficients of one loop.
pub trait ConditionBuilder {
    /// One coefficient per entry of `loop_lines`, in the same order.
    fn coefficients(
        &self,
        observations: &[MeasurementSummary],
        loop_lines: &[usize],
    ) -> Result<Vec<f64>, AdjustmentError>;
}

/// All coefficients `+1`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsignedConditions;

impl ConditionBuilder for UnsignedConditions {
    fn coefficients(
        &self,
        _observations: &[MeasurementSummary],
        loop_lines: &[usize],
    ) -> Result<Vec<f64>, AdjustmentError> {
        Ok(vec![1.0; loop_lines.len()])
    }
}

/// `±1` depending on the traversal direction of each line.
///
/// Loop lines must be listed in traversal order. The direction of the first
/// line is taken from the point it shares with the second one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignedConditions;

impl ConditionBuilder for SignedConditions {
    fn coefficients(
        &self,
        observations: &[MeasurementSummary],
        loop_lines: &[usize],
    ) -> Result<Vec<f64>, AdjustmentError> {
        let Some((&first, rest)) = loop_lines.split_first() else {
            return Ok(Vec::new());
        };
        let first_obs = &observations[first];
        let (first_sign, mut current) = match rest.first() {
            Some(&next) => {
                let next_obs = &observations[next];
                let touches = |id: &str| next_obs.from_point == id || next_obs.to_point == id;
                if touches(first_obs.to_point.as_str()) {
                    (1.0, first_obs.to_point.as_str())
                } else {
                    (-1.0, first_obs.from_point.as_str())
                }
            }
            None => (1.0, first_obs.to_point.as_str()),
        };

        let mut signs = Vec::with_capacity(loop_lines.len());
        signs.push(first_sign);
        for &idx in rest {
            let obs = &observations[idx];
            if obs.from_point == current {
                signs.push(1.0);
                current = obs.to_point.as_str();
            } else if obs.to_point == current {
                signs.push(-1.0);
                current = obs.from_point.as_str();
            } else {
                return Err(AdjustmentError::invalid_network(format!(
                    "loop line {} ({}) does not continue from point {current}",
                    idx,
                    obs.key()
                )));
            }
        }
        Ok(signs)
    }
}

/// Loop-based adjuster; the condition policy is a type parameter.
#[derive(Clone, Debug, Default)]
pub struct ConditionalAdjuster<C = UnsignedConditions> {
    kernel: AdjustmentKernel,
    builder: C,
}

impl ConditionalAdjuster<UnsignedConditions> {
    pub fn new(params: KernelParams) -> Self {
        Self::with_builder(params, UnsignedConditions)
    }
}

impl<C: ConditionBuilder> ConditionalAdjuster<C> {
    pub fn with_builder(params: KernelParams, builder: C) -> Self {
        Self {
            kernel: AdjustmentKernel::new(params),
            builder,
        }
    }

    /// Adjusts `lines` subject to one closure condition per entry of `loops`
    /// (each a list of indices into `lines`).
    ///
    /// With `fixed_points` the corrected observations are re-adjusted
    /// parametrically to recover heights; otherwise `adjusted_heights` is
    /// empty.
    pub fn adjust_loops(
        &self,
        lines: &[LevelingLine],
        loops: &[Vec<usize>],
        fixed_points: Option<&BTreeMap<String, f64>>,
    ) -> Result<AdjustmentResult, AdjustmentError> {
        let observations: Vec<MeasurementSummary> =
            lines.iter().map(MeasurementSummary::from).collect();
        self.adjust_observations(&observations, loops, fixed_points)
    }

    pub fn adjust_observations(
        &self,
        observations: &[MeasurementSummary],
        loops: &[Vec<usize>],
        fixed_points: Option<&BTreeMap<String, f64>>,
    ) -> Result<AdjustmentResult, AdjustmentError> {
        let t0 = Instant::now();
        if loops.is_empty() {
            return Err(AdjustmentError::invalid_network("no loops provided"));
        }
        let (b, w) = self.condition_equations(observations, loops)?;
        let p = distance_weights(observations.iter().map(|obs| obs.distance));
        let solution = self.kernel.run_conditional_adjustment(&b, &w, &p)?;

        let residuals_m: Vec<f64> = solution.v.iter().copied().collect();
        let adjusted_heights = match fixed_points {
            Some(fixed) if !fixed.is_empty() => {
                let corrected: Vec<MeasurementSummary> = observations
                    .iter()
                    .zip(&residuals_m)
                    .map(|(obs, v)| {
                        let mut corrected = obs.clone();
                        corrected.height_diff += v;
                        corrected.adjusted_dh = Some(corrected.height_diff);
                        corrected.residual = Some(*v);
                        corrected
                    })
                    .collect();
                let params = ParametricParams {
                    check_stability: false,
                    ..Default::default()
                };
                ParametricAdjuster::new(params)
                    .adjust(&corrected, fixed, None)?
                    .adjusted_heights
            }
            _ => BTreeMap::new(),
        };

        let mut diagnostics = AdjustmentDiagnostics {
            converged: true,
            degrees_of_freedom: solution.degrees_of_freedom,
            vtpv: solution.vtpv,
            ..Default::default()
        };
        if let Some(info) = &solution.stability {
            diagnostics.extend_warnings(AdjustmentWarning::from_stability(
                info,
                self.kernel.params().condition_threshold,
            ));
        }
        diagnostics.stability = solution.stability;
        diagnostics.elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;

        let result = build_result(
            observations,
            &residuals_m,
            adjusted_heights,
            BTreeMap::new(),
            1,
            solution.sigma_0,
            true,
            diagnostics,
        );
        info!(
            "conditional adjustment done: {} loops, sigma_0={:.5} K={:.3}",
            loops.len(),
            result.mse_unit_weight,
            result.k_coefficient
        );
        Ok(result)
    }

    /// Condition matrix `B` and misclosure vector `w = B·dh`.
    pub fn condition_equations(
        &self,
        observations: &[MeasurementSummary],
        loops: &[Vec<usize>],
    ) -> Result<(DMatrix<f64>, DVector<f64>), AdjustmentError> {
        let n_obs = observations.len();
        let mut b = DMatrix::zeros(loops.len(), n_obs);
        let mut w = DVector::zeros(loops.len());
        for (row, loop_lines) in loops.iter().enumerate() {
            if let Some(&bad) = loop_lines.iter().find(|&&idx| idx >= n_obs) {
                return Err(AdjustmentError::invalid_network(format!(
                    "loop {row} references line {bad}, only {n_obs} lines available"
                )));
            }
            let coefficients = self.builder.coefficients(observations, loop_lines)?;
            for (&idx, coef) in loop_lines.iter().zip(coefficients) {
                b[(row, idx)] += coef;
                w[row] += coef * observations[idx].height_diff;
            }
            debug!("loop {row}: {} lines, w={:.4} m", loop_lines.len(), w[row]);
        }
        Ok((b, w))
    }
}
