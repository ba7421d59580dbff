//! Normal-equation kernel shared by the parametric and conditional methods.
//!
//! Parametric (observation equations):
//!
//! ```text
//! V = A·X − L,   N = AᵀPA,   U = AᵀPL,   N·X = U,   Qxx = N⁻¹
//! ```
//!
//! Conditional (condition equations):
//!
//! ```text
//! B·v + w = 0,   N = B·P⁻¹·Bᵀ,   N·k = −w,   v = P⁻¹·Bᵀ·k
//! ```
//!
//! With `N·k = −w` the correction carries no leading minus: `v = −P⁻¹·Bᵀ·k`
//! would pair with `N·k = w`. See DESIGN.md, "Condition sign".
//!
//! Both report σ₀² = vᵀPv / redundancy. Before solving, the normal matrix can
//! be screened by [`AdjustmentKernel::check_matrix_stability`]: a determinant
//! below [`SINGULAR_DETERMINANT`] aborts, a large condition number only warns.

use crate::diagnostics::StabilityInfo;
use crate::error::AdjustmentError;
use log::{debug, error, info, warn};
use nalgebra::{DMatrix, DVector};

/// `|det(N)|` below this is treated as singular.
pub const SINGULAR_DETERMINANT: f64 = 1e-15;

/// Default condition-number threshold for the ill-conditioning warning.
pub const DEFAULT_CONDITION_THRESHOLD: f64 = 1e10;

/// Kernel knobs.
#[derive(Clone, Debug)]
pub struct KernelParams {
    /// Condition number above which a matrix is reported ill-conditioned.
    pub condition_threshold: f64,
    /// Run the stability screen on every normal matrix.
    pub check_stability: bool,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            condition_threshold: DEFAULT_CONDITION_THRESHOLD,
            check_stability: true,
        }
    }
}

/// Output of [`AdjustmentKernel::run_linear_adjustment`].
#[derive(Clone, Debug)]
pub struct LinearSolution {
    /// Parameter corrections.
    pub x: DVector<f64>,
    /// Residuals `A·X − L`.
    pub v: DVector<f64>,
    pub n: DMatrix<f64>,
    /// Cofactor matrix `N⁻¹`.
    pub qxx: DMatrix<f64>,
    pub sigma_0: f64,
    pub sigma_0_squared: f64,
    /// `σ₀·√diag(Qxx)`.
    pub std_errors: DVector<f64>,
    pub vtpv: f64,
    pub degrees_of_freedom: usize,
    pub stability: Option<StabilityInfo>,
}

/// Output of [`AdjustmentKernel::run_conditional_adjustment`].
#[derive(Clone, Debug)]
pub struct ConditionalSolution {
    /// Correlates (Lagrange multipliers).
    pub k: DVector<f64>,
    /// Observation residuals; satisfy `B·v + w = 0`.
    pub v: DVector<f64>,
    pub n: DMatrix<f64>,
    pub sigma_0: f64,
    pub sigma_0_squared: f64,
    pub vtpv: f64,
    pub degrees_of_freedom: usize,
    pub stability: Option<StabilityInfo>,
}

/// Stateless solver configured by [`KernelParams`].
#[derive(Clone, Debug, Default)]
pub struct AdjustmentKernel {
    params: KernelParams,
}

impl AdjustmentKernel {
    pub fn new(params: KernelParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    /// Screens a matrix for singularity, conditioning and rank.
    ///
    /// Non-square input short-circuits with `is_square = false`. A singular
    /// matrix is an error; ill-conditioning and rank deficiency are only
    /// flagged in the returned report.
    pub fn check_matrix_stability(
        &self,
        m: &DMatrix<f64>,
        label: &str,
    ) -> Result<StabilityInfo, AdjustmentError> {
        let (rows, cols) = m.shape();
        let mut info = StabilityInfo {
            label: label.to_string(),
            rows,
            cols,
            ..Default::default()
        };
        if rows != cols {
            warn!("{label} is not square: {rows}x{cols}");
            return Ok(info);
        }
        info.is_square = true;
        if rows == 0 {
            info.is_singular = true;
            return Err(AdjustmentError::SingularMatrix {
                label: label.to_string(),
                determinant: 0.0,
            });
        }

        let det = m.clone().lu().determinant();
        info.determinant = det;
        if !det.is_finite() || det.abs() < SINGULAR_DETERMINANT {
            info.is_singular = true;
            error!("{label} is singular (det={det:.2e})");
            return Err(AdjustmentError::SingularMatrix {
                label: label.to_string(),
                determinant: det,
            });
        }

        let sv = m.clone().svd(false, false).singular_values;
        let s_max = sv.max();
        let s_min = sv.min();
        info.condition_number = if s_min > 0.0 {
            s_max / s_min
        } else {
            f64::INFINITY
        };
        if info.condition_number > self.params.condition_threshold {
            info.is_ill_conditioned = true;
            warn!(
                "{label} is ill-conditioned with condition number {:.2e}; results may be numerically unstable",
                info.condition_number
            );
        }

        let rank_tol = s_max * rows.max(cols) as f64 * f64::EPSILON;
        info.rank = sv.iter().filter(|&&s| s > rank_tol).count();
        if info.rank < rows {
            warn!("{label} is rank deficient: rank={}, size={rows}", info.rank);
        }

        debug!(
            "{label} stability: shape={rows}x{cols} det={det:.2e} cond={:.2e} rank={}",
            info.condition_number, info.rank
        );
        Ok(info)
    }

    /// Solves the parametric normal equations `AᵀPA·X = AᵀPL`.
    pub fn run_linear_adjustment(
        &self,
        a: &DMatrix<f64>,
        l: &DVector<f64>,
        p: &DMatrix<f64>,
    ) -> Result<LinearSolution, AdjustmentError> {
        let (n_obs, n_unknowns) = a.shape();
        if l.len() != n_obs {
            return Err(AdjustmentError::DimensionMismatch {
                what: "observation vector L",
                expected: n_obs,
                found: l.len(),
            });
        }
        check_weight_shape(p, n_obs)?;
        if n_obs <= n_unknowns {
            return Err(AdjustmentError::InsufficientObservations {
                observations: n_obs,
                unknowns: n_unknowns,
            });
        }
        let dof = n_obs - n_unknowns;
        debug!("linear adjustment: {n_obs} obs, {n_unknowns} unknowns, {dof} dof");

        let at_p = a.transpose() * p;
        let n = &at_p * a;
        let u = &at_p * l;

        let label = "normal matrix N";
        let stability = if self.params.check_stability {
            Some(self.check_matrix_stability(&n, label)?)
        } else {
            None
        };

        let lu = n.clone().lu();
        let x = lu
            .solve(&u)
            .filter(|x| x.iter().all(|v| v.is_finite()))
            .ok_or_else(|| singular(label, &lu))?;
        let qxx = lu.try_inverse().ok_or_else(|| singular(label, &lu))?;

        let v = a * &x - l;
        let vtpv = quadratic_form(&v, p);
        let sigma_0_squared = vtpv / dof as f64;
        let sigma_0 = sigma_0_squared.max(0.0).sqrt();
        let std_errors = qxx.diagonal().map(|q| sigma_0 * q.max(0.0).sqrt());

        debug!(
            "linear adjustment done: sigma_0={sigma_0:.4} max|v|={:.4}",
            v.amax()
        );
        Ok(LinearSolution {
            x,
            v,
            n,
            qxx,
            sigma_0,
            sigma_0_squared,
            std_errors,
            vtpv,
            degrees_of_freedom: dof,
            stability,
        })
    }

    /// Solves the condition equations `B·v + w = 0` for correlates and residuals.
    pub fn run_conditional_adjustment(
        &self,
        b: &DMatrix<f64>,
        w: &DVector<f64>,
        p: &DMatrix<f64>,
    ) -> Result<ConditionalSolution, AdjustmentError> {
        let (n_conditions, n_obs) = b.shape();
        if w.len() != n_conditions {
            return Err(AdjustmentError::DimensionMismatch {
                what: "misclosure vector w",
                expected: n_conditions,
                found: w.len(),
            });
        }
        check_weight_shape(p, n_obs)?;
        if n_conditions >= n_obs {
            return Err(AdjustmentError::InsufficientObservations {
                observations: n_obs,
                unknowns: n_conditions,
            });
        }
        let dof = n_obs - n_conditions;
        info!("conditional adjustment: {n_obs} obs, {n_conditions} conditions, {dof} dof");

        let p_inv = invert_weights(p)?;
        let p_inv_bt = &p_inv * b.transpose();
        let n = b * &p_inv_bt;
        let u = -w;

        let label = "normal matrix N (conditional)";
        let stability = if self.params.check_stability {
            Some(self.check_matrix_stability(&n, label)?)
        } else {
            None
        };

        let lu = n.clone().lu();
        let k = lu
            .solve(&u)
            .filter(|k| k.iter().all(|v| v.is_finite()))
            .ok_or_else(|| singular(label, &lu))?;
        let v = &p_inv_bt * &k;
        let vtpv = quadratic_form(&v, p);
        let sigma_0_squared = vtpv / dof as f64;
        let sigma_0 = sigma_0_squared.max(0.0).sqrt();

        debug!(
            "conditional adjustment done: sigma_0={sigma_0:.4} max|v|={:.4}",
            v.amax()
        );
        Ok(ConditionalSolution {
            k,
            v,
            n,
            sigma_0,
            sigma_0_squared,
            vtpv,
            degrees_of_freedom: dof,
            stability,
        })
    }
}

/// Diagonal weight matrix `P[i,i] = 1/d_km`, or 1 for zero-length observations.
pub fn distance_weights<I>(distances_m: I) -> DMatrix<f64>
where
    I: IntoIterator<Item = f64>,
{
    let diag: Vec<f64> = distances_m
        .into_iter()
        .map(|d| {
            let km = d / 1000.0;
            if km > 0.0 {
                1.0 / km
            } else {
                1.0
            }
        })
        .collect();
    DMatrix::from_diagonal(&DVector::from_vec(diag))
}

/// `P⁻¹`, falling back to a diagonal inverse when `P` is singular but diagonal.
///
/// Zero diagonal entries stay zero in the fallback (pseudo-inverse), so the
/// matching observations receive no correction.
fn invert_weights(p: &DMatrix<f64>) -> Result<DMatrix<f64>, AdjustmentError> {
    if let Some(inv) = p.clone().try_inverse() {
        return Ok(inv);
    }
    if !is_diagonal(p) {
        return Err(AdjustmentError::WeightMatrix {
            reason: "weight matrix P is singular and non-diagonal".to_string(),
        });
    }
    warn!("weight matrix P is singular; using the diagonal pseudo-inverse");
    let diag = p.diagonal().map(|d| if d != 0.0 { 1.0 / d } else { 0.0 });
    Ok(DMatrix::from_diagonal(&diag))
}

fn is_diagonal(m: &DMatrix<f64>) -> bool {
    m.is_square() && *m == DMatrix::from_diagonal(&m.diagonal())
}

fn check_weight_shape(p: &DMatrix<f64>, n_obs: usize) -> Result<(), AdjustmentError> {
    if p.nrows() != n_obs {
        return Err(AdjustmentError::DimensionMismatch {
            what: "weight matrix P rows",
            expected: n_obs,
            found: p.nrows(),
        });
    }
    if p.ncols() != n_obs {
        return Err(AdjustmentError::DimensionMismatch {
            what: "weight matrix P columns",
            expected: n_obs,
            found: p.ncols(),
        });
    }
    Ok(())
}

fn quadratic_form(v: &DVector<f64>, p: &DMatrix<f64>) -> f64 {
    v.dot(&(p * v))
}

fn singular(
    label: &str,
    lu: &nalgebra::LU<f64, nalgebra::Dyn, nalgebra::Dyn>,
) -> AdjustmentError {
    let determinant = lu.determinant();
    error!("failed to solve {label} (det={determinant:.2e})");
    AdjustmentError::SingularMatrix {
        label: label.to_string(),
        determinant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn non_square_matrix_short_circuits() {
        let kernel = AdjustmentKernel::default();
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let info = kernel.check_matrix_stability(&m, "B").unwrap();
        assert!(!info.is_square);
        assert_eq!(info.rank, 0);
    }

    #[test]
    fn singular_matrix_is_fatal() {
        let kernel = AdjustmentKernel::default();
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(
            kernel.check_matrix_stability(&m, "N"),
            Err(AdjustmentError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn ill_conditioning_only_warns() {
        let kernel = AdjustmentKernel::default();
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1e-12]);
        let info = kernel.check_matrix_stability(&m, "N").unwrap();
        assert!(info.is_ill_conditioned);
        assert!(!info.is_singular);
        assert_eq!(info.rank, 2);
        assert_abs_diff_eq!(info.condition_number, 1e12, epsilon = 1.0);
    }

    #[test]
    fn linear_adjustment_of_repeated_measurement() {
        let kernel = AdjustmentKernel::default();
        let a = DMatrix::from_element(3, 1, 1.0);
        let l = DVector::from_vec(vec![1.0, 1.1, 0.9]);
        let p = DMatrix::identity(3, 3);
        let sol = kernel.run_linear_adjustment(&a, &l, &p).unwrap();
        assert_abs_diff_eq!(sol.x[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sol.v[1], -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(sol.sigma_0, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(sol.qxx[(0, 0)], 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sol.std_errors[0], 0.1 / 3f64.sqrt(), epsilon = 1e-12);
        assert_eq!(sol.degrees_of_freedom, 2);
        assert!(sol.stability.is_some());
    }

    #[test]
    fn linear_adjustment_rejects_bad_shapes() {
        let kernel = AdjustmentKernel::default();
        let a = DMatrix::from_element(2, 2, 1.0);
        let l = DVector::zeros(2);
        let p = DMatrix::identity(2, 2);
        assert_eq!(
            kernel.run_linear_adjustment(&a, &l, &p).unwrap_err(),
            AdjustmentError::InsufficientObservations {
                observations: 2,
                unknowns: 2
            }
        );

        let a = DMatrix::from_element(3, 1, 1.0);
        let l = DVector::zeros(2);
        let p = DMatrix::identity(3, 3);
        assert!(matches!(
            kernel.run_linear_adjustment(&a, &l, &p),
            Err(AdjustmentError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn conditional_residuals_close_the_condition() {
        let kernel = AdjustmentKernel::default();
        let b = DMatrix::from_row_slice(1, 3, &[1.0, 1.0, 1.0]);
        let w = DVector::from_vec(vec![0.006]);
        let p = DMatrix::identity(3, 3);
        let sol = kernel.run_conditional_adjustment(&b, &w, &p).unwrap();
        for i in 0..3 {
            assert_abs_diff_eq!(sol.v[i], -0.002, epsilon = 1e-12);
        }
        assert_abs_diff_eq!((&b * &sol.v + &w)[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sol.sigma_0_squared, 6e-6, epsilon = 1e-15);
    }

    #[test]
    fn conditional_needs_redundancy() {
        let kernel = AdjustmentKernel::default();
        let b = DMatrix::identity(2, 2);
        let w = DVector::zeros(2);
        let p = DMatrix::identity(2, 2);
        assert!(matches!(
            kernel.run_conditional_adjustment(&b, &w, &p),
            Err(AdjustmentError::InsufficientObservations { .. })
        ));
    }

    #[test]
    fn weight_matrix_fallbacks() {
        let kernel = AdjustmentKernel::default();
        let b = DMatrix::from_row_slice(1, 3, &[1.0, 1.0, 1.0]);
        let w = DVector::from_vec(vec![0.003]);

        let p = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(matches!(
            kernel.run_conditional_adjustment(&b, &w, &p),
            Err(AdjustmentError::WeightMatrix { .. })
        ));

        let p = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.0, 2.0]));
        let sol = kernel.run_conditional_adjustment(&b, &w, &p).unwrap();
        assert_abs_diff_eq!(sol.v[1], 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!((&b * &sol.v + &w)[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn diagonal_detection() {
        assert!(is_diagonal(&DMatrix::identity(3, 3)));
        assert!(is_diagonal(&DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 0.0]))));
        let mut m = DMatrix::<f64>::identity(3, 3);
        m[(2, 0)] = 1e-9;
        assert!(!is_diagonal(&m));
        assert!(!is_diagonal(&DMatrix::zeros(2, 3)));
    }

    #[test]
    fn weights_are_inverse_kilometers() {
        let p = distance_weights([500.0, 0.0, 2000.0]);
        assert_abs_diff_eq!(p[(0, 0)], 2.0);
        assert_abs_diff_eq!(p[(1, 1)], 1.0);
        assert_abs_diff_eq!(p[(2, 2)], 0.5);
        assert_abs_diff_eq!(p[(0, 2)], 0.0);
    }
}
