use std::fmt;

/// Which end of a leveling line a check refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    End,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::End => f.write_str("end"),
        }
    }
}

/// Fatal conditions raised by the numerical kernel and the adjusters.
///
/// Every variant aborts the computation; no partial result is returned.
/// Non-fatal conditions are reported as
/// [`AdjustmentWarning`](crate::diagnostics::AdjustmentWarning)s instead.
#[derive(Clone, Debug, PartialEq)]
pub enum AdjustmentError {
    /// The normal-equation matrix has a (near) zero determinant or could not
    /// be solved or inverted.
    SingularMatrix { label: String, determinant: f64 },
    /// Not enough redundancy: observations ≤ unknowns (parametric) or
    /// conditions ≥ observations (conditional).
    InsufficientObservations { observations: usize, unknowns: usize },
    /// Matrix/vector shapes do not agree.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Weight matrix is singular and not diagonal.
    WeightMatrix { reason: String },
    /// Network cannot be adjusted as supplied (no fixed points, nothing left
    /// to adjust, bad loop references).
    InvalidNetwork { reason: String },
    /// Iteration cap reached while the largest correction was still above
    /// tolerance. Only raised when the caller asks for strict convergence.
    Convergence {
        iterations: usize,
        max_correction: f64,
    },
    /// A line endpoint does not match the benchmark supplied for it.
    EndpointMismatch {
        endpoint: Endpoint,
        line_point: String,
        benchmark_point: String,
    },
    /// Correction count differs from the setup count.
    CorrectionCount { expected: usize, found: usize },
    /// None of the runs connects the requested benchmark pair.
    NoMatchingRuns,
    /// The two lines do not run between the same points in opposite directions.
    NotADoubleRun { forward: String, backward: String },
}

impl AdjustmentError {
    pub(crate) fn invalid_network(reason: impl Into<String>) -> Self {
        AdjustmentError::InvalidNetwork {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AdjustmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustmentError::SingularMatrix { label, determinant } => write!(
                f,
                "{label} is singular (det={determinant:.2e}); equations are linearly dependent or under-constrained"
            ),
            AdjustmentError::InsufficientObservations {
                observations,
                unknowns,
            } => write!(
                f,
                "insufficient observations: {observations} observations for {unknowns} unknowns"
            ),
            AdjustmentError::DimensionMismatch {
                what,
                expected,
                found,
            } => write!(f, "dimension mismatch for {what}: expected {expected}, got {found}"),
            AdjustmentError::WeightMatrix { reason } => write!(f, "invalid weight matrix: {reason}"),
            AdjustmentError::InvalidNetwork { reason } => write!(f, "invalid network: {reason}"),
            AdjustmentError::Convergence {
                iterations,
                max_correction,
            } => write!(
                f,
                "no convergence after {iterations} iterations (max correction {max_correction:.3e} m)"
            ),
            AdjustmentError::EndpointMismatch {
                endpoint,
                line_point,
                benchmark_point,
            } => write!(
                f,
                "{endpoint} point mismatch: line has {line_point}, benchmark is {benchmark_point}"
            ),
            AdjustmentError::CorrectionCount { expected, found } => write!(
                f,
                "number of corrections ({found}) must match number of setups ({expected})"
            ),
            AdjustmentError::NoMatchingRuns => {
                write!(f, "no run connects the requested benchmark pair")
            }
            AdjustmentError::NotADoubleRun { forward, backward } => write!(
                f,
                "lines {forward} and {backward} do not form a double run"
            ),
        }
    }
}

impl std::error::Error for AdjustmentError {}
