#![doc = include_str!("../README.md")]

// Public modules
pub mod adjust;
pub mod classes;
pub mod diagnostics;
pub mod error;
pub mod height;
pub mod network;
pub mod types;
pub mod validate;

// Configuration and file helpers used by the binary.
pub mod config;
pub mod io;

// --- High-level re-exports -------------------------------------------------

// Adjusters and their parameters.
pub use crate::adjust::{
    ConditionalAdjuster, KernelParams, LineAdjuster, ParametricAdjuster, ParametricParams,
};
pub use crate::classes::{AccuracyClass, AchievedClass, ClassParameters, ClassTable};
pub use crate::error::AdjustmentError;
pub use crate::types::{
    AdjustmentResult, Benchmark, LevelingLine, LineStatus, MeasurementMethod, MeasurementSummary,
    StationSetup,
};

// Diagnostics attached to results.
pub use crate::diagnostics::{AdjustmentDiagnostics, AdjustmentWarning, NetworkSummary};

// Topology.
pub use crate::network::{Loop, LoopAnalyzer, NetworkGraph};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for scripts and tests.
///
/// ```no_run
/// use leveling_adjust::prelude::*;
/// use std::collections::BTreeMap;
///
/// # fn main() -> Result<(), AdjustmentError> {
/// let observations = vec![
///     MeasurementSummary::new("A", "B", 10.5, 1000.0),
///     MeasurementSummary::new("B", "C", -5.123, 1500.0),
///     MeasurementSummary::new("A", "C", 5.4, 2000.0),
/// ];
/// let fixed = BTreeMap::from([("A".to_string(), 100.0)]);
///
/// let result = ParametricAdjuster::default().adjust(&observations, &fixed, None)?;
/// println!("B={:.4} sigma_0={:.5}", result.adjusted_heights["B"], result.mse_unit_weight);
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::{
        AccuracyClass, AdjustmentError, AdjustmentResult, Benchmark, ClassTable,
        ConditionalAdjuster, LevelingLine, LineAdjuster, LoopAnalyzer, MeasurementSummary,
        ParametricAdjuster, StationSetup,
    };
}
