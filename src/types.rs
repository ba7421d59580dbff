//! Value types shared by every stage of the engine.
//!
//! Parsers hand the engine [`LevelingLine`]s, adjusters consume
//! [`MeasurementSummary`] records, and exporters receive an
//! [`AdjustmentResult`]. Lengths are meters and height differences are
//! meters unless a field name says otherwise.

use crate::diagnostics::AdjustmentDiagnostics;
use crate::height;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Leveling measurement method of a line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementMethod {
    /// Backsight-foresight single run.
    #[default]
    #[serde(rename = "BF")]
    Bf,
    /// Back-fore-fore-back double run.
    #[serde(rename = "BFFB")]
    Bffb,
    /// Reversed single run.
    #[serde(rename = "FB")]
    Fb,
}

impl MeasurementMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementMethod::Bf => "BF",
            MeasurementMethod::Bffb => "BFFB",
            MeasurementMethod::Fb => "FB",
        }
    }

    /// Method after reversing the line direction. `BFFB` is symmetric.
    pub fn reversed(self) -> Self {
        match self {
            MeasurementMethod::Bf => MeasurementMethod::Fb,
            MeasurementMethod::Fb => MeasurementMethod::Bf,
            MeasurementMethod::Bffb => MeasurementMethod::Bffb,
        }
    }
}

impl fmt::Display for MeasurementMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a leveling line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    #[default]
    Valid,
    /// The line ends on a turning point instead of a benchmark.
    InvalidEndpoint,
    /// The file name disagrees with the recorded start/end points.
    NamingError,
    /// Missing setups or readings.
    Incomplete,
    ExceededTolerance,
}

/// One instrument station of a leveling run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationSetup {
    pub setup_number: u32,
    pub from_point: String,
    pub to_point: String,
    /// Backsight rod reading (m).
    pub backsight: f64,
    /// Foresight rod reading (m).
    pub foresight: f64,
    /// Horizontal distance to the backsight rod (m).
    pub distance_back: f64,
    /// Horizontal distance to the foresight rod (m).
    pub distance_fore: f64,
    #[serde(default)]
    pub temperature: Option<f64>,
    /// `backsight - foresight`, unless a correction pass changed it.
    #[serde(default)]
    pub height_diff: Option<f64>,
    /// Running height relative to the line start, set by correction passes.
    #[serde(default)]
    pub cumulative_height: Option<f64>,
    #[serde(default = "default_true")]
    pub is_used: bool,
}

fn default_true() -> bool {
    true
}

impl StationSetup {
    /// Creates a setup and derives its height difference from the readings.
    pub fn new(
        setup_number: u32,
        from_point: impl Into<String>,
        to_point: impl Into<String>,
        backsight: f64,
        foresight: f64,
        distance_back: f64,
        distance_fore: f64,
    ) -> Self {
        Self {
            setup_number,
            from_point: from_point.into(),
            to_point: to_point.into(),
            backsight,
            foresight,
            distance_back,
            distance_fore,
            temperature: None,
            height_diff: Some(height::height_diff(backsight, foresight)),
            cumulative_height: None,
            is_used: true,
        }
    }

    /// Mean of the back and fore sight distances (m).
    #[inline]
    pub fn average_distance(&self) -> f64 {
        0.5 * (self.distance_back + self.distance_fore)
    }

    /// Stored height difference, falling back to the rod readings.
    #[inline]
    pub fn effective_height_diff(&self) -> f64 {
        self.height_diff
            .unwrap_or_else(|| height::height_diff(self.backsight, self.foresight))
    }
}

/// Ordered sequence of setups between a start and an end point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelingLine {
    pub filename: String,
    pub start_point: String,
    pub end_point: String,
    #[serde(default)]
    pub setups: Vec<StationSetup>,
    #[serde(default)]
    pub method: MeasurementMethod,
    #[serde(default)]
    pub instrument_id: Option<String>,
    /// Total line distance (m).
    #[serde(default)]
    pub total_distance: f64,
    /// Total height difference (m).
    #[serde(default)]
    pub total_height_diff: f64,
    #[serde(default)]
    pub misclosure: Option<f64>,
    #[serde(default)]
    pub status: LineStatus,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default = "default_true")]
    pub is_used: bool,
}

impl LevelingLine {
    pub fn new(
        filename: impl Into<String>,
        start_point: impl Into<String>,
        end_point: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            start_point: start_point.into(),
            end_point: end_point.into(),
            setups: Vec::new(),
            method: MeasurementMethod::Bf,
            instrument_id: None,
            total_distance: 0.0,
            total_height_diff: 0.0,
            misclosure: None,
            status: LineStatus::Valid,
            validation_errors: Vec::new(),
            is_used: true,
        }
    }

    /// Builds a line from its setups and derives the totals.
    pub fn with_setups(
        filename: impl Into<String>,
        start_point: impl Into<String>,
        end_point: impl Into<String>,
        setups: Vec<StationSetup>,
    ) -> Self {
        let mut line = Self::new(filename, start_point, end_point);
        line.setups = setups;
        line.calculate_totals();
        line
    }

    /// A line known only by its totals, as produced by summary files.
    pub fn from_totals(
        filename: impl Into<String>,
        start_point: impl Into<String>,
        end_point: impl Into<String>,
        total_height_diff: f64,
        total_distance: f64,
    ) -> Self {
        let mut line = Self::new(filename, start_point, end_point);
        line.total_height_diff = total_height_diff;
        line.total_distance = total_distance;
        line
    }

    #[inline]
    pub fn num_setups(&self) -> usize {
        self.setups.len()
    }

    #[inline]
    pub fn distance_km(&self) -> f64 {
        self.total_distance / 1000.0
    }

    /// Re-derives `total_distance` and `total_height_diff` from the setups.
    pub fn calculate_totals(&mut self) {
        let (distance, dh) = height::line_totals(self);
        self.total_distance = distance;
        self.total_height_diff = dh;
    }

    fn totals_missing(&self) -> bool {
        !self.setups.is_empty() && self.total_distance == 0.0 && self.total_height_diff == 0.0
    }

    /// Derives the totals when a parser left them at zero.
    pub fn ensure_totals(&mut self) {
        if self.totals_missing() {
            self.calculate_totals();
        }
    }

    /// `(total_distance, total_height_diff)`, derived from the setups when a
    /// parser left both at zero.
    pub fn effective_totals(&self) -> (f64, f64) {
        if self.totals_missing() {
            height::line_totals(self)
        } else {
            (self.total_distance, self.total_height_diff)
        }
    }

    /// Reverses the line in place. Applying it twice is the identity.
    ///
    /// Back and fore readings trade places, so setups without a stored
    /// height difference flip sign as well.
    pub fn toggle_direction(&mut self) {
        std::mem::swap(&mut self.start_point, &mut self.end_point);
        self.method = self.method.reversed();
        for setup in &mut self.setups {
            if let Some(dh) = setup.height_diff.as_mut() {
                *dh = -*dh;
            }
            std::mem::swap(&mut setup.from_point, &mut setup.to_point);
            std::mem::swap(&mut setup.backsight, &mut setup.foresight);
            std::mem::swap(&mut setup.distance_back, &mut setup.distance_fore);
        }
        self.total_height_diff = -self.total_height_diff;
    }

    pub fn used_setups(&self) -> impl Iterator<Item = &StationSetup> {
        self.setups.iter().filter(|s| s.is_used)
    }

    /// True when `other` runs between the same endpoints in the opposite direction.
    pub fn reverses(&self, other: &LevelingLine) -> bool {
        self.start_point == other.end_point && self.end_point == other.start_point
    }
}

/// Control point with a known height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub point_id: String,
    /// Height (m).
    pub height: f64,
    /// Control order (1 = highest precision).
    #[serde(default = "default_order")]
    pub order: u8,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub easting: Option<f64>,
    #[serde(default)]
    pub northing: Option<f64>,
}

fn default_order() -> u8 {
    3
}

impl Benchmark {
    pub fn new(point_id: impl Into<String>, height: f64) -> Self {
        Self {
            point_id: point_id.into(),
            height,
            order: default_order(),
            description: None,
            easting: None,
            northing: None,
        }
    }
}

/// Flattened observation consumed by the network adjusters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSummary {
    pub from_point: String,
    pub to_point: String,
    /// Observed height difference (m).
    pub height_diff: f64,
    /// Line length (m).
    pub distance: f64,
    #[serde(default)]
    pub num_setups: usize,
    /// Forward/backward discrepancy (mm).
    #[serde(default)]
    pub bf_diff: f64,
    /// Survey period in `MMYY` form.
    #[serde(default)]
    pub year_month: String,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub residual: Option<f64>,
    #[serde(default)]
    pub adjusted_dh: Option<f64>,
    #[serde(default = "default_true")]
    pub is_used: bool,
}

impl MeasurementSummary {
    /// Bare observation between two points.
    pub fn new(
        from_point: impl Into<String>,
        to_point: impl Into<String>,
        height_diff: f64,
        distance: f64,
    ) -> Self {
        Self {
            from_point: from_point.into(),
            to_point: to_point.into(),
            height_diff,
            distance,
            num_setups: 0,
            bf_diff: 0.0,
            year_month: String::new(),
            source_file: String::new(),
            residual: None,
            adjusted_dh: None,
            is_used: true,
        }
    }

    /// Summary record of a line with its provenance.
    pub fn from_line(line: &LevelingLine, bf_diff_mm: f64, year_month: &str) -> Self {
        let (distance, height_diff) = line.effective_totals();
        Self {
            from_point: line.start_point.clone(),
            to_point: line.end_point.clone(),
            height_diff,
            distance,
            num_setups: line.num_setups(),
            bf_diff: bf_diff_mm,
            year_month: year_month.to_string(),
            source_file: line.filename.clone(),
            residual: None,
            adjusted_dh: None,
            is_used: line.is_used,
        }
    }

    /// Key used for the residual map of an adjustment.
    pub fn key(&self) -> String {
        format!("{}-{}", self.from_point, self.to_point)
    }

    #[inline]
    pub fn distance_km(&self) -> f64 {
        self.distance / 1000.0
    }
}

impl From<&LevelingLine> for MeasurementSummary {
    fn from(line: &LevelingLine) -> Self {
        MeasurementSummary::from_line(line, 0.0, "")
    }
}

/// Outcome of one adjustment run. Produced once, never mutated afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct AdjustmentResult {
    /// Iterations used (1 for the non-iterative conditional method).
    pub iteration: usize,
    /// Standard error of unit weight (σ₀).
    pub mse_unit_weight: f64,
    /// Point id → adjusted height (m). Fixed points keep their input height.
    pub adjusted_heights: BTreeMap<String, f64>,
    /// Observation key → residual (mm).
    pub residuals: BTreeMap<String, f64>,
    /// Point id → standard error of the adjusted height (m).
    pub mse_heights: BTreeMap<String, f64>,
    pub total_distance_km: f64,
    /// Σ|residual| (mm).
    pub total_diff_mm: f64,
    /// Classification coefficient `Σ|v_mm| / √Σd_km`.
    pub k_coefficient: f64,
    /// False when the iteration cap was hit before the corrections settled.
    pub converged: bool,
    pub diagnostics: AdjustmentDiagnostics,
}

impl AdjustmentResult {
    pub fn height(&self, point_id: &str) -> Option<f64> {
        self.adjusted_heights.get(point_id).copied()
    }

    pub fn residual_mm(&self, key: &str) -> Option<f64> {
        self.residuals.get(key).copied()
    }
}

/// Residual keys for a list of observations; repeated keys get a `#n` suffix.
pub(crate) fn residual_keys<'a, I>(observations: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a MeasurementSummary>,
{
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    observations
        .into_iter()
        .map(|obs| {
            let base = obs.key();
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}#{count}")
            }
        })
        .collect()
}
