//! Field checks of a leveling line against its accuracy class.
//!
//! Checks run in a fixed order and never stop early, so one report lists
//! every problem of the line:
//!
//! 1. end point is a named benchmark, not a numeric turning point;
//! 2. the file name does not swap the start and end points;
//! 3. setups are present and numerous enough;
//! 4. line length, sight distances, back/fore distance imbalance and
//!    measurement method are within the class limits.

use crate::classes::{AccuracyClass, ClassParameters, ClassTable, SightKind};
use crate::types::{LevelingLine, LineStatus};
use log::debug;
use serde::Serialize;

/// Numeric-only ids mark turning points.
pub fn is_turning_point(point_id: &str) -> bool {
    let id = point_id.trim();
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

/// Benchmark ids contain at least one letter.
pub fn is_benchmark(point_id: &str) -> bool {
    point_id.trim().chars().any(char::is_alphabetic)
}

/// Findings for one line.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    pub line: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub endpoint_valid: bool,
    pub naming_valid: bool,
    pub data_complete: bool,
    pub regulation_valid: bool,
}

impl ValidationReport {
    fn new(line: &str) -> Self {
        Self {
            line: line.to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
            endpoint_valid: true,
            naming_valid: true,
            data_complete: true,
            regulation_valid: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Counts over a batch of reports.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub endpoint_issues: usize,
    pub naming_issues: usize,
    pub incomplete: usize,
    pub regulation_issues: usize,
    pub pass_rate: f64,
}

impl ValidationSummary {
    pub fn from_reports(reports: &[ValidationReport]) -> Self {
        let total = reports.len();
        let valid = reports.iter().filter(|r| r.is_valid()).count();
        Self {
            total,
            valid,
            invalid: total - valid,
            endpoint_issues: reports.iter().filter(|r| !r.endpoint_valid).count(),
            naming_issues: reports.iter().filter(|r| !r.naming_valid).count(),
            incomplete: reports.iter().filter(|r| !r.data_complete).count(),
            regulation_issues: reports.iter().filter(|r| !r.regulation_valid).count(),
            pass_rate: if total > 0 {
                valid as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Validates lines against one class of a [`ClassTable`].
#[derive(Clone, Debug)]
pub struct LineValidator<'a> {
    table: &'a ClassTable,
    class: AccuracyClass,
    sight_kind: SightKind,
}

impl<'a> LineValidator<'a> {
    pub fn new(table: &'a ClassTable) -> Self {
        Self {
            table,
            class: table.default_class(),
            sight_kind: SightKind::Geometric,
        }
    }

    pub fn with_class(mut self, class: AccuracyClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_sight_kind(mut self, kind: SightKind) -> Self {
        self.sight_kind = kind;
        self
    }

    /// Validates `line`, updating its `status` and `validation_errors`.
    pub fn validate(&self, line: &mut LevelingLine) -> ValidationReport {
        let params = self.table.get(self.class);
        let mut report = ValidationReport::new(&line.filename);

        if let Some(status) = check_endpoint(line, &mut report) {
            line.status = status;
        }
        if let Some(status) = check_naming(line, &mut report) {
            line.status = status;
        }
        if let Some(status) = check_completeness(line, params, &mut report) {
            line.status = status;
        }
        self.check_regulations(line, params, &mut report);

        debug!(
            "validated {}: {} errors, {} warnings",
            line.filename,
            report.errors.len(),
            report.warnings.len()
        );
        line.validation_errors = report.errors.clone();
        report
    }

    pub fn validate_batch(&self, lines: &mut [LevelingLine]) -> Vec<ValidationReport> {
        lines.iter_mut().map(|line| self.validate(line)).collect()
    }

    fn check_regulations(
        &self,
        line: &LevelingLine,
        params: &ClassParameters,
        report: &mut ValidationReport,
    ) {
        let mut errors = Vec::new();
        let (distance, _) = line.effective_totals();
        if let Err(msg) = params.validate_line_length(distance / 1000.0) {
            errors.push(msg);
        }
        if let Err(msg) = params.validate_method(line.method) {
            errors.push(msg);
        }

        let mut cumulative = 0.0;
        for setup in line.used_setups() {
            for sight in [setup.distance_back, setup.distance_fore] {
                if let Err(msg) = params.validate_sight_distance(sight, self.sight_kind) {
                    errors.push(format!("setup {}: {msg}", setup.setup_number));
                }
            }
            let imbalance = setup.distance_back - setup.distance_fore;
            if imbalance.abs() > params.max_single_distance_imbalance_m {
                errors.push(format!(
                    "setup {}: back/fore distance imbalance {:.1} m exceeds {} m for {}",
                    setup.setup_number,
                    imbalance.abs(),
                    params.max_single_distance_imbalance_m,
                    params.class
                ));
            }
            cumulative += imbalance;
        }
        if cumulative.abs() > params.max_cumulative_distance_imbalance_m {
            errors.push(format!(
                "cumulative back/fore distance imbalance {:.1} m exceeds {} m for {}",
                cumulative.abs(),
                params.max_cumulative_distance_imbalance_m,
                params.class
            ));
        }

        if !errors.is_empty() {
            report.regulation_valid = false;
            report.errors.extend(errors);
        }
    }
}

fn check_endpoint(line: &LevelingLine, report: &mut ValidationReport) -> Option<LineStatus> {
    if line.end_point.trim().is_empty() {
        report.endpoint_valid = false;
        report.errors.push("no end point defined".to_string());
        return Some(LineStatus::InvalidEndpoint);
    }
    if is_turning_point(&line.end_point) {
        report.endpoint_valid = false;
        report.errors.push(format!(
            "end point '{}' is a turning point (numeric); a line must end on a named benchmark",
            line.end_point
        ));
        return Some(LineStatus::InvalidEndpoint);
    }
    if !is_benchmark(&line.end_point) {
        report.warnings.push(format!(
            "end point '{}' may not be a valid benchmark name",
            line.end_point
        ));
    }
    None
}

/// Detects a file name that lists the end point first and the start point last.
fn check_naming(line: &LevelingLine, report: &mut ValidationReport) -> Option<LineStatus> {
    let filename = line.filename.to_lowercase();
    let start = line.start_point.trim().to_lowercase();
    let end = line.end_point.trim().to_lowercase();
    if start.is_empty() || end.is_empty() {
        return None;
    }
    for sep in ["-", "_", " to "] {
        let parts: Vec<&str> = filename.split(sep).collect();
        if parts.len() < 2 {
            continue;
        }
        let file_start = parts[0].trim();
        let file_end = parts[parts.len() - 1]
            .trim()
            .split('.')
            .next()
            .unwrap_or_default();
        if file_end.contains(start.as_str()) && file_start.contains(end.as_str()) {
            report.naming_valid = false;
            report.errors.push(format!(
                "front-to-back naming error: file '{}' suggests {file_start} -> {file_end}, data shows {} -> {}",
                line.filename, line.start_point, line.end_point
            ));
            return Some(LineStatus::NamingError);
        }
    }
    None
}

fn check_completeness(
    line: &LevelingLine,
    params: &ClassParameters,
    report: &mut ValidationReport,
) -> Option<LineStatus> {
    if line.setups.is_empty() {
        report.data_complete = false;
        report.errors.push("no measurement setups found".to_string());
        return Some(LineStatus::Incomplete);
    }
    if line.setups.len() < params.min_setups {
        report.warnings.push(format!(
            "only {} setups found, minimum expected {}",
            line.setups.len(),
            params.min_setups
        ));
    }
    let missing = line.setups.iter().filter(|s| s.height_diff.is_none()).count();
    if missing > 0 {
        report
            .warnings
            .push(format!("{missing} setups missing height differences"));
    }
    None
}
