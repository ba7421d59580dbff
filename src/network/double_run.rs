//! Forward/return line pairs measured between the same two points.

use crate::classes::{AccuracyClass, AchievedClass, ClassTable};
use crate::error::AdjustmentError;
use crate::types::LevelingLine;
use serde::Serialize;

/// Pairs lines that run between the same endpoints in opposite directions.
///
/// Greedy in input order: each line joins at most one pair, and a line pairs
/// with the first unused reverse line after it.
pub fn detect_double_runs(lines: &[LevelingLine]) -> Vec<(usize, usize)> {
    let mut used = vec![false; lines.len()];
    let mut pairs = Vec::new();
    for i in 0..lines.len() {
        if used[i] {
            continue;
        }
        let partner = (i + 1..lines.len()).find(|&j| !used[j] && lines[i].reverses(&lines[j]));
        if let Some(j) = partner {
            used[i] = true;
            used[j] = true;
            pairs.push((i, j));
        }
    }
    pairs
}

/// Quality of a forward/return pair.
#[derive(Clone, Debug, Serialize)]
pub struct DoubleRunAnalysis {
    pub forward: String,
    pub backward: String,
    pub forward_dh: f64,
    pub return_dh: f64,
    /// `forward_dh + return_dh`, ideally zero (m).
    pub misclosure: f64,
    pub misclosure_mm: f64,
    /// `(forward_dh − return_dh) / 2` (m).
    pub mean_dh: f64,
    /// Sum of both line lengths (m).
    pub total_distance: f64,
    pub target_class: AccuracyClass,
    pub tolerance_mm: f64,
    pub within_tolerance: bool,
    pub achieved: AchievedClass,
}

impl DoubleRunAnalysis {
    /// Tightest class number 1..=6, or 0 when every tolerance is exceeded.
    pub fn tolerance_class(&self) -> u8 {
        self.achieved.number()
    }
}

/// Compares a forward run with its return run.
pub fn analyze_double_run(
    forward: &LevelingLine,
    backward: &LevelingLine,
    target_class: AccuracyClass,
    table: &ClassTable,
) -> Result<DoubleRunAnalysis, AdjustmentError> {
    if !forward.reverses(backward) {
        return Err(AdjustmentError::NotADoubleRun {
            forward: forward.filename.clone(),
            backward: backward.filename.clone(),
        });
    }
    let (forward_distance, forward_dh) = forward.effective_totals();
    let (return_distance, return_dh) = backward.effective_totals();
    let misclosure = forward_dh + return_dh;
    let misclosure_mm = misclosure * 1000.0;
    let total_distance = forward_distance + return_distance;
    let distance_km = total_distance / 1000.0;
    let tolerance_mm = table.tolerance_mm(target_class, distance_km);
    Ok(DoubleRunAnalysis {
        forward: forward.filename.clone(),
        backward: backward.filename.clone(),
        forward_dh,
        return_dh,
        misclosure,
        misclosure_mm,
        mean_dh: (forward_dh - return_dh) / 2.0,
        total_distance,
        target_class,
        tolerance_mm,
        within_tolerance: misclosure_mm.abs() <= tolerance_mm,
        achieved: table.classify(misclosure_mm, distance_km),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pairs_are_exclusive() {
        let lines = vec![
            LevelingLine::from_totals("1", "A", "B", 1.0, 500.0),
            LevelingLine::from_totals("2", "B", "A", -1.0, 500.0),
            LevelingLine::from_totals("3", "B", "A", -1.001, 500.0),
            LevelingLine::from_totals("4", "A", "B", 1.002, 500.0),
        ];
        assert_eq!(detect_double_runs(&lines), vec![(0, 1), (2, 3)]);
        assert_eq!(detect_double_runs(&lines[..3]), vec![(0, 1)]);
    }

    #[test]
    fn analysis_of_consistent_pair() {
        let table = ClassTable::default();
        let f = LevelingLine::from_totals("f", "A", "B", 1.2345, 1000.0);
        let b = LevelingLine::from_totals("b", "B", "A", -1.2331, 1000.0);
        let a = analyze_double_run(&f, &b, AccuracyClass::H1, &table).unwrap();
        assert_abs_diff_eq!(a.misclosure_mm, 1.4, epsilon = 1e-9);
        assert_abs_diff_eq!(a.mean_dh, 1.2338, epsilon = 1e-12);
        assert_abs_diff_eq!(a.tolerance_mm, 3.0 * 2f64.sqrt(), epsilon = 1e-12);
        assert!(a.within_tolerance);
        assert_eq!(a.tolerance_class(), 1);
    }

    #[test]
    fn lines_that_do_not_reverse_are_rejected() {
        let table = ClassTable::default();
        let f = LevelingLine::from_totals("f", "A", "B", 1.0, 1000.0);
        let g = LevelingLine::from_totals("g", "A", "B", 1.0, 1000.0);
        assert_eq!(
            analyze_double_run(&f, &g, AccuracyClass::H3, &table).unwrap_err(),
            AdjustmentError::NotADoubleRun {
                forward: "f".into(),
                backward: "g".into()
            }
        );
    }
}
