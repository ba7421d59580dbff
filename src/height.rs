//! Height-difference arithmetic for single leveling lines.
//!
//! Pure functions except [`apply_corrections`], which rewrites the setups of
//! the line it is given. Clone the line first if the original is needed.

use crate::classes::{AccuracyClass, ClassTable};
use crate::error::AdjustmentError;
use crate::types::LevelingLine;
use serde::{Deserialize, Serialize};

/// How a misclosure is spread over the setups of a line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMethod {
    /// Same correction for every setup.
    Equal,
    /// Correction proportional to the setup's mean sight distance.
    #[default]
    Proportional,
}

/// `backsight − foresight`; positive when the foresight point is higher.
#[inline]
pub fn height_diff(backsight: f64, foresight: f64) -> f64 {
    backsight - foresight
}

/// `(total_distance, total_height_diff)` summed over the setups.
pub fn line_totals(line: &LevelingLine) -> (f64, f64) {
    line.setups.iter().fold((0.0, 0.0), |(dist, dh), setup| {
        (
            dist + setup.average_distance(),
            dh + setup.effective_height_diff(),
        )
    })
}

/// `computed_dh − (end_height − start_height)`.
#[inline]
pub fn misclosure(computed_dh: f64, start_height: f64, end_height: f64) -> f64 {
    computed_dh - (end_height - start_height)
}

/// Allowable misclosure (mm) for a line of `distance_m` meters.
pub fn allowable_misclosure(distance_m: f64, class: AccuracyClass, table: &ClassTable) -> f64 {
    table.allowable_misclosure_mm(distance_m, class)
}

/// One correction per setup that together remove `misclosure` (m).
///
/// Both methods sum to `-misclosure`. A line with zero total distance gets
/// all-zero corrections under [`DistributionMethod::Proportional`].
pub fn distribute_misclosure(
    line: &LevelingLine,
    misclosure: f64,
    method: DistributionMethod,
) -> Vec<f64> {
    let n = line.setups.len();
    if n == 0 {
        return Vec::new();
    }
    match method {
        DistributionMethod::Equal => vec![-misclosure / n as f64; n],
        DistributionMethod::Proportional => {
            let total: f64 = line.setups.iter().map(|s| s.average_distance()).sum();
            if total == 0.0 {
                return vec![0.0; n];
            }
            line.setups
                .iter()
                .map(|s| -misclosure * (s.average_distance() / total))
                .collect()
        }
    }
}

/// Adds `corrections` to the setup height differences, rebuilds the running
/// heights and resets `total_height_diff` to the corrected sum.
pub fn apply_corrections(
    line: &mut LevelingLine,
    corrections: &[f64],
) -> Result<(), AdjustmentError> {
    if corrections.len() != line.setups.len() {
        return Err(AdjustmentError::CorrectionCount {
            expected: line.setups.len(),
            found: corrections.len(),
        });
    }
    let mut cumulative = 0.0;
    for (setup, correction) in line.setups.iter_mut().zip(corrections) {
        let dh = setup.effective_height_diff() + correction;
        setup.height_diff = Some(dh);
        cumulative += dh;
        setup.cumulative_height = Some(cumulative);
    }
    line.total_height_diff = cumulative;
    Ok(())
}

/// Forward/backward agreement: `(is_consistent, |forward + backward| mm)`.
///
/// Without a tolerance the pair is always reported consistent.
pub fn check_bf_consistency(
    forward_dh: f64,
    backward_dh: f64,
    tolerance_mm: Option<f64>,
) -> (bool, f64) {
    let diff_mm = ((forward_dh + backward_dh) * 1000.0).abs();
    match tolerance_mm {
        Some(tol) => (diff_mm <= tol, diff_mm),
        None => (true, diff_mm),
    }
}

/// Mean height difference of a forward/backward pair and their signed
/// discrepancy in mm: `((f − b) / 2, (f + b) · 1000)`.
pub fn merge_bf_measurements(forward: &LevelingLine, backward: &LevelingLine) -> (f64, f64) {
    let f = forward.total_height_diff;
    let b = backward.total_height_diff;
    ((f - b) / 2.0, (f + b) * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StationSetup;
    use approx::assert_abs_diff_eq;

    fn line() -> LevelingLine {
        LevelingLine::with_setups(
            "A-B",
            "A",
            "B",
            vec![
                StationSetup::new(1, "A", "1", 1.800, 1.200, 40.0, 40.0),
                StationSetup::new(2, "1", "2", 1.300, 1.100, 20.0, 22.0),
                StationSetup::new(3, "2", "B", 0.900, 1.400, 35.0, 33.0),
            ],
        )
    }

    #[test]
    fn misclosure_sign_convention() {
        assert_abs_diff_eq!(misclosure(1.005, 100.0, 101.0), 0.005, epsilon = 1e-12);
        assert_abs_diff_eq!(height_diff(1.5, 1.2), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn line_totals_fall_back_to_readings() {
        let mut l = line();
        l.setups[1].height_diff = None;
        let (dist, dh) = line_totals(&l);
        assert_abs_diff_eq!(dist, 40.0 + 21.0 + 34.0, epsilon = 1e-12);
        assert_abs_diff_eq!(dh, 0.6 + 0.2 - 0.5, epsilon = 1e-12);
    }

    #[test]
    fn proportional_distribution_sums_to_negated_misclosure() {
        let l = line();
        for m in [0.012, -0.0031, 1.0e-4] {
            let c = distribute_misclosure(&l, m, DistributionMethod::Proportional);
            assert_eq!(c.len(), 3);
            assert_abs_diff_eq!(c.iter().sum::<f64>(), -m, epsilon = 1e-9);
            assert!(c[0].abs() > c[1].abs());
        }
    }

    #[test]
    fn equal_distribution_and_zero_distance() {
        let mut l = line();
        let c = distribute_misclosure(&l, 0.009, DistributionMethod::Equal);
        assert!(c.iter().all(|v| (*v + 0.003).abs() < 1e-12));

        for s in &mut l.setups {
            s.distance_back = 0.0;
            s.distance_fore = 0.0;
        }
        let c = distribute_misclosure(&l, 0.009, DistributionMethod::Proportional);
        assert_eq!(c, vec![0.0; 3]);
    }

    #[test]
    fn apply_corrections_updates_running_heights() {
        let mut l = line();
        let before = l.total_height_diff;
        let c = distribute_misclosure(&l, 0.006, DistributionMethod::Proportional);
        apply_corrections(&mut l, &c).unwrap();
        assert_abs_diff_eq!(l.total_height_diff, before - 0.006, epsilon = 1e-12);
        assert_abs_diff_eq!(
            l.setups[2].cumulative_height.unwrap(),
            l.total_height_diff,
            epsilon = 1e-12
        );

        let err = apply_corrections(&mut l, &[0.0]).unwrap_err();
        assert_eq!(
            err,
            AdjustmentError::CorrectionCount {
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn bf_helpers() {
        let (ok, diff) = check_bf_consistency(1.2345, -1.2331, Some(2.0));
        assert!(ok);
        assert_abs_diff_eq!(diff, 1.4, epsilon = 1e-9);
        assert!(!check_bf_consistency(1.2345, -1.2300, Some(2.0)).0);

        let f = LevelingLine::from_totals("f", "A", "B", 1.2345, 800.0);
        let b = LevelingLine::from_totals("b", "B", "A", -1.2331, 810.0);
        let (mean, bf) = merge_bf_measurements(&f, &b);
        assert_abs_diff_eq!(mean, 1.2338, epsilon = 1e-12);
        assert_abs_diff_eq!(bf, 1.4, epsilon = 1e-9);
    }
}
