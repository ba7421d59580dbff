mod common;

use approx::assert_abs_diff_eq;
use common::networks::{heights, init_logger, open_triangle, three_point_lines, three_point_observations};
use leveling_adjust::adjust::{
    ConditionalAdjuster, KernelParams, ParametricAdjuster, SignedConditions,
};
use leveling_adjust::{AdjustmentError, MeasurementSummary};
use nalgebra::DVector;

fn residual_vector(keys: &[&str], residuals_mm: &std::collections::BTreeMap<String, f64>) -> DVector<f64> {
    DVector::from_iterator(keys.len(), keys.iter().map(|k| residuals_mm[*k] / 1000.0))
}

#[test]
fn corrections_close_every_condition() {
    init_logger();
    let lines = open_triangle();
    let observations: Vec<MeasurementSummary> = lines.iter().map(MeasurementSummary::from).collect();
    let loops = vec![vec![0, 1, 2]];
    let adjuster = ConditionalAdjuster::new(KernelParams::default());
    let result = adjuster.adjust_loops(&lines, &loops, None).unwrap();

    let (b, w) = adjuster.condition_equations(&observations, &loops).unwrap();
    assert_abs_diff_eq!(w[0], -0.1, epsilon = 1e-12);
    let v = residual_vector(&["A-B", "B-C", "C-A"], &result.residuals);
    let closure = &b * &v + &w;
    assert_abs_diff_eq!(closure[0], 0.0, epsilon = 1e-12);

    // Equal lengths share the misclosure equally.
    for key in ["A-B", "B-C", "C-A"] {
        assert_abs_diff_eq!(result.residuals[key], 100.0 / 3.0, epsilon = 1e-9);
    }
    assert!(result.adjusted_heights.is_empty());
    assert!(result.mse_heights.is_empty());
    assert_eq!(result.iteration, 1);
    assert_eq!(result.diagnostics.degrees_of_freedom, 2);
}

#[test]
fn fixed_points_recover_heights() {
    let lines = open_triangle();
    let fixed = heights(&[("A", 100.0)]);
    let result = ConditionalAdjuster::new(KernelParams::default())
        .adjust_loops(&lines, &[vec![0, 1, 2]], Some(&fixed))
        .unwrap();
    assert_eq!(result.height("A"), Some(100.0));
    assert_abs_diff_eq!(result.height("B").unwrap(), 101.0 + 0.1 / 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.height("C").unwrap(), 101.5 + 0.2 / 3.0, epsilon = 1e-9);
}

#[test]
fn signed_conditions_match_parametric_solution() {
    let lines = three_point_lines();
    let fixed = heights(&[("BM1", 100.0)]);
    let loops = vec![vec![0, 1, 2]];

    let signed = ConditionalAdjuster::with_builder(KernelParams::default(), SignedConditions);
    let conditional = signed.adjust_loops(&lines, &loops, Some(&fixed)).unwrap();
    let parametric = ParametricAdjuster::default()
        .adjust(&three_point_observations(), &fixed, None)
        .unwrap();

    for point in ["BM2", "BM3"] {
        assert_abs_diff_eq!(
            conditional.adjusted_heights[point],
            parametric.adjusted_heights[point],
            epsilon = 1e-9
        );
    }
    for (key, v) in &parametric.residuals {
        assert_abs_diff_eq!(conditional.residuals[key], *v, epsilon = 1e-6);
    }
    assert_abs_diff_eq!(conditional.diagnostics.vtpv, parametric.diagnostics.vtpv, epsilon = 1e-12);

    let observations = three_point_observations();
    let (b, w) = signed.condition_equations(&observations, &loops).unwrap();
    assert_eq!(b.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0, -1.0]);
    assert_abs_diff_eq!(w[0], -0.001, epsilon = 1e-12);
}

#[test]
fn unsigned_conditions_ignore_direction() {
    let observations = three_point_observations();
    let adjuster = ConditionalAdjuster::new(KernelParams::default());
    let (b, w) = adjuster.condition_equations(&observations, &[vec![0, 1, 2]]).unwrap();
    assert!(b.iter().all(|&c| c == 1.0));
    assert_abs_diff_eq!(w[0], 10.524 - 5.123 + 5.402, epsilon = 1e-12);
}

#[test]
fn malformed_loops_are_rejected() {
    let lines = open_triangle();
    let adjuster = ConditionalAdjuster::new(KernelParams::default());
    assert!(matches!(
        adjuster.adjust_loops(&lines, &[], None).unwrap_err(),
        AdjustmentError::InvalidNetwork { .. }
    ));
    assert!(matches!(
        adjuster.adjust_loops(&lines, &[vec![0, 1, 7]], None).unwrap_err(),
        AdjustmentError::InvalidNetwork { .. }
    ));

    let broken = vec![
        leveling_adjust::LevelingLine::from_totals("A-B", "A", "B", 1.0, 1000.0),
        leveling_adjust::LevelingLine::from_totals("C-D", "C", "D", 1.0, 1000.0),
        leveling_adjust::LevelingLine::from_totals("D-A", "D", "A", 1.0, 1000.0),
    ];
    let signed = ConditionalAdjuster::with_builder(KernelParams::default(), SignedConditions);
    assert!(matches!(
        signed.adjust_loops(&broken, &[vec![0, 1, 2]], None).unwrap_err(),
        AdjustmentError::InvalidNetwork { .. }
    ));
}
