mod common;

use approx::assert_abs_diff_eq;
use common::networks::{field_line, init_logger};
use leveling_adjust::adjust::{adjust_single_line, LineAdjuster};
use leveling_adjust::height::{self, DistributionMethod};
use leveling_adjust::{AccuracyClass, AdjustmentError, Benchmark, ClassTable, LevelingLine, LineStatus};
use std::collections::HashMap;

#[test]
fn line_closes_on_its_benchmarks() {
    init_logger();
    let table = ClassTable::default();
    let mut line = field_line();
    let start = Benchmark::new("BM1", 100.0);
    let end = Benchmark::new("BM2", 100.406);
    let adj = LineAdjuster::new(&table).adjust(&mut line, &start, &end).unwrap();

    assert_eq!(adj.class, AccuracyClass::H3);
    assert_abs_diff_eq!(adj.computed_dh, 0.404, epsilon = 1e-12);
    assert_abs_diff_eq!(adj.misclosure_mm, -2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(adj.tolerance_mm, 10.0 * 0.1f64.sqrt(), epsilon = 1e-9);
    assert!(adj.within_tolerance);
    assert_eq!(line.status, LineStatus::Valid);
    assert_abs_diff_eq!(line.misclosure.unwrap(), -0.002, epsilon = 1e-12);

    let expected = [0.0005, 0.0005, 0.001];
    for (c, e) in adj.corrections.iter().zip(expected) {
        assert_abs_diff_eq!(*c, e, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(line.total_height_diff, 0.406, epsilon = 1e-12);
    assert_abs_diff_eq!(adj.height_of("1").unwrap(), 100.3105, epsilon = 1e-9);
    assert_abs_diff_eq!(adj.height_of("2").unwrap(), 100.536, epsilon = 1e-9);
    assert_abs_diff_eq!(adj.height_of("BM2").unwrap(), 100.406, epsilon = 1e-9);
}

#[test]
fn strict_class_marks_the_line() {
    let table = ClassTable::default();
    let mut line = field_line();
    let adj = LineAdjuster::new(&table)
        .with_class(AccuracyClass::H1)
        .with_distribution(DistributionMethod::Equal)
        .adjust(&mut line, &Benchmark::new("BM1", 100.0), &Benchmark::new("BM2", 100.406))
        .unwrap();
    assert!(!adj.within_tolerance);
    assert_eq!(line.status, LineStatus::ExceededTolerance);
    for c in &adj.corrections {
        assert_abs_diff_eq!(*c, 0.002 / 3.0, epsilon = 1e-12);
    }
}

#[test]
fn endpoint_mismatch_is_an_error() {
    let table = ClassTable::default();
    let mut line = field_line();
    let closed = adjust_single_line(&mut line, 100.0, 100.4, &table);
    assert!(closed.is_ok());

    let err = LineAdjuster::new(&table)
        .adjust(&mut line, &Benchmark::new("BM9", 100.0), &Benchmark::new("BM2", 100.4))
        .unwrap_err();
    assert!(matches!(err, AdjustmentError::EndpointMismatch { .. }));
}

#[test]
fn proportional_distribution_sums_to_negative_misclosure() {
    let line = field_line();
    for m in [-0.0123, 0.0, 0.004, 0.25] {
        let total: f64 = height::distribute_misclosure(&line, m, DistributionMethod::Proportional)
            .iter()
            .sum();
        assert_abs_diff_eq!(total, -m, epsilon = 1e-9);
    }
}

#[test]
fn direction_toggle_is_an_involution() {
    let original = field_line();
    let mut line = original.clone();
    line.toggle_direction();
    assert_eq!(line.start_point, "BM2");
    assert_abs_diff_eq!(line.total_height_diff, -0.404, epsilon = 1e-12);
    line.toggle_direction();
    assert_eq!(line, original);
}

#[test]
fn runs_are_averaged_and_batches_keep_order() {
    let table = ClassTable::default();
    let adjuster = LineAdjuster::new(&table);
    let start = Benchmark::new("A", 10.0);
    let end = Benchmark::new("B", 11.0);
    let runs = vec![
        LevelingLine::from_totals("f", "A", "B", 1.002, 500.0),
        LevelingLine::from_totals("b", "B", "A", -1.000, 500.0),
        LevelingLine::from_totals("x", "C", "D", 5.0, 500.0),
    ];
    let avg = adjuster.adjust_multiple_runs(&runs, &start, &end).unwrap();
    assert_eq!(avg.runs_used, 2);
    assert_abs_diff_eq!(avg.mean_dh, 1.001, epsilon = 1e-12);
    assert_abs_diff_eq!(avg.bf_diff_mm, 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(avg.misclosure_mm, 1.0, epsilon = 1e-9);
    assert_eq!(
        adjuster.adjust_multiple_runs(&runs[2..], &start, &end).unwrap_err(),
        AdjustmentError::NoMatchingRuns
    );

    let benchmarks: HashMap<String, Benchmark> = [start, end]
        .into_iter()
        .map(|bm| (bm.point_id.clone(), bm))
        .collect();
    let mut lines = runs;
    let results = adjuster.adjust_many(&mut lines, &benchmarks);
    assert_eq!(results.len(), 3);
    assert_abs_diff_eq!(results[0].as_ref().unwrap().misclosure_mm, 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(results[1].as_ref().unwrap().misclosure_mm, 0.0, epsilon = 1e-9);
    assert!(matches!(results[2], Err(AdjustmentError::InvalidNetwork { .. })));
    assert_abs_diff_eq!(lines[0].total_height_diff, 1.0, epsilon = 1e-12);
}
