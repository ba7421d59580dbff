#![allow(dead_code)]

use leveling_adjust::{LevelingLine, MeasurementSummary, StationSetup};
use std::collections::BTreeMap;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn heights(points: &[(&str, f64)]) -> BTreeMap<String, f64> {
    points.iter().map(|(id, h)| (id.to_string(), *h)).collect()
}

/// Three benchmarks, one loop: `BM1→BM2`, `BM2→BM3`, `BM1→BM3`.
pub fn three_point_observations() -> Vec<MeasurementSummary> {
    vec![
        MeasurementSummary::new("BM1", "BM2", 10.524, 1500.0),
        MeasurementSummary::new("BM2", "BM3", -5.123, 2000.0),
        MeasurementSummary::new("BM1", "BM3", 5.402, 3500.0),
    ]
}

pub fn three_point_lines() -> Vec<LevelingLine> {
    three_point_observations()
        .iter()
        .map(|obs| {
            LevelingLine::from_totals(
                format!("{}-{}.DAT", obs.from_point, obs.to_point),
                obs.from_point.clone(),
                obs.to_point.clone(),
                obs.height_diff,
                obs.distance,
            )
        })
        .collect()
}

/// `A→B +1.0`, `B→C +0.5`, `C→A −1.6`, 1 km each: misclosure −0.1 m.
pub fn open_triangle() -> Vec<LevelingLine> {
    vec![
        LevelingLine::from_totals("A-B", "A", "B", 1.0, 1000.0),
        LevelingLine::from_totals("B-C", "B", "C", 0.5, 1000.0),
        LevelingLine::from_totals("C-A", "C", "A", -1.6, 1000.0),
    ]
}

/// Square `A-B-C-D` closed by the diagonal `A→C`.
pub fn square_with_diagonal() -> Vec<LevelingLine> {
    vec![
        LevelingLine::from_totals("A-B", "A", "B", 1.000, 1000.0),
        LevelingLine::from_totals("B-C", "B", "C", 2.000, 1000.0),
        LevelingLine::from_totals("C-D", "C", "D", -0.500, 1000.0),
        LevelingLine::from_totals("D-A", "D", "A", -2.502, 1000.0),
        LevelingLine::from_totals("A-C", "A", "C", 3.001, 1400.0),
    ]
}

/// BM1 to BM2 through two turning points, 100 m, Δh = +0.404 m.
pub fn field_line() -> LevelingLine {
    LevelingLine::with_setups(
        "BM1-BM2.DAT",
        "BM1",
        "BM2",
        vec![
            StationSetup::new(1, "BM1", "1", 1.520, 1.210, 25.0, 25.0),
            StationSetup::new(2, "1", "2", 1.330, 1.105, 25.0, 25.0),
            StationSetup::new(3, "2", "BM2", 0.982, 1.113, 50.0, 50.0),
        ],
    )
}
