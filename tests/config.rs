mod common;

use approx::assert_abs_diff_eq;
use common::networks::init_logger;
use leveling_adjust::adjust::ParametricAdjuster;
use leveling_adjust::config::{load_class_table, load_config, AdjustmentMethod};
use leveling_adjust::io::{read_json_file, write_json_file};
use leveling_adjust::network::LoopAnalyzer;
use leveling_adjust::AccuracyClass;
use std::fs;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("leveling-adjust-{}-{name}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

const NETWORK: &str = r#"{
    "lines": [
        { "filename": "BM1-BM2.DAT", "start_point": "BM1", "end_point": "BM2",
          "total_distance": 1500.0, "total_height_diff": 10.524 },
        { "filename": "BM2-BM3.DAT", "start_point": "BM2", "end_point": "BM3",
          "total_distance": 2000.0, "total_height_diff": -5.123 },
        { "filename": "BM1-BM3.DAT", "start_point": "BM1", "end_point": "BM3",
          "total_distance": 3500.0, "total_height_diff": 5.402 }
    ],
    "benchmarks": [
        { "point_id": "BM1", "height": 100.0 },
        { "point_id": "BM3", "height": 105.4 }
    ],
    "fixed_points": ["BM1"],
    "target_class": "H2",
    "classes": { "classes": { "H2": { "tolerance_coefficient": 0.1 } } },
    "loop_search": { "max_loop_size": 5 },
    "output": { "json_out": "report.json" }
}"#;

#[test]
fn runtime_config_drives_an_adjustment() {
    init_logger();
    let dir = scratch_dir("runtime");
    let path = dir.join("network.json");
    fs::write(&path, NETWORK).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.method, AdjustmentMethod::Parametric);
    assert_eq!(config.loop_search.max_loop_size, 5);
    let table = config.class_table().unwrap();
    let class = config.target_class(&table);
    assert_eq!(class, AccuracyClass::H2);

    let fixed = config.fixed_heights().unwrap();
    assert_eq!(fixed.len(), 1);
    let result = ParametricAdjuster::new(config.adjustment.clone())
        .adjust_from_lines(&config.lines, &fixed)
        .unwrap();
    assert_abs_diff_eq!(result.height("BM3").unwrap(), 105.4015, epsilon = 1e-9);

    // 1 mm over 7 km exceeds the tightened H2 tolerance of 0.1 mm/√km.
    let loops = LoopAnalyzer::new(&config.lines, &table)
        .with_target_class(class)
        .find_loops();
    assert_eq!(loops.len(), 1);
    assert!(!loops[0].within_tolerance());

    let out = dir.join("out").join("result.json");
    write_json_file(&out, &result).unwrap();
    let back: serde_json::Value = read_json_file(&out).unwrap();
    assert_eq!(back["converged"], serde_json::Value::Bool(true));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn class_table_file_overrides_defaults() {
    let dir = scratch_dir("classes");
    let path = dir.join("classes.json");
    fs::write(
        &path,
        r#"{ "default_class": "H5", "classes": { "H5": { "max_line_length_km": 7.5 } } }"#,
    )
    .unwrap();
    let table = load_class_table(&path).unwrap();
    assert_eq!(table.default_class(), AccuracyClass::H5);
    assert_eq!(table.get(AccuracyClass::H5).max_line_length_km, Some(7.5));
    assert_eq!(table.get(AccuracyClass::H5).tolerance_coefficient, 30.0);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn load_errors_name_the_file() {
    let dir = scratch_dir("errors");
    let missing = dir.join("missing.json");
    let err = load_config(&missing).unwrap_err();
    assert!(err.contains("missing.json"), "{err}");

    let broken = dir.join("broken.json");
    fs::write(&broken, "{ \"lines\": 3 }").unwrap();
    let err = load_config(&broken).unwrap_err();
    assert!(err.contains("Failed to parse"), "{err}");
    fs::remove_dir_all(&dir).ok();
}
