use leveling_adjust::adjust::{ConditionalAdjuster, ParametricAdjuster, SignedConditions};
use leveling_adjust::config::{self, AdjustmentMethod, RuntimeConfig};
use leveling_adjust::diagnostics::NetworkSummary;
use leveling_adjust::io::write_json_file;
use leveling_adjust::network::{DoubleRunAnalysis, Loop, LoopAnalyzer};
use leveling_adjust::validate::{LineValidator, ValidationReport, ValidationSummary};
use leveling_adjust::{AccuracyClass, AdjustmentResult, LevelingLine};
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Instant;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[derive(Serialize)]
struct NetworkReport {
    method: &'static str,
    target_class: AccuracyClass,
    network: NetworkSummary,
    validation: ValidationSummary,
    line_reports: Vec<ValidationReport>,
    loops: Vec<Loop>,
    double_runs: Vec<DoubleRunAnalysis>,
    adjustment: AdjustmentResult,
    elapsed_ms: f64,
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = config::load_config(Path::new(&config_path))?;
    let t0 = Instant::now();

    let table = config.class_table()?;
    let target_class = config.target_class(&table);
    let fixed = config.fixed_heights()?;

    let mut lines = config.lines.clone();
    let line_reports = LineValidator::new(&table)
        .with_class(target_class)
        .validate_batch(&mut lines);
    let validation = ValidationSummary::from_reports(&line_reports);

    let analyzer = LoopAnalyzer::new(&lines, &table)
        .with_target_class(target_class)
        .with_params(config.loop_search.clone());
    let network = analyzer.network_summary();
    let loops = analyzer.find_basis_loops();
    let double_runs = analyzer
        .detect_double_runs()
        .into_iter()
        .map(|(f, b)| analyzer.analyze_double_run(&lines[f], &lines[b]))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let adjustment = adjust(&config, &lines, &loops, &fixed)?;

    let report = NetworkReport {
        method: match config.method {
            AdjustmentMethod::Parametric => "parametric",
            AdjustmentMethod::Conditional => "conditional",
        },
        target_class,
        network,
        validation,
        line_reports,
        loops,
        double_runs,
        adjustment,
        elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
    };
    print_text_summary(&report);

    if let Some(path) = &config.output.json_out {
        write_json_file(path, &report)?;
        println!("Saved report to {}", path.display());
    }
    Ok(())
}

fn adjust(
    config: &RuntimeConfig,
    lines: &[LevelingLine],
    basis: &[Loop],
    fixed: &BTreeMap<String, f64>,
) -> Result<AdjustmentResult, String> {
    let result = match config.method {
        AdjustmentMethod::Parametric => {
            ParametricAdjuster::new(config.adjustment.clone()).adjust_from_lines(lines, fixed)
        }
        AdjustmentMethod::Conditional => {
            let loops: Vec<Vec<usize>> = match &config.loops {
                Some(loops) => loops.clone(),
                None => basis.iter().map(|l| l.line_indices.clone()).collect(),
            };
            let params = config.adjustment.kernel_params();
            if config.signed_conditions {
                ConditionalAdjuster::with_builder(params, SignedConditions).adjust_loops(
                    lines,
                    &loops,
                    Some(fixed),
                )
            } else {
                ConditionalAdjuster::new(params).adjust_loops(lines, &loops, Some(fixed))
            }
        }
    };
    result.map_err(|e| e.to_string())
}

fn print_text_summary(report: &NetworkReport) {
    let net = &report.network;
    println!(
        "Network: {} points, {} lines, {} components, {} independent loops",
        net.num_points, net.num_lines, net.num_components, net.expected_loops
    );
    println!(
        "Validation ({}): {}/{} lines valid",
        report.target_class, report.validation.valid, report.validation.total
    );
    for line in report.line_reports.iter().filter(|r| !r.is_valid()) {
        println!("  {}: {}", line.line, line.errors.join("; "));
    }
    for l in &report.loops {
        println!("  {l}");
    }
    for run in &report.double_runs {
        println!(
            "  Double run {} / {}: {:.2} mm (±{:.2} mm, {})",
            run.forward, run.backward, run.misclosure_mm, run.tolerance_mm, run.achieved
        );
    }

    let adj = &report.adjustment;
    println!(
        "Adjustment ({}): iterations={} converged={} sigma_0={:.5} dof={} K={:.3}",
        report.method,
        adj.iteration,
        adj.converged,
        adj.mse_unit_weight,
        adj.diagnostics.degrees_of_freedom,
        adj.k_coefficient
    );
    for (point, height) in &adj.adjusted_heights {
        match adj.mse_heights.get(point) {
            Some(mse) => println!("  {point}: {height:.4} m ± {:.2} mm", mse * 1000.0),
            None => println!("  {point}: {height:.4} m"),
        }
    }
    for warning in &adj.diagnostics.warnings {
        println!("  warning: {warning}");
    }
    println!("Total time: {:.3} ms", report.elapsed_ms);
}

fn usage() -> String {
    "Usage: network_adjust <config.json>".to_string()
}
