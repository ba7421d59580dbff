//! Adjustment of a single leveling line between two known benchmarks.

use crate::classes::{AccuracyClass, ClassTable};
use crate::error::{AdjustmentError, Endpoint};
use crate::height::{self, DistributionMethod};
use crate::types::{Benchmark, LevelingLine, LineStatus};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Outcome of [`LineAdjuster::adjust`].
#[derive(Clone, Debug, Serialize)]
pub struct LineAdjustment {
    pub class: AccuracyClass,
    pub misclosure_m: f64,
    pub misclosure_mm: f64,
    pub tolerance_mm: f64,
    pub within_tolerance: bool,
    pub start_height: f64,
    pub end_height: f64,
    /// Measured height difference before correction.
    pub computed_dh: f64,
    pub expected_dh: f64,
    /// Heights of the start point and every setup's forward point, in line order.
    pub intermediate_heights: Vec<(String, f64)>,
    /// Per-setup corrections (m).
    pub corrections: Vec<f64>,
}

impl LineAdjustment {
    pub fn height_of(&self, point_id: &str) -> Option<f64> {
        self.intermediate_heights
            .iter()
            .rev()
            .find(|(id, _)| id == point_id)
            .map(|(_, h)| *h)
    }
}

/// Average of several runs between the same benchmark pair.
#[derive(Clone, Debug, Serialize)]
pub struct RunAverage {
    /// Runs that connect the benchmark pair.
    pub runs_used: usize,
    /// Height differences oriented start → end.
    pub individual_dhs: Vec<f64>,
    pub mean_dh: f64,
    /// Spread `max − min` of the oriented runs (mm); zero for a single run.
    pub bf_diff_mm: f64,
    pub expected_dh: f64,
    pub misclosure_mm: f64,
}

/// Distributes the misclosure of a line over its setups.
#[derive(Clone, Debug)]
pub struct LineAdjuster<'a> {
    table: &'a ClassTable,
    class: AccuracyClass,
    distribution: DistributionMethod,
}

impl<'a> LineAdjuster<'a> {
    /// Adjuster using the table's default class and proportional distribution.
    pub fn new(table: &'a ClassTable) -> Self {
        Self {
            table,
            class: table.default_class(),
            distribution: DistributionMethod::Proportional,
        }
    }

    pub fn with_class(mut self, class: AccuracyClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_distribution(mut self, distribution: DistributionMethod) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn class(&self) -> AccuracyClass {
        self.class
    }

    /// Adjusts `line` in place so that it closes on the two benchmarks.
    ///
    /// The line's `misclosure` is recorded and its status set to
    /// [`LineStatus::ExceededTolerance`] when the misclosure is outside the
    /// class tolerance. A line without setups only has its total corrected.
    pub fn adjust(
        &self,
        line: &mut LevelingLine,
        start: &Benchmark,
        end: &Benchmark,
    ) -> Result<LineAdjustment, AdjustmentError> {
        check_endpoint(Endpoint::Start, &line.start_point, start)?;
        check_endpoint(Endpoint::End, &line.end_point, end)?;
        line.ensure_totals();

        let computed_dh = line.total_height_diff;
        let misclosure_m = height::misclosure(computed_dh, start.height, end.height);
        let misclosure_mm = misclosure_m * 1000.0;
        let tolerance_mm =
            height::allowable_misclosure(line.total_distance, self.class, self.table);
        let within_tolerance = misclosure_mm.abs() <= tolerance_mm;

        let corrections = height::distribute_misclosure(line, misclosure_m, self.distribution);
        if line.setups.is_empty() {
            line.total_height_diff = computed_dh - misclosure_m;
        } else {
            height::apply_corrections(line, &corrections)?;
        }
        line.misclosure = Some(misclosure_m);
        if !within_tolerance {
            warn!(
                "line {} misclosure {misclosure_mm:.2} mm exceeds {} tolerance {tolerance_mm:.2} mm",
                line.filename, self.class
            );
            line.status = LineStatus::ExceededTolerance;
        }
        debug!(
            "line {}: misclosure {misclosure_mm:.2} mm over {:.3} km, {} corrections",
            line.filename,
            line.distance_km(),
            corrections.len()
        );

        Ok(LineAdjustment {
            class: self.class,
            misclosure_m,
            misclosure_mm,
            tolerance_mm,
            within_tolerance,
            start_height: start.height,
            end_height: end.height,
            computed_dh,
            expected_dh: end.height - start.height,
            intermediate_heights: intermediate_heights(line, start.height),
            corrections,
        })
    }

    /// Averages forward and backward runs between `start` and `end`.
    ///
    /// Backward runs are sign-inverted first. Runs that connect neither way
    /// are skipped with a warning.
    pub fn adjust_multiple_runs(
        &self,
        lines: &[LevelingLine],
        start: &Benchmark,
        end: &Benchmark,
    ) -> Result<RunAverage, AdjustmentError> {
        let mut dhs = Vec::with_capacity(lines.len());
        for line in lines {
            if line.start_point == start.point_id && line.end_point == end.point_id {
                dhs.push(line.total_height_diff);
            } else if line.start_point == end.point_id && line.end_point == start.point_id {
                dhs.push(-line.total_height_diff);
            } else {
                warn!(
                    "line {} ({} -> {}) does not connect {} and {}",
                    line.filename, line.start_point, line.end_point, start.point_id, end.point_id
                );
            }
        }
        if dhs.is_empty() {
            return Err(AdjustmentError::NoMatchingRuns);
        }

        let mean_dh = dhs.iter().sum::<f64>() / dhs.len() as f64;
        let bf_diff_mm = if dhs.len() >= 2 {
            let max = dhs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = dhs.iter().copied().fold(f64::INFINITY, f64::min);
            (max - min) * 1000.0
        } else {
            0.0
        };
        let expected_dh = end.height - start.height;
        Ok(RunAverage {
            runs_used: dhs.len(),
            individual_dhs: dhs,
            mean_dh,
            bf_diff_mm,
            expected_dh,
            misclosure_mm: (mean_dh - expected_dh) * 1000.0,
        })
    }

    /// Adjusts independent lines against a benchmark map.
    ///
    /// Results are returned in line order. With the `parallel` feature the
    /// lines are processed on the rayon pool.
    pub fn adjust_many(
        &self,
        lines: &mut [LevelingLine],
        benchmarks: &HashMap<String, Benchmark>,
    ) -> Vec<Result<LineAdjustment, AdjustmentError>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            lines
                .par_iter_mut()
                .map(|line| self.adjust_with_map(line, benchmarks))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            lines
                .iter_mut()
                .map(|line| self.adjust_with_map(line, benchmarks))
                .collect()
        }
    }

    fn adjust_with_map(
        &self,
        line: &mut LevelingLine,
        benchmarks: &HashMap<String, Benchmark>,
    ) -> Result<LineAdjustment, AdjustmentError> {
        let start = benchmark_for(benchmarks, &line.start_point, &line.filename)?;
        let end = benchmark_for(benchmarks, &line.end_point, &line.filename)?;
        self.adjust(line, start, end)
    }
}

fn benchmark_for<'m>(
    benchmarks: &'m HashMap<String, Benchmark>,
    point_id: &str,
    line_name: &str,
) -> Result<&'m Benchmark, AdjustmentError> {
    benchmarks.get(point_id).ok_or_else(|| {
        AdjustmentError::invalid_network(format!(
            "no benchmark for point {point_id} of line {line_name}"
        ))
    })
}

/// Adjusts `line` between known start and end heights with default settings.
pub fn adjust_single_line(
    line: &mut LevelingLine,
    start_height: f64,
    end_height: f64,
    table: &ClassTable,
) -> Result<LineAdjustment, AdjustmentError> {
    let start = Benchmark::new(line.start_point.clone(), start_height);
    let end = Benchmark::new(line.end_point.clone(), end_height);
    LineAdjuster::new(table).adjust(line, &start, &end)
}

fn check_endpoint(
    endpoint: Endpoint,
    line_point: &str,
    benchmark: &Benchmark,
) -> Result<(), AdjustmentError> {
    if line_point == benchmark.point_id {
        Ok(())
    } else {
        Err(AdjustmentError::EndpointMismatch {
            endpoint,
            line_point: line_point.to_string(),
            benchmark_point: benchmark.point_id.clone(),
        })
    }
}

fn intermediate_heights(line: &LevelingLine, start_height: f64) -> Vec<(String, f64)> {
    let mut heights = Vec::with_capacity(line.setups.len() + 1);
    heights.push((line.start_point.clone(), start_height));
    let mut current = start_height;
    for setup in &line.setups {
        current += setup.effective_height_diff();
        heights.push((setup.to_point.clone(), current));
    }
    if line.setups.is_empty() {
        heights.push((line.end_point.clone(), start_height + line.total_height_diff));
    }
    heights
}
