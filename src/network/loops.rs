//! Closed-loop enumeration and classification.

use crate::classes::{AccuracyClass, AchievedClass, ClassTable};
use crate::diagnostics::NetworkSummary;
use crate::error::AdjustmentError;
use crate::network::double_run::{self, DoubleRunAnalysis};
use crate::network::graph::NetworkGraph;
use crate::types::LevelingLine;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Loop search bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSearchParams {
    /// Largest number of lines in a reported loop.
    pub max_loop_size: usize,
}

impl Default for LoopSearchParams {
    fn default() -> Self {
        Self { max_loop_size: 10 }
    }
}

/// Closed walk through the network.
#[derive(Clone, Debug, Serialize)]
pub struct Loop {
    /// Indices of the loop's lines in traversal order.
    pub line_indices: Vec<usize>,
    /// `+1` where a line is walked in its measured direction, `−1` otherwise.
    pub signs: Vec<f64>,
    /// Visited points; the first point is repeated at the end.
    pub points: Vec<String>,
    /// Total distance (m).
    pub total_distance: f64,
    /// Signed sum of the height differences along the walk (m).
    pub misclosure: f64,
    pub target_class: AccuracyClass,
    /// Tolerance of `target_class` over the loop length (mm).
    pub allowable_tolerance: f64,
    pub achieved: AchievedClass,
}

impl Loop {
    fn new(
        graph: &NetworkGraph<'_>,
        points: &[usize],
        line_indices: Vec<usize>,
        signs: Vec<f64>,
        target_class: AccuracyClass,
        table: &ClassTable,
    ) -> Self {
        let mut total_distance = 0.0;
        let mut misclosure = 0.0;
        for (&idx, sign) in line_indices.iter().zip(&signs) {
            let (distance, dh) = graph.line(idx).effective_totals();
            total_distance += distance;
            misclosure += sign * dh;
        }
        let distance_km = total_distance / 1000.0;
        Self {
            points: points.iter().map(|&p| graph.point_id(p).to_string()).collect(),
            line_indices,
            signs,
            total_distance,
            misclosure,
            target_class,
            allowable_tolerance: table.tolerance_mm(target_class, distance_km),
            achieved: table.classify(misclosure * 1000.0, distance_km),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.points.len() > 2 && self.points.first() == self.points.last()
    }

    pub fn num_lines(&self) -> usize {
        self.line_indices.len()
    }

    pub fn misclosure_mm(&self) -> f64 {
        self.misclosure * 1000.0
    }

    pub fn within_tolerance(&self) -> bool {
        self.misclosure_mm().abs() <= self.allowable_tolerance
    }

    /// Tightest class number 1..=6, or 0 when every tolerance is exceeded.
    pub fn tolerance_class(&self) -> u8 {
        self.achieved.number()
    }

    /// The loop's lines, resolved against the slice the graph was built from.
    pub fn lines<'l>(&'l self, lines: &'l [LevelingLine]) -> impl Iterator<Item = &'l LevelingLine> + 'l {
        self.line_indices.iter().map(move |&idx| &lines[idx])
    }
}

impl fmt::Display for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loop: {} (misclosure {:.2} mm, tolerance ±{:.2} mm, {})",
            self.points.join(" → "),
            self.misclosure_mm(),
            self.allowable_tolerance,
            self.achieved
        )
    }
}

struct Frame {
    point: usize,
    cursor: usize,
}

/// All simple loops of at least three and at most `max_loop_size` lines.
///
/// The search starts from every point in graph order. A loop found again
/// from another start point or in the other direction (same set of lines) is
/// reported only once, in the orientation it was first found.
pub fn find_all_loops(
    graph: &NetworkGraph<'_>,
    params: &LoopSearchParams,
    target_class: AccuracyClass,
    table: &ClassTable,
) -> Vec<Loop> {
    let mut loops = Vec::new();
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let max_lines = params.max_loop_size;

    for start in 0..graph.num_points() {
        let mut stack = vec![Frame {
            point: start,
            cursor: 0,
        }];
        let mut path = vec![start];
        let mut used: Vec<usize> = Vec::new();
        let mut signs: Vec<f64> = Vec::new();

        while let Some(frame) = stack.last_mut() {
            let point = frame.point;
            let Some(&edge) = graph.neighbors(point).get(frame.cursor) else {
                stack.pop();
                path.pop();
                used.pop();
                signs.pop();
                continue;
            };
            frame.cursor += 1;
            if used.contains(&edge.line) {
                continue;
            }
            let sign = graph.traversal_sign(edge.line, point);

            if edge.neighbor == start {
                if used.len() >= 2 && used.len() < max_lines {
                    let mut lines = used.clone();
                    lines.push(edge.line);
                    let mut key = lines.clone();
                    key.sort_unstable();
                    if seen.insert(key) {
                        let mut points = path.clone();
                        points.push(start);
                        let mut loop_signs = signs.clone();
                        loop_signs.push(sign);
                        loops.push(Loop::new(graph, &points, lines, loop_signs, target_class, table));
                    }
                }
                continue;
            }

            if used.len() + 2 <= max_lines && !path.contains(&edge.neighbor) {
                path.push(edge.neighbor);
                used.push(edge.line);
                signs.push(sign);
                stack.push(Frame {
                    point: edge.neighbor,
                    cursor: 0,
                });
            }
        }
    }
    debug!(
        "loop search: {} points, {} lines, {} loops",
        graph.num_points(),
        graph.num_lines(),
        loops.len()
    );
    loops
}

/// Smallest enumerated loops, up to the cycle rank `E − V + C` of the graph.
///
/// An approximation of a loop basis: the selected loops are not checked for
/// independence.
pub fn find_minimum_loops(
    graph: &NetworkGraph<'_>,
    params: &LoopSearchParams,
    target_class: AccuracyClass,
    table: &ClassTable,
) -> Vec<Loop> {
    let mut loops = find_all_loops(graph, params, target_class, table);
    loops.sort_by_key(Loop::num_lines);
    loops.truncate(graph.cycle_rank());
    loops
}

/// Loop and double-run analysis over one line collection.
#[derive(Clone, Debug)]
pub struct LoopAnalyzer<'a> {
    graph: NetworkGraph<'a>,
    table: &'a ClassTable,
    target_class: AccuracyClass,
    params: LoopSearchParams,
}

impl<'a> LoopAnalyzer<'a> {
    /// Analyzer checking loops against the strictest class `H1`.
    pub fn new(lines: &'a [LevelingLine], table: &'a ClassTable) -> Self {
        Self {
            graph: NetworkGraph::new(lines),
            table,
            target_class: AccuracyClass::H1,
            params: LoopSearchParams::default(),
        }
    }

    pub fn with_target_class(mut self, class: AccuracyClass) -> Self {
        self.target_class = class;
        self
    }

    pub fn with_params(mut self, params: LoopSearchParams) -> Self {
        self.params = params;
        self
    }

    pub fn graph(&self) -> &NetworkGraph<'a> {
        &self.graph
    }

    pub fn find_loops(&self) -> Vec<Loop> {
        find_all_loops(&self.graph, &self.params, self.target_class, self.table)
    }

    pub fn find_basis_loops(&self) -> Vec<Loop> {
        find_minimum_loops(&self.graph, &self.params, self.target_class, self.table)
    }

    /// Forward/return pairs among the analyzer's lines, as index pairs.
    pub fn detect_double_runs(&self) -> Vec<(usize, usize)> {
        double_run::detect_double_runs(self.graph.lines())
    }

    pub fn analyze_double_run(
        &self,
        forward: &LevelingLine,
        backward: &LevelingLine,
    ) -> Result<DoubleRunAnalysis, AdjustmentError> {
        double_run::analyze_double_run(forward, backward, self.target_class, self.table)
    }

    pub fn network_summary(&self) -> NetworkSummary {
        NetworkSummary {
            num_points: self.graph.num_points(),
            num_lines: self.graph.num_lines(),
            num_loops: self.find_loops().len(),
            num_components: self.graph.count_components(),
            expected_loops: self.graph.cycle_rank(),
            points: self.graph.points().iter().map(|p| p.to_string()).collect(),
        }
    }
}
