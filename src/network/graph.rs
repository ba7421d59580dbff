//! Undirected multigraph of a leveling network.
//!
//! Points are interned into an arena in first-seen order; adjacency lists hold
//! `(neighbor index, line index)` pairs where the line index points back into
//! the slice the graph was built from.

use crate::types::LevelingLine;
use std::collections::HashMap;

/// One adjacency entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub neighbor: usize,
    /// Index into [`NetworkGraph::lines`].
    pub line: usize,
}

/// Read-only topology over a borrowed line collection.
#[derive(Clone, Debug)]
pub struct NetworkGraph<'a> {
    lines: &'a [LevelingLine],
    points: Vec<&'a str>,
    index: HashMap<&'a str, usize>,
    adjacency: Vec<Vec<Edge>>,
    /// Lines that entered the graph (both endpoints named).
    edges: Vec<usize>,
}

impl<'a> NetworkGraph<'a> {
    /// Builds the graph. Lines with an empty start or end point are skipped.
    pub fn new(lines: &'a [LevelingLine]) -> Self {
        let mut graph = Self {
            lines,
            points: Vec::new(),
            index: HashMap::new(),
            adjacency: Vec::new(),
            edges: Vec::new(),
        };
        for (idx, line) in lines.iter().enumerate() {
            if line.start_point.is_empty() || line.end_point.is_empty() {
                continue;
            }
            let from = graph.intern(&line.start_point);
            let to = graph.intern(&line.end_point);
            graph.adjacency[from].push(Edge {
                neighbor: to,
                line: idx,
            });
            graph.adjacency[to].push(Edge {
                neighbor: from,
                line: idx,
            });
            graph.edges.push(idx);
        }
        graph
    }

    fn intern(&mut self, id: &'a str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.points.len();
        self.points.push(id);
        self.index.insert(id, idx);
        self.adjacency.push(Vec::new());
        idx
    }

    pub fn lines(&self) -> &'a [LevelingLine] {
        self.lines
    }

    pub fn line(&self, idx: usize) -> &'a LevelingLine {
        &self.lines[idx]
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of lines in the graph.
    pub fn num_lines(&self) -> usize {
        self.edges.len()
    }

    /// Point ids in first-seen order.
    pub fn points(&self) -> &[&'a str] {
        &self.points
    }

    pub fn point_id(&self, idx: usize) -> &'a str {
        self.points[idx]
    }

    pub fn point_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn neighbors(&self, point: usize) -> &[Edge] {
        &self.adjacency[point]
    }

    /// Neighbors of a point by id; empty for unknown points.
    pub fn neighbors_of(&self, id: &str) -> &[Edge] {
        self.point_index(id)
            .map(|idx| self.adjacency[idx].as_slice())
            .unwrap_or(&[])
    }

    /// `+1` when leaving `from` along `line` follows the measured direction.
    pub fn traversal_sign(&self, line: usize, from: usize) -> f64 {
        if self.point_index(&self.lines[line].start_point) == Some(from) {
            1.0
        } else {
            -1.0
        }
    }

    pub fn count_components(&self) -> usize {
        let mut visited = vec![false; self.points.len()];
        let mut components = 0;
        let mut stack = Vec::new();
        for start in 0..self.points.len() {
            if visited[start] {
                continue;
            }
            components += 1;
            visited[start] = true;
            stack.push(start);
            while let Some(point) = stack.pop() {
                for edge in &self.adjacency[point] {
                    if !visited[edge.neighbor] {
                        visited[edge.neighbor] = true;
                        stack.push(edge.neighbor);
                    }
                }
            }
        }
        components
    }

    /// Number of independent loops `E − V + C`.
    pub fn cycle_rank(&self) -> usize {
        (self.num_lines() + self.count_components()).saturating_sub(self.num_points())
    }
}
