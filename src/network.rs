//! Network topology: graph construction, loop search and double runs.

pub mod double_run;
pub mod graph;
pub mod loops;

pub use double_run::{analyze_double_run, detect_double_runs, DoubleRunAnalysis};
pub use graph::{Edge, NetworkGraph};
pub use loops::{find_all_loops, find_minimum_loops, Loop, LoopAnalyzer, LoopSearchParams};
