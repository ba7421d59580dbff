use super::classes::ClassTableConfig;
use crate::adjust::ParametricParams;
use crate::classes::{AccuracyClass, ClassTable};
use crate::io::read_json_file;
use crate::network::LoopSearchParams;
use crate::types::{Benchmark, LevelingLine};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentMethod {
    #[default]
    Parametric,
    Conditional,
}

/// One run of the `network_adjust` binary.
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    pub lines: Vec<LevelingLine>,
    #[serde(default)]
    pub benchmarks: Vec<Benchmark>,
    /// Benchmarks held fixed; every benchmark when absent.
    #[serde(default)]
    pub fixed_points: Option<Vec<String>>,
    #[serde(default)]
    pub method: AdjustmentMethod,
    /// Loops for the conditional method as indices into `lines`. The
    /// fundamental loops found by the loop analyzer are used when absent.
    #[serde(default)]
    pub loops: Option<Vec<Vec<usize>>>,
    #[serde(default)]
    pub signed_conditions: bool,
    /// Class used for tolerances; the table's default class when absent.
    #[serde(default)]
    pub target_class: Option<AccuracyClass>,
    #[serde(default)]
    pub classes: ClassTableConfig,
    #[serde(default)]
    pub adjustment: ParametricParams,
    #[serde(default)]
    pub loop_search: LoopSearchParams,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_out: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn class_table(&self) -> Result<ClassTable, String> {
        self.classes.resolve()
    }

    pub fn target_class(&self, table: &ClassTable) -> AccuracyClass {
        self.target_class.unwrap_or_else(|| table.default_class())
    }

    /// Heights of the fixed points, looked up among the benchmarks.
    pub fn fixed_heights(&self) -> Result<BTreeMap<String, f64>, String> {
        let known: BTreeMap<&str, f64> = self
            .benchmarks
            .iter()
            .map(|bm| (bm.point_id.as_str(), bm.height))
            .collect();
        let fixed = match &self.fixed_points {
            Some(ids) => ids
                .iter()
                .map(|id| {
                    known
                        .get(id.as_str())
                        .map(|&h| (id.clone(), h))
                        .ok_or_else(|| format!("fixed point {id} is not a listed benchmark"))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?,
            None => known
                .into_iter()
                .map(|(id, h)| (id.to_string(), h))
                .collect(),
        };
        if fixed.is_empty() {
            return Err("no fixed points: list at least one benchmark".to_string());
        }
        Ok(fixed)
    }
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, String> {
    read_json_file(path).map_err(|e| format!("Failed to load config: {e}"))
}
