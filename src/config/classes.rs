use crate::classes::{AccuracyClass, ClassParameters, ClassTable};
use crate::io::read_json_file;
use crate::types::MeasurementMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-class overrides of the editable regulation values.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassOverride {
    pub tolerance_coefficient: Option<f64>,
    pub max_line_length_km: Option<f64>,
    pub max_sight_distance_geometric_m: Option<f64>,
    pub max_sight_distance_trigonometric_m: Option<f64>,
    pub required_method: Option<MeasurementMethod>,
    pub min_setups: Option<usize>,
    pub max_single_distance_imbalance_m: Option<f64>,
    pub max_cumulative_distance_imbalance_m: Option<f64>,
    pub max_fb_difference_mm: Option<f64>,
    pub max_instrument_error_mm_per_km: Option<f64>,
    pub max_days_for_double_run: Option<u32>,
}

impl ClassOverride {
    pub fn apply(&self, params: &mut ClassParameters) {
        if let Some(v) = self.tolerance_coefficient {
            params.tolerance_coefficient = v;
        }
        if let Some(v) = self.max_line_length_km {
            params.max_line_length_km = Some(v);
        }
        if let Some(v) = self.max_sight_distance_geometric_m {
            params.max_sight_distance_geometric_m = v;
        }
        if let Some(v) = self.max_sight_distance_trigonometric_m {
            params.max_sight_distance_trigonometric_m = v;
        }
        if let Some(v) = self.required_method {
            params.required_method = v;
        }
        if let Some(v) = self.min_setups {
            params.min_setups = v;
        }
        if let Some(v) = self.max_single_distance_imbalance_m {
            params.max_single_distance_imbalance_m = v;
        }
        if let Some(v) = self.max_cumulative_distance_imbalance_m {
            params.max_cumulative_distance_imbalance_m = v;
        }
        if let Some(v) = self.max_fb_difference_mm {
            params.max_fb_difference_mm = Some(v);
        }
        if let Some(v) = self.max_instrument_error_mm_per_km {
            params.max_instrument_error_mm_per_km = Some(v);
        }
        if let Some(v) = self.max_days_for_double_run {
            params.max_days_for_double_run = Some(v);
        }
    }
}

/// User settings for the class table, keyed by class name (`"H1"`..`"H6"`).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassTableConfig {
    pub default_class: Option<String>,
    pub classes: BTreeMap<String, ClassOverride>,
}

impl ClassTableConfig {
    /// Regulation defaults with the overrides applied.
    pub fn resolve(&self) -> Result<ClassTable, String> {
        let mut table = ClassTable::default();
        for (name, class_override) in &self.classes {
            let class: AccuracyClass = name.parse()?;
            let params = table.get_mut(class);
            class_override.apply(params);
            if !(params.tolerance_coefficient.is_finite() && params.tolerance_coefficient > 0.0) {
                return Err(format!(
                    "tolerance coefficient for {class} must be positive, got {}",
                    params.tolerance_coefficient
                ));
            }
        }
        if let Some(name) = &self.default_class {
            table.set_default_class(name.parse()?);
        }
        Ok(table)
    }
}

pub fn load_class_table(path: &Path) -> Result<ClassTable, String> {
    let config: ClassTableConfig = read_json_file(path)
        .map_err(|e| format!("Failed to load class settings: {e}"))?;
    config.resolve()
}
