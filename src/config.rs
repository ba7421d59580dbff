//! JSON configuration: class-table overrides and the runtime description
//! consumed by the `network_adjust` binary.

pub mod classes;
pub mod network;

pub use classes::{load_class_table, ClassOverride, ClassTableConfig};
pub use network::{load_config, AdjustmentMethod, OutputConfig, RuntimeConfig};
