pub mod config;
pub mod types;

pub use config::{ExporterConfig, FirehoseConfig};
pub use types::*;
