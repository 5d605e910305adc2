//! Logging configuration
//!
//! Global and per-component log levels plus console/file output selection.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for daily rolling JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// File name prefix of the rolling log files
    pub file_prefix: String,

    /// Include file location in logs
    pub include_file_location: bool,

    /// Level for threshold, SBI and ICP internals
    pub algorithm_level: String,

    /// Level for batch orchestration
    pub pipeline_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            file_prefix: "sbi-icp.log".to_string(),
            include_file_location: false,
            algorithm_level: "info".to_string(),
            pipeline_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration used by `-vv` and above
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            include_file_location: true,
            algorithm_level: "trace".to_string(),
            pipeline_level: "debug".to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, level) in [
            ("global_level", &self.global_level),
            ("algorithm_level", &self.algorithm_level),
            ("pipeline_level", &self.pipeline_level),
        ] {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        if self.file_prefix.is_empty() {
            return Err("file_prefix must not be empty".to_string());
        }

        Ok(())
    }

    /// Effective log level for a component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "algorithm" | "algorithms" => &self.algorithm_level,
            "pipeline" => &self.pipeline_level,
            _ => &self.global_level,
        }
    }

    /// `EnvFilter` directives for this crate's targets.
    pub fn filter_directives(&self) -> String {
        let krate = env!("CARGO_PKG_NAME").replace('-', "_");
        format!(
            "{krate}={},{krate}::algorithms={},{krate}::pipeline={}",
            self.global_level,
            self.get_component_level("algorithms"),
            self.get_component_level("pipeline"),
        )
    }
}
