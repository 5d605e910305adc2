use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use crate::algorithms::IcpConfig;
pub use crate::logging::LoggingConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: ExecutionBackend,
    pub volume: VolumeConfig,
    pub threshold: ThresholdConfig,
    pub icp: IcpConfig,
    pub policy: PipelinePolicy,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Fewest slice files for a directory to count as a volume
    pub minimum_file_number: usize,
    /// Candidate slice extensions, in tie-break order
    pub extensions: Vec<String>,
    /// Extension of registered slices
    pub output_extension: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub scan_interval: usize,
}

/// Behavioural variants of the registration pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelinePolicy {
    /// Force voxels that were 0 before rotation back to 0 afterwards
    pub preserve_background_mask: bool,
    pub path_convention: PathConvention,
    pub feature_connectivity: Connectivity,
}

/// Where SBI artifacts and registered volumes are written, relative to the volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathConvention {
    /// `.{name}_SBI.pcd` and `.{name}_registrated` next to the volume
    #[default]
    HiddenSibling,
    /// `.registrated/{name}_SBI.pcd` and `.registrated/{name}` next to the volume
    RegistratedDirectory,
}

/// Voxel adjacency used when labelling connected components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// 6 neighbours sharing a face
    Face,
    /// 26 neighbours sharing a face, edge or corner
    #[default]
    Full,
}

/// Array execution backend, chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    #[default]
    Serial,
    /// Rayon over slices
    Parallel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Run independent series on the rayon pool
    pub parallel_series: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            minimum_file_number: 64,
            extensions: [".cb", ".png", ".tif", ".tiff", ".jpg", ".jpeg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_extension: "tif".to_string(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            scan_interval: crate::algorithms::DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        if content.trim_start().starts_with('{') {
            serde_json::from_str(&content).with_context(|| format!("Invalid JSON config {}", path.display()))
        } else {
            toml::from_str(&content).with_context(|| format!("Invalid TOML config {}", path.display()))
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.volume.minimum_file_number == 0 {
            errors.push("volume.minimum_file_number must be positive".to_string());
        }

        if self.volume.extensions.is_empty() {
            errors.push("volume.extensions must list at least one extension".to_string());
        }

        if let Some(ext) = self.volume.extensions.iter().find(|e| !e.starts_with('.')) {
            errors.push(format!("volume.extensions entry '{}' must start with '.'", ext));
        }

        if self.volume.output_extension.trim_start_matches('.').is_empty() {
            errors.push("volume.output_extension must not be empty".to_string());
        }

        if self.threshold.scan_interval == 0 {
            errors.push("threshold.scan_interval must be positive".to_string());
        }

        if !(self.icp.max_correspondence_distance > 0.0) {
            errors.push("icp.max_correspondence_distance must be positive".to_string());
        }

        if self.icp.max_iterations == 0 {
            errors.push("icp.max_iterations must be positive".to_string());
        }

        if self.icp.relative_fitness < 0.0 || self.icp.relative_rmse < 0.0 {
            errors.push("icp tolerances must be non-negative".to_string());
        }

        if let Err(e) = self.logging.validate() {
            errors.push(format!("logging: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConfigFormat {
    Json,
    Toml,
}

/// Load and validate `config_path`, falling back to defaults on any problem.
///
/// Logging is not up yet when this runs, so problems go to stderr.
pub fn load_config_or_default(config_path: Option<&Path>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    eprintln!("Configuration validation errors:");
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                    eprintln!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                eprintln!("Failed to load config from '{}': {:#}", path.display(), e);
                eprintln!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.volume.minimum_file_number, 64);
        assert_eq!(config.volume.extensions.len(), 6);
        assert_eq!(config.threshold.scan_interval, 128);
        assert_eq!(config.icp.max_correspondence_distance, 100.0);
        assert_eq!(config.policy.path_convention, PathConvention::HiddenSibling);
        assert_eq!(config.policy.feature_connectivity, Connectivity::Full);
        assert!(!config.policy.preserve_background_mask);
        assert_eq!(config.backend, ExecutionBackend::Serial);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            backend = "parallel"

            [policy]
            path_convention = "registrated_directory"
            feature_connectivity = "face"

            [volume]
            minimum_file_number = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, ExecutionBackend::Parallel);
        assert_eq!(config.policy.path_convention, PathConvention::RegistratedDirectory);
        assert_eq!(config.policy.feature_connectivity, Connectivity::Face);
        assert_eq!(config.volume.minimum_file_number, 3);
        assert_eq!(config.volume.output_extension, "tif");
        assert_eq!(config.icp.max_iterations, 30);
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.policy.preserve_background_mask = true;
        config.batch.parallel_series = true;

        for (name, format) in [("c.json", ConfigFormat::Json), ("c.toml", ConfigFormat::Toml)] {
            let path = dir.path().join(name);
            config.save_to_file(&path, format).unwrap();
            assert_eq!(Config::load_from_file(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = Config::default();
        config.volume.minimum_file_number = 0;
        config.threshold.scan_interval = 0;
        config.icp.max_correspondence_distance = -1.0;
        config.volume.extensions = vec!["png".to_string()];

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "volume = 12").unwrap();
        assert_eq!(load_config_or_default(Some(path.as_path())), Config::default());

        std::fs::write(&path, "[threshold]\nscan_interval = 0\n").unwrap();
        assert_eq!(load_config_or_default(Some(path.as_path())), Config::default());
    }
}
