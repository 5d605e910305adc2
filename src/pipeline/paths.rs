use crate::config::PathConvention;
use std::path::{Path, PathBuf};

/// Directory that holds SBI artifacts and registered volumes under
/// [`PathConvention::RegistratedDirectory`].
pub const REGISTRATED_DIRECTORY: &str = ".registrated";

/// Artifact locations derived from a volume directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePaths {
    pub volume: PathBuf,
    /// Persisted SBI point set
    pub sbi_artifact: PathBuf,
    /// Output directory of the registered volume
    pub registered_volume: PathBuf,
}

impl VolumePaths {
    pub fn new(volume: &Path, convention: PathConvention) -> Self {
        let base = base_name(volume);
        let parent = volume.parent().map(Path::to_path_buf).unwrap_or_default();

        let (sbi_artifact, registered_volume) = match convention {
            PathConvention::HiddenSibling => (
                parent.join(format!(".{base}_SBI.pcd")),
                parent.join(format!(".{base}_registrated")),
            ),
            PathConvention::RegistratedDirectory => {
                let dir = parent.join(REGISTRATED_DIRECTORY);
                (dir.join(format!("{base}_SBI.pcd")), dir.join(&base))
            }
        };

        Self {
            volume: volume.to_path_buf(),
            sbi_artifact,
            registered_volume,
        }
    }
}

/// Last component of `volume`, resolving `.`-style paths through the filesystem.
fn base_name(volume: &Path) -> String {
    volume
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            std::fs::canonicalize(volume)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "volume".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_sibling() {
        let paths = VolumePaths::new(Path::new("/data/seed_A/day_03/"), PathConvention::HiddenSibling);
        assert_eq!(paths.sbi_artifact, Path::new("/data/seed_A/.day_03_SBI.pcd"));
        assert_eq!(paths.registered_volume, Path::new("/data/seed_A/.day_03_registrated"));
    }

    #[test]
    fn test_registrated_directory() {
        let paths = VolumePaths::new(Path::new("/data/seed_A/day_03"), PathConvention::RegistratedDirectory);
        assert_eq!(paths.sbi_artifact, Path::new("/data/seed_A/.registrated/day_03_SBI.pcd"));
        assert_eq!(paths.registered_volume, Path::new("/data/seed_A/.registrated/day_03"));
    }

    #[test]
    fn test_relative_volume() {
        let paths = VolumePaths::new(Path::new("day_01"), PathConvention::HiddenSibling);
        assert_eq!(paths.sbi_artifact, Path::new(".day_01_SBI.pcd"));
    }
}
