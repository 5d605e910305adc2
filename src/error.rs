use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, segmenting or registering a volume.
///
/// Everything except `Io` and `Image` is an input problem with the volume itself;
/// the batch runner turns any of them into a failed outcome for that volume only.
#[derive(Error, Debug)]
pub enum SbiError {
    #[error("volume directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("{dir} holds {found} image files, at least {minimum} are required")]
    TooFewImages {
        dir: PathBuf,
        found: usize,
        minimum: usize,
    },

    #[error("volume has no voxels, shape {0:?}")]
    EmptyVolume((usize, usize, usize)),

    #[error("no nonzero voxels in the central sub-volume, histogram is empty")]
    EmptyHistogram,

    #[error("segmentation produced no feature points")]
    NoFeatures,

    #[error("point set is empty")]
    EmptyPointSet,

    #[error("slice {path} is {found:?} (h, w), expected {expected:?}")]
    ShapeMismatch {
        path: PathBuf,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("cannot decode {0}: {1}")]
    UnsupportedImage(PathBuf, String),

    #[error("malformed point cloud file {path}: {reason}")]
    Pcd { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl SbiError {
    /// True for problems with the input data rather than the environment.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, SbiError::Io(_) | SbiError::Image(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        assert!(SbiError::EmptyHistogram.is_input_error());
        assert!(SbiError::TooFewImages {
            dir: PathBuf::from("vol"),
            found: 3,
            minimum: 64
        }
        .is_input_error());

        let io = SbiError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!io.is_input_error());
    }
}
