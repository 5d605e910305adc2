use crate::config::VolumeConfig;
use crate::data::{BitDepth, VolumeStack};
use crate::{Result, SbiError};
use image::{DynamicImage, ImageError};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Reads a directory of 2D slice images into a [`VolumeStack`].
#[derive(Debug, Clone)]
pub struct VolumeLoader {
    minimum_file_number: usize,
    extensions: Vec<String>,
}

impl Default for VolumeLoader {
    fn default() -> Self {
        Self::new(&VolumeConfig::default())
    }
}

impl VolumeLoader {
    pub fn new(config: &VolumeConfig) -> Self {
        Self {
            minimum_file_number: config.minimum_file_number,
            extensions: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Slice files of `dir` sorted by name.
    ///
    /// Only the most common extension is kept; on a tie the one listed first wins.
    /// Dot-files are ignored.
    pub fn image_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(SbiError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.starts_with('.') || !entry.path().is_file() {
                continue;
            }
            candidates.push((name, entry.path()));
        }

        let mut best: Option<(&str, usize)> = None;
        for ext in &self.extensions {
            let count = candidates.iter().filter(|(name, _)| name.ends_with(ext.as_str())).count();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((ext.as_str(), count));
            }
        }

        let Some((ext, _)) = best else {
            return Ok(Vec::new());
        };

        let mut files: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|(name, _)| name.ends_with(ext))
            .map(|(_, path)| path)
            .collect();
        files.sort();
        Ok(files)
    }

    pub fn image_file_number(&self, dir: &Path) -> usize {
        self.image_files(dir).map(|files| files.len()).unwrap_or(0)
    }

    /// A directory is a volume when it holds at least `minimum_file_number` slices.
    pub fn is_volume_directory(&self, dir: &Path) -> bool {
        self.image_file_number(dir) >= self.minimum_file_number
    }

    pub fn load(&self, dir: &Path) -> Result<VolumeStack> {
        let files = self.image_files(dir)?;
        if files.len() < self.minimum_file_number {
            return Err(SbiError::TooFewImages {
                dir: dir.to_path_buf(),
                found: files.len(),
                minimum: self.minimum_file_number,
            });
        }

        info!(count = files.len(), directory = %dir.display(), "Loading image files");

        let mut slices = Vec::with_capacity(files.len());
        let mut depths = Vec::with_capacity(files.len());
        let mut expected = None;

        for file in &files {
            let (slice, depth) = load_slice(file)?;
            match expected {
                None => expected = Some(slice.dim()),
                Some(shape) if shape != slice.dim() => {
                    return Err(SbiError::ShapeMismatch {
                        path: file.clone(),
                        expected: shape,
                        found: slice.dim(),
                    });
                }
                Some(_) => {}
            }
            slices.push(slice);
            depths.push(depth);
        }

        let bit_depth = if depths.contains(&BitDepth::Sixteen) {
            BitDepth::Sixteen
        } else {
            BitDepth::Eight
        };
        if bit_depth == BitDepth::Sixteen && depths.contains(&BitDepth::Eight) {
            warn!(directory = %dir.display(), "Mixed 8/16-bit slices, widening 8-bit slices");
            // Same widening as image's 8 to 16-bit luma conversion
            for (slice, _) in slices
                .iter_mut()
                .zip(&depths)
                .filter(|(_, depth)| **depth == BitDepth::Eight)
            {
                slice.mapv_inplace(|v| v * 257);
            }
        }

        let volume = VolumeStack::from_slices(&slices, bit_depth)?;
        debug!(shape = ?volume.shape(), bit_depth = ?bit_depth, "Volume loaded");
        Ok(volume)
    }
}

/// Decode one slice as grayscale, keeping 8/16-bit samples as they are.
pub fn load_slice(path: &Path) -> Result<(Array2<u16>, BitDepth)> {
    let image = image::open(path).map_err(|e| match e {
        ImageError::Unsupported(_) | ImageError::Decoding(_) => {
            SbiError::UnsupportedImage(path.to_path_buf(), e.to_string())
        }
        other => SbiError::Image(other),
    })?;

    let (width, height) = (image.width() as usize, image.height() as usize);
    let (samples, depth) = match image {
        DynamicImage::ImageLuma8(img) => (
            img.into_raw().into_iter().map(u16::from).collect::<Vec<_>>(),
            BitDepth::Eight,
        ),
        DynamicImage::ImageLuma16(img) => (img.into_raw(), BitDepth::Sixteen),
        other => (other.to_luma16().into_raw(), BitDepth::Sixteen),
    };

    let slice = Array2::from_shape_vec((height, width), samples)
        .map_err(|e| SbiError::UnsupportedImage(path.to_path_buf(), e.to_string()))?;
    Ok((slice, depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};
    use tempfile::tempdir;

    fn loader(minimum: usize) -> VolumeLoader {
        VolumeLoader::new(&VolumeConfig {
            minimum_file_number: minimum,
            ..VolumeConfig::default()
        })
    }

    #[test]
    fn test_most_common_extension_wins() {
        let dir = tempdir().unwrap();
        for i in 0..3 {
            GrayImage::new(4, 4).save(dir.path().join(format!("s{i}.png"))).unwrap();
        }
        GrayImage::new(4, 4).save(dir.path().join("extra.tif")).unwrap();
        std::fs::write(dir.path().join(".hidden.png"), b"x").unwrap();

        let files = loader(1).image_files(dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_too_few_images() {
        let dir = tempdir().unwrap();
        GrayImage::new(4, 4).save(dir.path().join("img0000.png")).unwrap();

        let loader = loader(2);
        assert!(!loader.is_volume_directory(dir.path()));
        assert!(matches!(
            loader.load(dir.path()),
            Err(SbiError::TooFewImages { found: 1, minimum: 2, .. })
        ));
    }

    #[test]
    fn test_missing_directory() {
        let err = loader(1).load(Path::new("/nonexistent/volume")).unwrap_err();
        assert!(matches!(err, SbiError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_sixteen_bit_preserved() {
        let dir = tempdir().unwrap();
        for i in 0..2u16 {
            let img: ImageBuffer<Luma<u16>, Vec<u16>> =
                ImageBuffer::from_fn(3, 2, |x, _| Luma([1000 * (i + 1) + x as u16]));
            img.save(dir.path().join(format!("img{i:04}.png"))).unwrap();
        }

        let volume = loader(2).load(dir.path()).unwrap();
        assert_eq!(volume.shape(), (2, 2, 3));
        assert_eq!(volume.bit_depth(), BitDepth::Sixteen);
        assert_eq!(volume.data()[[1, 0, 2]], 2002);
    }

    #[test]
    fn test_mixed_depths_widened() {
        let dir = tempdir().unwrap();
        GrayImage::from_pixel(3, 2, Luma([200])).save(dir.path().join("img0000.png")).unwrap();
        let wide: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(3, 2, Luma([40000]));
        wide.save(dir.path().join("img0001.png")).unwrap();

        let volume = loader(2).load(dir.path()).unwrap();
        assert_eq!(volume.bit_depth(), BitDepth::Sixteen);
        assert_eq!(volume.data()[[0, 1, 1]], 200 * 257);
        assert_eq!(volume.data()[[1, 1, 1]], 40000);
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = tempdir().unwrap();
        GrayImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
        GrayImage::new(5, 4).save(dir.path().join("b.png")).unwrap();

        assert!(matches!(
            loader(2).load(dir.path()),
            Err(SbiError::ShapeMismatch { .. })
        ));
    }
}
