use crate::data::{BitDepth, VolumeStack};
use crate::Result;
use image::{ImageBuffer, Luma};
use ndarray::Axis;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes a volume as `img0000.<ext>`, `img0001.<ext>`, ... one file per slice.
#[derive(Debug, Clone)]
pub struct VolumeSaver {
    extension: String,
}

impl VolumeSaver {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_lowercase(),
        }
    }

    /// File name of slice `index`.
    pub fn slice_file_name(&self, index: usize) -> String {
        format!("img{:04}.{}", index, self.extension)
    }

    fn supports_sixteen_bit(&self) -> bool {
        matches!(self.extension.as_str(), "tif" | "tiff" | "png")
    }

    pub fn save(&self, volume: &VolumeStack, destination: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(destination)?;

        info!(
            count = volume.depth(),
            directory = %destination.display(),
            "Saving registered volume"
        );

        let (_, height, width) = volume.shape();
        let sixteen = volume.bit_depth() == BitDepth::Sixteen && self.supports_sixteen_bit();
        let mut written = Vec::with_capacity(volume.depth());

        for (index, slice) in volume.data().axis_iter(Axis(0)).enumerate() {
            let path = destination.join(self.slice_file_name(index));

            if sixteen {
                let raw: Vec<u16> = slice.iter().copied().collect();
                let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
                    ImageBuffer::from_raw(width as u32, height as u32, raw)
                        .ok_or_else(|| std::io::Error::other("slice buffer size mismatch"))?;
                buffer.save(&path)?;
            } else {
                let raw: Vec<u8> = match volume.bit_depth() {
                    BitDepth::Eight => slice.iter().map(|&v| v.min(255) as u8).collect(),
                    BitDepth::Sixteen => slice.iter().map(|&v| (v >> 8) as u8).collect(),
                };
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width as u32, height as u32, raw)
                        .ok_or_else(|| std::io::Error::other("slice buffer size mismatch"))?;
                buffer.save(&path)?;
            }

            written.push(path);
        }

        Ok(written)
    }
}
