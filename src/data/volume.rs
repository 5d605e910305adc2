use crate::{Result, SbiError};
use ndarray::{s, Array2, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Sample width of the images a volume was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

/// Ordered stack of equally sized 2D slices, indexed `(z, y, x)`.
///
/// Samples are held as `u16` whatever the source bit depth; `bit_depth` records what
/// the volume has to be written back as.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeStack {
    data: Array3<u16>,
    bit_depth: BitDepth,
}

impl VolumeStack {
    pub fn new(data: Array3<u16>, bit_depth: BitDepth) -> Result<Self> {
        if data.is_empty() {
            return Err(SbiError::EmptyVolume(data.dim()));
        }
        Ok(Self { data, bit_depth })
    }

    /// Stack slices in acquisition order. Callers guarantee equal slice shapes.
    pub fn from_slices(slices: &[Array2<u16>], bit_depth: BitDepth) -> Result<Self> {
        let views: Vec<_> = slices.iter().map(|s| s.view()).collect();
        if views.is_empty() {
            return Err(SbiError::EmptyVolume((0, 0, 0)));
        }
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|_| SbiError::EmptyVolume((slices.len(), 0, 0)))?;
        Self::new(data, bit_depth)
    }

    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    pub fn into_data(self) -> Array3<u16> {
        self.data
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Slice indices `N/4 .. 3N/4`, the part of the scan used for SBI features.
    pub fn central_range(&self) -> Range<usize> {
        let n = self.depth();
        n / 4..3 * n / 4
    }

    pub fn central(&self) -> ArrayView3<'_, u16> {
        let range = self.central_range();
        self.data.slice(s![range, .., ..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_range() {
        let volume = VolumeStack::new(Array3::zeros((8, 2, 2)), BitDepth::Sixteen).unwrap();
        assert_eq!(volume.central_range(), 2..6);
        assert_eq!(volume.central().dim(), (4, 2, 2));

        let volume = VolumeStack::new(Array3::zeros((3, 2, 2)), BitDepth::Sixteen).unwrap();
        assert_eq!(volume.central_range(), 0..2);

        let volume = VolumeStack::new(Array3::zeros((1, 2, 2)), BitDepth::Sixteen).unwrap();
        assert!(volume.central_range().is_empty());
    }

    #[test]
    fn test_empty_volume_rejected() {
        assert!(VolumeStack::new(Array3::zeros((0, 4, 4)), BitDepth::Eight).is_err());
        assert!(VolumeStack::from_slices(&[], BitDepth::Eight).is_err());
    }

    #[test]
    fn test_from_slices_keeps_order() {
        let slices: Vec<Array2<u16>> = (0..3).map(|z| Array2::from_elem((2, 3), z as u16)).collect();
        let volume = VolumeStack::from_slices(&slices, BitDepth::Eight).unwrap();
        assert_eq!(volume.shape(), (3, 2, 3));
        assert_eq!(volume.data()[[2, 1, 2]], 2);
        assert_eq!(volume.bit_depth(), BitDepth::Eight);
    }
}
