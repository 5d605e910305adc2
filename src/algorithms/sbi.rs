//! SBI feature extraction: bright blobs of the central sub-volume, flattened to 2D points.

use crate::algorithms::ThresholdEstimator;
use crate::config::{Config, Connectivity, ExecutionBackend};
use crate::data::{FeaturePoint, SbiPointSet, VolumeStack};
use crate::{Result, SbiError};
use ndarray::{Array3, ArrayView3, Zip};
use std::collections::VecDeque;
use tracing::{debug, info};

type Voxel = (usize, usize, usize);

/// Accumulated voxel coordinates of one connected component.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Component {
    pub voxels: usize,
    sum_z: f64,
    sum_y: f64,
    sum_x: f64,
}

impl Component {
    fn add(&mut self, (z, y, x): Voxel) {
        self.voxels += 1;
        self.sum_z += z as f64;
        self.sum_y += y as f64;
        self.sum_x += x as f64;
    }

    /// Mean `(z, y, x)` of the component's voxels.
    pub fn centroid(&self) -> (f64, f64, f64) {
        let n = self.voxels as f64;
        (self.sum_z / n, self.sum_y / n, self.sum_x / n)
    }
}

fn neighbour_offsets(connectivity: Connectivity) -> Vec<(isize, isize, isize)> {
    let mut offsets = Vec::with_capacity(26);
    for dz in -1isize..=1 {
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let steps = dz.abs() + dy.abs() + dx.abs();
                let keep = match connectivity {
                    Connectivity::Face => steps == 1,
                    Connectivity::Full => steps > 0,
                };
                if keep {
                    offsets.push((dz, dy, dx));
                }
            }
        }
    }
    offsets
}

/// Connected components of `mask` in scan order (z, then y, then x of the first voxel).
pub fn label_components(mask: &Array3<bool>, connectivity: Connectivity) -> Vec<Component> {
    let (depth, height, width) = mask.dim();
    let offsets = neighbour_offsets(connectivity);
    let mut visited = Array3::<bool>::from_elem(mask.raw_dim(), false);
    let mut components = Vec::new();
    let mut queue: VecDeque<Voxel> = VecDeque::new();

    for (start, &foreground) in mask.indexed_iter() {
        if !foreground || visited[start] {
            continue;
        }

        let mut component = Component::default();
        visited[start] = true;
        queue.push_back(start);

        while let Some(voxel) = queue.pop_front() {
            component.add(voxel);
            let (z, y, x) = voxel;

            for &(dz, dy, dx) in &offsets {
                let (nz, ny, nx) = (
                    z.wrapping_add_signed(dz),
                    y.wrapping_add_signed(dy),
                    x.wrapping_add_signed(dx),
                );
                // wrapped indices land far above the bounds
                if nz >= depth || ny >= height || nx >= width {
                    continue;
                }
                let next = (nz, ny, nx);
                if mask[next] && !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }

        components.push(component);
    }

    components
}

/// Builds the SBI point set of a volume.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    estimator: ThresholdEstimator,
    connectivity: Connectivity,
    backend: ExecutionBackend,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ThresholdEstimator::default(), Connectivity::Full, ExecutionBackend::Serial)
    }
}

impl FeatureExtractor {
    pub fn new(estimator: ThresholdEstimator, connectivity: Connectivity, backend: ExecutionBackend) -> Self {
        Self {
            estimator,
            connectivity,
            backend,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ThresholdEstimator::new(config.threshold.scan_interval),
            config.policy.feature_connectivity,
            config.backend,
        )
    }

    /// Threshold of the volume's central slices.
    pub fn threshold(&self, volume: &VolumeStack) -> Result<u16> {
        self.estimator.estimate(&volume.central())
    }

    /// Threshold the volume, then extract its feature points.
    pub fn build(&self, volume: &VolumeStack) -> Result<SbiPointSet> {
        let threshold = self.threshold(volume)?;
        info!(threshold, "Applying SBI threshold");
        self.extract(volume, threshold)
    }

    /// One point per connected component of `voxel > threshold` in the central slices.
    ///
    /// Points are centred on the full slice with y pointing up:
    /// `x = cx - W/2`, `y = (H - cy - 1) - H/2`.
    pub fn extract(&self, volume: &VolumeStack, threshold: u16) -> Result<SbiPointSet> {
        let mask = self.foreground_mask(&volume.central(), threshold);
        let components = label_components(&mask, self.connectivity);

        if components.is_empty() {
            return Err(SbiError::NoFeatures);
        }

        let half_w = (volume.width() / 2) as f64;
        let half_h = (volume.height() / 2) as f64;
        let height = volume.height() as f64;

        let points: SbiPointSet = components
            .iter()
            .map(|c| {
                let (_, cy, cx) = c.centroid();
                FeaturePoint::new(cx - half_w, (height - cy - 1.0) - half_h)
            })
            .collect();

        debug!(
            components = components.len(),
            connectivity = ?self.connectivity,
            "Connected components labelled"
        );
        Ok(points)
    }

    fn foreground_mask(&self, sub_volume: &ArrayView3<u16>, threshold: u16) -> Array3<bool> {
        let mut mask = Array3::from_elem(sub_volume.raw_dim(), false);
        let zip = Zip::from(&mut mask).and(sub_volume);
        match self.backend {
            ExecutionBackend::Serial => zip.for_each(|m, &v| *m = v > threshold),
            ExecutionBackend::Parallel => zip.par_for_each(|m, &v| *m = v > threshold),
        }
        mask
    }
}
