use approx::assert_relative_eq;
use ndarray::{s, Array3};
use sbi_registration::config::{Connectivity, ExecutionBackend};
use sbi_registration::{BitDepth, FeatureExtractor, SbiError, ThresholdEstimator, VolumeStack};

fn extractor(connectivity: Connectivity, backend: ExecutionBackend) -> FeatureExtractor {
    FeatureExtractor::new(ThresholdEstimator::default(), connectivity, backend)
}

/// 8 slices of 16x20 background at 100 with one bright 2x3x2 blob in the central range.
fn single_blob_volume() -> VolumeStack {
    let mut data = Array3::<u16>::from_elem((8, 16, 20), 100);
    data.slice_mut(s![3..5, 4..7, 10..12]).fill(2000);
    // Outside the central slices 2..6, must be ignored
    data.slice_mut(s![0, 1..3, 1..3]).fill(2000);
    VolumeStack::new(data, BitDepth::Sixteen).unwrap()
}

#[test]
fn test_single_blob_point() {
    let volume = single_blob_volume();
    let points = FeatureExtractor::default().build(&volume).unwrap();

    assert_eq!(points.len(), 1);
    // centroid (y, x) = (5, 10.5); x = 10.5 - 20/2, y = (16 - 5 - 1) - 16/2
    let p = points.points()[0];
    assert_relative_eq!(p.x, 0.5);
    assert_relative_eq!(p.y, 2.0);
}

#[test]
fn test_backends_agree() {
    let volume = single_blob_volume();
    let serial = extractor(Connectivity::Full, ExecutionBackend::Serial).build(&volume).unwrap();
    let parallel = extractor(Connectivity::Full, ExecutionBackend::Parallel).build(&volume).unwrap();
    assert_eq!(serial, parallel);
}

#[test]
fn test_connectivity_policy() {
    // Two voxels touching only at a corner, in adjacent slices
    let mut data = Array3::<u16>::zeros((4, 6, 6));
    data[[1, 1, 1]] = 900;
    data[[2, 2, 2]] = 900;
    let volume = VolumeStack::new(data, BitDepth::Sixteen).unwrap();

    let face = extractor(Connectivity::Face, ExecutionBackend::Serial).extract(&volume, 500).unwrap();
    assert_eq!(face.len(), 2);

    let full = extractor(Connectivity::Full, ExecutionBackend::Serial).extract(&volume, 500).unwrap();
    assert_eq!(full.len(), 1);
    // centroid (y, x) = (1.5, 1.5) on a 6x6 slice
    assert_relative_eq!(full.points()[0].x, -1.5);
    assert_relative_eq!(full.points()[0].y, 0.5);
}

#[test]
fn test_threshold_is_strict() {
    let mut data = Array3::<u16>::from_elem((4, 5, 5), 10);
    data[[1, 2, 2]] = 500;
    let volume = VolumeStack::new(data, BitDepth::Sixteen).unwrap();

    let fx = FeatureExtractor::default();
    assert_eq!(fx.extract(&volume, 499).unwrap().len(), 1);
    assert!(matches!(fx.extract(&volume, 500), Err(SbiError::NoFeatures)));
}

#[test]
fn test_every_component_counts() {
    let mut data = Array3::<u16>::zeros((4, 10, 10));
    for &(y, x) in &[(1, 1), (1, 8), (8, 1), (8, 8), (5, 5)] {
        data[[1, y, x]] = 700;
    }
    let volume = VolumeStack::new(data, BitDepth::Sixteen).unwrap();

    let points = FeatureExtractor::default().extract(&volume, 100).unwrap();
    assert_eq!(points.len(), 5);
    assert_relative_eq!(points.center().x, -0.4, epsilon = 1e-12);
    assert_relative_eq!(points.center().y, -0.6, epsilon = 1e-12);
}
