use ndarray::{s, Array3};
use sbi_registration::{BitDepth, FeatureExtractor, SbiError, ThresholdEstimator, VolumeStack};

/// 4-slice volume whose central slices (1 and 2) hold `values`, padded with zeros.
/// The outer slices are saturated so any leak outside the central range shows up.
fn central_volume(values: &[u16]) -> VolumeStack {
    let mut data = Array3::<u16>::zeros((4, 30, 30));
    data.slice_mut(s![0, .., ..]).fill(4000);
    data.slice_mut(s![3, .., ..]).fill(4000);
    for (i, &v) in values.iter().enumerate() {
        let z = 1 + i / 900;
        let r = i % 900;
        data[[z, r / 30, r % 30]] = v;
    }
    VolumeStack::new(data, BitDepth::Sixteen).unwrap()
}

fn repeat(value: u16, count: usize) -> impl Iterator<Item = u16> {
    std::iter::repeat(value).take(count)
}

#[test]
fn test_single_sharp_peak() {
    let values: Vec<u16> = repeat(50, 100).chain(repeat(300, 1000)).chain(repeat(310, 10)).collect();
    let volume = central_volume(&values);

    let threshold = FeatureExtractor::default().threshold(&volume).unwrap();
    assert_eq!(threshold, 300);
}

#[test]
fn test_walk_stops_when_count_rises() {
    // Peak at 1000, then 400 -> 200 -> 100 -> 150 every 128 units
    let values: Vec<u16> = repeat(10, 50)
        .chain(repeat(1000, 400))
        .chain(repeat(1128, 200))
        .chain(repeat(1256, 100))
        .chain(repeat(1384, 150))
        .collect();
    let volume = central_volume(&values);

    assert_eq!(ThresholdEstimator::default().estimate(&volume.central()).unwrap(), 1256);
}

#[test]
fn test_walk_stops_at_histogram_end() {
    let values: Vec<u16> = repeat(10, 50)
        .chain(repeat(1000, 400))
        .chain(repeat(1128, 200))
        .chain(repeat(1256, 100))
        .collect();
    let volume = central_volume(&values);

    assert_eq!(ThresholdEstimator::default().estimate(&volume.central()).unwrap(), 1256);
}

#[test]
fn test_background_shoulder() {
    // The background bin is the peak, so a single step past it is taken
    let values: Vec<u16> = repeat(10, 500)
        .chain(repeat(1000, 400))
        .chain(repeat(1128, 200))
        .chain(repeat(1256, 300))
        .collect();
    let volume = central_volume(&values);

    assert_eq!(ThresholdEstimator::default().estimate(&volume.central()).unwrap(), 138);
}

#[test]
fn test_empty_central_range_is_an_error() {
    let volume = central_volume(&[]);
    assert!(matches!(
        FeatureExtractor::default().threshold(&volume),
        Err(SbiError::EmptyHistogram)
    ));
    assert!(matches!(
        FeatureExtractor::default().build(&volume),
        Err(SbiError::EmptyHistogram)
    ));
}
