use ndarray::Array3;
use sbi_registration::config::ExecutionBackend;
use sbi_registration::{BitDepth, RigidTransform2D, VolumeStack, VolumeTransformer};

fn gradient_volume() -> VolumeStack {
    let data = Array3::from_shape_fn((3, 12, 9), |(z, y, x)| (1 + z * 200 + y * 13 + x * 7) as u16);
    VolumeStack::new(data, BitDepth::Sixteen).unwrap()
}

fn transform(degree: f64, shift_x: i64, shift_y: i64) -> RigidTransform2D {
    RigidTransform2D {
        degree,
        shift_x,
        shift_y,
    }
}

#[test]
fn test_identity_round_trip() {
    let volume = gradient_volume();
    for backend in [ExecutionBackend::Serial, ExecutionBackend::Parallel] {
        for mask in [false, true] {
            let out = VolumeTransformer::new(backend, mask)
                .apply(volume.clone(), &RigidTransform2D::identity())
                .unwrap();
            assert_eq!(out, volume);
        }
    }
}

#[test]
fn test_shape_preserved_for_any_transform() {
    let volume = gradient_volume();
    let transformer = VolumeTransformer::new(ExecutionBackend::Serial, false);

    for &degree in &[0.0, 1.5, -33.0, 90.0, 180.0, 271.25] {
        for &(sx, sy) in &[(0, 0), (3, -2), (-8, 11), (9, 12), (100, -100)] {
            let out = transformer.apply(volume.clone(), &transform(degree, sx, sy)).unwrap();
            assert_eq!(out.shape(), volume.shape(), "degree {degree}, shift ({sx}, {sy})");
            assert_eq!(out.bit_depth(), BitDepth::Sixteen);
        }
    }
}

#[test]
fn test_shift_beyond_volume_is_all_zero() {
    let out = VolumeTransformer::new(ExecutionBackend::Serial, false)
        .apply(gradient_volume(), &transform(0.0, 9, 0))
        .unwrap();
    assert!(out.data().iter().all(|&v| v == 0));
}

#[test]
fn test_pure_shift_moves_content() {
    let volume = gradient_volume();
    let out = VolumeTransformer::new(ExecutionBackend::Serial, false)
        .apply(volume.clone(), &transform(0.0, 2, -1))
        .unwrap();

    // out[y, x] = in[y + 1, x - 2]
    assert_eq!(out.data()[[1, 4, 5]], volume.data()[[1, 5, 3]]);
    assert_eq!(out.data()[[0, 11, 5]], 0);
    assert_eq!(out.data()[[0, 3, 1]], 0);
}

#[test]
fn test_half_turn() {
    let volume = gradient_volume();
    let out = VolumeTransformer::new(ExecutionBackend::Serial, false)
        .apply(volume.clone(), &transform(180.0, 0, 0))
        .unwrap();

    let (_, h, w) = volume.shape();
    assert_eq!(out.data()[[2, 0, 0]], volume.data()[[2, h - 1, w - 1]]);
    assert_eq!(out.data()[[0, 3, 7]], volume.data()[[0, h - 4, w - 8]]);
}
