use crate::algorithms::RigidTransform2D;
use crate::config::{Config, ExecutionBackend};
use crate::data::VolumeStack;
use crate::Result;
use ndarray::{s, Array3, ArrayView2, ArrayViewMut2, Zip};
use tracing::{debug, info};

/// Applies an in-plane rigid transform to every slice of a volume.
///
/// Output always has the input's shape: rotation does not resize and the
/// translation zero-fills whatever is shifted in from outside the frame.
#[derive(Debug, Clone, Copy)]
pub struct VolumeTransformer {
    backend: ExecutionBackend,
    preserve_background_mask: bool,
}

impl VolumeTransformer {
    pub fn new(backend: ExecutionBackend, preserve_background_mask: bool) -> Self {
        Self {
            backend,
            preserve_background_mask,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backend, config.policy.preserve_background_mask)
    }

    /// Rotate about the slice centre, then shift by whole pixels.
    pub fn apply(&self, volume: VolumeStack, transform: &RigidTransform2D) -> Result<VolumeStack> {
        info!(
            degree = transform.degree,
            shift_x = transform.shift_x,
            shift_y = transform.shift_y,
            "Performing SBI-ICP registration"
        );

        let bit_depth = volume.bit_depth();
        let data = volume.into_data();

        let rotated = if transform.degree == 0.0 {
            data
        } else {
            let background = self.preserve_background_mask.then(|| data.mapv(|v| v == 0));
            let mut rotated = self.rotate(&data, transform.degree);
            if let Some(mask) = background {
                Zip::from(&mut rotated).and(&mask).for_each(|v, &empty| {
                    if empty {
                        *v = 0;
                    }
                });
            }
            rotated
        };

        let shifted = translate(&rotated, transform.shift_y, transform.shift_x);
        VolumeStack::new(shifted, bit_depth)
    }

    /// First-order rotation of each y-x slice by `degrees`, zero outside the input.
    pub fn rotate(&self, data: &Array3<u16>, degrees: f64) -> Array3<u16> {
        let (sin_a, cos_a) = degrees.to_radians().sin_cos();
        let mut out = Array3::<u16>::zeros(data.raw_dim());

        let zip = Zip::from(out.outer_iter_mut()).and(data.outer_iter());
        match self.backend {
            ExecutionBackend::Serial => {
                zip.for_each(|dst, src| rotate_slice(src, dst, sin_a, cos_a));
            }
            ExecutionBackend::Parallel => {
                zip.par_for_each(|dst, src| rotate_slice(src, dst, sin_a, cos_a));
            }
        }

        debug!(degrees, backend = ?self.backend, "Slices rotated");
        out
    }
}

fn rotate_slice(src: ArrayView2<u16>, mut dst: ArrayViewMut2<u16>, sin_a: f64, cos_a: f64) {
    let (height, width) = src.dim();
    let center_y = (height as f64 - 1.0) / 2.0;
    let center_x = (width as f64 - 1.0) / 2.0;

    for ((oy, ox), value) in dst.indexed_iter_mut() {
        let dy = oy as f64 - center_y;
        let dx = ox as f64 - center_x;

        // Inverse mapping: output coordinate -> input coordinate
        let in_y = cos_a * dy + sin_a * dx + center_y;
        let in_x = -sin_a * dy + cos_a * dx + center_x;

        *value = bilinear_interpolate(&src, in_y, in_x)
            .map(|v| v.round().clamp(0.0, u16::MAX as f64) as u16)
            .unwrap_or(0);
    }
}

/// Rounding noise of the rotation tolerated at the slice border.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Bilinear sample at `(y, x)`; `None` outside `[0, len - 1]` on either axis.
fn bilinear_interpolate(image: &ArrayView2<u16>, y: f64, x: f64) -> Option<f64> {
    let (height, width) = image.dim();
    let (max_y, max_x) = ((height - 1) as f64, (width - 1) as f64);
    if y < -EDGE_TOLERANCE || x < -EDGE_TOLERANCE || y > max_y + EDGE_TOLERANCE || x > max_x + EDGE_TOLERANCE {
        return None;
    }
    let (y, x) = (y.clamp(0.0, max_y), x.clamp(0.0, max_x));

    let y1 = y.floor() as usize;
    let x1 = x.floor() as usize;
    let y2 = (y1 + 1).min(height - 1);
    let x2 = (x1 + 1).min(width - 1);

    let fy = y - y1 as f64;
    let fx = x - x1 as f64;

    let p11 = image[[y1, x1]] as f64;
    let p12 = image[[y2, x1]] as f64;
    let p21 = image[[y1, x2]] as f64;
    let p22 = image[[y2, x2]] as f64;

    Some(
        p11 * (1.0 - fx) * (1.0 - fy)
            + p21 * fx * (1.0 - fy)
            + p12 * (1.0 - fx) * fy
            + p22 * fx * fy,
    )
}

/// Destination and source ranges along one axis for an integer shift.
fn shifted_span(len: usize, shift: i64) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let magnitude = shift.unsigned_abs() as usize;
    if magnitude >= len {
        return None;
    }
    if shift >= 0 {
        Some((magnitude..len, 0..len - magnitude))
    } else {
        Some((0..len - magnitude, magnitude..len))
    }
}

/// `out[z, y, x] = data[z, y - shift_y, x - shift_x]`, zero where that falls outside.
///
/// Same result as padding both sides by `|shift|` and cropping the original window
/// at offset `|shift| - shift`; never wraps around.
pub fn translate(data: &Array3<u16>, shift_y: i64, shift_x: i64) -> Array3<u16> {
    if shift_y == 0 && shift_x == 0 {
        return data.clone();
    }

    let (_, height, width) = data.dim();
    let mut out = Array3::<u16>::zeros(data.raw_dim());

    if let (Some((dst_y, src_y)), Some((dst_x, src_x))) =
        (shifted_span(height, shift_y), shifted_span(width, shift_x))
    {
        out.slice_mut(s![.., dst_y, dst_x])
            .assign(&data.slice(s![.., src_y, src_x]));
    }

    out
}
