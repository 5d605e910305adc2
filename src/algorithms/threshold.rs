use crate::{Result, SbiError};
use ndarray::ArrayView3;
use tracing::debug;

/// Default step, in intensity units, of the forward walk from the histogram peak.
pub const DEFAULT_SCAN_INTERVAL: usize = 128;

/// Unit-width histogram of the nonzero samples of a sub-volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Intensity of bin 0
    pub start: u16,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Bins span `min..=max` of the nonzero samples.
    pub fn of_nonzero(volume: &ArrayView3<u16>) -> Result<Self> {
        let (min, max) = volume
            .iter()
            .filter(|&&v| v > 0)
            .fold(None, |acc: Option<(u16, u16)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .ok_or(SbiError::EmptyHistogram)?;

        let mut counts = vec![0u64; (max - min) as usize + 1];
        for &v in volume.iter().filter(|&&v| v > 0) {
            counts[(v - min) as usize] += 1;
        }

        Ok(Self { start: min, counts })
    }

    pub fn intensity(&self, bin: usize) -> u16 {
        self.start + bin as u16
    }

    /// Otsu's threshold: the intensity maximising between-class variance.
    ///
    /// Samples strictly above the returned value form the foreground. A histogram
    /// with a single populated value returns that value.
    pub fn otsu(&self) -> u16 {
        let n = self.counts.len();
        if n < 2 {
            return self.start;
        }

        let values: Vec<f64> = (0..n).map(|i| self.intensity(i) as f64).collect();
        let counts: Vec<f64> = self.counts.iter().map(|&c| c as f64).collect();

        // Class weights and means from the low end (1) and from the high end (2)
        let mut weight1 = vec![0.0; n];
        let mut mean1 = vec![0.0; n];
        let (mut w, mut m) = (0.0, 0.0);
        for i in 0..n {
            w += counts[i];
            m += counts[i] * values[i];
            weight1[i] = w;
            mean1[i] = if w > 0.0 { m / w } else { 0.0 };
        }

        let mut weight2 = vec![0.0; n];
        let mut mean2 = vec![0.0; n];
        let (mut w, mut m) = (0.0, 0.0);
        for i in (0..n).rev() {
            w += counts[i];
            m += counts[i] * values[i];
            weight2[i] = w;
            mean2[i] = if w > 0.0 { m / w } else { 0.0 };
        }

        let mut best = 0;
        let mut best_variance = f64::NEG_INFINITY;
        for i in 0..n - 1 {
            let diff = mean1[i] - mean2[i + 1];
            let variance = weight1[i] * weight2[i + 1] * diff * diff;
            if variance > best_variance {
                best_variance = variance;
                best = i;
            }
        }

        self.intensity(best)
    }
}

/// Picks the foreground cutoff used to segment bright blobs.
///
/// Starts from Otsu's threshold, then walks forward from the histogram peak in
/// steps of `scan_interval` while the count keeps dropping.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEstimator {
    scan_interval: usize,
}

impl Default for ThresholdEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_INTERVAL)
    }
}

impl ThresholdEstimator {
    pub fn new(scan_interval: usize) -> Self {
        Self {
            scan_interval: scan_interval.max(1),
        }
    }

    /// Threshold of an already restricted sub-volume; zero samples are ignored.
    pub fn estimate(&self, sub_volume: &ArrayView3<u16>) -> Result<u16> {
        let histogram = Histogram::of_nonzero(sub_volume)?;
        let otsu = histogram.otsu();
        let threshold = self.walk_from_peak(&histogram, otsu);

        debug!(otsu, threshold, bins = histogram.counts.len(), "SBI threshold estimated");
        Ok(threshold)
    }

    fn walk_from_peak(&self, histogram: &Histogram, otsu: u16) -> u16 {
        let tail = &histogram.counts[(otsu - histogram.start) as usize..];

        // First maximum, as a stable argmax
        let mut peak = 0;
        for (i, &count) in tail.iter().enumerate() {
            if count > tail[peak] {
                peak = i;
            }
        }

        while peak + self.scan_interval < tail.len() {
            let next = peak + self.scan_interval;
            if tail[peak] <= tail[next] {
                break;
            }
            peak = next;
        }

        otsu + peak as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_histogram_skips_zero() {
        let data = Array3::from_shape_vec((1, 2, 3), vec![0, 5, 5, 7, 0, 9]).unwrap();
        let hist = Histogram::of_nonzero(&data.view()).unwrap();
        assert_eq!(hist.start, 5);
        assert_eq!(hist.counts, vec![2, 0, 1, 0, 1]);
    }

    #[test]
    fn test_empty_histogram_is_an_error() {
        let data = Array3::<u16>::zeros((2, 3, 3));
        assert!(matches!(
            ThresholdEstimator::default().estimate(&data.view()),
            Err(SbiError::EmptyHistogram)
        ));
    }

    #[test]
    fn test_otsu_two_levels() {
        // Every cut between the two levels separates them equally; the first wins
        let mut values = vec![100u16; 50];
        values.extend(std::iter::repeat(1000).take(10));
        let data = Array3::from_shape_vec((1, 6, 10), values).unwrap();
        let hist = Histogram::of_nonzero(&data.view()).unwrap();
        assert_eq!(hist.otsu(), 100);
    }

    #[test]
    fn test_otsu_three_clusters() {
        let mut values = vec![10u16; 40];
        values.extend(std::iter::repeat(12).take(40));
        values.extend(std::iter::repeat(200).take(20));
        let data = Array3::from_shape_vec((1, 10, 10), values).unwrap();
        let otsu = Histogram::of_nonzero(&data.view()).unwrap().otsu();
        assert!((12..200).contains(&otsu));
    }

    #[test]
    fn test_otsu_single_value() {
        let data = Array3::from_elem((1, 2, 2), 42u16);
        assert_eq!(Histogram::of_nonzero(&data.view()).unwrap().otsu(), 42);
    }
}
