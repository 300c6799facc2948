//! Percentile based contrast windowing.

use crate::volume::Volume;

use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;

/// Intensity interval that colour mapping is clamped to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayRange {
    pub low: f32,
    pub high: f32,
}

impl DisplayRange {
    pub fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    /// Thresholds at `min_pct` and `max_pct` over every finite sample of the
    /// volume. Both come out of a single sort.
    pub fn from_percentiles(volume: &Volume, min_pct: f64, max_pct: f64) -> Self {
        let sorted = sorted_samples(volume.data().iter().copied());
        Self {
            low: percentile_of_sorted(&sorted, min_pct),
            high: percentile_of_sorted(&sorted, max_pct),
        }
    }

    /// Position of `value` inside the range, clamped to `[0, 1]`. A zero
    /// width range maps everything at or above `low` to 1.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let width = self.high - self.low;
        if width <= 0.0 {
            return if value >= self.low { 1.0 } else { 0.0 };
        }
        ((value - self.low) / width).clamp(0.0, 1.0)
    }
}

fn sorted_samples(values: impl Iterator<Item = f32>) -> Vec<f32> {
    let mut samples: Vec<f32> = values.filter(|v| v.is_finite()).collect();
    samples.par_sort_unstable_by(f32::total_cmp);
    samples
}

/// Linear interpolation between closest ranks, the default estimator of
/// `numpy.percentile`. `sorted` must be ascending.
pub fn percentile_of_sorted(sorted: &[f32], pct: f64) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let a = sorted[lo] as f64;
    let b = sorted[hi] as f64;
    (a + (b - a) * frac) as f32
}

/// Percentile of an unsorted sample set.
pub fn percentile(values: &[f32], pct: f64) -> f32 {
    percentile_of_sorted(&sorted_samples(values.iter().copied()), pct)
}

/// Remembers the last computed range for a volume generation so that
/// repeated renders with unchanged inputs skip the sort.
#[derive(Debug, Default)]
pub struct WindowCache {
    entry: Option<(u64, i32, i32, DisplayRange)>,
}

impl WindowCache {
    pub fn get_or_compute(
        &mut self,
        generation: u64,
        volume: &Volume,
        min_pct: i32,
        max_pct: i32,
    ) -> DisplayRange {
        if let Some((g, lo, hi, range)) = self.entry {
            if g == generation && lo == min_pct && hi == max_pct {
                return range;
            }
        }
        let range = DisplayRange::from_percentiles(volume, min_pct as f64, max_pct as f64);
        tracing::debug!(generation, min_pct, max_pct, ?range, "computed display range");
        self.entry = Some((generation, min_pct, max_pct, range));
        range
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn ramp(shape: (usize, usize, usize)) -> Volume {
        let n = shape.0 * shape.1 * shape.2;
        let data = Array3::from_shape_vec(shape, (0..n).map(|v| v as f32).collect())
            .expect("shape matches");
        Volume::new(data, 1.0)
    }

    #[test]
    fn matches_closed_form_for_uniform_ramp() {
        let volume = ramp((4, 5, 5));
        let range = DisplayRange::from_percentiles(&volume, 8.0, 92.0);
        assert_relative_eq!(range.low, 7.92, epsilon = 1e-4);
        assert_relative_eq!(range.high, 91.08, epsilon = 1e-4);
    }

    #[test]
    fn full_range_is_min_and_max() {
        let range = DisplayRange::from_percentiles(&ramp((4, 4, 4)), 0.0, 100.0);
        assert_eq!(range, DisplayRange::new(0.0, 63.0));
    }

    #[test]
    fn low_never_exceeds_high_for_ordered_percentiles() {
        let values = [5.0, -2.0, 9.5, 3.25, 3.25, 100.0, 0.0];
        for lo in 0..=100 {
            for hi in (lo..=100).step_by(7) {
                assert!(percentile(&values, lo as f64) <= percentile(&values, hi as f64));
            }
        }
    }

    #[test]
    fn ignores_non_finite_samples() {
        let values = [f32::NAN, 1.0, 2.0, f32::INFINITY, 3.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 3.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn cache_reuses_until_inputs_change() {
        let volume = ramp((4, 4, 4));
        let mut cache = WindowCache::default();
        let first = cache.get_or_compute(1, &volume, 0, 100);
        assert_eq!(first, DisplayRange::new(0.0, 63.0));

        let other = ramp((2, 2, 2));
        // Same key: the cached value wins even though a different volume is passed.
        assert_eq!(cache.get_or_compute(1, &other, 0, 100), first);
        assert_eq!(cache.get_or_compute(2, &other, 0, 100), DisplayRange::new(0.0, 7.0));
    }

    #[test]
    fn normalize_handles_flat_ranges() {
        let flat = DisplayRange::new(0.0, 0.0);
        assert_eq!(flat.normalize(0.0), 1.0);
        assert_eq!(flat.normalize(-1.0), 0.0);
        let range = DisplayRange::new(0.0, 10.0);
        assert_eq!(range.normalize(5.0), 0.5);
    }
}
