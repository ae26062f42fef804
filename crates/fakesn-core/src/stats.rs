//! Robust statistics shared by star extraction, background estimation and
//! ePSF building.

use serde::{Deserialize, Serialize};

/// Parameters for iterative sigma clipping around the median.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SigmaClipParams {
    /// Values further than `sigma` standard deviations from the median are rejected.
    pub sigma: f64,
    /// Maximum number of rejection passes.
    pub max_iters: usize,
}

impl Default for SigmaClipParams {
    fn default() -> Self {
        Self {
            sigma: 3.0,
            max_iters: 5,
        }
    }
}

/// Mean, median and standard deviation of the values surviving clipping.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    /// Number of values that survived clipping.
    pub count: usize,
}

/// Sigma-clipped statistics. Non-finite values are ignored.
///
/// Each pass computes the median and population standard deviation of the
/// surviving values and rejects those outside `median +/- sigma * std`.
/// Iteration stops early once a pass rejects nothing.
pub fn sigma_clipped_stats<I>(values: I, params: &SigmaClipParams) -> ClippedStats
where
    I: IntoIterator<Item = f64>,
{
    let mut kept: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if kept.is_empty() {
        return ClippedStats::default();
    }

    for _ in 0..params.max_iters {
        let median = median_mut(&mut kept);
        let (_, std) = mean_stddev(&kept);
        if std <= 0.0 {
            break;
        }
        let lo = median - params.sigma * std;
        let hi = median + params.sigma * std;
        let before = kept.len();
        kept.retain(|&v| v >= lo && v <= hi);
        if kept.len() == before || kept.is_empty() {
            break;
        }
    }

    if kept.is_empty() {
        return ClippedStats::default();
    }

    let (mean, std) = mean_stddev(&kept);
    let median = median_mut(&mut kept);
    ClippedStats {
        mean,
        median,
        std,
        count: kept.len(),
    }
}

/// Median of a slice, reordering it in place.
///
/// Uses `select_nth_unstable` for O(n) selection without a full sort.
/// Returns 0.0 for an empty slice.
pub fn median_mut(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return values[0];
    }
    let mid = n / 2;
    if n % 2 == 1 {
        *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
    } else {
        values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        let upper = values[mid];
        values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (values[mid - 1] + upper) / 2.0
    }
}

/// Population mean and standard deviation.
pub fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
