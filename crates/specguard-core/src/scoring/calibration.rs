//! Calibration metrics over `(outcome, confidence)` pairs.
//!
//! Confidences are clamped to [0, 1] before use.

/// Default number of equal-width bins for [`expected_calibration_error`].
pub const DEFAULT_BINS: usize = 10;

/// Mean squared error between confidence and outcome.
pub fn brier_score(pairs: &[(bool, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let total: f64 = pairs
        .iter()
        .map(|&(truth, prob)| {
            let p = prob.clamp(0.0, 1.0);
            let t = if truth { 1.0 } else { 0.0 };
            (p - t).powi(2)
        })
        .sum();
    total / pairs.len() as f64
}

/// Expected calibration error with `bins` equal-width confidence bins.
pub fn expected_calibration_error(pairs: &[(bool, f64)], bins: usize) -> f64 {
    if pairs.is_empty() || bins == 0 {
        return 0.0;
    }

    let mut counts = vec![0usize; bins];
    let mut hits = vec![0.0f64; bins];
    let mut confidence = vec![0.0f64; bins];
    for &(truth, prob) in pairs {
        let p = prob.clamp(0.0, 1.0);
        let index = ((p * bins as f64) as usize).min(bins - 1);
        counts[index] += 1;
        hits[index] += if truth { 1.0 } else { 0.0 };
        confidence[index] += p;
    }

    let n = pairs.len() as f64;
    (0..bins)
        .filter(|&i| counts[i] > 0)
        .map(|i| {
            let count = counts[i] as f64;
            let accuracy = hits[i] / count;
            let mean_confidence = confidence[i] / count;
            (accuracy - mean_confidence).abs() * (count / n)
        })
        .sum()
}
