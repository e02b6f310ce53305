use std::time::Duration;

/// Minimum sample count before a percentile is considered meaningful
const MIN_SAMPLES: usize = 5;

/// Linear-interpolated percentile of a sample buffer.
///
/// Returns `Duration::ZERO` for fewer than 5 samples (insufficient data,
/// not an error). `p` is a fraction in `0.0..=1.0`, clamped.
pub fn percentile(samples: &[Duration], p: f64) -> Duration {
    if samples.len() < MIN_SAMPLES {
        return Duration::ZERO;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let frac = rank - lower as f64;
    let a = sorted[lower].as_secs_f64();
    let b = sorted[upper].as_secs_f64();
    Duration::from_secs_f64(a + (b - a) * frac)
}
