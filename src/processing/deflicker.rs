//! Pass 1: per-frame deflicker. Computes a histogram-median exposure
//! correction and expresses it as a `BaselineExposure` tag; the pixel
//! buffer itself is never modified by this pass.

/// Returns `BaselineExposure` in ten-thousandths of a stop, i.e. the
/// DNG tag's numerator over a fixed 10000 denominator.
///
/// `target` is the desired median expressed as a raw pixel level (the
/// same convention `deflicker_target` uses in [`crate::config`], e.g.
/// `3072`), so `BaselineExposure = log2((target - black) / (median -
/// black)) * 10000`. Returns `0` when `target` is `None`, the
/// histogram has no samples in range, the median is at or below black,
/// or `target` is at or below black (would make the log undefined).
pub fn baseline_exposure_e4(samples: &[u16], black: u16, white: u16, target: Option<i32>) -> i32 {
    let Some(target_level) = target else { return 0 };
    if target_level <= black as i32 {
        return 0;
    }

    let median = match histogram_median(samples, black, white) {
        Some(m) => m,
        None => return 0,
    };
    if median <= black {
        return 0;
    }

    let ratio = (target_level as f64 - black as f64) / (median as f64 - black as f64);
    (ratio.log2() * 10000.0).round() as i32
}

fn histogram_median(samples: &[u16], black: u16, white: u16) -> Option<u16> {
    if samples.is_empty() {
        return None;
    }
    let mut histogram = vec![0u64; white as usize + 2];
    let mut total = 0u64;
    for &s in samples {
        if s > black && s <= white {
            histogram[s as usize] += 1;
            total += 1;
        }
    }
    if total == 0 {
        return None;
    }
    let half = total / 2;
    let mut running = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        running += count;
        if running > half {
            return Some(value as u16);
        }
    }
    None
}
