//! Pass 6: vertical-stripe correction. Column gains are estimated once
//! per recording from a sample of frames (balancing each column's
//! histogram against the image mean) and cached; every frame then just
//! applies the cached gains.

/// Per-column multiplicative gain table, one entry per raw column.
#[derive(Debug, Clone)]
pub struct StripeGainTable {
    pub gains: Vec<f64>,
}

#[cfg(feature = "parallel")]
use rayon::prelude::*;

fn column_mean(samples: &[u16], width: usize, height: usize, col: usize, black: u16) -> f64 {
    let mut sum = 0i64;
    let mut count = 0i64;
    for row in 0..height {
        let v = samples[row * width + col] as i64 - black as i64;
        if v > 0 {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

/// Estimates a gain per column from one or more sample frames so that
/// every column's mean (after black subtraction) matches the overall
/// image mean. Frames are averaged first so a single noisy frame
/// doesn't dominate the estimate.
pub fn estimate(sample_frames: &[&[u16]], width: usize, height: usize, black: u16) -> StripeGainTable {
    if sample_frames.is_empty() || width == 0 {
        return StripeGainTable { gains: vec![1.0; width] };
    }

    #[cfg(feature = "parallel")]
    let column_means: Vec<f64> = (0..width)
        .into_par_iter()
        .map(|col| {
            sample_frames.iter().map(|frame| column_mean(frame, width, height, col, black)).sum::<f64>()
                / sample_frames.len() as f64
        })
        .collect();
    #[cfg(not(feature = "parallel"))]
    let column_means: Vec<f64> = (0..width)
        .map(|col| {
            sample_frames.iter().map(|frame| column_mean(frame, width, height, col, black)).sum::<f64>()
                / sample_frames.len() as f64
        })
        .collect();

    let overall_mean = column_means.iter().sum::<f64>() / width as f64;
    let gains = column_means
        .iter()
        .map(|&m| if m > 0.0 { overall_mean / m } else { 1.0 })
        .collect();

    StripeGainTable { gains }
}

/// Applies `table` to `samples` in place.
pub fn apply(samples: &mut [u16], width: usize, height: usize, black: u16, table: &StripeGainTable) {
    for row in 0..height {
        for col in 0..width {
            let gain = table.gains.get(col).copied().unwrap_or(1.0);
            let idx = row * width + col;
            let v = samples[idx] as i64 - black as i64;
            let corrected = (v as f64 * gain) as i64 + black as i64;
            samples[idx] = corrected.clamp(0, u16::MAX as i64) as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_columns_get_unit_gain() {
        let width = 4;
        let height = 4;
        let frame = vec![1000u16; width * height];
        let table = estimate(&[&frame], width, height, 0);
        for g in table.gains {
            assert!((g - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn biased_column_is_balanced_toward_the_mean() {
        let width = 4;
        let height = 8;
        let mut frame = vec![1000u16; width * height];
        for row in 0..height {
            frame[row * width + 1] = 2000;
        }
        let table = estimate(&[&frame[..]], width, height, 0);
        let mut corrected = frame.clone();
        apply(&mut corrected, width, height, 0, &table);
        let col0_mean: f64 = (0..height).map(|r| corrected[r * width] as f64).sum::<f64>() / height as f64;
        let col1_mean: f64 = (0..height).map(|r| corrected[r * width + 1] as f64).sum::<f64>() / height as f64;
        assert!((col0_mean - col1_mean).abs() < 1.0);
    }
}
