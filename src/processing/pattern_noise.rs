//! Pass 2: pattern-noise fix. Estimates a per-row and per-column offset
//! from each line/column's dark percentile and subtracts it, the slow
//! optional pass meant to run before dual-ISO recovery sees the data.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const DARK_PERCENTILE: f64 = 0.05;

fn percentile(sorted: &[u16], p: f64) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx] as i64
}

fn row_offset(row: &[u16]) -> i64 {
    let mut v = row.to_vec();
    v.sort_unstable();
    percentile(&v, DARK_PERCENTILE)
}

/// Subtracts a per-row and per-column dark-percentile offset from
/// `samples` (row-major, `width*height` long) in place. Offsets are
/// computed against the whole buffer, then both applied in one pass so
/// row and column corrections don't compound on top of each other.
pub fn fix_pattern_noise(samples: &mut [u16], width: usize, height: usize) {
    if width == 0 || height == 0 {
        return;
    }

    #[cfg(feature = "parallel")]
    let row_offsets: Vec<i64> = (0..height)
        .into_par_iter()
        .map(|r| row_offset(&samples[r * width..(r + 1) * width]))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let row_offsets: Vec<i64> = (0..height).map(|r| row_offset(&samples[r * width..(r + 1) * width])).collect();

    let mut columns = vec![Vec::with_capacity(height); width];
    for r in 0..height {
        for c in 0..width {
            columns[c].push(samples[r * width + c]);
        }
    }
    #[cfg(feature = "parallel")]
    let col_offsets: Vec<i64> = columns.par_iter().map(|col| row_offset(col)).collect();
    #[cfg(not(feature = "parallel"))]
    let col_offsets: Vec<i64> = columns.iter().map(|col| row_offset(col)).collect();

    let mean_row = row_offsets.iter().sum::<i64>() / row_offsets.len().max(1) as i64;
    let mean_col = col_offsets.iter().sum::<i64>() / col_offsets.len().max(1) as i64;

    for r in 0..height {
        for c in 0..width {
            let idx = r * width + c;
            let correction = (row_offsets[r] - mean_row) + (col_offsets[c] - mean_col);
            samples[idx] = (samples[idx] as i64 - correction).clamp(0, u16::MAX as i64) as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_image_is_unchanged() {
        let width = 8;
        let height = 6;
        let mut samples = vec![1000u16; width * height];
        let before = samples.clone();
        fix_pattern_noise(&mut samples, width, height);
        assert_eq!(samples, before);
    }

    #[test]
    fn removes_a_constant_row_bias() {
        let width = 16;
        let height = 16;
        let mut samples = vec![500u16; width * height];
        for c in 0..width {
            samples[3 * width + c] += 200;
        }
        fix_pattern_noise(&mut samples, width, height);
        let max_dev = samples.iter().map(|&s| (s as i32 - 500).abs()).max().unwrap();
        assert!(max_dev < 200, "row bias should be reduced, max_dev={max_dev}");
    }
}
