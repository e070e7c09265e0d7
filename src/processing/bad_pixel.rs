//! Pass 4: focus-pixel / bad-pixel repair. Known positions (loaded from
//! a companion map keyed by camera model + width) and, optionally,
//! statistically detected outliers are replaced by a bilinear
//! interpolation of same-color neighbors.

use crate::config::BadPixelMode;

/// A camera's known bad/focus-pixel positions for one raw width. In a
/// full deployment this would be loaded from a companion file shipped
/// per camera model; here it is an in-memory map the caller supplies
/// (loading it is outside this pass's job).
#[derive(Debug, Clone, Default)]
pub struct FocusPixelMap {
    pub positions: Vec<(u32, u32)>,
}

/// Same-color neighbor offsets for a 2x2 Bayer mosaic: the nearest
/// pixel of the same color lies two rows/columns away in each
/// direction.
const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(-2, 0), (2, 0), (0, -2), (0, 2)];

fn bilinear_same_color(samples: &[u16], width: usize, height: usize, row: usize, col: usize) -> u16 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for (dr, dc) in NEIGHBOR_OFFSETS {
        let r = row as i32 + dr;
        let c = col as i32 + dc;
        if r >= 0 && c >= 0 && (r as usize) < height && (c as usize) < width {
            sum += samples[r as usize * width + c as usize] as u64;
            count += 1;
        }
    }
    if count == 0 {
        samples[row * width + col]
    } else {
        (sum / count) as u16
    }
}

/// Repairs pixels named in `map`, plus (in `Aggressive` mode) any
/// sample more than `threshold` away from its same-color neighbor
/// average. `Off` does nothing; `Auto` only repairs known positions.
pub fn fix_bad_pixels(samples: &mut [u16], width: usize, height: usize, map: &FocusPixelMap, mode: BadPixelMode) {
    if mode == BadPixelMode::Off {
        return;
    }

    for &(col, row) in &map.positions {
        let (row, col) = (row as usize, col as usize);
        if row < height && col < width {
            samples[row * width + col] = bilinear_same_color(samples, width, height, row, col);
        }
    }

    if mode == BadPixelMode::Aggressive {
        let threshold = 2000i64;
        let original = samples.to_vec();
        for row in 0..height {
            for col in 0..width {
                let expected = bilinear_same_color(&original, width, height, row, col) as i64;
                let actual = original[row * width + col] as i64;
                if (actual - expected).abs() > threshold {
                    samples[row * width + col] = expected.clamp(0, u16::MAX as i64) as u16;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_mode_leaves_buffer_untouched() {
        let mut samples = vec![100u16; 16];
        let before = samples.clone();
        fix_bad_pixels(&mut samples, 4, 4, &FocusPixelMap::default(), BadPixelMode::Off);
        assert_eq!(samples, before);
    }

    #[test]
    fn known_position_is_replaced_by_neighbor_average() {
        let mut samples = vec![1000u16; 36];
        samples[3 * 6 + 3] = 60000;
        let map = FocusPixelMap { positions: vec![(3, 3)] };
        fix_bad_pixels(&mut samples, 6, 6, &map, BadPixelMode::Auto);
        assert_eq!(samples[3 * 6 + 3], 1000);
    }

    #[test]
    fn aggressive_mode_catches_an_undeclared_outlier() {
        let mut samples = vec![1000u16; 64];
        samples[4 * 8 + 4] = 60000;
        fix_bad_pixels(&mut samples, 8, 8, &FocusPixelMap::default(), BadPixelMode::Aggressive);
        assert!(samples[4 * 8 + 4] < 2000);
    }
}
