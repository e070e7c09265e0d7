//! Pass 3: dual-ISO recovery. Alternating pairs of Bayer rows are
//! captured at two different ISOs; this pass detects the pattern and
//! merges the pair into one extended-dynamic-range image.

/// Detected dual-ISO row pairing and the gain ratio between the two
/// interleaved exposures.
#[derive(Debug, Clone, Copy)]
pub struct DualIsoPattern {
    pub gain_ratio: f64,
}

/// Levels the caller must use for the regenerated DNG header after a
/// successful recovery; white/black change because the merged buffer
/// spans a wider dynamic range than either original exposure.
#[derive(Debug, Clone, Copy)]
pub struct RecoveredLevels {
    pub black_level: u16,
    pub white_level: u16,
}

/// Compares the mean sample value of even row-pairs against odd
/// row-pairs; a pattern is reported only if the two differ by at least
/// half a stop, since real single-ISO recordings have no such
/// structure beyond noise.
pub fn detect(samples: &[u16], width: usize, height: usize, black: u16) -> Option<DualIsoPattern> {
    if width == 0 || height < 4 {
        return None;
    }
    let mut bright_sum = 0i64;
    let mut bright_n = 0i64;
    let mut dark_sum = 0i64;
    let mut dark_n = 0i64;

    for row in 0..height {
        let pair_index = row / 2;
        let is_bright_pair = pair_index % 2 == 0;
        for col in 0..width {
            let v = samples[row * width + col] as i64 - black as i64;
            if v <= 0 {
                continue;
            }
            if is_bright_pair {
                bright_sum += v;
                bright_n += 1;
            } else {
                dark_sum += v;
                dark_n += 1;
            }
        }
    }

    if bright_n == 0 || dark_n == 0 {
        return None;
    }
    let bright_mean = bright_sum as f64 / bright_n as f64;
    let dark_mean = dark_sum as f64 / dark_n as f64;
    if dark_mean <= 0.0 {
        return None;
    }
    let ratio = bright_mean / dark_mean;
    if ratio < 1.4 {
        return None; // less than ~half a stop apart: not a dual-ISO capture
    }
    Some(DualIsoPattern { gain_ratio: ratio })
}

/// Fast variant: for each row pair, keep whichever of the two rows is
/// not clipped, scaled by the detected gain so both halves share one
/// exposure reference, then blend by simple averaging with its neighbor
/// pair. Cheap enough for scrubbing a timeline in a preview player.
pub fn recover_fast(samples: &mut [u16], width: usize, height: usize, black: u16, white: u16, pattern: DualIsoPattern) -> RecoveredLevels {
    let scale = pattern.gain_ratio;
    for row in 0..height {
        let pair_index = row / 2;
        let is_dark_pair = pair_index % 2 == 1;
        if !is_dark_pair {
            continue;
        }
        for col in 0..width {
            let idx = row * width + col;
            let v = samples[idx] as i64 - black as i64;
            let scaled = (v as f64 * scale) as i64 + black as i64;
            samples[idx] = scaled.clamp(0, u16::MAX as i64) as u16;
        }
    }
    let new_white = ((white as f64 - black as f64) * scale) as u16 + black;
    RecoveredLevels { black_level: black, white_level: new_white.max(white) }
}

/// High-quality variant: like [`recover_fast`] but blends the scaled
/// dark-pair rows with their bright neighbors instead of a flat
/// scale-and-copy. `full_res`, `mean23` and `alias_map` mirror the
/// sub-options in [`crate::config::MountOptions`]:
///
/// - `full_res`: blend with the neighboring bright-pair row at all
///   (otherwise every dark-pair sample is just the scaled value).
/// - `mean23`: take a flat mean of the scaled sample and its neighbor;
///   when `false`, weight the neighbor down as the local gradient
///   between the two steepens, the AMaZE-style behavior that avoids
///   smearing a real edge across the row pair.
/// - `alias_map`: clamp the blended value to stay close to the plain
///   scaled sample, suppressing the color aliasing a flat or
///   gradient-weighted blend can otherwise introduce at hard edges.
///
/// With `full_res` left at its conservative default (`false`) this
/// degrades to the same result as `recover_fast`.
pub fn recover_high_quality(
    samples: &mut [u16],
    width: usize,
    height: usize,
    black: u16,
    white: u16,
    pattern: DualIsoPattern,
    full_res: bool,
    mean23: bool,
    alias_map: bool,
) -> RecoveredLevels {
    let scale = pattern.gain_ratio;
    let original = samples.to_vec();

    for row in 0..height {
        let pair_index = row / 2;
        let is_dark_pair = pair_index % 2 == 1;
        if !is_dark_pair {
            continue;
        }
        for col in 0..width {
            let idx = row * width + col;
            let v = original[idx] as i64 - black as i64;
            let scaled = (v as f64 * scale) as i64 + black as i64;

            let blended = if full_res && row + 2 < height {
                let neighbor = original[(row + 2) * width + col] as i64;
                if mean23 {
                    (scaled + neighbor) / 2
                } else {
                    let gradient = (neighbor - scaled).abs().max(1);
                    let neighbor_weight = (200i64 / gradient).clamp(0, 100);
                    (scaled * (100 - neighbor_weight) + neighbor * neighbor_weight) / 100
                }
            } else {
                scaled
            };

            let blended = if alias_map {
                let max_dev = ((white as i64 - black as i64) / 32).max(1);
                blended.clamp(scaled - max_dev, scaled + max_dev)
            } else {
                blended
            };

            samples[idx] = blended.clamp(0, u16::MAX as i64) as u16;
        }
    }

    let new_white = ((white as f64 - black as f64) * scale) as u16 + black;
    RecoveredLevels { black_level: black, white_level: new_white.max(white) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(width: usize, height: usize, bright: u16, dark: u16, black: u16) -> Vec<u16> {
        let mut buf = vec![0u16; width * height];
        for row in 0..height {
            let pair_index = row / 2;
            let is_bright = pair_index % 2 == 0;
            let value = if is_bright { bright } else { dark };
            for col in 0..width {
                buf[row * width + col] = black + value;
            }
        }
        buf
    }

    #[test]
    fn detects_a_clear_gain_difference() {
        let black = 0u16;
        let samples = synthetic(8, 16, 4000, 500, black);
        let pattern = detect(&samples, 8, 16, black).expect("should detect dual-iso pattern");
        assert!(pattern.gain_ratio > 1.4);
    }

    #[test]
    fn uniform_image_has_no_detected_pattern() {
        let samples = vec![1000u16; 8 * 16];
        assert!(detect(&samples, 8, 16, 0).is_none());
    }

    #[test]
    fn fast_recovery_raises_white_level() {
        let black = 0u16;
        let white = 16383u16;
        let mut samples = synthetic(8, 16, 4000, 500, black);
        let pattern = detect(&samples, 8, 16, black).unwrap();
        let recovered = recover_fast(&mut samples, 8, 16, black, white, pattern);
        assert!(recovered.white_level >= white);
    }

    #[test]
    fn high_quality_without_full_res_matches_fast() {
        let black = 0u16;
        let white = 16383u16;
        let mut fast = synthetic(8, 16, 4000, 500, black);
        let mut hq = fast.clone();
        let pattern = detect(&fast, 8, 16, black).unwrap();
        recover_fast(&mut fast, 8, 16, black, white, pattern);
        recover_high_quality(&mut hq, 8, 16, black, white, pattern, false, true, false);
        assert_eq!(fast, hq);
    }

    #[test]
    fn mean23_blend_differs_from_amaze_style_at_an_edge() {
        let black = 0u16;
        let white = 16383u16;
        let mut buf = synthetic(8, 16, 4000, 500, black);
        // Introduce a hard edge in the bright-pair neighbor row so the
        // two interpolation modes diverge.
        for col in 0..8 {
            buf[2 * 8 + col] = if col < 4 { black } else { 8000 };
        }
        let pattern = DualIsoPattern { gain_ratio: 8.0 };

        let mut mean23_buf = buf.clone();
        recover_high_quality(&mut mean23_buf, 8, 16, black, white, pattern, true, true, false);

        let mut amaze_buf = buf;
        recover_high_quality(&mut amaze_buf, 8, 16, black, white, pattern, true, false, false);

        assert_ne!(mean23_buf[0], amaze_buf[0], "mean23 and AMaZE-style blends should diverge across a hard edge");
    }

    #[test]
    fn alias_map_clamps_blend_closer_to_scaled_value() {
        let black = 0u16;
        let white = 16383u16;
        let mut buf = synthetic(8, 16, 4000, 500, black);
        for col in 0..8 {
            buf[2 * 8 + col] = 16000;
        }
        let pattern = DualIsoPattern { gain_ratio: 8.0 };

        let mut unclamped = buf.clone();
        recover_high_quality(&mut unclamped, 8, 16, black, white, pattern, true, true, false);

        let mut clamped = buf;
        recover_high_quality(&mut clamped, 8, 16, black, white, pattern, true, true, true);

        let scaled = (500i64 * 8) as u16;
        let unclamped_dev = (unclamped[0] as i64 - scaled as i64).abs();
        let clamped_dev = (clamped[0] as i64 - scaled as i64).abs();
        assert!(clamped_dev <= unclamped_dev, "alias map should not increase deviation from the scaled value");
    }
}
