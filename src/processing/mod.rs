//! C6 Image Processing: the fixed six-pass pipeline applied to a
//! 16-bit sample buffer before it is handed back to the DNG synthesizer.
//! Order is load-bearing — later passes assume earlier ones already
//! ran (chroma smoothing assumes pattern noise removed, stripe
//! correction assumes hot pixels fixed) — so [`process_frame`] is the
//! only entry point; nothing here calls the individual passes directly
//! from outside this module in a different order.

pub mod bad_pixel;
pub mod chroma_smooth;
pub mod deflicker;
pub mod dual_iso;
pub mod pattern_noise;
pub mod stripe_correction;

use crate::config::{BadPixelMode, DualIsoMode, MountOptions};
use bad_pixel::FocusPixelMap;
use stripe_correction::StripeGainTable;

/// Levels and header fields the caller must feed back into the DNG
/// synthesizer after processing, since any pass may have changed them.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingOutcome {
    pub black_level: u16,
    pub white_level: u16,
    pub baseline_exposure_e4: i32,
}

/// Runs the fixed pass order over `samples` in place.
///
/// `stripe_table` is `None` on a recording's very first processed
/// frame, before the per-recording table has been estimated; the
/// caller (pipeline.rs) is responsible for building and caching one
/// and passing it on subsequent calls.
pub fn process_frame(
    samples: &mut [u16],
    width: usize,
    height: usize,
    black_level: u16,
    white_level: u16,
    options: &MountOptions,
    focus_map: &FocusPixelMap,
    stripe_table: Option<&StripeGainTable>,
) -> ProcessingOutcome {
    let baseline_exposure_e4 = deflicker::baseline_exposure_e4(samples, black_level, white_level, options.deflicker_target);

    if options.fix_pattern_noise {
        pattern_noise::fix_pattern_noise(samples, width, height);
    }

    let mut black_level = black_level;
    let mut white_level = white_level;

    if options.dual_iso != DualIsoMode::Off {
        if let Some(pattern) = dual_iso::detect(samples, width, height, black_level) {
            let recovered = match options.dual_iso {
                DualIsoMode::Fast => dual_iso::recover_fast(samples, width, height, black_level, white_level, pattern),
                DualIsoMode::HighQuality => dual_iso::recover_high_quality(
                    samples,
                    width,
                    height,
                    black_level,
                    white_level,
                    pattern,
                    !options.hdr_no_fullres,
                    options.hdr_mean23,
                    !options.hdr_no_alias_map,
                ),
                DualIsoMode::Off => unreachable!(),
            };
            black_level = recovered.black_level;
            white_level = recovered.white_level;
        }
    }

    // Neither dual-ISO variant here folds in its own bad-pixel repair
    // or chroma smoothing, so both passes always run independently.
    if options.fix_bad_pixels != BadPixelMode::Off {
        bad_pixel::fix_bad_pixels(samples, width, height, focus_map, options.fix_bad_pixels);
    }

    let window = options.chroma_smooth.window();
    if window > 0 {
        chroma_smooth::smooth_chroma(samples, width, height, window);
    }

    if options.fix_stripes {
        if let Some(table) = stripe_table {
            stripe_correction::apply(samples, width, height, black_level, table);
        }
    }

    ProcessingOutcome { black_level, white_level, baseline_exposure_e4 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountOptions;

    #[test]
    fn all_passes_off_leaves_buffer_unchanged() {
        let width = 8;
        let height = 8;
        let mut samples: Vec<u16> = (0..(width * height) as u16).collect();
        let before = samples.clone();
        let options = MountOptions::default();
        let outcome = process_frame(&mut samples, width, height, 0, 16383, &options, &FocusPixelMap::default(), None);
        assert_eq!(samples, before);
        assert_eq!(outcome.baseline_exposure_e4, 0);
    }
}
