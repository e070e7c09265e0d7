//! Top-level orchestration: resolves a frame's metadata (C3), reads and
//! decompresses its raw payload (C4), runs the processing passes (C6),
//! and synthesizes the DNG header (C5). The result is exactly what the
//! image buffer cache (C7) uses as its builder for a `Dng(frame_index)`
//! cache key.

use crate::cache::CachedBuffer;
use crate::config::MountOptions;
use crate::container::raw_payload::read_payload_range;
use crate::dng::{self, HeaderInputs};
use crate::error::Result;
use crate::processing::bad_pixel::FocusPixelMap;
use crate::processing::{process_frame, stripe_correction};
use crate::recording::Recording;

/// Builds the full `{header, image}` pair for one frame. This is the
/// function the cache's `get_or_build` closure calls on a miss.
pub fn materialize_frame(recording: &Recording, frame_index: u64, options: &MountOptions, focus_map: &FocusPixelMap) -> Result<CachedBuffer> {
    let record = recording.header_cache.frame_headers(&recording.xref, &recording.chunks, frame_index)?;

    let width = record.rawi.width as usize;
    let height = record.rawi.height as usize;
    let byte_len = width * height * 2;

    let mut raw_bytes = vec![0u8; byte_len];
    read_payload_range(&recording.chunks, &record, 0, byte_len, &mut raw_bytes)?;

    let mut samples: Vec<u16> = raw_bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();

    let stripe_table = if options.fix_stripes {
        Some(recording.stripe_table_or_init(|| stripe_correction::estimate(&[&samples[..]], width, height, record.rawi.black_level)))
    } else {
        None
    };

    let outcome = process_frame(
        &mut samples,
        width,
        height,
        record.rawi.black_level,
        record.rawi.white_level,
        options,
        focus_map,
        stripe_table,
    );

    let header = dng::build_header(
        &record,
        HeaderInputs {
            black_level: outcome.black_level,
            white_level: outcome.white_level,
            baseline_exposure_e4: outcome.baseline_exposure_e4,
            fps_override: options.fps_override,
        },
    );

    let mut image = Vec::with_capacity(byte_len);
    for sample in &samples {
        image.extend_from_slice(&sample.to_le_bytes());
    }

    Ok(CachedBuffer { header, image })
}

/// Total DNG file size for `frame_index`, without materializing the
/// image payload: the header size is deterministic given the frame
/// record, so this only needs C3's metadata plus the fixed
/// `width*height*2` image length.
pub fn dng_size(recording: &Recording, frame_index: u64, options: &MountOptions) -> Result<u64> {
    let record = recording.header_cache.frame_headers(&recording.xref, &recording.chunks, frame_index)?;
    let image_len = record.rawi.image_byte_len();
    let header_len = dng::header_size(
        &record,
        HeaderInputs {
            black_level: record.rawi.black_level,
            white_level: record.rawi.white_level,
            baseline_exposure_e4: 0,
            fps_override: options.fps_override,
        },
    );
    Ok(header_len + image_len)
}
