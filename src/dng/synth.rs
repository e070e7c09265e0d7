//! C5 DNG Synthesizer: produces a byte-exact TIFF/EP + EXIF header for
//! one frame and reports the deterministic header size the cache and
//! path resolver rely on to compute file size without materializing
//! the image payload.

use byteorder::{ByteOrder, LittleEndian};

use super::camera_matrix::{self, CameraColorProfile};
use crate::container::header_cache::FrameRecord;

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_SRATIONAL: u16 = 10;

const TAG_NEW_SUBFILE_TYPE: u16 = 254;
const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC_INTERPRETATION: u16 = 262;
const TAG_MAKE: u16 = 271;
const TAG_MODEL: u16 = 272;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIGURATION: u16 = 284;
const TAG_SOFTWARE: u16 = 305;
const TAG_DATE_TIME: u16 = 306;
const TAG_CFA_REPEAT_PATTERN_DIM: u16 = 33421;
const TAG_CFA_PATTERN: u16 = 33422;
const TAG_EXIF_IFD: u16 = 34665;
const TAG_UNIQUE_CAMERA_MODEL: u16 = 50708;
const TAG_BLACK_LEVEL: u16 = 50714;
const TAG_WHITE_LEVEL: u16 = 50717;
const TAG_DEFAULT_SCALE: u16 = 50718;
const TAG_DEFAULT_CROP_ORIGIN: u16 = 50719;
const TAG_DEFAULT_CROP_SIZE: u16 = 50720;
const TAG_COLOR_MATRIX_1: u16 = 50721;
const TAG_COLOR_MATRIX_2: u16 = 50722;
const TAG_AS_SHOT_NEUTRAL: u16 = 50728;
const TAG_BASELINE_EXPOSURE: u16 = 50730;
const TAG_ACTIVE_AREA: u16 = 50829;
const TAG_FORWARD_MATRIX_1: u16 = 50964;
const TAG_FORWARD_MATRIX_2: u16 = 50965;
const TAG_FRAME_RATE: u16 = 51044;

const TAG_EXPOSURE_TIME: u16 = 33434;
const TAG_FNUMBER: u16 = 33437;
const TAG_ISO_SPEED_RATINGS: u16 = 34855;
const TAG_FOCAL_LENGTH: u16 = 37386;

#[derive(Clone)]
enum Value {
    Inline([u8; 4]),
    Bytes(Vec<u8>),
}

struct RawEntry {
    tag: u16,
    typ: u16,
    count: u32,
    value: Value,
}

fn type_size(typ: u16) -> usize {
    match typ {
        TYPE_BYTE | TYPE_ASCII => 1,
        TYPE_SHORT => 2,
        TYPE_LONG => 4,
        TYPE_RATIONAL | TYPE_SRATIONAL => 8,
        _ => 4,
    }
}

fn entry(tag: u16, typ: u16, count: u32, bytes: Vec<u8>) -> RawEntry {
    if bytes.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..bytes.len()].copy_from_slice(&bytes);
        RawEntry { tag, typ, count, value: Value::Inline(inline) }
    } else {
        RawEntry { tag, typ, count, value: Value::Bytes(bytes) }
    }
}

fn short_entry(tag: u16, v: u16) -> RawEntry {
    let mut b = [0u8; 4];
    LittleEndian::write_u16(&mut b[0..2], v);
    entry(tag, TYPE_SHORT, 1, b.to_vec())
}

fn long_entry(tag: u16, v: u32) -> RawEntry {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, v);
    entry(tag, TYPE_LONG, 1, b.to_vec())
}

fn rational_entry(tag: u16, num: u32, denom: u32) -> RawEntry {
    let mut b = vec![0u8; 8];
    LittleEndian::write_u32(&mut b[0..4], num);
    LittleEndian::write_u32(&mut b[4..8], denom);
    entry(tag, TYPE_RATIONAL, 1, b)
}

fn rational_array(tag: u16, pairs: &[(u32, u32)]) -> RawEntry {
    let mut b = Vec::with_capacity(pairs.len() * 8);
    for &(num, denom) in pairs {
        let mut chunk = [0u8; 8];
        LittleEndian::write_u32(&mut chunk[0..4], num);
        LittleEndian::write_u32(&mut chunk[4..8], denom);
        b.extend_from_slice(&chunk);
    }
    entry(tag, TYPE_RATIONAL, pairs.len() as u32, b)
}

fn srational_array(tag: u16, pairs: &[(i32, i32)]) -> RawEntry {
    let mut b = Vec::with_capacity(pairs.len() * 8);
    for &(num, denom) in pairs {
        let mut chunk = [0u8; 8];
        LittleEndian::write_i32(&mut chunk[0..4], num);
        LittleEndian::write_i32(&mut chunk[4..8], denom);
        b.extend_from_slice(&chunk);
    }
    entry(tag, TYPE_SRATIONAL, pairs.len() as u32, b)
}

fn ascii_entry(tag: u16, s: &str) -> RawEntry {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    let count = bytes.len() as u32;
    entry(tag, TYPE_ASCII, count, bytes)
}

fn bytes_entry(tag: u16, bytes: Vec<u8>) -> RawEntry {
    let count = bytes.len() as u32;
    entry(tag, TYPE_BYTE, count, bytes)
}

fn short_array(tag: u16, values: &[u16]) -> RawEntry {
    let mut b = Vec::with_capacity(values.len() * 2);
    for &v in values {
        let mut chunk = [0u8; 2];
        LittleEndian::write_u16(&mut chunk, v);
        b.extend_from_slice(&chunk);
    }
    entry(tag, TYPE_SHORT, values.len() as u32, b)
}

fn table_len(entries: &[RawEntry]) -> usize {
    2 + entries.len() * 12 + 4
}

fn overflow_len(entries: &[RawEntry]) -> usize {
    entries
        .iter()
        .map(|e| match &e.value {
            Value::Inline(_) => 0,
            Value::Bytes(b) => b.len() + (b.len() % 2),
        })
        .sum()
}

fn serialize_ifd(entries: &mut [RawEntry], overflow_base: usize, out: &mut Vec<u8>, overflow: &mut Vec<u8>) {
    entries.sort_by_key(|e| e.tag);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    let mut running_overflow_offset = overflow_base + overflow.len();
    for e in entries.iter() {
        out.extend_from_slice(&e.tag.to_le_bytes());
        out.extend_from_slice(&e.typ.to_le_bytes());
        out.extend_from_slice(&e.count.to_le_bytes());
        match &e.value {
            Value::Inline(b) => out.extend_from_slice(b),
            Value::Bytes(b) => {
                out.extend_from_slice(&(running_overflow_offset as u32).to_le_bytes());
                overflow.extend_from_slice(b);
                if b.len() % 2 == 1 {
                    overflow.push(0);
                }
                running_overflow_offset += b.len() + (b.len() % 2);
            }
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes()); // no next IFD
}

/// Per-frame values the header depends on that are not directly on the
/// wire blocks: the result of image processing (levels may have
/// changed, e.g. after dual-ISO recovery) and mount-level overrides.
#[derive(Debug, Clone, Copy)]
pub struct HeaderInputs {
    pub black_level: u16,
    pub white_level: u16,
    pub baseline_exposure_e4: i32,
    pub fps_override: Option<f64>,
}

fn exif_entries(record: &FrameRecord) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    if let Some(expo) = record.expo {
        entries.push(rational_entry(TAG_EXPOSURE_TIME, expo.shutter_us as u32, 1_000_000));
        entries.push(short_entry(TAG_ISO_SPEED_RATINGS, expo.iso.min(u16::MAX as u32) as u16));
    }
    if let Some(lens) = record.lens {
        entries.push(rational_entry(TAG_FNUMBER, (lens.aperture * 100.0) as u32, 100));
        entries.push(rational_entry(TAG_FOCAL_LENGTH, (lens.focal_len_mm * 10.0) as u32, 10));
    }
    entries
}

fn ifd0_entries(record: &FrameRecord, inputs: HeaderInputs, profile: &CameraColorProfile, exif_ifd_offset: u32, strip_offset: u32, strip_len: u32) -> Vec<RawEntry> {
    let w = record.rawi.width;
    let h = record.rawi.height;
    let camera_name = record.idnt.as_ref().map(|i| i.camera_name.clone()).unwrap_or_else(|| "Unknown".into());

    let fps = inputs.fps_override.unwrap_or_else(|| record.mlvi.map(|m| m.fps()).unwrap_or(25.0));
    let fps_rational = float_to_rational(fps);

    let as_shot_neutral = match record.wbal {
        Some(w) => [
            (1.0 / w.gain_r.max(1e-9) * 10000.0) as u32,
            (1.0 / w.gain_g.max(1e-9) * 10000.0) as u32,
            (1.0 / w.gain_b.max(1e-9) * 10000.0) as u32,
        ],
        None => [10000, 10000, 10000],
    };

    let datetime = record.rtci.map(|r| r.datetime).unwrap_or(chrono::NaiveDateTime::UNIX_EPOCH);

    vec![
        long_entry(TAG_NEW_SUBFILE_TYPE, 0),
        long_entry(TAG_IMAGE_WIDTH, w),
        long_entry(TAG_IMAGE_LENGTH, h),
        short_entry(TAG_BITS_PER_SAMPLE, 16),
        short_entry(TAG_COMPRESSION, 1),
        short_entry(TAG_PHOTOMETRIC_INTERPRETATION, 32803),
        ascii_entry(TAG_MAKE, "Canon"),
        ascii_entry(TAG_MODEL, &camera_name),
        long_entry(TAG_STRIP_OFFSETS, strip_offset),
        short_entry(TAG_SAMPLES_PER_PIXEL, 1),
        long_entry(TAG_ROWS_PER_STRIP, h),
        long_entry(TAG_STRIP_BYTE_COUNTS, strip_len),
        short_entry(TAG_PLANAR_CONFIGURATION, 1),
        ascii_entry(TAG_SOFTWARE, "mlvfs-core"),
        ascii_entry(TAG_DATE_TIME, &datetime.format("%Y:%m:%d %H:%M:%S").to_string()),
        short_array(TAG_CFA_REPEAT_PATTERN_DIM, &[2, 2]),
        bytes_entry(TAG_CFA_PATTERN, record.rawi.pattern.dng_indices().to_vec()),
        long_entry(TAG_EXIF_IFD, exif_ifd_offset),
        ascii_entry(TAG_UNIQUE_CAMERA_MODEL, profile.unique_model),
        short_array(TAG_BLACK_LEVEL, &[inputs.black_level]),
        short_array(TAG_WHITE_LEVEL, &[inputs.white_level]),
        rational_array(TAG_DEFAULT_SCALE, &[(1, 1), (1, 1)]),
        short_array(TAG_DEFAULT_CROP_ORIGIN, &[record.rawi.crop_x, record.rawi.crop_y]),
        short_array(TAG_DEFAULT_CROP_SIZE, &[(w as u16).saturating_sub(record.rawi.crop_x), (h as u16).saturating_sub(record.rawi.crop_y)]),
        srational_array(TAG_COLOR_MATRIX_1, &profile.color_matrix_1.map(|p| (p[0], p[1]))),
        srational_array(TAG_COLOR_MATRIX_2, &profile.color_matrix_2.map(|p| (p[0], p[1]))),
        rational_array(TAG_AS_SHOT_NEUTRAL, &[
            (10000, as_shot_neutral[0].max(1)),
            (10000, as_shot_neutral[1].max(1)),
            (10000, as_shot_neutral[2].max(1)),
        ]),
        srational_entry_signed(TAG_BASELINE_EXPOSURE, inputs.baseline_exposure_e4, 10000),
        short_array(TAG_ACTIVE_AREA, &[0, 0, h as u16, w as u16]),
        srational_array(TAG_FORWARD_MATRIX_1, &profile.forward_matrix_1.map(|p| (p[0], p[1]))),
        srational_array(TAG_FORWARD_MATRIX_2, &profile.forward_matrix_2.map(|p| (p[0], p[1]))),
        rational_entry(TAG_FRAME_RATE, fps_rational.0, fps_rational.1),
    ]
}

fn srational_entry_signed(tag: u16, num: i32, denom: i32) -> RawEntry {
    let mut b = vec![0u8; 8];
    LittleEndian::write_i32(&mut b[0..4], num);
    LittleEndian::write_i32(&mut b[4..8], denom);
    entry(tag, TYPE_SRATIONAL, 1, b)
}

fn float_to_rational(v: f64) -> (u32, u32) {
    let denom = 10000u32;
    ((v * denom as f64).round() as u32, denom)
}

/// Builds the complete TIFF header (IFD0 + EXIF IFD + overflow data) for
/// `record`, given the processing-adjusted [`HeaderInputs`]. The strip
/// offset is set to the returned buffer's own length, so `StripOffsets`
/// always points exactly past the header.
pub fn build_header(record: &FrameRecord, inputs: HeaderInputs) -> Vec<u8> {
    let camera_model = record.idnt.as_ref().map(|i| i.camera_model).unwrap_or(0);
    let profile = camera_matrix::lookup(camera_model);

    let strip_len = record.rawi.image_byte_len() as u32;

    // First pass: build entry lists with placeholder offsets, to learn
    // table/overflow sizes.
    let mut ifd0 = ifd0_entries(record, inputs, &profile, 0, 0, strip_len);
    let mut exif = exif_entries(record);
    ifd0.sort_by_key(|e| e.tag);
    exif.sort_by_key(|e| e.tag);

    let ifd0_table_len = table_len(&ifd0);
    let exif_table_len = table_len(&exif);
    let ifd0_overflow_len = overflow_len(&ifd0);

    let offset_ifd0_table = 8usize;
    let offset_exif_table = offset_ifd0_table + ifd0_table_len;
    let offset_ifd0_overflow = offset_exif_table + exif_table_len;
    let offset_exif_overflow = offset_ifd0_overflow + ifd0_overflow_len;

    // Second pass: now that offsets are known, rebuild IFD0 with the
    // real EXIF pointer and strip offset (header_size = total length).
    let exif_overflow_len = overflow_len(&exif);
    let header_size = offset_exif_overflow + exif_overflow_len;

    let mut ifd0 = ifd0_entries(record, inputs, &profile, offset_exif_table as u32, header_size as u32, strip_len);
    ifd0.sort_by_key(|e| e.tag);

    let mut out = Vec::with_capacity(header_size);
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&(offset_ifd0_table as u32).to_le_bytes());

    let mut ifd0_overflow = Vec::new();
    serialize_ifd(&mut ifd0, offset_ifd0_overflow, &mut out, &mut ifd0_overflow);

    let mut exif_overflow = Vec::new();
    serialize_ifd(&mut exif, offset_exif_overflow, &mut out, &mut exif_overflow);

    out.extend_from_slice(&ifd0_overflow);
    out.extend_from_slice(&exif_overflow);

    debug_assert_eq!(out.len(), header_size);
    out
}

/// Header size alone, without building the full byte buffer — cheap
/// enough in practice that this just calls [`build_header`] and takes
/// the length, keeping one code path for both callers.
pub fn header_size(record: &FrameRecord, inputs: HeaderInputs) -> u64 {
    build_header(record, inputs).len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::blocks::{BayerPattern, MlviBlock, RawiBlock};

    fn sample_record() -> FrameRecord {
        FrameRecord {
            mlvi: Some(MlviBlock { file_num: 0, video_class: 0, audio_class: 0, frame_count: 3, fps_num: 24000, fps_denom: 1001 }),
            rawi: RawiBlock { width: 1920, height: 1080, bits_per_pixel: 14, black_level: 2048, white_level: 15000, pattern: BayerPattern::RGGB, crop_x: 0, crop_y: 0 },
            rtci: None,
            idnt: None,
            expo: None,
            lens: None,
            wbal: None,
            wavi: None,
            vidf: crate::container::blocks::VidfHeader { frame_number: 0, timestamp: 0, frame_space: 0, payload_offset: 0, payload_len: 0 },
            origin_chunk: 0,
            origin_offset: 0,
        }
    }

    #[test]
    fn header_size_is_deterministic_across_calls() {
        let record = sample_record();
        let inputs = HeaderInputs { black_level: 2048, white_level: 15000, baseline_exposure_e4: 0, fps_override: None };
        let a = header_size(&record, inputs);
        let b = header_size(&record, inputs);
        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn strip_offset_equals_header_size() {
        let record = sample_record();
        let inputs = HeaderInputs { black_level: 2048, white_level: 15000, baseline_exposure_e4: 0, fps_override: None };
        let header = build_header(&record, inputs);
        // Re-parse the StripOffsets entry (tag 273) back out of IFD0.
        let ifd0_offset = LittleEndian::read_u32(&header[4..8]) as usize;
        let count = LittleEndian::read_u16(&header[ifd0_offset..ifd0_offset + 2]) as usize;
        let mut strip_offset = None;
        for i in 0..count {
            let base = ifd0_offset + 2 + i * 12;
            let tag = LittleEndian::read_u16(&header[base..base + 2]);
            if tag == TAG_STRIP_OFFSETS {
                strip_offset = Some(LittleEndian::read_u32(&header[base + 8..base + 12]));
            }
        }
        assert_eq!(strip_offset.unwrap() as usize, header.len());
    }
}
