//! C4 Raw Payload Reader: given one frame record, produce unpacked
//! 16-bit-per-sample Bayer data, transparently branching on
//! `MLVI.videoClass` between uncompressed packed bits, LZMA, and LJ92.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use super::bitpack::{unpack_bits, words_needed_for_bytes};
use super::chunk_set::ChunkSet;
use super::header_cache::FrameRecord;
use super::lj92;
use crate::error::{MlvError, Result};

/// Reads `len` output bytes (always 16-bit LE samples) starting at
/// output byte offset `off` within one frame's image, writing into
/// `out` (which must be at least `len` bytes).
pub fn read_payload_range(chunks: &ChunkSet, record: &FrameRecord, off: usize, len: usize, out: &mut [u8]) -> Result<usize> {
    if len == 0 {
        return Ok(0);
    }

    let is_lzma = record.mlvi.map(|m| m.is_lzma()).unwrap_or(false);
    let is_lj92 = record.mlvi.map(|m| m.is_lj92()).unwrap_or(false);

    if is_lj92 {
        return read_lj92(chunks, record, off, len, out);
    }
    if is_lzma {
        return read_lzma(chunks, record, off, len, out);
    }
    read_uncompressed(chunks, record, off, len, out)
}

fn read_uncompressed(chunks: &ChunkSet, record: &FrameRecord, off: usize, len: usize, out: &mut [u8]) -> Result<usize> {
    let bpp = record.rawi.bits_per_pixel;
    let pixel_start = off / 2;
    let words = words_needed_for_bytes(len, bpp);
    let byte_offset_in_payload = (pixel_start as u64 * bpp as u64 / 16) * 2;
    let read_len = words * 2;

    let abs_offset = record.vidf.payload_offset + byte_offset_in_payload;
    let src = match chunks.read(record.origin_chunk as usize, abs_offset, read_len) {
        Ok(s) => s,
        Err(_) => {
            out[..len].fill(0);
            return Ok(len);
        }
    };

    let bit_skip = (pixel_start as u64 * bpp as u64) % 16;
    let want = len / 2;
    let samples = unpack_bits(src, bpp, want, bit_skip as u32);

    let mut written = 0usize;
    for sample in &samples {
        out[written..written + 2].copy_from_slice(&sample.to_le_bytes());
        written += 2;
    }
    if written < len {
        out[written..len].fill(0);
        written = len;
    }
    Ok(written)
}

fn read_lzma(chunks: &ChunkSet, record: &FrameRecord, off: usize, len: usize, out: &mut [u8]) -> Result<usize> {
    let header_len = 4 + 5;
    let header = match chunks.read(record.origin_chunk as usize, record.vidf.payload_offset, header_len) {
        Ok(h) => h,
        Err(_) => {
            out[..len].fill(0);
            return Ok(len);
        }
    };
    let uncompressed_size = (&header[0..4]).read_u32::<LittleEndian>().unwrap_or(0) as usize;

    let compressed_len = record.vidf.payload_len as usize - header_len;
    let compressed = match chunks.read(
        record.origin_chunk as usize,
        record.vidf.payload_offset + header_len as u64,
        compressed_len,
    ) {
        Ok(c) => c,
        Err(_) => {
            out[..len].fill(0);
            return Ok(len);
        }
    };

    // lzma-rs wants the classic 13-byte LZMA header (5 props bytes +
    // 8-byte uncompressed-size field); reassemble it from the 5-byte
    // props this format stores plus the size field we already parsed.
    let mut full_header = Vec::with_capacity(13 + compressed.len());
    full_header.extend_from_slice(&header[4..9]);
    full_header.extend_from_slice(&(uncompressed_size as u64).to_le_bytes());
    full_header.extend_from_slice(compressed);

    let mut scratch = Vec::with_capacity(uncompressed_size);
    let mut cursor = Cursor::new(full_header);
    if lzma_rs::lzma_decompress(&mut cursor, &mut scratch).is_err() {
        out[..len].fill(0);
        return Ok(len);
    }

    let bpp = record.rawi.bits_per_pixel;
    let pixel_start = off / 2;
    let bit_offset = pixel_start as u64 * bpp as u64;
    let byte_offset = (bit_offset / 16) * 2;
    let slice_start = (byte_offset as usize).min(scratch.len());
    let bit_skip = bit_offset % 16;
    let want = len / 2;
    let samples = unpack_bits(&scratch[slice_start..], bpp, want, bit_skip as u32);

    let mut written = 0usize;
    for sample in &samples {
        out[written..written + 2].copy_from_slice(&sample.to_le_bytes());
        written += 2;
    }
    if written < len {
        out[written..len].fill(0);
        written = len;
    }
    Ok(written)
}

fn read_lj92(chunks: &ChunkSet, record: &FrameRecord, off: usize, len: usize, out: &mut [u8]) -> Result<usize> {
    let payload = match chunks.read(record.origin_chunk as usize, record.vidf.payload_offset, record.vidf.payload_len as usize) {
        Ok(p) => p,
        Err(_) => {
            out[..len].fill(0);
            return Ok(len);
        }
    };

    let decoded = match lj92::decode(payload, record.rawi.width as u16, record.rawi.height as u16) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "lj92 decode failed, returning zeros");
            out[..len].fill(0);
            return Ok(len);
        }
    };

    let pixel_start = off / 2;
    let want = len / 2;
    let mut written = 0usize;
    for i in 0..want {
        let idx = pixel_start + i;
        let sample = decoded.samples.get(idx).copied().unwrap_or(0);
        out[written..written + 2].copy_from_slice(&sample.to_le_bytes());
        written += 2;
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::block_index::{build_index, XrefEntry};
    use crate::container::blocks::*;
    use byteorder::WriteBytesExt;

    fn write_prefix(buf: &mut Vec<u8>, tag: [u8; 4], size: u32, ts: u64) {
        buf.extend_from_slice(&tag);
        buf.write_u32::<LittleEndian>(size).unwrap();
        buf.write_u64::<LittleEndian>(ts).unwrap();
    }

    #[test]
    fn uncompressed_slice_matches_full_unpack() {
        let width = 4u32;
        let height = 2u32;
        let bpp = 14u16;
        let samples: Vec<u16> = (0..(width * height)).map(|i| (i * 123) as u16 % (1 << bpp)).collect();
        let packed = crate::container::bitpack::pack_bits(&samples, bpp);

        let mut buf = Vec::new();
        let mlvi_body_len = MlviBlock::WIRE_LEN as u32;
        write_prefix(&mut buf, TAG_MLVI, 16 + mlvi_body_len, 0);
        MlviBlock { file_num: 0, video_class: 0, audio_class: 0, frame_count: 1, fps_num: 25, fps_denom: 1 }
            .write(&mut buf)
            .unwrap();

        let rawi_body_len = RawiBlock::WIRE_LEN as u32;
        write_prefix(&mut buf, TAG_RAWI, 16 + rawi_body_len, 1);
        RawiBlock {
            width,
            height,
            bits_per_pixel: bpp,
            black_level: 0,
            white_level: (1 << bpp) - 1,
            pattern: BayerPattern::RGGB,
            crop_x: 0,
            crop_y: 0,
        }
        .write(&mut buf)
        .unwrap();

        let vidf_hdr_len = FrameBlockHeader::WIRE_LEN as u32;
        let vidf_size = 16 + vidf_hdr_len + packed.len() as u32;
        write_prefix(&mut buf, TAG_VIDF, vidf_size, 2);
        FrameBlockHeader { frame_number: 0, frame_space: 0 }.write(&mut buf).unwrap();
        let vidf_origin_offset = (buf.len() as u64) - 16 - vidf_hdr_len as u64;
        buf.extend_from_slice(&packed);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        std::fs::write(&path, &buf).unwrap();
        let chunks = ChunkSet::open(&path).unwrap();
        let xref = build_index(&chunks).unwrap();
        assert_eq!(xref.vidf_count(), 1);

        let vidf_entry: &XrefEntry = xref.entries.iter().find(|e| e.tag == TAG_VIDF).unwrap();
        let record = FrameRecord {
            mlvi: Some(MlviBlock { file_num: 0, video_class: 0, audio_class: 0, frame_count: 1, fps_num: 25, fps_denom: 1 }),
            rawi: RawiBlock {
                width,
                height,
                bits_per_pixel: bpp,
                black_level: 0,
                white_level: (1 << bpp) - 1,
                pattern: BayerPattern::RGGB,
                crop_x: 0,
                crop_y: 0,
            },
            rtci: None,
            idnt: None,
            expo: None,
            lens: None,
            wbal: None,
            wavi: None,
            vidf: VidfHeader {
                frame_number: 0,
                timestamp: 2,
                frame_space: 0,
                payload_offset: vidf_origin_offset + 16 + vidf_hdr_len as u64,
                payload_len: packed.len() as u32,
            },
            origin_chunk: vidf_entry.chunk_index,
            origin_offset: vidf_entry.offset,
        };

        let total_len = (width * height * 2) as usize;
        let mut full = vec![0u8; total_len];
        read_payload_range(&chunks, &record, 0, total_len, &mut full).unwrap();

        let mut middle = vec![0u8; 4];
        read_payload_range(&chunks, &record, 2, 4, &mut middle).unwrap();
        assert_eq!(&full[2..6], &middle[..]);
    }

    #[test]
    fn uncompressed_slice_matches_full_unpack_at_non_word_aligned_offset() {
        let width = 4u32;
        let height = 2u32;
        let bpp = 12u16;
        let samples: Vec<u16> = (0..(width * height)).map(|i| (i * 321) as u16 % (1 << bpp)).collect();
        let packed = crate::container::bitpack::pack_bits(&samples, bpp);

        let mut buf = Vec::new();
        let mlvi_body_len = MlviBlock::WIRE_LEN as u32;
        write_prefix(&mut buf, TAG_MLVI, 16 + mlvi_body_len, 0);
        MlviBlock { file_num: 0, video_class: 0, audio_class: 0, frame_count: 1, fps_num: 25, fps_denom: 1 }
            .write(&mut buf)
            .unwrap();

        let rawi_body_len = RawiBlock::WIRE_LEN as u32;
        write_prefix(&mut buf, TAG_RAWI, 16 + rawi_body_len, 1);
        RawiBlock {
            width,
            height,
            bits_per_pixel: bpp,
            black_level: 0,
            white_level: (1 << bpp) - 1,
            pattern: BayerPattern::RGGB,
            crop_x: 0,
            crop_y: 0,
        }
        .write(&mut buf)
        .unwrap();

        let vidf_hdr_len = FrameBlockHeader::WIRE_LEN as u32;
        let vidf_size = 16 + vidf_hdr_len + packed.len() as u32;
        write_prefix(&mut buf, TAG_VIDF, vidf_size, 2);
        FrameBlockHeader { frame_number: 0, frame_space: 0 }.write(&mut buf).unwrap();
        let vidf_origin_offset = (buf.len() as u64) - 16 - vidf_hdr_len as u64;
        buf.extend_from_slice(&packed);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        std::fs::write(&path, &buf).unwrap();
        let chunks = ChunkSet::open(&path).unwrap();
        let xref = build_index(&chunks).unwrap();

        let vidf_entry: &XrefEntry = xref.entries.iter().find(|e| e.tag == TAG_VIDF).unwrap();
        let record = FrameRecord {
            mlvi: Some(MlviBlock { file_num: 0, video_class: 0, audio_class: 0, frame_count: 1, fps_num: 25, fps_denom: 1 }),
            rawi: RawiBlock {
                width,
                height,
                bits_per_pixel: bpp,
                black_level: 0,
                white_level: (1 << bpp) - 1,
                pattern: BayerPattern::RGGB,
                crop_x: 0,
                crop_y: 0,
            },
            rtci: None,
            idnt: None,
            expo: None,
            lens: None,
            wbal: None,
            wavi: None,
            vidf: VidfHeader {
                frame_number: 0,
                timestamp: 2,
                frame_space: 0,
                payload_offset: vidf_origin_offset + 16 + vidf_hdr_len as u64,
                payload_len: packed.len() as u32,
            },
            origin_chunk: vidf_entry.chunk_index,
            origin_offset: vidf_entry.offset,
        };

        let total_len = (width * height * 2) as usize;
        let mut full = vec![0u8; total_len];
        read_payload_range(&chunks, &record, 0, total_len, &mut full).unwrap();

        // Pixel 2 at bpp=12: byte offset 4, which is not 16-bit-word
        // aligned (bit_skip = 8 within the aligned source word).
        let mut pixel2 = vec![0u8; 2];
        read_payload_range(&chunks, &record, 4, 2, &mut pixel2).unwrap();
        assert_eq!(&full[4..6], &pixel2[..]);

        // Also check a read spanning two non-aligned pixels.
        let mut pair = vec![0u8; 4];
        read_payload_range(&chunks, &record, 4, 4, &mut pair).unwrap();
        assert_eq!(&full[4..8], &pair[..]);
    }
}
