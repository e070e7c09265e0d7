//! WAV sizing and streaming. The encoder itself (RIFF/WAVE PCM
//! synthesis from scratch) is out of scope; this module only needs to
//! compute the fixed 44-byte header and let a caller slice an arbitrary
//! byte range of the logical file without materializing it whole.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::container::blocks::{FrameBlockHeader, WaviBlock, BLOCK_PREFIX_LEN, TAG_AUDF, TAG_WAVI};
use crate::container::block_index::XrefTable;
use crate::container::chunk_set::ChunkSet;
use crate::error::Result;

const WAV_HEADER_LEN: u64 = 44;

struct AudioFrame {
    chunk_index: u16,
    payload_offset: u64,
    payload_len: u32,
}

/// Scans `xref` for the most recent `WAVI` and every `AUDF` block,
/// returning `None` if the recording has no audio at all.
fn collect_audio(xref: &XrefTable, chunks: &ChunkSet) -> Result<Option<(WaviBlock, Vec<AudioFrame>)>> {
    let mut wavi = None;
    let mut frames = Vec::new();

    for entry in &xref.entries {
        if entry.tag == TAG_WAVI {
            let body_offset = entry.offset + BLOCK_PREFIX_LEN;
            let body = chunks.read(entry.chunk_index as usize, body_offset, WaviBlock::WIRE_LEN)?;
            wavi = Some(WaviBlock::parse(body)?);
        } else if entry.tag == TAG_AUDF {
            let body_offset = entry.offset + BLOCK_PREFIX_LEN;
            let prefix = chunks.read(entry.chunk_index as usize, entry.offset, BLOCK_PREFIX_LEN as usize)?;
            let block_size = (&prefix[4..8]).read_u32::<LittleEndian>().unwrap_or(0) as u64;
            let hdr_body = chunks.read(entry.chunk_index as usize, body_offset, FrameBlockHeader::WIRE_LEN)?;
            let hdr = FrameBlockHeader::parse(hdr_body)?;
            let header_len = BLOCK_PREFIX_LEN + FrameBlockHeader::WIRE_LEN as u64;
            let payload_offset = entry.offset + header_len + hdr.frame_space as u64;
            if payload_offset > entry.offset + block_size {
                continue; // malformed AUDF, skip rather than fail the whole file
            }
            let payload_len = (entry.offset + block_size - payload_offset) as u32;
            frames.push(AudioFrame { chunk_index: entry.chunk_index, payload_offset, payload_len });
        }
    }

    match wavi {
        Some(w) => Ok(Some((w, frames))),
        None => Ok(None),
    }
}

fn riff_header(wavi: &WaviBlock, data_len: u32) -> [u8; WAV_HEADER_LEN as usize] {
    let mut h = [0u8; 44];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&wavi.format_tag.to_le_bytes());
    h[22..24].copy_from_slice(&wavi.channels.to_le_bytes());
    h[24..28].copy_from_slice(&wavi.samples_per_sec.to_le_bytes());
    h[28..32].copy_from_slice(&wavi.byte_rate().to_le_bytes());
    h[32..34].copy_from_slice(&wavi.block_align().to_le_bytes());
    h[34..36].copy_from_slice(&wavi.bits_per_sample.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_len.to_le_bytes());
    h
}

/// Total logical WAV file size, or `None` if there's no audio.
pub fn wav_size(xref: &XrefTable, chunks: &ChunkSet) -> Result<Option<u64>> {
    let Some((_wavi, frames)) = collect_audio(xref, chunks)? else { return Ok(None) };
    let data_len: u64 = frames.iter().map(|f| f.payload_len as u64).sum();
    Ok(Some(WAV_HEADER_LEN + data_len))
}

/// Reads `len` bytes at logical offset `off` in the synthesized WAV
/// file, without materializing the whole thing: the header is computed
/// directly, and only the overlapping `AUDF` payload ranges are read.
pub fn stream_range(xref: &XrefTable, chunks: &ChunkSet, off: u64, len: usize, out: &mut [u8]) -> Result<usize> {
    let Some((wavi, frames)) = collect_audio(xref, chunks)? else { return Ok(0) };
    let data_len: u32 = frames.iter().map(|f| f.payload_len).sum();
    let header = riff_header(&wavi, data_len);
    let total_len = WAV_HEADER_LEN + data_len as u64;

    if off >= total_len {
        return Ok(0);
    }
    let end = (off + len as u64).min(total_len);
    let mut written = 0usize;
    let mut cursor = off;

    while cursor < end {
        if cursor < WAV_HEADER_LEN {
            let n = ((WAV_HEADER_LEN.min(end) - cursor) as usize).min(out.len() - written);
            out[written..written + n].copy_from_slice(&header[cursor as usize..cursor as usize + n]);
            written += n;
            cursor += n as u64;
            continue;
        }

        let mut data_pos = cursor - WAV_HEADER_LEN;
        let mut consumed_any = false;
        for frame in &frames {
            let frame_len = frame.payload_len as u64;
            if data_pos < frame_len {
                let want = ((end - cursor) as usize).min((frame_len - data_pos) as usize);
                let bytes = chunks.read(frame.chunk_index as usize, frame.payload_offset + data_pos, want)?;
                out[written..written + want].copy_from_slice(bytes);
                written += want;
                cursor += want as u64;
                consumed_any = true;
                break;
            }
            data_pos -= frame_len;
        }
        if !consumed_any {
            break;
        }
    }

    Ok(written)
}
