//! C3 Header Cache: resolves a frame index to the fully-populated set
//! of metadata blocks in force at that frame, plus the frame's own
//! `VIDF` header.

use parking_lot::Mutex;

use super::blocks::*;
use super::block_index::{XrefEntry, XrefTable};
use super::chunk_set::ChunkSet;
use crate::error::{MlvError, Result};

/// Metadata in force at one frame, plus the frame block itself.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub mlvi: Option<MlviBlock>,
    pub rawi: RawiBlock,
    pub rtci: Option<RtciBlock>,
    pub idnt: Option<IdntBlock>,
    pub expo: Option<ExpoBlock>,
    pub lens: Option<LensBlock>,
    pub wbal: Option<WbalBlock>,
    pub wavi: Option<WaviBlock>,
    pub vidf: VidfHeader,
    pub origin_chunk: u16,
    pub origin_offset: u64,
}

#[derive(Default)]
struct RunningRecord {
    mlvi: Option<MlviBlock>,
    rawi: Option<RawiBlock>,
    rtci: Option<RtciBlock>,
    idnt: Option<IdntBlock>,
    expo: Option<ExpoBlock>,
    lens: Option<LensBlock>,
    wbal: Option<WbalBlock>,
    wavi: Option<WaviBlock>,
}

impl Clone for RunningRecord {
    fn clone(&self) -> Self {
        Self {
            mlvi: self.mlvi,
            rawi: self.rawi,
            rtci: self.rtci,
            idnt: self.idnt.clone(),
            expo: self.expo,
            lens: self.lens,
            wbal: self.wbal,
            wavi: self.wavi,
        }
    }
}

/// Last (frame_index, xref position, running record) triple observed,
/// so sequential forward requests don't rescan from the start.
struct ScanCursor {
    frame_index: u64,
    xref_pos: usize,
    vidf_count: u64,
    record: RunningRecord,
}

/// Per-recording scan state. One instance is shared by all callers
/// resolving frames of the same recording.
pub struct HeaderCache {
    cursor: Mutex<Option<ScanCursor>>,
}

impl Default for HeaderCache {
    fn default() -> Self {
        Self { cursor: Mutex::new(None) }
    }
}

impl HeaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `frame_index` (0-based, in xref timestamp order) against
    /// `xref` and `chunks`. Returns `NotFound` if the scan runs out of
    /// `VIDF` blocks before reaching `frame_index`, `Malformed` if no
    /// `RAWI` preceded the matched `VIDF`.
    pub fn frame_headers(&self, xref: &XrefTable, chunks: &ChunkSet, frame_index: u64) -> Result<FrameRecord> {
        let mut guard = self.cursor.lock();

        let (mut start_pos, mut vidf_count, mut running) = match guard.as_ref() {
            Some(cursor) if cursor.frame_index <= frame_index => {
                (cursor.xref_pos, cursor.vidf_count, cursor.record.clone())
            }
            _ => (0, 0, RunningRecord::default()),
        };

        let mut pos = start_pos;
        while pos < xref.entries.len() {
            let entry = &xref.entries[pos];
            apply_metadata(&mut running, entry, chunks)?;

            if entry.tag == TAG_VIDF {
                if vidf_count == frame_index {
                    let rawi = running.rawi.ok_or_else(|| MlvError::Malformed {
                        container: chunks.base_name().to_string(),
                        detail: format!("no RAWI preceding frame {frame_index}"),
                    })?;
                    let vidf = read_vidf_header(chunks, entry, &running.mlvi)?;

                    *guard = Some(ScanCursor {
                        frame_index: frame_index + 1,
                        xref_pos: pos + 1,
                        vidf_count: vidf_count + 1,
                        record: running.clone(),
                    });

                    return Ok(FrameRecord {
                        mlvi: running.mlvi,
                        rawi,
                        rtci: running.rtci,
                        idnt: running.idnt,
                        expo: running.expo,
                        lens: running.lens,
                        wbal: running.wbal,
                        wavi: running.wavi,
                        vidf,
                        origin_chunk: entry.chunk_index,
                        origin_offset: entry.offset,
                    });
                }
                vidf_count += 1;
            }
            pos += 1;
            start_pos = pos;
        }

        // Remember where the scan gave up so a retry for the same
        // (unreached) index doesn't restart from zero either.
        *guard = Some(ScanCursor { frame_index, xref_pos: start_pos, vidf_count, record: running });
        Err(MlvError::NotFound(format!("frame index {frame_index}")))
    }
}

fn apply_metadata(running: &mut RunningRecord, entry: &XrefEntry, chunks: &ChunkSet) -> Result<()> {
    let body_offset = entry.offset + BLOCK_PREFIX_LEN;
    match BlockKind::from_tag(entry.tag) {
        BlockKind::Mlvi => {
            let body = chunks.read(entry.chunk_index as usize, body_offset, MlviBlock::WIRE_LEN)?;
            running.mlvi = Some(MlviBlock::parse(body)?);
        }
        BlockKind::Rawi => {
            let body = chunks.read(entry.chunk_index as usize, body_offset, RawiBlock::WIRE_LEN)?;
            running.rawi = Some(RawiBlock::parse(body)?);
        }
        BlockKind::Rtci => {
            let body = chunks.read(entry.chunk_index as usize, body_offset, RtciBlock::WIRE_LEN)?;
            running.rtci = Some(RtciBlock::parse(body)?);
        }
        BlockKind::Idnt => {
            // Variable length: re-derive the block's declared size from
            // the prefix that produced this xref entry.
            let prefix = chunks.read(entry.chunk_index as usize, entry.offset, BLOCK_PREFIX_LEN as usize)?;
            let size = u32::from_le_bytes(prefix[4..8].try_into().unwrap()) as u64;
            let body_len = size.saturating_sub(BLOCK_PREFIX_LEN) as usize;
            let body = chunks.read(entry.chunk_index as usize, body_offset, body_len)?;
            running.idnt = Some(IdntBlock::parse(body)?);
        }
        BlockKind::Expo => {
            let body = chunks.read(entry.chunk_index as usize, body_offset, ExpoBlock::WIRE_LEN)?;
            running.expo = Some(ExpoBlock::parse(body)?);
        }
        BlockKind::Lens => {
            let body = chunks.read(entry.chunk_index as usize, body_offset, LensBlock::WIRE_LEN)?;
            running.lens = Some(LensBlock::parse(body)?);
        }
        BlockKind::Wbal => {
            let body = chunks.read(entry.chunk_index as usize, body_offset, WbalBlock::WIRE_LEN)?;
            running.wbal = Some(WbalBlock::parse(body)?);
        }
        BlockKind::Wavi => {
            let body = chunks.read(entry.chunk_index as usize, body_offset, WaviBlock::WIRE_LEN)?;
            running.wavi = Some(WaviBlock::parse(body)?);
        }
        _ => {}
    }
    Ok(())
}

fn read_vidf_header(chunks: &ChunkSet, entry: &XrefEntry, mlvi: &Option<MlviBlock>) -> Result<VidfHeader> {
    let body_offset = entry.offset + BLOCK_PREFIX_LEN;
    let prefix = chunks.read(entry.chunk_index as usize, entry.offset, BLOCK_PREFIX_LEN as usize)?;
    let block_size = u32::from_le_bytes(prefix[4..8].try_into().unwrap()) as u64;

    let hdr_body = chunks.read(entry.chunk_index as usize, body_offset, FrameBlockHeader::WIRE_LEN)?;
    let hdr = FrameBlockHeader::parse(hdr_body)?;

    let header_len = BLOCK_PREFIX_LEN + FrameBlockHeader::WIRE_LEN as u64;
    let payload_offset = entry.offset + header_len + hdr.frame_space as u64;
    if payload_offset > entry.offset + block_size {
        return Err(MlvError::Malformed {
            container: chunks.base_name().to_string(),
            detail: "VIDF frameSpace exceeds block size".into(),
        });
    }
    let payload_len = (entry.offset + block_size).saturating_sub(payload_offset) as u32;

    let _ = mlvi;
    Ok(VidfHeader {
        frame_number: hdr.frame_number,
        timestamp: entry.timestamp,
        frame_space: hdr.frame_space,
        payload_offset,
        payload_len,
    })
}
