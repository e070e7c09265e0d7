//! C2 Block Index: a full scan of every chunk producing a cross-reference
//! table sorted by in-recording timestamp, with an optional `.IDX`
//! on-disk cache (spec §6 layout).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::path::Path;

use super::blocks::BLOCK_PREFIX_LEN;
use super::chunk_set::ChunkSet;
use crate::error::{MlvError, Result};

const IDX_MAGIC: [u8; 4] = *b"XREF";
const IDX_VERSION: u32 = 1;

/// One xref record: where a block lives and when it was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefEntry {
    pub chunk_index: u16,
    pub offset: u64,
    pub tag: [u8; 4],
    pub timestamp: u64,
    /// Position in on-disk scan order, used only to break timestamp ties
    /// deterministically (spec's stable secondary sort key).
    pub orig_pos: u64,
}

/// The full xref table for a recording, sorted by `(timestamp, orig_pos)`.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    pub entries: Vec<XrefEntry>,
    /// Set if any chunk's scan terminated early on a bad block size.
    pub partial: bool,
}

impl XrefTable {
    pub fn vidf_count(&self) -> usize {
        self.entries.iter().filter(|e| e.tag == super::blocks::TAG_VIDF).count()
    }
}

/// Scans every chunk in `chunks` from offset 0, recording one xref entry
/// per block and advancing by the block's declared size. A block whose
/// size is zero or would extend past the chunk's end stops that chunk's
/// scan; everything gathered so far for other chunks remains valid and
/// the table is marked `partial`.
pub fn build_index(chunks: &ChunkSet) -> Result<XrefTable> {
    let mut entries = Vec::new();
    let mut partial = false;
    let mut orig_pos: u64 = 0;

    for chunk_index in 0..chunks.chunk_count() {
        let chunk_len = chunks.chunk_len(chunk_index).unwrap_or(0);
        let mut offset: u64 = 0;
        loop {
            if offset + BLOCK_PREFIX_LEN > chunk_len {
                break;
            }
            let prefix = chunks.read(chunk_index, offset, BLOCK_PREFIX_LEN as usize)?;
            let mut tag = [0u8; 4];
            tag.copy_from_slice(&prefix[0..4]);
            let size = (&prefix[4..8]).read_u32::<LittleEndian>().unwrap_or(0) as u64;
            let timestamp = (&prefix[8..16]).read_u64::<LittleEndian>().unwrap_or(0);

            if size < BLOCK_PREFIX_LEN || offset + size > chunk_len {
                partial = true;
                break;
            }

            entries.push(XrefEntry { chunk_index: chunk_index as u16, offset, tag, timestamp, orig_pos });
            orig_pos += 1;
            offset += size;
        }
    }

    entries.sort_by_key(|e| (e.timestamp, e.orig_pos));
    Ok(XrefTable { entries, partial })
}

/// Reads a previously persisted `.IDX` sidecar. Returns `Ok(None)` if the
/// file does not exist; a malformed header/body is a hard error since
/// the caller is expected to fall back to a live scan only on absence.
pub fn load_idx(path: &Path) -> Result<Option<XrefTable>> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MlvError::Io(e)),
    };

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).map_err(MlvError::Io)?;
    if magic != IDX_MAGIC {
        return Err(MlvError::Malformed {
            container: path.display().to_string(),
            detail: "bad .IDX magic".into(),
        });
    }
    let _version = file.read_u32::<LittleEndian>().map_err(MlvError::Io)?;
    let entry_count = file.read_u32::<LittleEndian>().map_err(MlvError::Io)?;

    let mut entries = Vec::with_capacity(entry_count as usize);
    for orig_pos in 0..entry_count as u64 {
        let chunk_index = file.read_u16::<LittleEndian>().map_err(MlvError::Io)?;
        let _reserved0 = file.read_u16::<LittleEndian>().map_err(MlvError::Io)?;
        let offset = file.read_u64::<LittleEndian>().map_err(MlvError::Io)?;
        let frame_type = file.read_u16::<LittleEndian>().map_err(MlvError::Io)?;
        let _reserved1 = file.read_u16::<LittleEndian>().map_err(MlvError::Io)?;
        let timestamp = file.read_u64::<LittleEndian>().map_err(MlvError::Io)?;
        entries.push(XrefEntry {
            chunk_index,
            offset,
            tag: frame_type_to_tag(frame_type),
            timestamp,
            orig_pos,
        });
    }

    Ok(Some(XrefTable { entries, partial: false }))
}

/// Writes the xref table to `path` in the `.IDX` layout.
pub fn save_idx(path: &Path, table: &XrefTable) -> Result<()> {
    let mut file = std::fs::File::create(path).map_err(MlvError::Io)?;
    file.write_all(&IDX_MAGIC).map_err(MlvError::Io)?;
    file.write_u32::<LittleEndian>(IDX_VERSION).map_err(MlvError::Io)?;
    file.write_u32::<LittleEndian>(table.entries.len() as u32).map_err(MlvError::Io)?;

    for entry in &table.entries {
        file.write_u16::<LittleEndian>(entry.chunk_index).map_err(MlvError::Io)?;
        file.write_u16::<LittleEndian>(0).map_err(MlvError::Io)?;
        file.write_u64::<LittleEndian>(entry.offset).map_err(MlvError::Io)?;
        file.write_u16::<LittleEndian>(tag_to_frame_type(entry.tag)).map_err(MlvError::Io)?;
        file.write_u16::<LittleEndian>(0).map_err(MlvError::Io)?;
        file.write_u64::<LittleEndian>(entry.timestamp).map_err(MlvError::Io)?;
    }
    Ok(())
}

/// `.IDX` stores block types as a compact numeric code rather than the
/// raw 4-byte tag, so round-tripping through the sidecar needs a stable
/// mapping. Unknown tags round-trip via their first byte plus a marker
/// bit, which is lossy only for exotic/unknown block types that never
/// contribute to a `FrameRecord` anyway.
fn tag_to_frame_type(tag: [u8; 4]) -> u16 {
    use super::blocks::*;
    match tag {
        TAG_MLVI => 1,
        TAG_RAWI => 2,
        TAG_RTCI => 3,
        TAG_IDNT => 4,
        TAG_EXPO => 5,
        TAG_LENS => 6,
        TAG_WBAL => 7,
        TAG_WAVI => 8,
        TAG_VIDF => 9,
        TAG_AUDF => 10,
        TAG_DEBG => 11,
        TAG_NULL => 12,
        _ => 0xFFFF,
    }
}

fn frame_type_to_tag(code: u16) -> [u8; 4] {
    use super::blocks::*;
    match code {
        1 => TAG_MLVI,
        2 => TAG_RAWI,
        3 => TAG_RTCI,
        4 => TAG_IDNT,
        5 => TAG_EXPO,
        6 => TAG_LENS,
        7 => TAG_WBAL,
        8 => TAG_WAVI,
        9 => TAG_VIDF,
        10 => TAG_AUDF,
        11 => TAG_DEBG,
        12 => TAG_NULL,
        _ => *b"????",
    }
}

/// Builds (or reloads) the xref table for `chunks`, preferring a valid
/// `.IDX` sidecar whose entry count matches a fresh block count.
pub fn get_index(chunks: &ChunkSet, idx_path: &Path) -> Result<XrefTable> {
    let fresh = build_index(chunks)?;
    if let Some(cached) = load_idx(idx_path)? {
        if cached.entries.len() == fresh.entries.len() {
            return Ok(cached);
        }
    }
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::blocks::{TAG_MLVI, TAG_RAWI, TAG_VIDF};
    use byteorder::WriteBytesExt;

    fn write_block(buf: &mut Vec<u8>, tag: [u8; 4], timestamp: u64, body: &[u8]) {
        let size = (16 + body.len()) as u32;
        buf.extend_from_slice(&tag);
        buf.write_u32::<LittleEndian>(size).unwrap();
        buf.write_u64::<LittleEndian>(timestamp).unwrap();
        buf.extend_from_slice(body);
    }

    #[test]
    fn scans_and_sorts_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        let mut buf = Vec::new();
        write_block(&mut buf, TAG_MLVI, 0, &[]);
        write_block(&mut buf, TAG_VIDF, 200, &[1, 2, 3, 4]);
        write_block(&mut buf, TAG_RAWI, 100, &[]);
        std::fs::write(&path, &buf).unwrap();

        let chunks = ChunkSet::open(&path).unwrap();
        let table = build_index(&chunks).unwrap();
        assert!(!table.partial);
        assert_eq!(table.entries.len(), 3);
        let timestamps: Vec<u64> = table.entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![0, 100, 200]);
        assert_eq!(table.vidf_count(), 1);
    }

    #[test]
    fn truncated_final_block_marks_partial_but_keeps_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        let mut buf = Vec::new();
        write_block(&mut buf, TAG_MLVI, 0, &[]);
        // Declares a size far larger than remaining bytes.
        buf.extend_from_slice(&TAG_RAWI);
        buf.write_u32::<LittleEndian>(9999).unwrap();
        buf.write_u64::<LittleEndian>(1).unwrap();
        std::fs::write(&path, &buf).unwrap();

        let chunks = ChunkSet::open(&path).unwrap();
        let table = build_index(&chunks).unwrap();
        assert!(table.partial);
        assert_eq!(table.entries.len(), 1);
    }

    #[test]
    fn idx_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        let mut buf = Vec::new();
        write_block(&mut buf, TAG_MLVI, 0, &[]);
        write_block(&mut buf, TAG_VIDF, 50, &[]);
        std::fs::write(&path, &buf).unwrap();

        let chunks = ChunkSet::open(&path).unwrap();
        let table = build_index(&chunks).unwrap();
        let idx_path = dir.path().join("A.IDX");
        save_idx(&idx_path, &table).unwrap();
        let loaded = load_idx(&idx_path).unwrap().unwrap();
        assert_eq!(loaded.entries.len(), table.entries.len());
        for (a, b) in table.entries.iter().zip(loaded.entries.iter()) {
            assert_eq!(a.chunk_index, b.chunk_index);
            assert_eq!(a.offset, b.offset);
            assert_eq!(a.tag, b.tag);
            assert_eq!(a.timestamp, b.timestamp);
        }
    }

    #[test]
    fn missing_idx_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_idx(&dir.path().join("nope.IDX")).unwrap().is_none());
    }
}
