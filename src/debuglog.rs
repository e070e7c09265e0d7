//! Debug log (`.log`) virtual file: the concatenation of every `DEBG`
//! block's text payload in xref order, each null-terminated.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::container::blocks::{BLOCK_PREFIX_LEN, TAG_DEBG};
use crate::container::block_index::XrefTable;
use crate::container::chunk_set::ChunkSet;
use crate::error::Result;

/// Concatenates all `DEBG` block payloads, appending a `\0` to any that
/// don't already end with one.
pub fn log_bytes(xref: &XrefTable, chunks: &ChunkSet) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for entry in &xref.entries {
        if entry.tag != TAG_DEBG {
            continue;
        }
        let prefix = chunks.read(entry.chunk_index as usize, entry.offset, BLOCK_PREFIX_LEN as usize)?;
        let block_size = (&prefix[4..8]).read_u32::<LittleEndian>().unwrap_or(0) as u64;
        let body_len = block_size.saturating_sub(BLOCK_PREFIX_LEN) as usize;
        let body = chunks.read(entry.chunk_index as usize, entry.offset + BLOCK_PREFIX_LEN, body_len)?;
        out.extend_from_slice(body);
        if out.last() != Some(&0) {
            out.push(0);
        }
    }
    Ok(out)
}
