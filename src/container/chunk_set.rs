//! C1 Chunk Set: the ordered group of numbered container files
//! (`X.MLV`, `X.M00`, `X.M01`, …) that make up one logical recording.

use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{MlvError, Result};

/// One memory-mapped chunk file plus its path, for error messages.
struct Chunk {
    path: PathBuf,
    map: Mmap,
}

/// The full ordered set of chunk files for one recording, mapped once
/// and kept open for the process lifetime. Reads are plain slices of
/// an immutable mapping, so concurrent readers need no lock.
pub struct ChunkSet {
    base_name: String,
    chunks: Vec<Chunk>,
}

impl ChunkSet {
    /// Opens `path` (the `.MLV`/`.mlv` file) plus every lexically later
    /// sibling sharing its stem with extension `.M00`, `.M01`, ….
    pub fn open(path: &Path) -> Result<Self> {
        let first = File::open(path).map_err(MlvError::Io)?;
        let first_map = unsafe { Mmap::map(&first) }.map_err(MlvError::Io)?;

        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut chunks = vec![Chunk { path: path.to_path_buf(), map: first_map }];

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut siblings: Vec<PathBuf> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let candidate = entry.path();
                if candidate == path {
                    continue;
                }
                if is_numbered_sibling(path, &candidate) {
                    siblings.push(candidate);
                }
            }
        }
        siblings.sort();

        for sib in siblings {
            let f = File::open(&sib).map_err(MlvError::Io)?;
            let m = unsafe { Mmap::map(&f) }.map_err(MlvError::Io)?;
            chunks.push(Chunk { path: sib, map: m });
        }

        Ok(Self { base_name, chunks })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_len(&self, chunk_index: usize) -> Option<u64> {
        self.chunks.get(chunk_index).map(|c| c.map.len() as u64)
    }

    /// Reads `len` bytes at `offset` within chunk `chunk_index`. Returns
    /// `TransientIo` if the read would run past the chunk's end rather
    /// than panicking or silently truncating.
    pub fn read(&self, chunk_index: usize, offset: u64, len: usize) -> Result<&[u8]> {
        let chunk = self.chunks.get(chunk_index).ok_or_else(|| MlvError::TransientIo {
            container: self.base_name.clone(),
            detail: format!("chunk index {chunk_index} out of range"),
        })?;
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| MlvError::TransientIo { container: chunk_label(chunk), detail: "offset overflow".into() })?;
        if end > chunk.map.len() {
            return Err(MlvError::TransientIo {
                container: chunk_label(chunk),
                detail: format!("read [{start}, {end}) past chunk length {}", chunk.map.len()),
            });
        }
        Ok(&chunk.map[start..end])
    }
}

fn chunk_label(chunk: &Chunk) -> String {
    chunk.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Whether `candidate` is a numbered sibling of `first` (same stem,
/// extension matching `.M` followed by two digits, case-insensitively).
fn is_numbered_sibling(first: &Path, candidate: &Path) -> bool {
    let (Some(first_stem), Some(cand_stem)) = (first.file_stem(), candidate.file_stem()) else {
        return false;
    };
    if first_stem != cand_stem {
        return false;
    }
    let Some(ext) = candidate.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_uppercase();
    ext.len() == 3 && ext.starts_with('M') && ext[1..].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn opens_base_file_with_no_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        std::fs::write(&path, b"hello world").unwrap();

        let set = ChunkSet::open(&path).unwrap();
        assert_eq!(set.chunk_count(), 1);
        assert_eq!(set.base_name(), "A");
        assert_eq!(set.read(0, 0, 5).unwrap(), b"hello");
    }

    #[test]
    fn collects_numbered_siblings_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("A.MLV");
        std::fs::write(&base, b"chunk0").unwrap();
        std::fs::write(dir.path().join("A.M01"), b"chunk2").unwrap();
        std::fs::write(dir.path().join("A.M00"), b"chunk1").unwrap();
        std::fs::write(dir.path().join("B.M00"), b"unrelated").unwrap();

        let set = ChunkSet::open(&base).unwrap();
        assert_eq!(set.chunk_count(), 3);
        assert_eq!(set.read(0, 0, 6).unwrap(), b"chunk0");
        assert_eq!(set.read(1, 0, 6).unwrap(), b"chunk1");
        assert_eq!(set.read(2, 0, 6).unwrap(), b"chunk2");
    }

    #[test]
    fn read_past_end_is_transient_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"1234").unwrap();

        let set = ChunkSet::open(&path).unwrap();
        let err = set.read(0, 0, 100).unwrap_err();
        assert!(matches!(err, MlvError::TransientIo { .. }));
    }
}
