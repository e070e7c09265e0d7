//! Process-wide recording registry tying C1 (chunk set) and C2 (block
//! index) together, plus the per-recording lazy stripe-correction
//! table cache that C6 relies on.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::container::block_index::{get_index, XrefTable};
use crate::container::chunk_set::ChunkSet;
use crate::container::header_cache::HeaderCache;
use crate::error::Result;
use crate::processing::stripe_correction::StripeGainTable;

/// Everything known about one opened recording: its chunk set, the
/// immutable-once-built xref table, the header-resolution scan state,
/// and a lazily computed stripe-correction table.
pub struct Recording {
    pub path: PathBuf,
    pub base_name: String,
    pub chunks: ChunkSet,
    pub xref: Arc<XrefTable>,
    pub header_cache: HeaderCache,
    stripe_table: OnceCell<StripeGainTable>,
}

impl Recording {
    /// Returns the cached stripe-gain table, computing it via `build`
    /// on first use under this recording's own lock. `build` typically
    /// decodes a handful of sample frames and calls
    /// `processing::stripe_correction::estimate`.
    pub fn stripe_table_or_init(&self, build: impl FnOnce() -> StripeGainTable) -> &StripeGainTable {
        self.stripe_table.get_or_init(build)
    }
}

/// The process-wide table of opened recordings, keyed by canonical
/// container path. The block index and chunk set are immutable once
/// built; a per-path build lock (not a single global one) guards the
/// open step so concurrent opens of *different* recordings don't
/// serialize behind each other.
#[derive(Default)]
pub struct RecordingRegistry {
    build_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    recordings: Mutex<HashMap<PathBuf, Arc<Recording>>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or returns the already-open) recording at `mlv_path`.
    pub fn get_or_open(&self, mlv_path: &Path) -> Result<Arc<Recording>> {
        if let Some(existing) = self.recordings.lock().get(mlv_path) {
            return Ok(existing.clone());
        }

        let build_lock = {
            let mut locks = self.build_locks.lock();
            locks.entry(mlv_path.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = build_lock.lock();

        if let Some(existing) = self.recordings.lock().get(mlv_path) {
            return Ok(existing.clone());
        }

        let chunks = ChunkSet::open(mlv_path)?;
        let idx_path = mlv_path.with_extension("IDX");
        let xref = Arc::new(get_index(&chunks, &idx_path)?);
        let base_name = chunks.base_name().to_string();

        let recording = Arc::new(Recording {
            path: mlv_path.to_path_buf(),
            base_name,
            chunks,
            xref,
            header_cache: HeaderCache::new(),
            stripe_table: OnceCell::new(),
        });

        self.recordings.lock().insert(mlv_path.to_path_buf(), recording.clone());
        Ok(recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_opens_return_the_same_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.MLV");
        std::fs::write(&path, b"").unwrap();

        let registry = RecordingRegistry::new();
        let a = registry.get_or_open(&path).unwrap();
        let b = registry.get_or_open(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
