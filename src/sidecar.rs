//! C9 Sidecar Mirror: redirects non-virtual paths inside a mounted
//! container to a real shadow directory (`<name>.MLD`) on disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MlvError, Result};

/// Derives the shadow directory for container `base_name` (e.g. `A` for
/// `A.MLV` -> `A.MLD`), rooted next to the container file.
pub fn mirror_dir(container_dir: &Path, base_name: &str) -> PathBuf {
    container_dir.join(format!("{base_name}.MLD"))
}

/// Maps a mirrored logical name to its real on-disk path, creating the
/// `.MLD` directory on first use if it doesn't exist yet. Never
/// deletes the directory itself.
pub fn resolve_mirror_path(container_dir: &Path, base_name: &str, logical_name: &Path) -> Result<PathBuf> {
    let dir = mirror_dir(container_dir, base_name);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(MlvError::Io)?;
    }
    Ok(dir.join(logical_name))
}

/// Lists real entries in the mirror directory, suppressing the `.MLD`
/// directory itself and any `.IDX` sidecar so they never double up
/// with virtual listings.
pub fn list_mirror_entries(container_dir: &Path, base_name: &str) -> Result<Vec<String>> {
    let dir = mirror_dir(container_dir, base_name);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir).map_err(MlvError::Io)? {
        let entry = entry.map_err(MlvError::Io)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".MLD") || name.ends_with(".IDX") {
            continue;
        }
        out.push(name);
    }
    Ok(out)
}

/// Writes `data` to the mirrored path for `logical_name`, creating the
/// `.MLD` directory lazily.
pub fn write_mirror_file(container_dir: &Path, base_name: &str, logical_name: &Path, data: &[u8]) -> Result<()> {
    let real_path = resolve_mirror_path(container_dir, base_name, logical_name)?;
    fs::write(real_path, data).map_err(MlvError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_mld_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let mld = mirror_dir(dir.path(), "A");
        assert!(!mld.exists());

        write_mirror_file(dir.path(), "A", Path::new("A_000000.dng.xmp"), b"<xmp/>").unwrap();
        assert!(mld.exists());
        assert!(mld.join("A_000000.dng.xmp").exists());
    }

    #[test]
    fn listing_suppresses_mld_and_idx_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_mirror_file(dir.path(), "A", Path::new("note.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("A.IDX"), b"ignored").unwrap();

        let entries = list_mirror_entries(dir.path(), "A").unwrap();
        assert_eq!(entries, vec!["note.txt".to_string()]);
    }

    #[test]
    fn listing_missing_directory_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(list_mirror_entries(dir.path(), "A").unwrap(), Vec::<String>::new());
    }
}
