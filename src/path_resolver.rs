//! C8 Path Resolver: classifies a virtual filesystem path into the
//! closed tagged variant downstream components match on, instead of
//! re-checking path suffixes at every call site.

use std::path::{Path, PathBuf};

use crate::config::NameScheme;
use crate::container::blocks::RtciBlock;

/// What one resolved path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualEntry {
    /// A synthesized per-frame DNG, by frame index.
    Dng(u64),
    /// The concatenated-audio WAV file.
    Wav,
    /// The concatenated debug log.
    Log,
    /// The (unencoded, zero-length) preview animation placeholder.
    Gif,
    /// Anything else inside a recognized container: delegate to the
    /// sidecar mirror at this real path.
    Mirror(PathBuf),
}

/// One recognized container directory under the mount root.
#[derive(Debug, Clone)]
pub struct ResolvedContainer {
    pub mlv_path: PathBuf,
    pub base_name: String,
}

/// Builds the virtual directory name for a container under the active
/// naming scheme.
pub fn container_dir_name(base_name: &str, scheme: NameScheme, rtci: Option<RtciBlock>, clip_index: u32) -> String {
    match scheme {
        NameScheme::Default => format!("{base_name}.MLV"),
        NameScheme::ResolveCompatible => {
            let date = rtci
                .map(|r| r.datetime.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "0000-00-00".to_string());
            format!("{base_name}.MLV_1_{date}_{clip_index:04}_C0000")
        }
    }
}

/// Resolves `path` relative to `mount_root` against the set of known
/// containers. Walks prefix components until one matches a known
/// container directory name; the remainder is classified as a
/// [`VirtualEntry`]. Returns `None` if no component matches any
/// container (the caller should surface `NotFound`).
pub fn resolve<'a>(path: &Path, mount_root: &Path, containers: &'a [ResolvedContainer], scheme: NameScheme) -> Option<(&'a ResolvedContainer, VirtualEntry)> {
    let relative = path.strip_prefix(mount_root).ok()?;
    let mut components = relative.components();
    let dir_component = components.next()?.as_os_str().to_string_lossy().into_owned();

    let container = containers.iter().find(|c| match scheme {
        NameScheme::Default => dir_component == format!("{}.MLV", c.base_name),
        NameScheme::ResolveCompatible => dir_component.starts_with(&format!("{}.MLV_", c.base_name)),
    })?;

    let remainder: PathBuf = components.collect();
    let name = remainder.to_string_lossy().into_owned();

    if name.ends_with(".dng") {
        if let Some(idx) = extract_frame_index(&name) {
            return Some((container, VirtualEntry::Dng(idx)));
        }
    }
    if name == format!("{}.wav", container.base_name) {
        return Some((container, VirtualEntry::Wav));
    }
    if name == format!("{}.log", container.base_name) {
        return Some((container, VirtualEntry::Log));
    }
    if name == "_PREVIEW.gif" {
        return Some((container, VirtualEntry::Gif));
    }

    Some((container, VirtualEntry::Mirror(remainder)))
}

/// Parses the six digits immediately before the final `.` as a frame
/// index (e.g. `A_000123.dng` -> `123`).
fn extract_frame_index(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".dng")?;
    if stem.len() < 6 {
        return None;
    }
    let digits = &stem[stem.len() - 6..];
    digits.parse().ok()
}

/// Default-scheme virtual filename for frame `index` of `base_name`.
pub fn dng_name(base_name: &str, index: u64) -> String {
    format!("{base_name}_{index:06}.dng")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn containers() -> Vec<ResolvedContainer> {
        vec![ResolvedContainer { mlv_path: PathBuf::from("/data/A.MLV"), base_name: "A".to_string() }]
    }

    #[test]
    fn resolves_a_default_scheme_dng_path() {
        let root = PathBuf::from("/mnt");
        let path = root.join("A.MLV").join("A_000123.dng");
        let (container, entry) = resolve(&path, &root, &containers(), NameScheme::Default).unwrap();
        assert_eq!(container.base_name, "A");
        assert_eq!(entry, VirtualEntry::Dng(123));
    }

    #[test]
    fn resolves_wav_log_and_gif() {
        let root = PathBuf::from("/mnt");
        let cs = containers();
        assert_eq!(resolve(&root.join("A.MLV/A.wav"), &root, &cs, NameScheme::Default).unwrap().1, VirtualEntry::Wav);
        assert_eq!(resolve(&root.join("A.MLV/A.log"), &root, &cs, NameScheme::Default).unwrap().1, VirtualEntry::Log);
        assert_eq!(resolve(&root.join("A.MLV/_PREVIEW.gif"), &root, &cs, NameScheme::Default).unwrap().1, VirtualEntry::Gif);
    }

    #[test]
    fn anything_else_mirrors_to_the_sidecar() {
        let root = PathBuf::from("/mnt");
        let cs = containers();
        let (_c, entry) = resolve(&root.join("A.MLV/A_000000.dng.xmp"), &root, &cs, NameScheme::Default).unwrap();
        assert_eq!(entry, VirtualEntry::Mirror(PathBuf::from("A_000000.dng.xmp")));
    }

    #[test]
    fn resolve_compatible_scheme_matches_embedded_date_prefix() {
        let root = PathBuf::from("/mnt");
        let cs = containers();
        let dirname = container_dir_name("A", NameScheme::ResolveCompatible, None, 1);
        let path = root.join(&dirname).join("A_000001.dng");
        let (container, entry) = resolve(&path, &root, &cs, NameScheme::ResolveCompatible).unwrap();
        assert_eq!(container.base_name, "A");
        assert_eq!(entry, VirtualEntry::Dng(1));
    }

    #[test]
    fn no_matching_container_returns_none() {
        let root = PathBuf::from("/mnt");
        let cs = containers();
        assert!(resolve(&root.join("B.MLV/B_000000.dng"), &root, &cs, NameScheme::Default).is_none());
    }
}
