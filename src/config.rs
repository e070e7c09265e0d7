//! Mount-time configuration: the option table of spec §6, loadable either
//! from a TOML file (the host binding's config file) or from a `-o
//! key=value,...` string (the host binding's FUSE mount-option string).
//! Parsing the command line itself remains the host binding's job.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{MlvError, Result};

/// Dual-ISO interpolation quality.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DualIsoMode {
    #[default]
    Off,
    Fast,
    HighQuality,
}

impl DualIsoMode {
    fn from_code(v: u8) -> Result<Self> {
        match v {
            0 => Ok(DualIsoMode::Off),
            1 => Ok(DualIsoMode::Fast),
            2 => Ok(DualIsoMode::HighQuality),
            other => Err(MlvError::Config(format!("dual_iso must be 0, 1 or 2, got {other}"))),
        }
    }
}

/// Bad-pixel repair aggressiveness.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum BadPixelMode {
    #[default]
    Off,
    Auto,
    Aggressive,
}

impl BadPixelMode {
    fn from_code(v: u8) -> Result<Self> {
        match v {
            0 => Ok(BadPixelMode::Off),
            1 => Ok(BadPixelMode::Auto),
            2 => Ok(BadPixelMode::Aggressive),
            other => Err(MlvError::Config(format!("fix_bad_pixels must be 0, 1 or 2, got {other}"))),
        }
    }
}

/// Chroma-smoothing window size. `0` disables the pass.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaSmooth {
    #[default]
    Off,
    Window2x2,
    Window3x3,
    Window5x5,
}

impl ChromaSmooth {
    fn from_code(v: u8) -> Result<Self> {
        match v {
            0 => Ok(ChromaSmooth::Off),
            2 => Ok(ChromaSmooth::Window2x2),
            3 => Ok(ChromaSmooth::Window3x3),
            5 => Ok(ChromaSmooth::Window5x5),
            other => Err(MlvError::Config(format!("chroma_smooth must be 0, 2, 3 or 5, got {other}"))),
        }
    }

    pub fn window(self) -> usize {
        match self {
            ChromaSmooth::Off => 0,
            ChromaSmooth::Window2x2 => 2,
            ChromaSmooth::Window3x3 => 3,
            ChromaSmooth::Window5x5 => 5,
        }
    }
}

/// Virtual-path naming scheme (spec §4.8 / §6 `name_scheme`).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameScheme {
    #[default]
    Default,
    ResolveCompatible,
}

/// Full set of mount-time options recognized by the core (spec §6 table).
#[derive(Debug, Clone)]
pub struct MountOptions {
    pub mlv_path: PathBuf,
    pub name_scheme: NameScheme,
    pub chroma_smooth: ChromaSmooth,
    pub fix_bad_pixels: BadPixelMode,
    pub fix_pattern_noise: bool,
    pub fix_stripes: bool,
    /// Target EV * 10000, or `None` for "off".
    pub deflicker_target: Option<i32>,
    pub dual_iso: DualIsoMode,
    /// `true` = mean23, `false` = AMaZE.
    pub hdr_mean23: bool,
    pub hdr_no_alias_map: bool,
    pub hdr_no_fullres: bool,
    pub fps_override: Option<f64>,
    /// Cache budget in bytes for the image buffer cache (C7).
    pub cache_budget_bytes: u64,
    /// Whether writes to virtual `.dng` files are permitted (spec §6).
    pub writable_dng: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            mlv_path: PathBuf::from("."),
            name_scheme: NameScheme::Default,
            chroma_smooth: ChromaSmooth::Off,
            fix_bad_pixels: BadPixelMode::Off,
            fix_pattern_noise: false,
            fix_stripes: false,
            deflicker_target: None,
            dual_iso: DualIsoMode::Off,
            hdr_mean23: false,
            hdr_no_alias_map: false,
            hdr_no_fullres: false,
            fps_override: None,
            cache_budget_bytes: 512 * 1024 * 1024,
            writable_dng: false,
        }
    }
}

/// On-disk mirror of [`MountOptions`], as read from a TOML config file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MountOptionsFile {
    pub mlv_path: PathBuf,
    #[serde(default)]
    pub name_scheme: u8,
    #[serde(default)]
    pub chroma_smooth: u8,
    #[serde(default)]
    pub fix_bad_pixels: u8,
    #[serde(default)]
    pub fix_pattern_noise: u8,
    #[serde(default)]
    pub fix_stripes: u8,
    #[serde(default)]
    pub deflicker: i32,
    #[serde(default)]
    pub dual_iso: u8,
    #[serde(default)]
    pub hdr_interpolation_method: u8,
    #[serde(default)]
    pub hdr_no_alias_map: u8,
    #[serde(default)]
    pub hdr_no_fullres: u8,
    pub fps: Option<f64>,
    #[serde(default = "default_cache_budget_mb")]
    pub cache_budget_mb: u64,
    #[serde(default)]
    pub writable_dng: u8,
}

fn default_cache_budget_mb() -> u64 {
    512
}

impl MountOptionsFile {
    fn into_options(self) -> Result<MountOptions> {
        Ok(MountOptions {
            mlv_path: self.mlv_path,
            name_scheme: if self.name_scheme == 0 {
                NameScheme::Default
            } else {
                NameScheme::ResolveCompatible
            },
            chroma_smooth: ChromaSmooth::from_code(self.chroma_smooth)?,
            fix_bad_pixels: BadPixelMode::from_code(self.fix_bad_pixels)?,
            fix_pattern_noise: self.fix_pattern_noise != 0,
            fix_stripes: self.fix_stripes != 0,
            deflicker_target: if self.deflicker == 0 { None } else { Some(self.deflicker) },
            dual_iso: DualIsoMode::from_code(self.dual_iso)?,
            hdr_mean23: self.hdr_interpolation_method != 0,
            hdr_no_alias_map: self.hdr_no_alias_map != 0,
            hdr_no_fullres: self.hdr_no_fullres != 0,
            fps_override: self.fps,
            cache_budget_bytes: self.cache_budget_mb * 1024 * 1024,
            writable_dng: self.writable_dng != 0,
        })
    }
}

impl MountOptions {
    /// Load options from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MlvError::Config(format!("cannot read config file: {e}")))?;
        let file: MountOptionsFile = toml::from_str(&content)
            .map_err(|e| MlvError::Config(format!("invalid TOML: {e}")))?;
        file.into_options()
    }

    /// Parse a comma-separated `key=value` string, the form a FUSE host
    /// typically collects via `-o`. Keys not recognized are ignored so a
    /// host can mix in its own unrelated mount options.
    pub fn from_option_string(mlv_path: PathBuf, opts: &str) -> Result<Self> {
        let mut out = MountOptions { mlv_path, ..MountOptions::default() };
        for pair in opts.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "name_scheme" => {
                    out.name_scheme = if parse_u8(value)? == 0 {
                        NameScheme::Default
                    } else {
                        NameScheme::ResolveCompatible
                    };
                }
                "chroma_smooth" => out.chroma_smooth = ChromaSmooth::from_code(parse_u8(value)?)?,
                "fix_bad_pixels" => out.fix_bad_pixels = BadPixelMode::from_code(parse_u8(value)?)?,
                "fix_pattern_noise" => out.fix_pattern_noise = parse_u8(value)? != 0,
                "fix_stripes" => out.fix_stripes = parse_u8(value)? != 0,
                "deflicker" => {
                    let v: i32 = value
                        .parse()
                        .map_err(|_| MlvError::Config(format!("invalid deflicker value '{value}'")))?;
                    out.deflicker_target = if v == 0 { None } else { Some(v) };
                }
                "dual_iso" => out.dual_iso = DualIsoMode::from_code(parse_u8(value)?)?,
                "hdr_interpolation_method" => out.hdr_mean23 = parse_u8(value)? != 0,
                "hdr_no_alias_map" => out.hdr_no_alias_map = parse_u8(value)? != 0,
                "hdr_no_fullres" => out.hdr_no_fullres = parse_u8(value)? != 0,
                "fps" => {
                    out.fps_override = Some(
                        value
                            .parse()
                            .map_err(|_| MlvError::Config(format!("invalid fps value '{value}'")))?,
                    );
                }
                "writable_dng" => out.writable_dng = parse_u8(value)? != 0,
                _ => {}
            }
        }
        Ok(out)
    }
}

fn parse_u8(value: &str) -> Result<u8> {
    value
        .parse()
        .map_err(|_| MlvError::Config(format!("expected an integer, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_string_defaults_when_empty() {
        let opts = MountOptions::from_option_string(PathBuf::from("/mnt"), "").unwrap();
        assert_eq!(opts.name_scheme, NameScheme::Default);
        assert_eq!(opts.dual_iso, DualIsoMode::Off);
    }

    #[test]
    fn option_string_parses_known_keys() {
        let opts = MountOptions::from_option_string(
            PathBuf::from("/mnt"),
            "name_scheme=1,chroma_smooth=3,dual_iso=2,deflicker=20000,fps=23.976,unknown_key=7",
        )
        .unwrap();
        assert_eq!(opts.name_scheme, NameScheme::ResolveCompatible);
        assert_eq!(opts.chroma_smooth, ChromaSmooth::Window3x3);
        assert_eq!(opts.dual_iso, DualIsoMode::HighQuality);
        assert_eq!(opts.deflicker_target, Some(20000));
        assert_eq!(opts.fps_override, Some(23.976));
    }

    #[test]
    fn rejects_bad_enum_code() {
        let err = MountOptions::from_option_string(PathBuf::from("/mnt"), "dual_iso=9").unwrap_err();
        assert!(matches!(err, MlvError::Config(_)));
    }
}
