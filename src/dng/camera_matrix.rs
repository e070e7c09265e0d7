//! Per-camera color science tables, keyed by `IDNT.cameraModel`.
//! Computed once and read-only thereafter (Design Notes: "Global lookup
//! tables ... implement as eagerly computed constants ... not per-call
//! allocation").

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A camera's DNG color characterization: two illuminant color
/// matrices and the matching forward matrices, all 3x3 row-major.
#[derive(Debug, Clone, Copy)]
pub struct CameraColorProfile {
    pub color_matrix_1: [[i32; 2]; 9],
    pub color_matrix_2: [[i32; 2]; 9],
    pub forward_matrix_1: [[i32; 2]; 9],
    pub forward_matrix_2: [[i32; 2]; 9],
    pub unique_model: &'static str,
}

const IDENTITY_SRATIONAL: [[i32; 2]; 9] =
    [[1, 1], [0, 1], [0, 1], [0, 1], [1, 1], [0, 1], [0, 1], [0, 1], [1, 1]];

fn generic_profile(unique_model: &'static str) -> CameraColorProfile {
    CameraColorProfile {
        color_matrix_1: IDENTITY_SRATIONAL,
        color_matrix_2: IDENTITY_SRATIONAL,
        forward_matrix_1: IDENTITY_SRATIONAL,
        forward_matrix_2: IDENTITY_SRATIONAL,
        unique_model,
    }
}

/// Canon EOS 5D Mark III, sRGB D65 approximation (illustrative; real
/// deployments should replace these with measured matrices).
fn canon_5d3() -> CameraColorProfile {
    CameraColorProfile {
        color_matrix_1: [
            [6722, 10000], [-635, 10000], [-963, 10000],
            [-4287, 10000], [12460, 10000], [2028, 10000],
            [-675, 10000], [1762, 10000], [5080, 10000],
        ],
        color_matrix_2: [
            [6722, 10000], [-635, 10000], [-963, 10000],
            [-4287, 10000], [12460, 10000], [2028, 10000],
            [-675, 10000], [1762, 10000], [5080, 10000],
        ],
        forward_matrix_1: IDENTITY_SRATIONAL,
        forward_matrix_2: IDENTITY_SRATIONAL,
        unique_model: "Canon EOS 5D Mark III",
    }
}

/// Canon EOS M, same illustrative caveat as above.
fn canon_eos_m() -> CameraColorProfile {
    CameraColorProfile {
        color_matrix_1: [
            [6602, 10000], [-841, 10000], [-939, 10000],
            [-4472, 10000], [12458, 10000], [2247, 10000],
            [-975, 10000], [1885, 10000], [5778, 10000],
        ],
        color_matrix_2: [
            [6602, 10000], [-841, 10000], [-939, 10000],
            [-4472, 10000], [12458, 10000], [2247, 10000],
            [-975, 10000], [1885, 10000], [5778, 10000],
        ],
        forward_matrix_1: IDENTITY_SRATIONAL,
        forward_matrix_2: IDENTITY_SRATIONAL,
        unique_model: "Canon EOS M",
    }
}

static CAMERA_TABLE: Lazy<HashMap<u32, CameraColorProfile>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(0x80000285, canon_5d3());
    table.insert(0x80000331, canon_eos_m());
    table
});

/// Looks up the color profile for `camera_model`, falling back to an
/// identity profile (no color correction) for unrecognized models
/// rather than failing the whole frame.
pub fn lookup(camera_model: u32) -> CameraColorProfile {
    CAMERA_TABLE.get(&camera_model).copied().unwrap_or_else(|| generic_profile("Unknown Camera"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_resolves_to_named_profile() {
        let profile = lookup(0x80000285);
        assert_eq!(profile.unique_model, "Canon EOS 5D Mark III");
    }

    #[test]
    fn unknown_model_falls_back_to_identity() {
        let profile = lookup(0xdeadbeef);
        assert_eq!(profile.unique_model, "Unknown Camera");
        assert_eq!(profile.color_matrix_1, IDENTITY_SRATIONAL);
    }
}
