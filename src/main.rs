//! `mlv-inspect` — a small demo binary for the frame materialization
//! core. It opens one MLV recording, materializes a single frame to a
//! `.dng` file on disk, and exits. Mounting a whole recording as a
//! filesystem (path routing for every frame, `readdir`, open file
//! handles) is the host binding's job, not this binary's.
//!
//! Usage: mlv-inspect <path-to.MLV> <frame-index> [output.dng]

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mlvfs_core::config::MountOptions;
use mlvfs_core::path_resolver;
use mlvfs_core::pipeline;
use mlvfs_core::processing::bad_pixel::FocusPixelMap;
use mlvfs_core::recording::RecordingRegistry;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let mlv_path = match args.next() {
        Some(p) => PathBuf::from(p),
        None => {
            eprintln!("usage: mlv-inspect <path-to.MLV> <frame-index> [output.dng]");
            std::process::exit(2);
        }
    };
    let frame_index: u64 = match args.next().and_then(|s| s.parse().ok()) {
        Some(i) => i,
        None => {
            eprintln!("usage: mlv-inspect <path-to.MLV> <frame-index> [output.dng]");
            std::process::exit(2);
        }
    };
    let base_name = file_stem(&mlv_path).to_string();
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(path_resolver::dng_name(&base_name, frame_index)));

    let registry = RecordingRegistry::new();
    let recording = match registry.get_or_open(&mlv_path) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, path = %mlv_path.display(), "failed to open recording");
            std::process::exit(1);
        }
    };

    info!(
        frames = recording.xref.vidf_count(),
        base_name = %recording.base_name,
        "opened recording"
    );

    let options = MountOptions { mlv_path: mlv_path.clone(), ..MountOptions::default() };
    let focus_map = FocusPixelMap::default();

    let buffer = match pipeline::materialize_frame(&recording, frame_index, &options, &focus_map) {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, frame_index, "failed to materialize frame");
            std::process::exit(1);
        }
    };

    let total_len = buffer.header.len() + buffer.image.len();
    if let Err(e) = std::fs::write(&output, [buffer.header.as_slice(), buffer.image.as_slice()].concat()) {
        error!(error = %e, path = %output.display(), "failed to write output file");
        std::process::exit(1);
    }

    info!(bytes = total_len, output = %output.display(), "wrote frame");
}

fn file_stem(path: &std::path::Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("output")
}
