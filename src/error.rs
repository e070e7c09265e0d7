//! Error taxonomy for the frame materialization pipeline.
//!
//! Every fallible core entry point returns [`Result<T>`]. None of them
//! panic or abort the process; a corrupt frame or a failed decode is
//! isolated to the caller that requested it, never the whole recording.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MlvError {
    /// Path does not resolve, or a frame index is out of range.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing `RAWI`, an implausible block size, or a decoder failure.
    #[error("malformed container '{container}': {detail}")]
    Malformed { container: String, detail: String },

    /// Generic I/O failure (config loading, sidecar mirror operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A chunk read failed; callers receive a short read, not a cached
    /// failure, so the next request retries.
    #[error("transient read failure on '{container}': {detail}")]
    TransientIo { container: String, detail: String },

    /// Cache budget exhausted with no evictable entries.
    #[error("cache out of memory: {0}")]
    OutOfMemory(String),

    /// Write attempted against a virtual file while not in writable-DNG mode.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Bad mount option or configuration file.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MlvError>;
