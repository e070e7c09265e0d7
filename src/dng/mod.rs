//! C5 DNG Synthesizer: TIFF/EP header construction and per-camera
//! color science tables.

pub mod camera_matrix;
pub mod synth;

pub use synth::{build_header, header_size, HeaderInputs};
