//! Container-format layer: chunk files, the block index, header
//! resolution, and raw payload decoding (C1-C4).

pub mod bitpack;
pub mod block_index;
pub mod blocks;
pub mod chunk_set;
pub mod header_cache;
pub mod lj92;
pub mod raw_payload;

pub use blocks::{BayerPattern, BlockKind};
pub use chunk_set::ChunkSet;
pub use header_cache::{FrameRecord, HeaderCache};
