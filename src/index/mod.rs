//! Spatial index: hash-keyed block storage and the bounding-box manager.
//!
//! - [`BlockIndex`]: hashmap from integer 3D keys to block records, with
//!   monotonic bounding-box growth, duplicate/aggregate insertion and
//!   neighbor-aware training-set assembly
//! - [`Block`] and [`BlockStats`]: per-block point indices and fused
//!   cell statistics

mod block;
mod spatial;

pub use block::{Block, BlockStats, cell_center_offsets, cell_index};
pub use spatial::BlockIndex;
