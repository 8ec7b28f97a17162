//! Grid module: index boxes and the box decomposition of the index space.

pub mod index_box;
pub mod struct_grid;

pub use index_box::{BoxPoints, Index, IndexBox, MAX_DIM};
pub use struct_grid::{GridBox, StructGrid};
