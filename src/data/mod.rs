//! Data module: vector storage, box atlas and the structured vector

pub mod atlas;
pub mod box_copy;
pub mod options;
pub mod storage;
pub mod struct_vector;

pub use atlas::{AtlasEntry, BoxAtlas};
pub use options::{NoOverlapPolicy, VectorOptions};
pub use storage::{Storage, VecStorage};
pub use struct_vector::StructVector;
