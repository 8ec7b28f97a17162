//! Vector configuration.

use serde::{Deserialize, Serialize};

/// What a bulk box operation does when the box touches no local storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOverlapPolicy {
    /// Fail with `StructMvError::NoOverlap`.
    #[default]
    Error,
    /// Treat the call as a no-op.
    Ignore,
}

/// Options fixed at vector creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorOptions {
    /// Stencil reach; becomes the initial ghost width on every side.
    pub stencil_width: usize,
    pub no_overlap: NoOverlapPolicy,
}

impl Default for VectorOptions {
    fn default() -> Self {
        Self {
            stencil_width: 1,
            no_overlap: NoOverlapPolicy::Error,
        }
    }
}
