#![cfg_attr(docsrs, feature(doc_cfg))]
//! # struct-mv
//!
//! struct-mv is a distributed vector over structured grids: `f64` values
//! addressed by integer coordinates on a regular index space whose boxes are
//! partitioned across ranks.
//!
//! ## Features
//! - Closed integer boxes ([`grid::IndexBox`]) and per-rank box layouts ([`grid::StructGrid`])
//! - Point, box and constant value access with ghost layers ([`data::StructVector`])
//! - Thread-parallel variants dispatched through a fixed worker pool ([`algs::WorkQueue`])
//! - Reusable communication plans and migration between partitions ([`algs::CommPlan`])
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//! ```
//! use std::sync::Arc;
//! use struct_mv::prelude::*;
//!
//! let bbox = IndexBox::new(&[0, 0], &[3, 3])?;
//! let grid = Arc::new(StructGrid::from_boxes(2, 0, [(0, bbox)])?);
//! let mut v = StructVector::with_stencil_width(grid, 0);
//! v.initialize()?;
//! let values: Vec<f64> = (0..16).map(f64::from).collect();
//! v.set_box_values(&bbox, &values)?;
//! assert_eq!(v.get_value(&[1, 2])?, 6.0);
//! # Ok::<(), StructMvError>(())
//! ```
//!
//! ## Features flags
//! - `mpi-support`: MPI communicator backend (`MpiComm`).
//! - `check-invariants`: validate internal invariants after mutations in
//!   release builds too.

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod grid;
pub mod struct_error;

pub use debug_invariants::DebugInvariants;
pub use struct_error::StructMvError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::migrate::{CommPlan, PlanKind, Transfer, migrate};
    pub use crate::algs::work_queue::{BatchReport, NUM_THREADS, QueueConfig, QueueState, WorkQueue};
    pub use crate::data::options::{NoOverlapPolicy, VectorOptions};
    pub use crate::data::storage::{Storage, VecStorage};
    pub use crate::data::struct_vector::StructVector;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::grid::{IndexBox, StructGrid};
    pub use crate::struct_error::StructMvError;
}
