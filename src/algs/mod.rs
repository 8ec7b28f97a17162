//! Re-export public algorithms.

pub mod communicator;
pub mod migrate;
pub mod wire;
pub mod work_queue;

pub use communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
pub use migrate::{CommPlan, migrate};
pub use work_queue::{NUM_THREADS, WorkQueue};
