//! StructMvError: Unified error type for struct-mv public APIs
//!
//! Every fallible operation in this crate returns `Result<_, StructMvError>`.
//! Threaded operations capture worker failures into their batch report and
//! surface them through this same type after the join.

use std::sync::Arc;
use thiserror::Error;

/// Boxed, shareable error source (keeps `StructMvError: Clone`).
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// Unified error type for struct-mv operations.
#[derive(Debug, Error, Clone)]
pub enum StructMvError {
    /// A box was constructed with `lower > upper` on some axis.
    #[error("Invalid box range on axis {axis}: lower {lower} > upper {upper}")]
    InvalidRange { axis: usize, lower: i64, upper: i64 },
    /// Coordinates, ghost widths or layouts disagree on dimensionality.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Point or box access outside every local owned-or-ghost region.
    #[error("Point {point:?} lies outside every local data box")]
    OutOfBounds { point: Vec<i64> },
    /// Operation invoked before (or after) its required lifecycle step.
    #[error("Vector not ready: {0}")]
    NotReady(&'static str),
    /// A bulk box operation touched zero local storage.
    #[error("Box {lower:?}..={upper:?} does not overlap any local data box")]
    NoOverlap { lower: Vec<i64>, upper: Vec<i64> },
    /// A value buffer does not match the addressed box volume.
    #[error("Value buffer length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    /// Storage request failed or its size overflowed.
    #[error("Allocation of {len} values failed")]
    Allocation { len: usize },
    /// Peer communication failure.
    #[error("Transport error with rank {peer}: {source}")]
    Transport {
        peer: usize,
        #[source]
        source: ErrorSource,
    },
    /// A plan was applied to vectors whose layouts differ from the ones it was built for.
    #[error("Layout mismatch: {0}")]
    LayoutMismatch(String),
    /// A dispatched unit of work panicked.
    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },
    /// Configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal invariant check failed.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl StructMvError {
    /// Build a [`StructMvError::Transport`] from a plain message.
    pub fn transport(peer: usize, msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        let boxed: Box<dyn std::error::Error + Send + Sync> = msg.into();
        StructMvError::Transport {
            peer,
            source: Arc::from(boxed),
        }
    }
}

impl PartialEq for StructMvError {
    fn eq(&self, other: &Self) -> bool {
        use StructMvError::*;
        match (self, other) {
            (
                InvalidRange { axis: a, lower: l, upper: u },
                InvalidRange { axis: b, lower: m, upper: v },
            ) => a == b && l == m && u == v,
            (
                DimensionMismatch { expected: a, found: b },
                DimensionMismatch { expected: c, found: d },
            ) => a == c && b == d,
            (OutOfBounds { point: a }, OutOfBounds { point: b }) => a == b,
            (NotReady(a), NotReady(b)) => a == b,
            (NoOverlap { lower: a, upper: b }, NoOverlap { lower: c, upper: d }) => {
                a == c && b == d
            }
            (
                LengthMismatch { expected: a, found: b },
                LengthMismatch { expected: c, found: d },
            ) => a == c && b == d,
            (Allocation { len: a }, Allocation { len: b }) => a == b,
            (Transport { peer: a, source: s }, Transport { peer: b, source: t }) => {
                a == b && s.to_string() == t.to_string()
            }
            (LayoutMismatch(a), LayoutMismatch(b)) => a == b,
            (
                WorkerPanicked { worker: a, message: m },
                WorkerPanicked { worker: b, message: n },
            ) => a == b && m == n,
            (InvalidConfig(a), InvalidConfig(b)) => a == b,
            (InvariantViolation(a), InvariantViolation(b)) => a == b,
            _ => false,
        }
    }
}
