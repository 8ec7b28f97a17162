//! Pluggable storage for vector buffers.
//!
//! This trait abstracts how a vector's flat buffer is allocated and held.
//! Sizing is computed by the vector; the storage only has to hand back a
//! contiguous slice of the requested length or report an allocation failure.

use core::fmt::{self, Debug};

use crate::struct_error::StructMvError;

/// Contiguous, indexable storage for `V` with slice access.
pub trait Storage<V>: Debug + Send + Sync {
    /// Allocate a buffer of `len` elements filled with `fill`.
    ///
    /// # Errors
    /// `Allocation` if the request cannot be satisfied.
    fn try_with_len(len: usize, fill: V) -> Result<Self, StructMvError>
    where
        V: Clone,
        Self: Sized;

    /// Current length in elements.
    fn len(&self) -> usize;

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entire read-only buffer.
    fn as_slice(&self) -> &[V];

    /// Entire mutable buffer.
    fn as_mut_slice(&mut self) -> &mut [V];
}

/// `Vec`-backed storage (default).
#[derive(Clone)]
pub struct VecStorage<V>(pub(crate) Vec<V>);

impl<V> Debug for VecStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecStorage")
            .field("len", &self.0.len())
            .finish()
    }
}

impl<V: Send + Sync> Storage<V> for VecStorage<V> {
    fn try_with_len(len: usize, fill: V) -> Result<Self, StructMvError>
    where
        V: Clone,
    {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| StructMvError::Allocation { len })?;
        buf.resize(len, fill);
        Ok(Self(buf))
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn as_slice(&self) -> &[V] {
        &self.0
    }

    fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.0
    }
}

impl<V> From<Vec<V>> for VecStorage<V> {
    fn from(v: Vec<V>) -> Self {
        Self(v)
    }
}

impl<V> VecStorage<V> {
    pub fn into_inner(self) -> Vec<V> {
        self.0
    }
}
