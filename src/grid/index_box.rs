//! IndexBox: axis-aligned integer coordinate ranges on a structured grid.
//!
//! A box is the closed range `[lower, upper]` in `D` dimensions (`1 ≤ D ≤ 3`).
//! Unused trailing axes are stored as zero so boxes of the same dimension
//! compare and hash consistently.
//!
//! ## Ordering contract
//! Every bulk get/set in this crate maps a flat `values` buffer onto box
//! coordinates in **row-major** order: the last dimension varies fastest.
//! [`IndexBox::points`] and [`IndexBox::offset_of`] are the two sides of that
//! contract.

use crate::struct_error::StructMvError;
use serde::{Deserialize, Serialize};

/// Maximum supported dimensionality.
pub const MAX_DIM: usize = 3;

/// A grid coordinate; axes `>= dim` are zero.
pub type Index = [i64; MAX_DIM];

/// Closed, non-empty integer box `[lower, upper]`.
///
/// # Invariants
/// - `1 <= dim <= MAX_DIM`
/// - `lower[d] <= upper[d]` for all `d < dim`
/// - `lower[d] == upper[d] == 0` for all `d >= dim`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIndexBox")]
pub struct IndexBox {
    dim: usize,
    lower: Index,
    upper: Index,
}

/// Unchecked wire form; deserialization goes through [`IndexBox::from_parts`].
#[derive(Deserialize)]
struct RawIndexBox {
    dim: usize,
    lower: Index,
    upper: Index,
}

impl TryFrom<RawIndexBox> for IndexBox {
    type Error = StructMvError;

    fn try_from(raw: RawIndexBox) -> Result<Self, Self::Error> {
        IndexBox::from_parts(raw.dim, raw.lower, raw.upper)
    }
}

fn check_dim(dim: usize) -> Result<(), StructMvError> {
    if dim == 0 || dim > MAX_DIM {
        return Err(StructMvError::DimensionMismatch {
            expected: MAX_DIM,
            found: dim,
        });
    }
    Ok(())
}

/// Copy a coordinate slice into a zero-padded [`Index`].
pub fn to_index(coords: &[i64]) -> Result<Index, StructMvError> {
    check_dim(coords.len())?;
    let mut out = [0i64; MAX_DIM];
    out[..coords.len()].copy_from_slice(coords);
    Ok(out)
}

impl IndexBox {
    /// Build a box from raw lower/upper coordinate slices.
    ///
    /// # Errors
    /// - `DimensionMismatch` if the slices differ in length or the length is
    ///   not in `1..=3`.
    /// - `InvalidRange` if `lower[d] > upper[d]` on some axis, or if an extent
    ///   or the volume does not fit in `usize`.
    ///
    /// # Example
    /// ```rust
    /// # fn main() -> Result<(), struct_mv::struct_error::StructMvError> {
    /// use struct_mv::grid::IndexBox;
    /// let b = IndexBox::new(&[0, 0], &[3, 3])?;
    /// assert_eq!(b.volume(), 16);
    /// assert_eq!(b.offset_of(&[1, 2]), Some(6));
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(lower: &[i64], upper: &[i64]) -> Result<Self, StructMvError> {
        if lower.len() != upper.len() {
            return Err(StructMvError::DimensionMismatch {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        Self::from_parts(lower.len(), to_index(lower)?, to_index(upper)?)
    }

    /// Build a box from padded coordinates.
    pub fn from_parts(dim: usize, lower: Index, upper: Index) -> Result<Self, StructMvError> {
        check_dim(dim)?;
        let mut lo = [0i64; MAX_DIM];
        let mut hi = [0i64; MAX_DIM];
        let mut volume = 1usize;
        for d in 0..dim {
            let extent = upper[d]
                .checked_sub(lower[d])
                .filter(|&e| e >= 0)
                .and_then(|e| usize::try_from(e).ok())
                .and_then(|e| e.checked_add(1));
            volume = match extent.and_then(|e| volume.checked_mul(e)) {
                Some(v) => v,
                None => {
                    return Err(StructMvError::InvalidRange {
                        axis: d,
                        lower: lower[d],
                        upper: upper[d],
                    });
                }
            };
            lo[d] = lower[d];
            hi[d] = upper[d];
        }
        Ok(Self {
            dim,
            lower: lo,
            upper: hi,
        })
    }

    /// Single-point box.
    pub fn point(coords: &[i64]) -> Result<Self, StructMvError> {
        Self::new(coords, coords)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn lower(&self) -> &[i64] {
        &self.lower[..self.dim]
    }

    #[inline]
    pub fn upper(&self) -> &[i64] {
        &self.upper[..self.dim]
    }

    /// Number of points along axis `d` (1 for axes beyond `dim`).
    ///
    /// Cannot overflow: construction rejects boxes whose extents or volume
    /// do not fit in `usize`.
    #[inline]
    pub fn extent(&self, d: usize) -> usize {
        (self.upper[d].wrapping_sub(self.lower[d]) as u64 as usize) + 1
    }

    /// Product of extents.
    pub fn volume(&self) -> usize {
        (0..self.dim).map(|d| self.extent(d)).product()
    }

    /// Row-major strides (last axis has stride 1).
    pub fn strides(&self) -> [usize; MAX_DIM] {
        let mut s = [0usize; MAX_DIM];
        let mut acc = 1usize;
        for d in (0..self.dim).rev() {
            s[d] = acc;
            acc *= self.extent(d);
        }
        s
    }

    /// Whether `point` (of length `dim`) lies inside the box.
    pub fn contains(&self, point: &[i64]) -> bool {
        point.len() == self.dim
            && (0..self.dim).all(|d| self.lower[d] <= point[d] && point[d] <= self.upper[d])
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &IndexBox) -> bool {
        other.dim == self.dim
            && (0..self.dim)
                .all(|d| self.lower[d] <= other.lower[d] && other.upper[d] <= self.upper[d])
    }

    /// Geometric intersection; `None` when empty or dimensions differ.
    pub fn intersection(&self, other: &IndexBox) -> Option<IndexBox> {
        if self.dim != other.dim {
            return None;
        }
        let mut lo = [0i64; MAX_DIM];
        let mut hi = [0i64; MAX_DIM];
        for d in 0..self.dim {
            lo[d] = self.lower[d].max(other.lower[d]);
            hi[d] = self.upper[d].min(other.upper[d]);
            if lo[d] > hi[d] {
                return None;
            }
        }
        Some(IndexBox {
            dim: self.dim,
            lower: lo,
            upper: hi,
        })
    }

    /// Flat row-major offset of `point` within this box.
    #[inline]
    pub fn offset_of(&self, point: &[i64]) -> Option<usize> {
        if !self.contains(point) {
            return None;
        }
        let strides = self.strides();
        Some(
            (0..self.dim)
                .map(|d| (point[d] - self.lower[d]) as usize * strides[d])
                .sum(),
        )
    }

    /// Lazy row-major enumeration of all contained points.
    ///
    /// The iterator is finite and cheap to recreate; calling `points()` again
    /// restarts the sequence.
    pub fn points(&self) -> BoxPoints {
        BoxPoints {
            bbox: *self,
            cursor: self.lower,
            remaining: self.volume(),
        }
    }

    /// Expand by ghost widths `[lo_0, hi_0, lo_1, hi_1, ...]` (`2*dim` entries).
    ///
    /// # Errors
    /// `InvalidRange` if the grown box leaves the `i64` coordinate space or
    /// its volume overflows.
    pub fn grow(&self, ghost: &[usize]) -> Result<IndexBox, StructMvError> {
        let mut lower = self.lower;
        let mut upper = self.upper;
        for d in 0..self.dim {
            let width = |k: usize| i64::try_from(ghost.get(k).copied().unwrap_or(0)).ok();
            let out_of_range = || StructMvError::InvalidRange {
                axis: d,
                lower: self.lower[d],
                upper: self.upper[d],
            };
            lower[d] = width(2 * d)
                .and_then(|w| lower[d].checked_sub(w))
                .ok_or_else(out_of_range)?;
            upper[d] = width(2 * d + 1)
                .and_then(|w| upper[d].checked_add(w))
                .ok_or_else(out_of_range)?;
        }
        IndexBox::from_parts(self.dim, lower, upper)
    }

    /// Disjoint pieces of `self` not covered by `other`.
    pub fn subtract(&self, other: &IndexBox) -> Vec<IndexBox> {
        let Some(cut) = self.intersection(other) else {
            return vec![*self];
        };
        let mut pieces = Vec::new();
        let mut rest = *self;
        for d in 0..self.dim {
            if rest.lower[d] < cut.lower[d] {
                let mut piece = rest;
                piece.upper[d] = cut.lower[d] - 1;
                pieces.push(piece);
                rest.lower[d] = cut.lower[d];
            }
            if rest.upper[d] > cut.upper[d] {
                let mut piece = rest;
                piece.lower[d] = cut.upper[d] + 1;
                pieces.push(piece);
                rest.upper[d] = cut.upper[d];
            }
        }
        pieces
    }

    /// Split along axis 0 into at most `parts` contiguous, disjoint slabs.
    ///
    /// Fewer slabs are returned when the axis-0 extent is smaller than
    /// `parts`; the slabs always cover `self` exactly.
    pub fn split_slabs(&self, parts: usize) -> Vec<IndexBox> {
        let extent = self.extent(0);
        let n = parts.clamp(1, extent);
        let base = extent / n;
        let rem = extent % n;
        let mut out = Vec::with_capacity(n);
        let mut cursor = self.lower[0];
        for k in 0..n {
            let len = (base + usize::from(k < rem)) as i64;
            out.push(self.with_axis(0, cursor, cursor + len - 1));
            cursor += len;
        }
        out
    }

    /// Same box with axis `d` replaced by `[lo, hi]` (caller keeps `lo <= hi`).
    pub(crate) fn with_axis(&self, d: usize, lo: i64, hi: i64) -> IndexBox {
        debug_assert!(lo <= hi && d < self.dim);
        let mut out = *self;
        out.lower[d] = lo;
        out.upper[d] = hi;
        out
    }
}

/// Remove `cut` from every piece, keeping the result disjoint.
pub fn subtract_from_all(pieces: Vec<IndexBox>, cut: &IndexBox) -> Vec<IndexBox> {
    pieces.into_iter().flat_map(|p| p.subtract(cut)).collect()
}

/// Row-major point iterator returned by [`IndexBox::points`].
#[derive(Clone, Debug)]
pub struct BoxPoints {
    bbox: IndexBox,
    cursor: Index,
    remaining: usize,
}

impl Iterator for BoxPoints {
    type Item = Index;

    fn next(&mut self) -> Option<Index> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.cursor;
        self.remaining -= 1;
        for d in (0..self.bbox.dim).rev() {
            if self.cursor[d] < self.bbox.upper[d] {
                self.cursor[d] += 1;
                break;
            }
            self.cursor[d] = self.bbox.lower[d];
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for BoxPoints {}
