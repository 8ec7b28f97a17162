//! StructGrid: the box decomposition a structured vector lives on.
//!
//! Every rank holds the same global list of boxes, each tagged with the rank
//! that owns it. The list order is the deterministic order used by plan
//! construction, so all ranks must build their grid identically. Local boxes
//! are the ones owned by [`StructGrid::rank`], kept in global order.

use crate::debug_invariants::DebugInvariants;
use crate::grid::index_box::{IndexBox, MAX_DIM};
use crate::struct_error::StructMvError;
use blake2::{Blake2s256, Digest};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// A box of the global decomposition and its owning rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridBox {
    pub owner: usize,
    pub bbox: IndexBox,
}

/// Global box decomposition, viewed from one rank.
#[derive(Clone, Debug)]
pub struct StructGrid {
    dim: usize,
    rank: usize,
    boxes: Vec<GridBox>,
    /// Global indices of local boxes, ascending.
    local: Vec<usize>,
    /// Global index → position in `local`.
    local_of: HashMap<usize, usize>,
}

impl StructGrid {
    /// Empty grid of dimension `dim`, viewed from `rank`.
    pub fn new(dim: usize, rank: usize) -> Result<Self, StructMvError> {
        if dim == 0 || dim > MAX_DIM {
            return Err(StructMvError::DimensionMismatch {
                expected: MAX_DIM,
                found: dim,
            });
        }
        Ok(Self {
            dim,
            rank,
            boxes: Vec::new(),
            local: Vec::new(),
            local_of: HashMap::new(),
        })
    }

    /// Build a grid from `(owner, box)` pairs in global order.
    ///
    /// # Errors
    /// `DimensionMismatch` for a box of the wrong dimension,
    /// `InvariantViolation` if two boxes overlap.
    pub fn from_boxes<I>(dim: usize, rank: usize, boxes: I) -> Result<Self, StructMvError>
    where
        I: IntoIterator<Item = (usize, IndexBox)>,
    {
        let mut grid = Self::new(dim, rank)?;
        for (owner, bbox) in boxes {
            grid.add_box(owner, bbox)?;
        }
        grid.validate_invariants()?;
        Ok(grid)
    }

    /// Append a box owned by `owner`; returns its global index.
    pub fn add_box(&mut self, owner: usize, bbox: IndexBox) -> Result<usize, StructMvError> {
        if bbox.dim() != self.dim {
            return Err(StructMvError::DimensionMismatch {
                expected: self.dim,
                found: bbox.dim(),
            });
        }
        let idx = self.boxes.len();
        self.boxes.push(GridBox { owner, bbox });
        if owner == self.rank {
            self.local_of.insert(idx, self.local.len());
            self.local.push(idx);
        }
        Ok(idx)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Rank this view belongs to.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// All boxes, global order.
    #[inline]
    pub fn boxes(&self) -> &[GridBox] {
        &self.boxes
    }

    /// Number of boxes owned by this rank.
    #[inline]
    pub fn local_count(&self) -> usize {
        self.local.len()
    }

    /// `(global_index, box)` for every local box, in global order.
    pub fn local_boxes(&self) -> impl Iterator<Item = (usize, &IndexBox)> + '_ {
        self.local.iter().map(move |&g| (g, &self.boxes[g].bbox))
    }

    /// Position of global box `global` among the local boxes.
    #[inline]
    pub fn local_index(&self, global: usize) -> Option<usize> {
        self.local_of.get(&global).copied()
    }

    /// Global index of the `local`-th local box.
    #[inline]
    pub fn global_index(&self, local: usize) -> Option<usize> {
        self.local.get(local).copied()
    }

    /// Smallest box containing every local box.
    pub fn local_bounding_box(&self) -> Option<IndexBox> {
        let mut it = self.local_boxes().map(|(_, b)| *b);
        let first = it.next()?;
        let mut l = [0i64; MAX_DIM];
        let mut u = [0i64; MAX_DIM];
        l[..self.dim].copy_from_slice(first.lower());
        u[..self.dim].copy_from_slice(first.upper());
        for b in it {
            for d in 0..self.dim {
                l[d] = l[d].min(b.lower()[d]);
                u[d] = u[d].max(b.upper()[d]);
            }
        }
        IndexBox::from_parts(self.dim, l, u).ok()
    }

    /// Layout fingerprint over dimension, owners and boxes.
    ///
    /// BLAKE2s over a little-endian encoding, so the value is the same on
    /// every rank, process and platform.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Blake2s256::new();
        h.update((self.dim as u64).to_le_bytes());
        for b in &self.boxes {
            h.update((b.owner as u64).to_le_bytes());
            for d in 0..self.dim {
                h.update(b.bbox.lower()[d].to_le_bytes());
                h.update(b.bbox.upper()[d].to_le_bytes());
            }
        }
        digest_u64(h)
    }
}

/// First eight bytes of a finished digest, little-endian.
pub(crate) fn digest_u64(h: Blake2s256) -> u64 {
    let out = h.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&out[..8]);
    u64::from_le_bytes(head)
}

impl DebugInvariants for StructGrid {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "StructGrid");
    }

    fn validate_invariants(&self) -> Result<(), StructMvError> {
        for (i, a) in self.boxes.iter().enumerate() {
            if a.bbox.dim() != self.dim {
                return Err(StructMvError::InvariantViolation(format!(
                    "box {i} has dimension {} in a {}-d grid",
                    a.bbox.dim(),
                    self.dim
                )));
            }
            for (j, b) in self.boxes.iter().enumerate().skip(i + 1) {
                if a.bbox.intersection(&b.bbox).is_some() {
                    return Err(StructMvError::InvariantViolation(format!(
                        "boxes {i} and {j} overlap"
                    )));
                }
            }
        }
        if self.local.len() != self.local_of.len() {
            return Err(StructMvError::InvariantViolation(
                "local index map out of sync".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(lo: &[i64], hi: &[i64]) -> IndexBox {
        IndexBox::new(lo, hi).unwrap()
    }

    const TWO_RANK_FINGERPRINT: u64 = 0xc448_49e2_cd4d_8c80;

    fn two_rank_grid(rank: usize) -> StructGrid {
        StructGrid::from_boxes(
            2,
            rank,
            [
                (0, bx(&[0, 0], &[3, 7])),
                (1, bx(&[4, 0], &[7, 7])),
                (0, bx(&[8, 0], &[9, 7])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn local_boxes_follow_global_order() {
        let g = two_rank_grid(0);
        let locals: Vec<_> = g.local_boxes().map(|(i, _)| i).collect();
        assert_eq!(locals, vec![0, 2]);
        assert_eq!(g.local_index(2), Some(1));
        assert_eq!(g.local_index(1), None);
        assert_eq!(g.global_index(1), Some(2));
    }

    #[test]
    fn fingerprint_ignores_viewing_rank() {
        assert_eq!(two_rank_grid(0).fingerprint(), two_rank_grid(1).fingerprint());
        let mut other = two_rank_grid(0);
        other.add_box(1, bx(&[10, 0], &[11, 7])).unwrap();
        assert_ne!(other.fingerprint(), two_rank_grid(0).fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_across_processes() {
        assert_eq!(two_rank_grid(0).fingerprint(), TWO_RANK_FINGERPRINT);
    }

    #[test]
    fn overlapping_boxes_are_refused() {
        let res = StructGrid::from_boxes(1, 0, [(0, bx(&[0], &[4])), (1, bx(&[4], &[8]))]);
        assert!(matches!(res, Err(StructMvError::InvariantViolation(_))));
    }

    #[test]
    fn rejects_wrong_dimension() {
        let mut g = StructGrid::new(2, 0).unwrap();
        assert!(matches!(
            g.add_box(0, bx(&[0], &[1])),
            Err(StructMvError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(StructGrid::new(4, 0).is_err());
    }

    #[test]
    fn overlap_is_an_invariant_violation() {
        let mut g = StructGrid::new(1, 0).unwrap();
        g.add_box(0, bx(&[0], &[4])).unwrap();
        g.add_box(1, bx(&[4], &[8])).unwrap();
        assert!(matches!(
            g.validate_invariants(),
            Err(StructMvError::InvariantViolation(_))
        ));
    }

    #[test]
    fn bounding_box_spans_local_boxes() {
        let g = two_rank_grid(0);
        let bb = g.local_bounding_box().unwrap();
        assert_eq!(bb.lower(), &[0, 0]);
        assert_eq!(bb.upper(), &[9, 7]);
        let empty = StructGrid::new(2, 5).unwrap();
        assert!(empty.local_bounding_box().is_none());
    }
}
