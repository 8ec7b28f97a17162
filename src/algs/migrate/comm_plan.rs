//! CommPlan: precomputed transfer lists between two vector layouts.
//!
//! A plan is computed from the *global* box lists of both layouts, so every
//! rank derives the same global transfer sequence and keeps only the part it
//! takes part in. Because all ranks walk the same order, the values a sender
//! packs for a peer line up with the transfers that peer unpacks.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::storage::Storage;
use crate::data::struct_vector::StructVector;
use crate::grid::IndexBox;
use crate::grid::index_box::subtract_from_all;
use crate::struct_error::StructMvError;

/// Copy of `region` from global source box `src_box` into global
/// destination box `dst_box`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub src_box: usize,
    pub dst_box: usize,
    pub src_rank: usize,
    pub dst_rank: usize,
    pub region: IndexBox,
}

/// What a plan moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanKind {
    /// Owned-or-ghost source values into destination owned regions.
    Migrate,
    /// Owned values into ghost shells of the same vector.
    Ghost,
}

/// Transfers of one rank, split into local copies and per-peer lists.
///
/// Peer maps are `BTreeMap`s so sends and receives are posted in a
/// deterministic order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommPlan {
    kind: PlanKind,
    rank: usize,
    src_layout: u64,
    dst_layout: u64,
    local: Vec<Transfer>,
    sends: BTreeMap<usize, Vec<Transfer>>,
    recvs: BTreeMap<usize, Vec<Transfer>>,
}

impl CommPlan {
    /// Plan moving `from` into `to`.
    ///
    /// Every destination owned point is covered by at most one transfer:
    /// source owned regions are matched first, and what is left is then
    /// taken from source ghost regions, lowest source box first.
    ///
    /// # Errors
    /// `DimensionMismatch` if the grids differ in dimension, `LayoutMismatch`
    /// if they are viewed from different ranks.
    pub fn build<S1, S2>(
        from: &StructVector<S1>,
        to: &StructVector<S2>,
    ) -> Result<Self, StructMvError>
    where
        S1: Storage<f64>,
        S2: Storage<f64>,
    {
        let (src, dst) = (from.grid(), to.grid());
        if src.dim() != dst.dim() {
            return Err(StructMvError::DimensionMismatch {
                expected: src.dim(),
                found: dst.dim(),
            });
        }
        if src.rank() != dst.rank() {
            return Err(StructMvError::LayoutMismatch(format!(
                "source grid is viewed from rank {}, destination from rank {}",
                src.rank(),
                dst.rank()
            )));
        }
        let ghost = from.num_ghost();
        let mut plan = Self::empty(PlanKind::Migrate, src.rank(), from, to);
        for (j, d) in dst.boxes().iter().enumerate() {
            let mut remaining = vec![d.bbox];
            for (i, s) in src.boxes().iter().enumerate() {
                if let Some(region) = s.bbox.intersection(&d.bbox) {
                    plan.record(Transfer {
                        src_box: i,
                        dst_box: j,
                        src_rank: s.owner,
                        dst_rank: d.owner,
                        region,
                    });
                    remaining = subtract_from_all(remaining, &region);
                }
            }
            for (i, s) in src.boxes().iter().enumerate() {
                if remaining.is_empty() {
                    break;
                }
                let data = s.bbox.grow(ghost)?;
                for piece in &remaining {
                    if let Some(region) = piece.intersection(&data) {
                        plan.record(Transfer {
                            src_box: i,
                            dst_box: j,
                            src_rank: s.owner,
                            dst_rank: d.owner,
                            region,
                        });
                    }
                }
                remaining = subtract_from_all(remaining, &data);
            }
        }
        log::debug!(
            "rank {}: migration plan with {} local transfers, {} send peers, {} recv peers",
            plan.rank,
            plan.local.len(),
            plan.sends.len(),
            plan.recvs.len()
        );
        Ok(plan)
    }

    /// Plan refreshing every ghost shell of `v` from the boxes that own it.
    pub fn ghost_exchange<S: Storage<f64>>(v: &StructVector<S>) -> Result<Self, StructMvError> {
        let grid = v.grid();
        let ghost = v.num_ghost();
        let mut plan = Self::empty(PlanKind::Ghost, grid.rank(), v, v);
        for (j, d) in grid.boxes().iter().enumerate() {
            let shell = d.bbox.grow(ghost)?.subtract(&d.bbox);
            let owners = grid.boxes().iter().enumerate().filter(|&(i, _)| i != j);
            for (piece, (i, s)) in shell.iter().cartesian_product(owners) {
                if let Some(region) = piece.intersection(&s.bbox) {
                    plan.record(Transfer {
                        src_box: i,
                        dst_box: j,
                        src_rank: s.owner,
                        dst_rank: d.owner,
                        region,
                    });
                }
            }
        }
        log::trace!(
            "rank {}: ghost plan with {} local transfers, {} peers",
            plan.rank,
            plan.local.len(),
            plan.sends.len().max(plan.recvs.len())
        );
        Ok(plan)
    }

    fn empty<S1, S2>(kind: PlanKind, rank: usize, from: &StructVector<S1>, to: &StructVector<S2>) -> Self
    where
        S1: Storage<f64>,
        S2: Storage<f64>,
    {
        Self {
            kind,
            rank,
            src_layout: from.layout_fingerprint(),
            dst_layout: to.layout_fingerprint(),
            local: Vec::new(),
            sends: BTreeMap::new(),
            recvs: BTreeMap::new(),
        }
    }

    fn record(&mut self, t: Transfer) {
        match (t.src_rank == self.rank, t.dst_rank == self.rank) {
            (true, true) => self.local.push(t),
            (true, false) => self.sends.entry(t.dst_rank).or_default().push(t),
            (false, true) => self.recvs.entry(t.src_rank).or_default().push(t),
            (false, false) => {}
        }
    }

    #[inline]
    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    /// Rank the plan was built for.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Fingerprints of the source and destination layouts.
    #[inline]
    pub fn layouts(&self) -> (u64, u64) {
        (self.src_layout, self.dst_layout)
    }

    /// Transfers with both ends on this rank.
    #[inline]
    pub fn local(&self) -> &[Transfer] {
        &self.local
    }

    /// Outgoing transfers per destination rank, in packing order.
    pub fn sends(&self) -> impl Iterator<Item = (usize, &[Transfer])> + '_ {
        self.sends.iter().map(|(&p, ts)| (p, ts.as_slice()))
    }

    /// Incoming transfers per source rank, in unpacking order.
    pub fn recvs(&self) -> impl Iterator<Item = (usize, &[Transfer])> + '_ {
        self.recvs.iter().map(|(&p, ts)| (p, ts.as_slice()))
    }

    /// Total number of transfers this rank takes part in.
    pub fn len(&self) -> usize {
        self.local.len()
            + self.sends.values().map(Vec::len).sum::<usize>()
            + self.recvs.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail unless the plan was built for these layouts on this rank.
    pub(crate) fn check(
        &self,
        kind: PlanKind,
        src_layout: u64,
        dst_layout: u64,
        rank: usize,
    ) -> Result<(), StructMvError> {
        if self.kind != kind {
            return Err(StructMvError::LayoutMismatch(format!(
                "plan kind {:?} used for {:?}",
                self.kind, kind
            )));
        }
        if self.rank != rank {
            return Err(StructMvError::LayoutMismatch(format!(
                "plan built for rank {} used on rank {rank}",
                self.rank
            )));
        }
        if self.src_layout != src_layout || self.dst_layout != dst_layout {
            return Err(StructMvError::LayoutMismatch(
                "vector layouts differ from those the plan was built for".into(),
            ));
        }
        Ok(())
    }
}

/// Number of values moved by `transfers`.
pub(crate) fn volume(transfers: &[Transfer]) -> usize {
    transfers.iter().map(|t| t.region.volume()).sum()
}
