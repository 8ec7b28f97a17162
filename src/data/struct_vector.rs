//! StructVector: a distributed `f64` array over a structured grid.
//!
//! Each rank stores the local boxes of its [`StructGrid`], every box grown by
//! the ghost widths, in one contiguous buffer laid out by a [`BoxAtlas`].
//!
//! ## Lifecycle
//! 1. create against a grid (`new`, `with_stencil_width`, `with_options`)
//! 2. optionally [`set_num_ghost`](StructVector::set_num_ghost)
//! 3. [`initialize`](StructVector::initialize) allocates storage (once)
//! 4. set values (point, box or constant; serial or threaded)
//! 5. [`assemble`](StructVector::assemble) refreshes ghost copies
//!
//! ## Access rules
//! - A point is addressable if it lies in the data box (owned + ghost) of
//!   some local box; anything else is `OutOfBounds`, never clamped.
//! - Writes update every local data box containing the point, so ghost
//!   copies of locally owned points stay coherent.
//! - Reads come from the first local box owning the point, else from the
//!   first local box holding it as a ghost.
//! - Bulk buffers are row-major over the addressed box.

use std::sync::Arc;

use blake2::{Blake2s256, Digest};

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::migrate::{CommPlan, engine};
use crate::algs::work_queue::WorkQueue;
use crate::data::atlas::{AtlasEntry, BoxAtlas};
use crate::data::box_copy::{copy_region, fill_region};
use crate::data::options::{NoOverlapPolicy, VectorOptions};
use crate::data::storage::{Storage, VecStorage};
use crate::debug_invariants::DebugInvariants;
use crate::grid::struct_grid::digest_u64;
use crate::grid::{IndexBox, MAX_DIM, StructGrid};
use crate::struct_error::StructMvError;

const NOT_INITIALIZED: &str = "vector storage has not been initialized";

/// Distributed structured-grid vector.
#[derive(Debug)]
pub struct StructVector<S = VecStorage<f64>> {
    grid: Arc<StructGrid>,
    options: VectorOptions,
    num_ghost: [usize; 2 * MAX_DIM],
    atlas: BoxAtlas,
    storage: Option<S>,
    assembled: bool,
    ghost_plan: Option<CommPlan>,
}

/// One worker's exclusive slice of a local box: the axis-0 slab `region` of
/// the box's data region and the matching part of the buffer.
struct BoxChunk<'a> {
    region: IndexBox,
    buf: &'a mut [f64],
}

impl StructVector<VecStorage<f64>> {
    /// Vector with `Vec` storage and default options (ghost width 1).
    pub fn new(grid: Arc<StructGrid>) -> Self {
        Self::with_options(grid, VectorOptions::default())
    }

    /// Vector whose ghost width on every side equals `width`.
    pub fn with_stencil_width(grid: Arc<StructGrid>, width: usize) -> Self {
        Self::with_options(
            grid,
            VectorOptions {
                stencil_width: width,
                ..VectorOptions::default()
            },
        )
    }
}

impl<S: Storage<f64>> StructVector<S> {
    /// Vector over `grid` using storage `S`.
    pub fn with_options(grid: Arc<StructGrid>, options: VectorOptions) -> Self {
        let mut num_ghost = [0usize; 2 * MAX_DIM];
        num_ghost[..2 * grid.dim()].fill(options.stencil_width);
        Self {
            grid,
            options,
            num_ghost,
            atlas: BoxAtlas::default(),
            storage: None,
            assembled: false,
            ghost_plan: None,
        }
    }

    #[inline]
    pub fn grid(&self) -> &Arc<StructGrid> {
        &self.grid
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.grid.dim()
    }

    #[inline]
    pub fn options(&self) -> &VectorOptions {
        &self.options
    }

    /// Ghost widths `[lo_0, hi_0, ..]`, `2*dim` entries.
    #[inline]
    pub fn num_ghost(&self) -> &[usize] {
        &self.num_ghost[..2 * self.dim()]
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.storage.is_some()
    }

    #[inline]
    pub fn is_assembled(&self) -> bool {
        self.assembled
    }

    /// Per-box layout of the buffer (empty before `initialize`).
    #[inline]
    pub fn atlas(&self) -> &BoxAtlas {
        &self.atlas
    }

    /// Number of stored values, ghosts included.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.atlas.total_len()
    }

    /// Customize ghost widths before `initialize`.
    ///
    /// # Errors
    /// `NotReady` once storage exists, `DimensionMismatch` unless
    /// `ghost.len() == 2 * dim`.
    pub fn set_num_ghost(&mut self, ghost: &[usize]) -> Result<(), StructMvError> {
        if self.is_initialized() {
            return Err(StructMvError::NotReady(
                "ghost widths cannot change after initialize",
            ));
        }
        let expected = 2 * self.dim();
        if ghost.len() != expected {
            return Err(StructMvError::DimensionMismatch {
                expected,
                found: ghost.len(),
            });
        }
        self.num_ghost[..expected].copy_from_slice(ghost);
        Ok(())
    }

    /// Allocate storage for every local data box, zero-filled.
    ///
    /// # Errors
    /// `NotReady` if called twice, `Allocation` if the buffer cannot be
    /// obtained.
    pub fn initialize(&mut self) -> Result<(), StructMvError> {
        if self.is_initialized() {
            return Err(StructMvError::NotReady("vector already initialized"));
        }
        let mut atlas = BoxAtlas::default();
        for (_, owned) in self.grid.local_boxes() {
            atlas.try_insert(*owned, owned.grow(self.num_ghost())?)?;
        }
        let storage = S::try_with_len(atlas.total_len(), 0.0)?;
        log::debug!(
            "rank {}: initialized vector with {} local boxes, {} values",
            self.grid.rank(),
            atlas.len(),
            atlas.total_len()
        );
        self.atlas = atlas;
        self.storage = Some(storage);
        self.debug_assert_invariants();
        Ok(())
    }

    fn buffer(&self) -> Result<&[f64], StructMvError> {
        self.storage
            .as_ref()
            .map(|s| s.as_slice())
            .ok_or(StructMvError::NotReady(NOT_INITIALIZED))
    }

    fn parts_mut(&mut self) -> Result<(&BoxAtlas, &mut [f64]), StructMvError> {
        let storage = self
            .storage
            .as_mut()
            .ok_or(StructMvError::NotReady(NOT_INITIALIZED))?;
        Ok((&self.atlas, storage.as_mut_slice()))
    }

    fn check_point(&self, point: &[i64]) -> Result<(), StructMvError> {
        if point.len() != self.dim() {
            return Err(StructMvError::DimensionMismatch {
                expected: self.dim(),
                found: point.len(),
            });
        }
        Ok(())
    }

    /// Validate a bulk request; `Ok(false)` means "skip silently".
    fn check_box(&self, target: &IndexBox, len: usize) -> Result<bool, StructMvError> {
        self.buffer()?;
        if target.dim() != self.dim() {
            return Err(StructMvError::DimensionMismatch {
                expected: self.dim(),
                found: target.dim(),
            });
        }
        if len != target.volume() {
            return Err(StructMvError::LengthMismatch {
                expected: target.volume(),
                found: len,
            });
        }
        if self
            .atlas
            .iter()
            .any(|e| e.data.intersection(target).is_some())
        {
            return Ok(true);
        }
        match self.options.no_overlap {
            NoOverlapPolicy::Error => Err(StructMvError::NoOverlap {
                lower: target.lower().to_vec(),
                upper: target.upper().to_vec(),
            }),
            NoOverlapPolicy::Ignore => Ok(false),
        }
    }

    /// Set one point (and every local ghost copy of it).
    pub fn set_value(&mut self, point: &[i64], value: f64) -> Result<(), StructMvError> {
        self.check_point(point)?;
        let (atlas, buf) = self.parts_mut()?;
        let mut hit = false;
        for e in atlas.iter() {
            if let Some(o) = e.data.offset_of(point) {
                buf[e.offset + o] = value;
                hit = true;
            }
        }
        if !hit {
            return Err(StructMvError::OutOfBounds {
                point: point.to_vec(),
            });
        }
        self.assembled = false;
        Ok(())
    }

    /// Read one point.
    pub fn get_value(&self, point: &[i64]) -> Result<f64, StructMvError> {
        self.check_point(point)?;
        let buf = self.buffer()?;
        self.atlas
            .locate(point)
            .and_then(|i| self.atlas.position(i, point))
            .map(|pos| buf[pos])
            .ok_or_else(|| StructMvError::OutOfBounds {
                point: point.to_vec(),
            })
    }

    /// Write `values` (row-major over `target`) into local storage.
    ///
    /// Points of `target` without local storage are skipped.
    pub fn set_box_values(&mut self, target: &IndexBox, values: &[f64]) -> Result<(), StructMvError> {
        if !self.check_box(target, values.len())? {
            return Ok(());
        }
        let (atlas, buf) = self.parts_mut()?;
        for e in atlas.iter() {
            if let Some(r) = target.intersection(&e.data) {
                copy_region(&r, target, values, &e.data, &mut buf[e.offset..e.offset + e.len]);
            }
        }
        self.assembled = false;
        Ok(())
    }

    /// Read `target` into a fresh row-major buffer (uncovered points are 0.0).
    ///
    /// The request is validated before the buffer is allocated.
    pub fn get_box_values(&self, target: &IndexBox) -> Result<Vec<f64>, StructMvError> {
        let covered = self.check_box(target, target.volume())?;
        let mut out = zeroed(target.volume())?;
        if covered {
            gather(&self.atlas, self.buffer()?, target, &mut out);
        }
        Ok(out)
    }

    /// Read `target` into `out`; uncovered points are left untouched.
    pub fn get_box_values_into(&self, target: &IndexBox, out: &mut [f64]) -> Result<(), StructMvError> {
        if !self.check_box(target, out.len())? {
            return Ok(());
        }
        gather(&self.atlas, self.buffer()?, target, out);
        Ok(())
    }

    /// Fill every stored point, ghosts included.
    pub fn set_constant_values(&mut self, value: f64) -> Result<(), StructMvError> {
        let (_, buf) = self.parts_mut()?;
        buf.fill(value);
        self.assembled = false;
        Ok(())
    }

    /// [`set_box_values`](Self::set_box_values) dispatched across `queue`.
    ///
    /// `target` is cut into axis-0 slabs, one per worker, and each local
    /// box's buffer is split at the same cuts, so every worker owns a
    /// disjoint part of the storage.
    pub fn set_box_values_threaded(
        &mut self,
        queue: &WorkQueue,
        target: &IndexBox,
        values: &[f64],
    ) -> Result<(), StructMvError> {
        if !self.check_box(target, values.len())? {
            return Ok(());
        }
        let slabs = target.split_slabs(queue.num_threads());
        let (atlas, buf) = self.parts_mut()?;
        let parts = split_by_slabs(atlas, buf, &slabs);
        queue.run_parts(parts, |_, chunks| {
            for c in chunks {
                if let Some(r) = target.intersection(&c.region) {
                    copy_region(&r, target, values, &c.region, c.buf);
                }
            }
            Ok(())
        })?;
        self.assembled = false;
        Ok(())
    }

    /// [`get_box_values`](Self::get_box_values) dispatched across `queue`;
    /// each worker fills the output rows of its own axis-0 slab.
    pub fn get_box_values_threaded(
        &self,
        queue: &WorkQueue,
        target: &IndexBox,
    ) -> Result<Vec<f64>, StructMvError> {
        let covered = self.check_box(target, target.volume())?;
        let mut out = zeroed(target.volume())?;
        if !covered {
            return Ok(out);
        }
        let buf = self.buffer()?;
        let atlas = &self.atlas;
        let slabs = target.split_slabs(queue.num_threads());
        let mut parts = Vec::with_capacity(slabs.len());
        let mut rest: &mut [f64] = &mut out;
        for slab in slabs {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(slab.volume());
            rest = tail;
            parts.push((slab, chunk));
        }
        queue.run_parts(parts, |_, (slab, chunk)| {
            gather(atlas, buf, &slab, chunk);
            Ok(())
        })?;
        Ok(out)
    }

    /// [`set_constant_values`](Self::set_constant_values) dispatched across
    /// `queue` in contiguous, disjoint chunks of the buffer.
    pub fn set_constant_values_threaded(
        &mut self,
        queue: &WorkQueue,
        value: f64,
    ) -> Result<(), StructMvError> {
        let (_, buf) = self.parts_mut()?;
        let chunk = buf.len().div_ceil(queue.num_threads()).max(1);
        let parts: Vec<&mut [f64]> = buf.chunks_mut(chunk).collect();
        queue.run_parts(parts, |_, part| {
            part.fill(value);
            Ok(())
        })?;
        self.assembled = false;
        Ok(())
    }

    /// Zero every ghost point (data box minus owned box) of every local box.
    pub fn clear_ghost_values(&mut self) -> Result<(), StructMvError> {
        let (atlas, buf) = self.parts_mut()?;
        for e in atlas.iter() {
            let span = &mut buf[e.offset..e.offset + e.len];
            for shell in e.data.subtract(&e.owned) {
                fill_region(&shell, &e.data, span, 0.0);
            }
        }
        self.assembled = false;
        Ok(())
    }

    /// Refresh ghost points from owned regions of other *local* boxes and
    /// mark the vector assembled. Idempotent.
    pub fn assemble(&mut self) -> Result<(), StructMvError> {
        self.buffer()?;
        let plan = self.take_ghost_plan()?;
        let res = engine::fill_local_ghosts(&plan, self);
        self.ghost_plan = Some(plan);
        res?;
        self.assembled = true;
        log::debug!("rank {}: vector assembled (local ghosts)", self.grid.rank());
        Ok(())
    }

    /// Refresh ghost points from every owner, local or remote.
    pub fn assemble_with<C: Communicator>(&mut self, comm: &C, tag: CommTag) -> Result<(), StructMvError> {
        self.buffer()?;
        let plan = self.take_ghost_plan()?;
        let res = engine::exchange_ghosts(&plan, self, comm, tag);
        self.ghost_plan = Some(plan);
        res?;
        self.assembled = true;
        log::debug!("rank {}: vector assembled (ghost exchange)", self.grid.rank());
        Ok(())
    }

    fn take_ghost_plan(&mut self) -> Result<CommPlan, StructMvError> {
        match self.ghost_plan.take() {
            Some(plan) => Ok(plan),
            None => CommPlan::ghost_exchange(self),
        }
    }

    /// Entry and values of the `i`-th local box.
    pub fn box_data(&self, i: usize) -> Option<(&AtlasEntry, &[f64])> {
        let buf = self.buffer().ok()?;
        let e = self.atlas.get(i)?;
        Some((e, &buf[e.offset..e.offset + e.len]))
    }

    /// Fingerprint of the grid plus ghost widths; plans record it.
    pub fn layout_fingerprint(&self) -> u64 {
        let mut h = Blake2s256::new();
        h.update(self.grid.fingerprint().to_le_bytes());
        for &g in self.num_ghost() {
            h.update((g as u64).to_le_bytes());
        }
        digest_u64(h)
    }

    pub(crate) fn mark_modified(&mut self) {
        self.assembled = false;
    }

    fn local_entry(&self, global: usize) -> Result<AtlasEntry, StructMvError> {
        self.grid
            .local_index(global)
            .and_then(|i| self.atlas.get(i))
            .copied()
            .ok_or_else(|| {
                StructMvError::LayoutMismatch(format!(
                    "box {global} is not stored on rank {}",
                    self.grid.rank()
                ))
            })
    }

    /// Data region and values of global box `global`.
    pub(crate) fn span(&self, global: usize) -> Result<(AtlasEntry, &[f64]), StructMvError> {
        let buf = self.buffer()?;
        let e = self.local_entry(global)?;
        Ok((e, &buf[e.offset..e.offset + e.len]))
    }

    /// Mutable variant of [`span`](Self::span).
    pub(crate) fn span_mut(&mut self, global: usize) -> Result<(AtlasEntry, &mut [f64]), StructMvError> {
        let e = self.local_entry(global)?;
        let (_, buf) = self.parts_mut()?;
        Ok((e, &mut buf[e.offset..e.offset + e.len]))
    }
}

/// Zero-filled output buffer; `Allocation` instead of aborting when `len`
/// values cannot be obtained.
fn zeroed(len: usize) -> Result<Vec<f64>, StructMvError> {
    VecStorage::try_with_len(len, 0.0).map(|s| s.0)
}

/// Read `slab` into `out` honoring the owned-first, lowest-box-first rule:
/// ghost copies are written first and owned values overwrite them, each pass
/// in reverse box order so earlier boxes win.
fn gather(atlas: &BoxAtlas, buf: &[f64], slab: &IndexBox, out: &mut [f64]) {
    for e in atlas.iter().rev() {
        if let Some(r) = slab.intersection(&e.data) {
            copy_region(&r, &e.data, &buf[e.offset..e.offset + e.len], slab, out);
        }
    }
    for e in atlas.iter().rev() {
        if let Some(r) = slab.intersection(&e.owned) {
            copy_region(&r, &e.data, &buf[e.offset..e.offset + e.len], slab, out);
        }
    }
}

/// Split `buf` into per-slab chunk lists. Slab `k` receives, for every local
/// box, the rows of its data region whose axis-0 coordinate falls in slab
/// `k`; rows outside every slab are not handed out.
fn split_by_slabs<'a>(atlas: &BoxAtlas, buf: &'a mut [f64], slabs: &[IndexBox]) -> Vec<Vec<BoxChunk<'a>>> {
    let mut parts: Vec<Vec<BoxChunk<'a>>> = slabs.iter().map(|_| Vec::new()).collect();
    let mut rest = buf;
    for e in atlas.iter() {
        let (mut span, tail) = std::mem::take(&mut rest).split_at_mut(e.len);
        rest = tail;
        let row = e.len / e.data.extent(0);
        let last_row = e.data.upper()[0];
        let mut cursor = e.data.lower()[0];
        for (k, slab) in slabs.iter().enumerate() {
            let lo = slab.lower()[0].max(cursor);
            let hi = slab.upper()[0].min(last_row);
            if lo > hi {
                continue;
            }
            let skip = (lo - cursor) as usize * row;
            let take = (hi - lo + 1) as usize * row;
            let (_, after) = std::mem::take(&mut span).split_at_mut(skip);
            let (chunk, after) = after.split_at_mut(take);
            span = after;
            parts[k].push(BoxChunk {
                region: e.data.with_axis(0, lo, hi),
                buf: chunk,
            });
            cursor = hi + 1;
        }
    }
    parts
}

impl<S: Storage<f64>> DebugInvariants for StructVector<S> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "StructVector");
    }

    fn validate_invariants(&self) -> Result<(), StructMvError> {
        self.atlas.validate_invariants()?;
        if let Some(s) = &self.storage {
            if s.len() != self.atlas.total_len() {
                return Err(StructMvError::InvariantViolation(format!(
                    "storage holds {} values, atlas expects {}",
                    s.len(),
                    self.atlas.total_len()
                )));
            }
            if self.atlas.len() != self.grid.local_count() {
                return Err(StructMvError::InvariantViolation(format!(
                    "atlas has {} boxes, grid has {} local boxes",
                    self.atlas.len(),
                    self.grid.local_count()
                )));
            }
        }
        Ok(())
    }
}
