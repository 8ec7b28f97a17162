#![allow(dead_code)]
use std::sync::Arc;

use struct_mv::prelude::*;

pub fn bx(lo: &[i64], hi: &[i64]) -> IndexBox {
    IndexBox::new(lo, hi).unwrap()
}

/// Split `domain` into `parts` axis-0 slabs; slab `k` is owned by `owner(k)`.
pub fn slab_grid(
    rank: usize,
    domain: &IndexBox,
    parts: usize,
    owner: impl Fn(usize) -> usize,
) -> Arc<StructGrid> {
    let boxes = domain
        .split_slabs(parts)
        .into_iter()
        .enumerate()
        .map(|(k, b)| (owner(k), b));
    Arc::new(StructGrid::from_boxes(domain.dim(), rank, boxes).unwrap())
}

/// Initialized vector with uniform ghost width.
pub fn vector(grid: Arc<StructGrid>, ghost: usize) -> StructVector {
    let mut v = StructVector::with_stencil_width(grid, ghost);
    v.initialize().unwrap();
    v
}

/// Distinct value per coordinate.
pub fn f(p: &[i64]) -> f64 {
    p.iter().fold(0.0, |acc, &x| acc * 1000.0 + x as f64)
}

/// Row-major values of `f` over `b`.
pub fn values_of(b: &IndexBox) -> Vec<f64> {
    b.points().map(|p| f(&p[..b.dim()])).collect()
}

/// Two-rank Rayon comms (ranks 0 and 1).
pub fn rayons() -> (RayonComm, RayonComm) {
    (RayonComm::new(0, 2), RayonComm::new(1, 2))
}
