//! Row-wise copies between flat buffers laid out over different boxes.
//!
//! A buffer "over" box `B` stores `B`'s points in row-major order. Copying the
//! points of a region `R ⊆ A ∩ B` from a buffer over `A` into a buffer over
//! `B` reduces to one `copy_from_slice` per row of `R` along the last axis.

use crate::grid::IndexBox;

/// Visit every last-axis row of `region`, passing the row's start offset in
/// a buffer over `a`, in a buffer over `b`, and the row length.
///
/// `region` must lie inside both `a` and `b`.
pub fn for_each_row<F>(region: &IndexBox, a: &IndexBox, b: &IndexBox, mut f: F)
where
    F: FnMut(usize, usize, usize),
{
    let last = region.dim() - 1;
    let row_len = region.extent(last);
    let lo = region.lower()[last];
    let starts = region.with_axis(last, lo, lo);
    for p in starts.points() {
        let p = &p[..region.dim()];
        if let (Some(oa), Some(ob)) = (a.offset_of(p), b.offset_of(p)) {
            f(oa, ob, row_len);
        }
    }
}

/// Copy `region` from `src` (over `src_box`) into `dst` (over `dst_box`).
pub fn copy_region(
    region: &IndexBox,
    src_box: &IndexBox,
    src: &[f64],
    dst_box: &IndexBox,
    dst: &mut [f64],
) {
    for_each_row(region, src_box, dst_box, |s, d, n| {
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
    });
}

/// Set every point of `region` in `dst` (over `dst_box`) to `value`.
pub fn fill_region(region: &IndexBox, dst_box: &IndexBox, dst: &mut [f64], value: f64) {
    for_each_row(region, dst_box, dst_box, |_, d, n| dst[d..d + n].fill(value));
}
