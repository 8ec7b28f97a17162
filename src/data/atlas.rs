//! BoxAtlas: mapping local boxes to contiguous spans of a vector buffer.
//!
//! Each local box of a grid owns one span of the vector's single flat
//! buffer. The span holds the box's *data box* (owned box grown by the ghost
//! widths) in row-major order, so any point of the data box is addressed by
//! `offset + data.offset_of(point)`.

use crate::debug_invariants::DebugInvariants;
use crate::grid::IndexBox;
use crate::struct_error::StructMvError;
use serde::{Deserialize, Serialize};

/// One local box: its owned region, its ghost-expanded data region and the
/// `(offset, len)` of the data region in the flat buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasEntry {
    pub owned: IndexBox,
    pub data: IndexBox,
    pub offset: usize,
    pub len: usize,
}

/// `BoxAtlas` maintains the per-box spans in local-box order.
///
/// # Invariants
///
/// - Spans are contiguous in insertion order and `total_len` is their sum.
/// - `len == data.volume()` and `data` contains `owned` for every entry.
///
/// These invariants are checked after mutations in debug builds and when the
/// `check-invariants` feature is enabled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoxAtlas {
    entries: Vec<AtlasEntry>,
    total_len: usize,
}

fn checked_volume(b: &IndexBox) -> Option<usize> {
    (0..b.dim()).try_fold(1usize, |acc, d| acc.checked_mul(b.extent(d)))
}

impl BoxAtlas {
    /// Register the next local box; returns the offset of its span.
    ///
    /// # Errors
    /// `InvariantViolation` if `data` does not contain `owned`, `Allocation` if
    /// the buffer size overflows `usize`.
    pub fn try_insert(&mut self, owned: IndexBox, data: IndexBox) -> Result<usize, StructMvError> {
        if !data.contains_box(&owned) {
            return Err(StructMvError::InvariantViolation(format!(
                "data box {:?}..={:?} does not contain owned box {:?}..={:?}",
                data.lower(),
                data.upper(),
                owned.lower(),
                owned.upper()
            )));
        }
        let len = checked_volume(&data).ok_or(StructMvError::Allocation { len: usize::MAX })?;
        let offset = self.total_len;
        self.total_len = offset
            .checked_add(len)
            .ok_or(StructMvError::Allocation { len: usize::MAX })?;
        self.entries.push(AtlasEntry {
            owned,
            data,
            offset,
            len,
        });
        self.debug_assert_invariants();
        Ok(offset)
    }

    /// Entry of the `i`-th local box.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&AtlasEntry> {
        self.entries.get(i)
    }

    /// Number of registered boxes.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of values across all spans.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Entries in local-box order.
    pub fn iter(&self) -> std::slice::Iter<'_, AtlasEntry> {
        self.entries.iter()
    }

    /// Flat buffer position of `point` inside box `i`'s data region.
    #[inline]
    pub fn position(&self, i: usize, point: &[i64]) -> Option<usize> {
        let e = self.entries.get(i)?;
        e.data.offset_of(point).map(|o| e.offset + o)
    }

    /// First box whose owned region contains `point`, else the first whose
    /// data region does.
    pub fn locate(&self, point: &[i64]) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.owned.contains(point))
            .or_else(|| self.entries.iter().position(|e| e.data.contains(point)))
    }
}

impl DebugInvariants for BoxAtlas {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "BoxAtlas");
    }

    fn validate_invariants(&self) -> Result<(), StructMvError> {
        let mut next = 0usize;
        for (i, e) in self.entries.iter().enumerate() {
            if e.offset != next {
                return Err(StructMvError::InvariantViolation(format!(
                    "entry {i} starts at {} (expected {next})",
                    e.offset
                )));
            }
            if e.len != e.data.volume() || !e.data.contains_box(&e.owned) {
                return Err(StructMvError::InvariantViolation(format!(
                    "entry {i} span does not match its data box"
                )));
            }
            next += e.len;
        }
        if next != self.total_len {
            return Err(StructMvError::InvariantViolation(format!(
                "total_len {} != sum of spans {next}",
                self.total_len
            )));
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

    #[test]
    fn spans_are_contiguous() {
        let mut atlas = BoxAtlas::default();
        let a = bx(&[0, 0], &[1, 1]);
        let b = bx(&[2, 0], &[3, 1]);
        assert_eq!(atlas.try_insert(a, a.grow(&[1, 1, 1, 1]).unwrap()).unwrap(), 0);
        assert_eq!(atlas.try_insert(b, b).unwrap(), 16);
        assert_eq!(atlas.total_len(), 20);
        assert!(atlas.validate_invariants().is_ok());
    }

    #[test]
    fn locate_prefers_owned_region() {
        let mut atlas = BoxAtlas::default();
        let a = bx(&[0], &[3]);
        let b = bx(&[4], &[7]);
        atlas.try_insert(a, a.grow(&[1, 1]).unwrap()).unwrap();
        atlas.try_insert(b, b.grow(&[1, 1]).unwrap()).unwrap();
        // 4 is a ghost of box 0 but owned by box 1
        assert_eq!(atlas.locate(&[4]), Some(1));
        // -1 is only a ghost of box 0
        assert_eq!(atlas.locate(&[-1]), Some(0));
        assert_eq!(atlas.locate(&[9]), None);
        assert_eq!(atlas.position(1, &[4]), Some(6 + 1));
    }

    #[test]
    fn data_must_contain_owned() {
        let mut atlas = BoxAtlas::default();
        let a = bx(&[0], &[3]);
        assert!(atlas.try_insert(a, bx(&[1], &[3])).is_err());
    }
}
