//! Fixed, versioned, little-endian wire types for migration and ghost exchange.
//!
//! One message per `(sender, receiver, tag)` carries every value the sender
//! owes the receiver under a plan, in plan order:
//!
//! ```text
//! [WireHdr (8 bytes)] [WireCount (8 bytes)] [WireValue (8 bytes) × count]
//! ```
//!
//! Both sides derive the expected count from the same plan, so a mismatch is
//! always a transport error rather than something to recover from.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds.
pub const KIND_MIGRATE: u16 = 1;
pub const KIND_GHOST: u16 = 2;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16, // = WIRE_VERSION.to_le()
    pub kind_le: u16,    // KIND_*
    pub sender_le: u32,  // sending rank
}

impl WireHdr {
    pub fn new(kind: u16, sender: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            sender_le: (sender as u32).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn sender(&self) -> usize {
        u32::from_le(self.sender_le) as usize
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64, // count of following records
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// An `f64` carried as its little-endian bit pattern.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireValue {
    pub bits_le: u64,
}

impl WireValue {
    pub fn of(v: f64) -> Self {
        Self {
            bits_le: v.to_bits().to_le(),
        }
    }
    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WireValue>(), 8);

/// Bytes of framing before the first value.
pub const FRAME_LEN: usize = size_of::<WireHdr>() + size_of::<WireCount>();

/// Total message length for `n` values.
pub fn message_len(n: usize) -> usize {
    FRAME_LEN + n * size_of::<WireValue>()
}

/// Frame `values` as one message.
pub fn encode_values(kind: u16, sender: usize, values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message_len(values.len()));
    out.extend_from_slice(cast_slice(std::slice::from_ref(&WireHdr::new(kind, sender))));
    out.extend_from_slice(cast_slice(std::slice::from_ref(&WireCount::new(values.len()))));
    let wire: Vec<WireValue> = values.iter().copied().map(WireValue::of).collect();
    out.extend_from_slice(cast_slice(&wire));
    out
}

/// Validate framing and decode exactly `expected` values.
pub fn decode_values(
    bytes: &[u8],
    kind: u16,
    sender: usize,
    expected: usize,
) -> Result<Vec<f64>, String> {
    if bytes.len() != message_len(expected) {
        return Err(format!(
            "expected {} bytes, got {}",
            message_len(expected),
            bytes.len()
        ));
    }
    let mut hdr = WireHdr::zeroed();
    cast_slice_mut(std::slice::from_mut(&mut hdr)).copy_from_slice(&bytes[..size_of::<WireHdr>()]);
    if hdr.version() != WIRE_VERSION {
        return Err(format!("unsupported wire version {}", hdr.version()));
    }
    if hdr.kind() != kind || hdr.sender() != sender {
        return Err(format!(
            "unexpected message kind {} from rank {}",
            hdr.kind(),
            hdr.sender()
        ));
    }
    let mut cnt = WireCount::zeroed();
    cast_slice_mut(std::slice::from_mut(&mut cnt))
        .copy_from_slice(&bytes[size_of::<WireHdr>()..FRAME_LEN]);
    if cnt.get() != expected {
        return Err(format!("expected {expected} values, header says {}", cnt.get()));
    }
    let mut wire = vec![WireValue::zeroed(); expected];
    cast_slice_mut(&mut wire).copy_from_slice(&bytes[FRAME_LEN..]);
    Ok(wire.iter().map(WireValue::get).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_values_decode() {
        let msg = encode_values(KIND_MIGRATE, 3, &[1.5, -0.0, f64::MAX]);
        assert_eq!(msg.len(), message_len(3));
        let back = decode_values(&msg, KIND_MIGRATE, 3, 3).unwrap();
        assert_eq!(back[0], 1.5);
        assert_eq!(back[1].to_bits(), (-0.0f64).to_bits());
        assert_eq!(back[2], f64::MAX);
    }

    #[test]
    fn count_and_sender_are_checked() {
        let msg = encode_values(KIND_GHOST, 1, &[1.0, 2.0]);
        assert!(decode_values(&msg, KIND_GHOST, 1, 3).is_err());
        assert!(decode_values(&msg, KIND_GHOST, 2, 2).is_err());
        assert!(decode_values(&msg, KIND_MIGRATE, 1, 2).is_err());
        assert!(decode_values(&msg[..10], KIND_GHOST, 1, 2).is_err());
    }

    #[test]
    fn version_guard() {
        let hdr = WireHdr::new(KIND_MIGRATE, 0);
        assert_eq!(hdr.version(), WIRE_VERSION);
        assert_eq!(hdr.kind(), KIND_MIGRATE);
    }
}
