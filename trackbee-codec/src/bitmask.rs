//! Bitmask-selected optional fields.
//!
//! The single most repeated shape across vendor grammars: a leading mask
//! selects which of up to 20+ optional fields follow, in fixed relative
//! order. [`present`] walks a field table in ascending bit-index order so a
//! decoder can consume exactly the fields that are on the wire.

/// Iterates the set bit indices of `mask`, ascending.
pub fn set_bits(mask: u64) -> impl Iterator<Item = u32> {
    (0..u64::BITS).filter(move |bit| mask & (1 << bit) != 0)
}

/// Tests a single bit.
pub fn check(mask: u64, bit: u32) -> bool {
    mask & (1 << bit) != 0
}

/// Yields `(bit_index, &field)` for every table entry whose bit is set in
/// `mask`, in ascending bit-index order.
///
/// Bits set beyond the table length are ignored by this iterator; a decoder
/// that must treat them as an error checks `mask >> table.len() != 0`
/// before iterating.
pub fn present<'a, T>(mask: u64, table: &'a [T]) -> impl Iterator<Item = (u32, &'a T)> {
    table
        .iter()
        .enumerate()
        .filter(move |(index, _)| check(mask, *index as u32))
        .map(|(index, field)| (index as u32, field))
}
