//! Multi-register values.
//!
//! The bank stores 16-bit cells only.  A 32-bit quantity (e.g. a Unix
//! timestamp) occupies two consecutive cells, high word first.  Slave-side
//! writers and master-side readers both go through these helpers so the
//! word order never diverges.

use super::bank::{RegisterBank, RegisterClass};

/// Split `value` into `[high, low]`.
pub const fn u32_to_words(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

/// Join `[high, low]` back into one value.
pub const fn words_to_u32(words: [u16; 2]) -> u32 {
    ((words[0] as u32) << 16) | words[1] as u32
}

/// Write a 32-bit value into `offset` and `offset + 1`.
///
/// The two cells are written one after the other; a concurrent reader of
/// the pair may observe one old and one new word.
pub fn set_u32(bank: &mut RegisterBank, class: RegisterClass, offset: u16, value: u32) {
    let [hi, lo] = u32_to_words(value);
    bank.set(class, offset, hi);
    bank.set(class, offset.wrapping_add(1), lo);
}

/// Decode a 32-bit value from the first two words of a register read.
pub fn u32_from_slice(words: &[u16]) -> Option<u32> {
    match words {
        [hi, lo, ..] => Some(words_to_u32([*hi, *lo])),
        _ => None,
    }
}
