//! Stateless codec primitives shared by every vendor protocol module.
//!
//! Everything in this crate is a pure function (or a small builder) over
//! byte ranges and integers: checksum families, packed-decimal digits,
//! scaled coordinate encodings, multi-epoch timestamp assembly and
//! bitmask-selected optional fields. Protocol modules compose these rather
//! than reimplementing them.

pub mod bcd;
pub mod bitmask;
pub mod checksum;
pub mod coords;
pub mod time;

use bytes::Buf;

/// Reads a fixed number of bytes from a [`Buf`] into an array.
pub trait BufReadBytesExt {
    fn get_bytes<const N: usize>(&mut self) -> [u8; N];
}

impl<B: Buf> BufReadBytesExt for B {
    fn get_bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut data: [u8; N] = [0; N];
        self.copy_to_slice(&mut data[..]);
        data
    }
}
