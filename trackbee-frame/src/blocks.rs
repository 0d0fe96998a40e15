use bytes::{
    Buf,
    Bytes,
};

use crate::Endianness;

/// Reader over a frame payload that is an ordered sequence of
/// length-prefixed sub-blocks (e.g. a GPS block, an LBS block, a status
/// block).
///
/// Every block comes back as its own [`Bytes`], so a decoder may read less
/// than the declared block length but can never read past it — the reader
/// has already advanced to the block boundary. A declared length of zero
/// yields an empty block, which is how formats mark a block as absent.
#[derive(Debug)]
pub struct BlockReader {
    remaining: Bytes,
    length_width: usize,
    order: Endianness,
}

impl BlockReader {
    pub fn new(payload: Bytes, length_width: usize, order: Endianness) -> Self {
        debug_assert!((1..=4).contains(&length_width));
        Self {
            remaining: payload,
            length_width,
            order,
        }
    }

    /// The next sub-block, `None` once the payload is exhausted.
    pub fn next_block(&mut self) -> Result<Option<Bytes>, BlockError> {
        if self.remaining.is_empty() {
            return Ok(None);
        }

        if self.remaining.len() < self.length_width {
            return Err(BlockError::TruncatedLength);
        }

        let declared = self.order.read(&self.remaining[..self.length_width]) as usize;
        let available = self.remaining.len() - self.length_width;
        if declared > available {
            return Err(BlockError::Truncated {
                declared,
                available,
            });
        }

        self.remaining.advance(self.length_width);
        Ok(Some(self.remaining.split_to(declared)))
    }

    pub fn remaining_bytes(&self) -> usize {
        self.remaining.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("truncated sub-block length field")]
    TruncatedLength,

    #[error("sub-block declares {declared} bytes but only {available} remain")]
    Truncated { declared: usize, available: usize },
}
