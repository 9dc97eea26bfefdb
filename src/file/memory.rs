//! In-memory backend for already-loaded binary data.
//!
//! The [`Memory`] backend implements [`crate::file::Backend`] over an owned `Vec<u8>`,
//! for callers that obtained the binary bytes through other means (network transfer,
//! embedded data, test fixtures).

use super::Backend;
use crate::Result;

/// A backend that owns its data in a heap-allocated buffer.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create a new in-memory backend taking ownership of `data`.
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(crate::Error::OutOfBounds);
        };

        if offset_end > self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
