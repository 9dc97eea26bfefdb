//! Bounds-checked cursor for sequential byte stream decoding.
//!
//! [`Parser`] wraps a byte slice with a position and read primitives that never step
//! outside the slice. The instruction decoder drives one of these over the readable
//! bytes of a segment; any read that would cross the end returns
//! [`crate::Error::OutOfBounds`] instead of touching adjacent memory.

use crate::Result;

/// Helper trait for little-endian integer reads through [`Parser::read_le`].
pub trait ByteIO: Sized {
    /// Number of bytes this type occupies in the stream.
    const SIZE: usize;

    /// Decodes `Self` from the first `SIZE` bytes of `data` (little-endian).
    fn from_le_slice(data: &[u8]) -> Self;
}

macro_rules! impl_byte_io {
    ($($ty:ty),*) => {
        $(impl ByteIO for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn from_le_slice(data: &[u8]) -> Self {
                let mut buffer = [0u8; std::mem::size_of::<$ty>()];
                buffer.copy_from_slice(&data[..Self::SIZE]);
                <$ty>::from_le_bytes(buffer)
            }
        })*
    };
}

impl_byte_io!(u8, u16, u32, u64, i8, i16, i32, i64);

/// A cursor over a byte slice with bounds-checked sequential and random access.
///
/// # Examples
///
/// ```rust
/// use rcdecomp::Parser;
///
/// let data = [0x48u8, 0x89, 0xE5];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u8>()?, 0x48);
/// assert_eq!(parser.pos(), 1);
/// assert_eq!(parser.remaining(), 2);
/// # Ok::<(), rcdecomp::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser over `data`, positioned at the start.
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the total length of the underlying slice.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying slice is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if at least one more byte can be read.
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Returns the current position.
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the underlying slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the number of bytes between the current position and the end.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Moves the cursor to `pos`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the slice.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Advances the cursor by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the new position would be past the end.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let Some(new_position) = self.position.checked_add(step) else {
            return Err(crate::Error::OutOfBounds);
        };

        self.seek(new_position)
    }

    /// Returns the byte at the current position without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the slice.
    pub fn peek_byte(&self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => Ok(*byte),
            None => Err(crate::Error::OutOfBounds),
        }
    }

    /// Reads a little-endian integer and advances past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `T::SIZE` bytes remain.
    pub fn read_le<T: ByteIO>(&mut self) -> Result<T> {
        if self.remaining() < T::SIZE {
            return Err(crate::Error::OutOfBounds);
        }

        let value = T::from_le_slice(&self.data[self.position..]);
        self.position += T::SIZE;
        Ok(value)
    }

    /// Reads `length` raw bytes and advances past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if self.remaining() < length {
            return Err(crate::Error::OutOfBounds);
        }

        let slice = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(slice)
    }
}
