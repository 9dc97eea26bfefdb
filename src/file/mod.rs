//! Byte image abstraction over pluggable data sources.
//!
//! This module owns the raw bytes of a loaded binary and provides bounded random and
//! sequential access to them. It abstracts over the data source through the [`Backend`]
//! trait with two implementations:
//!
//! - [`physical::Physical`] - memory-mapped file backend for disk access
//! - [`memory::Memory`] - in-memory buffer backend for already-loaded data
//!
//! [`File`] wraps exactly one backend and is the only component of the crate that touches
//! persistent storage; every later stage (container parsing, decoding, recovery) works
//! from the bytes it exposes. [`parser::Parser`] provides a bounds-checked cursor over a
//! byte slice for sequential decoding.
//!
//! # Examples
//!
//! ```rust,no_run
//! use rcdecomp::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("target/binary"))?;
//! assert_eq!(file.data_slice(0, 4)?, b"\x7fELF");
//! # Ok::<(), rcdecomp::Error>(())
//! ```

pub(crate) mod memory;
pub(crate) mod parser;
pub(crate) mod physical;

pub use memory::Memory;
pub use parser::{ByteIO, Parser};
pub use physical::Physical;

use std::path::Path;

use crate::Result;

/// Trait for the data sources a [`File`] can be backed by.
///
/// Implementations provide bounds-checked access to an immutable byte sequence. All
/// methods must be safe against out-of-range requests; `data_slice` returns
/// [`crate::Error::OutOfBounds`] rather than panicking.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`, or [`crate::Error::OutOfBounds`] if the
    /// range is not fully contained in the image.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the complete byte image.
    fn data(&self) -> &[u8];

    /// Returns the total size of the byte image in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if the image holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable byte image loaded from a file or memory buffer.
///
/// `File` owns the raw bytes of one binary for the lifetime of a load. It performs file
/// I/O exactly once, on construction; afterwards all access is in-memory and read-only.
///
/// # Examples
///
/// ```rust,no_run
/// use rcdecomp::File;
///
/// let file = File::from_mem(vec![0x7F, b'E', b'L', b'F'])?;
/// assert_eq!(file.len(), 4);
/// # Ok::<(), rcdecomp::Error>(())
/// ```
pub struct File {
    backend: Box<dyn Backend>,
}

impl File {
    /// Creates a `File` by memory-mapping the binary at `path`.
    ///
    /// This is the single I/O suspension point of a load; the file handle is released
    /// when the mapping is dropped, on every exit path.
    ///
    /// # Arguments
    /// * `path` - Location of the binary on persistent storage
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened,
    /// [`crate::Error::Empty`] if it holds no bytes, or [`crate::Error::Error`] if the
    /// memory mapping fails.
    pub fn from_file(path: &Path) -> Result<File> {
        let backend = physical::Physical::new(path)?;
        if backend.is_empty() {
            return Err(crate::Error::Empty);
        }

        Ok(File {
            backend: Box::new(backend),
        })
    }

    /// Creates a `File` from an already-loaded byte buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` holds no bytes.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        if data.is_empty() {
            return Err(crate::Error::Empty);
        }

        Ok(File {
            backend: Box::new(memory::Memory::new(data)),
        })
    }

    /// Returns the total size of the image in bytes.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// Returns `true` if the image holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Returns the complete byte image.
    pub fn data(&self) -> &[u8] {
        self.backend.data()
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is not fully contained in the
    /// image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.backend.data_slice(offset, len)
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").field("len", &self.len()).finish()
    }
}
