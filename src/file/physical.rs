//! Physical file backend for memory-mapped I/O.
//!
//! The [`Physical`] backend implements [`crate::file::Backend`] over a read-only memory
//! mapping of a file on disk. Pages are loaded on demand by the operating system, so
//! large binaries do not need to be read into memory upfront while random access stays
//! cheap. All access goes through bounds-checked slices.

use super::Backend;
use crate::{
    Error::{Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O for efficient access to binaries on disk.
///
/// The mapping is created read-only and shared. The underlying file handle is kept alive
/// by the mapping itself and released when the backend is dropped, on every exit path
/// including parse failures in later stages.
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// # Arguments
    /// * `path` - Path to the binary on disk
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// [`crate::Error::Error`] if memory mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
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
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn physical_invalid_file_path() {
        let result = Physical::new(PathBuf::from("/nonexistent/path/to/file.bin"));
        assert!(result.is_err());
        match result.unwrap_err() {
            FileError(io_error) => {
                assert_eq!(io_error.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected FileError"),
        }
    }

    #[test]
    fn physical_bounds() {
        let temp_path = std::env::temp_dir().join("rcdecomp_physical_bounds.bin");
        std::fs::write(&temp_path, [0xAAu8, 0xBB, 0xCC, 0xDD]).unwrap();

        let physical = Physical::new(&temp_path).unwrap();
        assert_eq!(physical.len(), 4);
        assert_eq!(physical.data_slice(1, 2).unwrap(), &[0xBB, 0xCC]);
        assert_eq!(physical.data_slice(3, 1).unwrap(), &[0xDD]);

        // Offset + len overflow
        assert!(physical.data_slice(usize::MAX, 1).is_err());
        // Exceeds length by one
        assert!(physical.data_slice(3, 2).is_err());
        // Zero-length read at end is fine
        assert_eq!(physical.data_slice(4, 0).unwrap().len(), 0);

        std::fs::remove_file(&temp_path).unwrap();
    }
}
