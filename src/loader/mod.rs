//! Container parsing and the segment map.
//!
//! This module interprets the executable container wrapped around the raw bytes and
//! produces a [`SegmentMap`]: an ordered, non-overlapping collection of [`Segment`]s plus
//! the entry-point virtual address. The map is built once per load and is read-only
//! afterwards; every later stage resolves virtual addresses through it, which makes the
//! bounds validation performed here the primary defense against out-of-range reads
//! during decoding and recovery.
//!
//! The concrete container format is ELF64 with x86-64 machine code, parsed through the
//! goblin crate in [`elf`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use rcdecomp::loader::{self, Perms};
//!
//! let map = loader::elf::parse(image, &options)?;
//! let segment = map.segment_at(map.entry_point()).unwrap();
//! assert!(segment.perms.contains(Perms::EXECUTE));
//! ```

pub(crate) mod elf;

use bitflags::bitflags;

use crate::Result;

bitflags! {
    /// Access permissions of a mapped segment, copied verbatim from the container
    /// metadata.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perms: u8 {
        /// Segment is readable
        const READ = 0b0000_0001;
        /// Segment is writable
        const WRITE = 0b0000_0010;
        /// Segment contains executable code
        const EXECUTE = 0b0000_0100;
    }
}

/// A contiguous region of the binary mapped to a virtual address range with uniform
/// permissions.
///
/// The file range `[file_offset, file_offset + file_size)` backs the virtual range
/// `[vaddr, vaddr + size)`; when `size > file_size` the tail of the virtual range is
/// zero-filled at run time (BSS) and holds no decodable bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Section or segment name from the container, e.g. `.text` or `load0`
    pub name: String,
    /// First virtual address of the mapped range
    pub vaddr: u64,
    /// Size of the virtual range in bytes
    pub size: u64,
    /// Offset of the backing bytes within the byte image
    pub file_offset: u64,
    /// Number of bytes backed by the image (`<= size`)
    pub file_size: u64,
    /// Access permissions
    pub perms: Perms,
}

impl Segment {
    /// Returns the first virtual address past the end of this segment.
    pub fn end(&self) -> u64 {
        self.vaddr + self.size
    }

    /// Returns `true` if `va` falls inside this segment's virtual range.
    pub fn contains(&self, va: u64) -> bool {
        va >= self.vaddr && va < self.end()
    }

    /// Returns `true` if this segment is mapped executable.
    pub fn is_executable(&self) -> bool {
        self.perms.contains(Perms::EXECUTE)
    }
}

/// Ordered collection of non-overlapping segments plus the entry-point virtual address.
///
/// Built once by the container parser; read-only afterwards. Every valid virtual address
/// used during decoding maps to exactly one segment or is explicitly unmapped
/// ([`crate::Error::UnmappedAddress`]).
#[derive(Debug, Clone)]
pub struct SegmentMap {
    segments: Vec<Segment>,
    entry_point: u64,
}

impl SegmentMap {
    /// Builds a map from `segments`, sorting them by virtual address.
    ///
    /// # Arguments
    /// * `segments` - The mapped segments, in any order
    /// * `entry_point` - Entry-point virtual address from the container header
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a segment's virtual range wraps the
    /// address space or if two segments overlap in virtual-address space.
    pub fn new(mut segments: Vec<Segment>, entry_point: u64) -> Result<SegmentMap> {
        for segment in &segments {
            if segment.vaddr.checked_add(segment.size).is_none() {
                return Err(malformed_error!(
                    "segment '{}' wraps the address space at {:#x} (+{:#x} bytes)",
                    segment.name,
                    segment.vaddr,
                    segment.size
                ));
            }
        }

        segments.sort_by_key(|segment| segment.vaddr);

        for window in segments.windows(2) {
            if window[1].vaddr < window[0].end() {
                return Err(malformed_error!(
                    "segments '{}' and '{}' overlap at address {:#x}",
                    window[0].name,
                    window[1].name,
                    window[1].vaddr
                ));
            }
        }

        Ok(SegmentMap {
            segments,
            entry_point,
        })
    }

    /// Returns the entry-point virtual address.
    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Returns the number of mapped segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if no segments are mapped.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterates over the segments in ascending virtual-address order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Returns the segment containing `va`, or `None` if the address is unmapped.
    pub fn segment_at(&self, va: u64) -> Option<&Segment> {
        let index = self
            .segments
            .partition_point(|segment| segment.end() <= va);
        self.segments
            .get(index)
            .filter(|segment| segment.contains(va))
    }

    /// Returns the file-backed bytes from `va` to the end of its containing segment.
    ///
    /// The returned slice is the upper bound on what the decoder may read for an
    /// instruction starting at `va`; an instruction that would need more bytes fails
    /// rather than reading into an adjacent segment.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnmappedAddress`] if no segment contains `va`, or
    /// [`crate::Error::OutOfBounds`] if `va` lies in the zero-filled (non-file-backed)
    /// tail of its segment.
    pub fn slice_at<'d>(&self, image: &'d [u8], va: u64) -> Result<&'d [u8]> {
        let Some(segment) = self.segment_at(va) else {
            return Err(crate::Error::UnmappedAddress(va));
        };

        let delta = va - segment.vaddr;
        if delta >= segment.file_size {
            return Err(crate::Error::OutOfBounds);
        }

        let start = usize::try_from(segment.file_offset + delta)
            .map_err(|_| crate::Error::OutOfBounds)?;
        let end = usize::try_from(segment.file_offset + segment.file_size)
            .map_err(|_| crate::Error::OutOfBounds)?;

        if end > image.len() {
            // The container parser validates ranges up front; a mismatch here means the
            // map was built against a different image.
            return Err(crate::Error::OutOfBounds);
        }

        Ok(&image[start..end])
    }

    /// Translates a virtual address to its offset within the byte image.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnmappedAddress`] for addresses outside every segment and
    /// [`crate::Error::OutOfBounds`] for addresses in a zero-filled tail.
    pub fn va_to_offset(&self, va: u64) -> Result<usize> {
        let Some(segment) = self.segment_at(va) else {
            return Err(crate::Error::UnmappedAddress(va));
        };

        let delta = va - segment.vaddr;
        if delta >= segment.file_size {
            return Err(crate::Error::OutOfBounds);
        }

        usize::try_from(segment.file_offset + delta).map_err(|_| crate::Error::OutOfBounds)
    }
}
