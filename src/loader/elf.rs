//! ELF64 container parsing via goblin.
//!
//! Turns a byte image into a [`SegmentMap`] by enumerating the container's loadable
//! program headers (or, for images without any, its allocatable sections) and copying
//! their permissions verbatim. Every descriptor range is validated against the byte
//! image bounds before the map is built, and descriptor counts and total mapped size are
//! checked against the configured limits before any backing storage is allocated.

use goblin::elf::{
    header::EM_X86_64,
    program_header::{PF_R, PF_W, PF_X, PT_LOAD},
    section_header::{SHF_ALLOC, SHF_EXECINSTR, SHT_NOBITS, SHT_NULL},
    Elf,
};
use log::warn;

use crate::{
    context::LoadOptions,
    loader::{Perms, Segment, SegmentMap},
    Result,
};

/// ELF magic bytes at the start of every container.
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

const ELF_CLASS_64: u8 = 2;

/// Parses an ELF64 byte image into a [`SegmentMap`].
///
/// Loadable program headers take precedence; images without any (relocatable objects)
/// fall back to allocatable sections. An entry point outside any executable segment is
/// reported as a warning, not a failure, since packed or self-modifying binaries may
/// legitimately lack a marked executable entry segment.
///
/// # Arguments
/// * `image` - The complete byte image of the container
/// * `options` - Limits applied to descriptor counts and mapped sizes
///
/// # Errors
/// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::NotSupported`] for
/// non-ELF64 or non-x86-64 input, and [`crate::Error::Malformed`] for descriptors whose
/// declared ranges fall outside the image or exceed the configured limits.
pub(crate) fn parse(image: &[u8], options: &LoadOptions) -> Result<SegmentMap> {
    if image.is_empty() {
        return Err(crate::Error::Empty);
    }

    if image.len() < 5 || image[..4] != ELF_MAGIC {
        return Err(crate::Error::NotSupported);
    }

    if image[4] != ELF_CLASS_64 {
        return Err(crate::Error::NotSupported);
    }

    let elf = Elf::parse(image)?;
    if elf.header.e_machine != EM_X86_64 {
        return Err(crate::Error::NotSupported);
    }

    let mut segments = segments_from_program_headers(&elf, image, options)?;
    if segments.is_empty() {
        segments = segments_from_sections(&elf, image, options)?;
    }

    let map = SegmentMap::new(segments, elf.entry)?;

    match map.segment_at(elf.entry) {
        Some(segment) if segment.is_executable() => {}
        Some(segment) => {
            warn!(
                "entry point {:#x} lies in non-executable segment '{}'",
                elf.entry, segment.name
            );
        }
        None => {
            warn!("entry point {:#x} is not mapped by any segment", elf.entry);
        }
    }

    Ok(map)
}

/// Returns the virtual addresses of all function symbols in the image, for use as
/// additional control-flow entry points.
///
/// Both the static and the dynamic symbol tables are consulted; addresses are
/// deduplicated and returned in ascending order.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] or [`crate::Error::GoblinErr`] if the image
/// cannot be parsed as ELF.
pub(crate) fn function_symbols(image: &[u8]) -> Result<Vec<u64>> {
    if image.len() < 4 || image[..4] != ELF_MAGIC {
        return Err(crate::Error::NotSupported);
    }

    let elf = Elf::parse(image)?;

    let mut addresses: Vec<u64> = elf
        .syms
        .iter()
        .chain(elf.dynsyms.iter())
        .filter(|sym| sym.is_function() && sym.st_value != 0)
        .map(|sym| sym.st_value)
        .collect();

    addresses.sort_unstable();
    addresses.dedup();
    Ok(addresses)
}

fn segments_from_program_headers(
    elf: &Elf,
    image: &[u8],
    options: &LoadOptions,
) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut mapped_bytes: u64 = 0;

    for (index, header) in elf
        .program_headers
        .iter()
        .filter(|header| header.p_type == PT_LOAD && header.p_memsz > 0)
        .enumerate()
    {
        if segments.len() >= options.max_segments {
            return Err(malformed_error!(
                "segment count exceeds limit of {}",
                options.max_segments
            ));
        }

        let Some(file_end) = header.p_offset.checked_add(header.p_filesz) else {
            return Err(malformed_error!(
                "segment {} file range overflows at offset {:#x}",
                index,
                header.p_offset
            ));
        };

        if file_end > image.len() as u64 {
            return Err(malformed_error!(
                "segment {} declares {:#x}..{:#x} beyond image size {:#x}",
                index,
                header.p_offset,
                file_end,
                image.len()
            ));
        }

        if header.p_filesz > header.p_memsz {
            return Err(malformed_error!(
                "segment {} file size {:#x} exceeds memory size {:#x}",
                index,
                header.p_filesz,
                header.p_memsz
            ));
        }

        mapped_bytes = mapped_bytes.saturating_add(header.p_memsz);
        if mapped_bytes > options.max_mapped_bytes {
            return Err(malformed_error!(
                "total mapped size exceeds limit of {:#x} bytes",
                options.max_mapped_bytes
            ));
        }

        segments.push(Segment {
            name: format!("load{}", index),
            vaddr: header.p_vaddr,
            size: header.p_memsz,
            file_offset: header.p_offset,
            file_size: header.p_filesz,
            perms: perms_from_flags(header.p_flags),
        });
    }

    Ok(segments)
}

fn segments_from_sections(elf: &Elf, image: &[u8], options: &LoadOptions) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut mapped_bytes: u64 = 0;

    for (index, section) in elf
        .section_headers
        .iter()
        .filter(|section| {
            section.sh_type != SHT_NULL
                && section.sh_flags & u64::from(SHF_ALLOC) != 0
                && section.sh_size > 0
        })
        .enumerate()
    {
        if segments.len() >= options.max_segments {
            return Err(malformed_error!(
                "section count exceeds limit of {}",
                options.max_segments
            ));
        }

        // NOBITS sections occupy memory but no file bytes.
        let file_size = if section.sh_type == SHT_NOBITS {
            0
        } else {
            section.sh_size
        };

        let Some(file_end) = section.sh_offset.checked_add(file_size) else {
            return Err(malformed_error!(
                "section {} file range overflows at offset {:#x}",
                index,
                section.sh_offset
            ));
        };

        if file_end > image.len() as u64 {
            return Err(malformed_error!(
                "section {} declares {:#x}..{:#x} beyond image size {:#x}",
                index,
                section.sh_offset,
                file_end,
                image.len()
            ));
        }

        mapped_bytes = mapped_bytes.saturating_add(section.sh_size);
        if mapped_bytes > options.max_mapped_bytes {
            return Err(malformed_error!(
                "total mapped size exceeds limit of {:#x} bytes",
                options.max_mapped_bytes
            ));
        }

        let name = elf
            .shdr_strtab
            .get_at(section.sh_name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("section{}", index));

        let mut perms = Perms::READ;
        if section.sh_flags & u64::from(SHF_EXECINSTR) != 0 {
            perms |= Perms::EXECUTE;
        }

        segments.push(Segment {
            name,
            vaddr: section.sh_addr,
            size: section.sh_size,
            file_offset: section.sh_offset,
            file_size,
            perms,
        });
    }

    Ok(segments)
}

fn perms_from_flags(p_flags: u32) -> Perms {
    let mut perms = Perms::empty();
    if p_flags & PF_R != 0 {
        perms |= Perms::READ;
    }
    if p_flags & PF_W != 0 {
        perms |= Perms::WRITE;
    }
    if p_flags & PF_X != 0 {
        perms |= Perms::EXECUTE;
    }
    perms
}
