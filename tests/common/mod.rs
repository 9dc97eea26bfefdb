//! Shared fixtures for integration tests.

#![allow(dead_code)]

/// Builds minimal ELF64 x86-64 executable images in memory: header, one `PT_LOAD`
/// program header per segment, segment bytes packed behind the table.
pub struct ElfBuilder {
    entry: u64,
    segments: Vec<BuilderSegment>,
}

struct BuilderSegment {
    vaddr: u64,
    flags: u32,
    code: Vec<u8>,
    filesz: u64,
}

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

const EHDR_SIZE: u64 = 64;
const PHDR_SIZE: u64 = 56;

impl ElfBuilder {
    pub fn new(entry: u64) -> ElfBuilder {
        ElfBuilder {
            entry,
            segments: Vec::new(),
        }
    }

    pub fn segment(self, vaddr: u64, flags: u32, code: &[u8]) -> ElfBuilder {
        let filesz = code.len() as u64;
        self.push(vaddr, flags, code, filesz)
    }

    pub fn segment_with_filesz(
        self,
        vaddr: u64,
        flags: u32,
        code: &[u8],
        filesz: u64,
    ) -> ElfBuilder {
        self.push(vaddr, flags, code, filesz)
    }

    fn push(mut self, vaddr: u64, flags: u32, code: &[u8], filesz: u64) -> ElfBuilder {
        self.segments.push(BuilderSegment {
            vaddr,
            flags,
            code: code.to_vec(),
            filesz,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let phnum = self.segments.len() as u16;
        let mut image = Vec::new();

        image.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
        image.push(2); // ELFCLASS64
        image.push(1); // ELFDATA2LSB
        image.push(1); // EV_CURRENT
        image.extend_from_slice(&[0u8; 9]);
        image.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        image.extend_from_slice(&0x3Eu16.to_le_bytes()); // EM_X86_64
        image.extend_from_slice(&1u32.to_le_bytes());
        image.extend_from_slice(&self.entry.to_le_bytes());
        image.extend_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
        image.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
        image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        image.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        image.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        image.extend_from_slice(&phnum.to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes());

        let mut offset = EHDR_SIZE + PHDR_SIZE * u64::from(phnum);
        for segment in &self.segments {
            image.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
            image.extend_from_slice(&segment.flags.to_le_bytes());
            image.extend_from_slice(&offset.to_le_bytes());
            image.extend_from_slice(&segment.vaddr.to_le_bytes());
            image.extend_from_slice(&segment.vaddr.to_le_bytes());
            image.extend_from_slice(&segment.filesz.to_le_bytes());
            let memsz = segment.filesz.max(segment.code.len() as u64);
            image.extend_from_slice(&memsz.to_le_bytes());
            image.extend_from_slice(&0x1000u64.to_le_bytes());
            offset += segment.code.len() as u64;
        }

        for segment in &self.segments {
            image.extend_from_slice(&segment.code);
        }

        image
    }
}
