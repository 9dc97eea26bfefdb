//! Shared helpers for unit tests.

/// Builds minimal ELF64 x86-64 executable images in memory.
///
/// Produces a header, one `PT_LOAD` program header per segment, and the segment
/// bytes packed behind the header table. When function symbols are added, a
/// `.symtab`/`.strtab` pair and the section header table are appended as well.
pub(crate) struct ElfBuilder {
    entry: u64,
    segments: Vec<BuilderSegment>,
    symbols: Vec<(String, u64)>,
}

struct BuilderSegment {
    vaddr: u64,
    flags: u32,
    code: Vec<u8>,
    filesz: u64,
}

const EHDR_SIZE: u64 = 64;
const PHDR_SIZE: u64 = 56;
const SHDR_SIZE: u64 = 64;
const SYM_SIZE: u64 = 24;

const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
// STB_GLOBAL << 4 | STT_FUNC
const GLOBAL_FUNC: u8 = 0x12;

impl ElfBuilder {
    pub(crate) fn new(entry: u64) -> ElfBuilder {
        ElfBuilder {
            entry,
            segments: Vec::new(),
            symbols: Vec::new(),
        }
    }

    /// Adds a loadable segment whose file and memory sizes match its bytes.
    pub(crate) fn segment(self, vaddr: u64, flags: u32, code: &[u8]) -> ElfBuilder {
        let filesz = code.len() as u64;
        self.push(vaddr, flags, code, filesz)
    }

    /// Adds a loadable segment with a declared file size that may disagree with the
    /// actual bytes, for malformed-container tests.
    pub(crate) fn segment_with_filesz(
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

    /// Adds a global `STT_FUNC` symbol pointing at `vaddr` to the static symbol
    /// table.
    pub(crate) fn function_symbol(mut self, name: &str, vaddr: u64) -> ElfBuilder {
        self.symbols.push((name.to_string(), vaddr));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let phnum = self.segments.len() as u16;
        let mut image = Vec::new();

        // ELF header
        image.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
        image.push(2); // ELFCLASS64
        image.push(1); // ELFDATA2LSB
        image.push(1); // EV_CURRENT
        image.extend_from_slice(&[0u8; 9]); // osabi, abiversion, padding
        image.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
        image.extend_from_slice(&0x3Eu16.to_le_bytes()); // e_machine = EM_X86_64
        image.extend_from_slice(&1u32.to_le_bytes()); // e_version
        image.extend_from_slice(&self.entry.to_le_bytes()); // e_entry
        image.extend_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
        image.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
        image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        image.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
        image.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes()); // e_phentsize
        image.extend_from_slice(&phnum.to_le_bytes()); // e_phnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        // Program headers; segment bytes are packed behind the table in order.
        let mut offset = EHDR_SIZE + PHDR_SIZE * u64::from(phnum);
        for segment in &self.segments {
            image.extend_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
            image.extend_from_slice(&segment.flags.to_le_bytes());
            image.extend_from_slice(&offset.to_le_bytes()); // p_offset
            image.extend_from_slice(&segment.vaddr.to_le_bytes()); // p_vaddr
            image.extend_from_slice(&segment.vaddr.to_le_bytes()); // p_paddr
            image.extend_from_slice(&segment.filesz.to_le_bytes()); // p_filesz
            let memsz = segment.filesz.max(segment.code.len() as u64);
            image.extend_from_slice(&memsz.to_le_bytes()); // p_memsz
            image.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align
            offset += segment.code.len() as u64;
        }

        for segment in &self.segments {
            image.extend_from_slice(&segment.code);
        }

        if !self.symbols.is_empty() {
            self.append_symbol_sections(&mut image);
        }

        image
    }

    /// Appends `.symtab`, `.strtab` and `.shstrtab` plus the section header table,
    /// then patches the section fields of the ELF header.
    fn append_symbol_sections(&self, image: &mut Vec<u8>) {
        // String table for the symbol names: leading NUL, then each name.
        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for (name, _) in &self.symbols {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        // Symbol table: the mandatory null symbol, then one global function each.
        let symtab_offset = image.len() as u64;
        image.extend_from_slice(&[0u8; SYM_SIZE as usize]);
        for ((_, vaddr), name_offset) in self.symbols.iter().zip(&name_offsets) {
            image.extend_from_slice(&name_offset.to_le_bytes()); // st_name
            image.push(GLOBAL_FUNC); // st_info
            image.push(0); // st_other
            image.extend_from_slice(&1u16.to_le_bytes()); // st_shndx
            image.extend_from_slice(&vaddr.to_le_bytes()); // st_value
            image.extend_from_slice(&0u64.to_le_bytes()); // st_size
        }
        let symtab_size = (1 + self.symbols.len() as u64) * SYM_SIZE;

        let strtab_offset = image.len() as u64;
        image.extend_from_slice(&strtab);

        // Section-name string table: "\0.symtab\0.strtab\0.shstrtab\0".
        let shstrtab_offset = image.len() as u64;
        let shstrtab = b"\0.symtab\0.strtab\0.shstrtab\0";
        image.extend_from_slice(shstrtab);

        let shoff = image.len() as u64;
        let shdr = |sh_name: u32,
                    sh_type: u32,
                    sh_offset: u64,
                    sh_size: u64,
                    sh_link: u32,
                    sh_entsize: u64| {
            let mut header = Vec::with_capacity(SHDR_SIZE as usize);
            header.extend_from_slice(&sh_name.to_le_bytes());
            header.extend_from_slice(&sh_type.to_le_bytes());
            header.extend_from_slice(&0u64.to_le_bytes()); // sh_flags
            header.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
            header.extend_from_slice(&sh_offset.to_le_bytes());
            header.extend_from_slice(&sh_size.to_le_bytes());
            header.extend_from_slice(&sh_link.to_le_bytes());
            header.extend_from_slice(&1u32.to_le_bytes()); // sh_info
            header.extend_from_slice(&1u64.to_le_bytes()); // sh_addralign
            header.extend_from_slice(&sh_entsize.to_le_bytes());
            header
        };

        image.extend_from_slice(&[0u8; SHDR_SIZE as usize]); // null section
        image.extend_from_slice(&shdr(1, SHT_SYMTAB, symtab_offset, symtab_size, 2, SYM_SIZE));
        image.extend_from_slice(&shdr(9, SHT_STRTAB, strtab_offset, strtab.len() as u64, 0, 0));
        image.extend_from_slice(&shdr(
            17,
            SHT_STRTAB,
            shstrtab_offset,
            shstrtab.len() as u64,
            0,
            0,
        ));

        image[40..48].copy_from_slice(&shoff.to_le_bytes()); // e_shoff
        image[58..60].copy_from_slice(&(SHDR_SIZE as u16).to_le_bytes()); // e_shentsize
        image[60..62].copy_from_slice(&4u16.to_le_bytes()); // e_shnum
        image[62..64].copy_from_slice(&3u16.to_le_bytes()); // e_shstrndx
    }
}
