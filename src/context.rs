//! The decompiler context: load lifecycle and analysis access.
//!
//! [`DecompilerContext`] owns everything derived from one binary: the byte image, the
//! segment map, and the recovered control-flow graph. A context starts empty, loads
//! at most one binary at a time, and releases all derived state when dropped or when
//! another binary is loaded over it.
//!
//! Loading is atomic: parsing, validation, and recovery all run against local state,
//! and the context is only updated if every stage succeeds. A failed load leaves a
//! previously loaded binary fully usable.
//!
//! # Examples
//!
//! ```rust,no_run
//! use rcdecomp::DecompilerContext;
//! use std::path::Path;
//!
//! let mut context = DecompilerContext::new();
//! context.load(Path::new("target/binary"))?;
//!
//! let graph = context.cfg().unwrap();
//! println!("{} blocks", graph.block_count());
//! # Ok::<(), rcdecomp::Error>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::{
    analysis::{recovery, ControlFlowGraph},
    disassembler::Instruction,
    file::File,
    loader::{elf, SegmentMap},
    Result,
};

/// Tunable limits and extensions for a load.
///
/// The defaults accept any reasonably sized binary; the limits exist so a malformed
/// container cannot demand unbounded work before validation catches it.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Maximum number of segments (or fallback sections) accepted from the container
    pub max_segments: usize,
    /// Maximum total virtual size mapped by all segments, in bytes
    pub max_mapped_bytes: u64,
    /// Maximum number of instructions recovery will decode before stopping
    pub max_instructions: usize,
    /// Additional virtual addresses to seed recovery with, after the entry point
    pub extra_entry_points: Vec<u64>,
    /// Also seed recovery from the container's function symbols, when present
    pub sweep_function_symbols: bool,
}

impl Default for LoadOptions {
    fn default() -> LoadOptions {
        LoadOptions {
            max_segments: 4096,
            max_mapped_bytes: 1 << 30,
            max_instructions: 1_000_000,
            extra_entry_points: Vec::new(),
            sweep_function_symbols: false,
        }
    }
}

/// Everything derived from one loaded binary.
#[derive(Debug)]
struct LoadedBinary {
    file: File,
    segments: SegmentMap,
    graph: ControlFlowGraph,
    /// Address-ordered view of every recovered instruction, shared with the graph's
    /// blocks. Entries are never mutated after the load completes.
    instructions: BTreeMap<u64, Arc<Instruction>>,
}

/// Owns the full lifecycle of one binary under analysis.
///
/// Created empty with [`DecompilerContext::new`]; populated by [`load`] or
/// [`load_from_mem`]; emptied by [`unload`], a subsequent load, or drop. All
/// accessors return `None` while no binary is loaded.
///
/// [`load`]: DecompilerContext::load
/// [`load_from_mem`]: DecompilerContext::load_from_mem
/// [`unload`]: DecompilerContext::unload
#[derive(Debug, Default)]
pub struct DecompilerContext {
    state: Option<LoadedBinary>,
    options: LoadOptions,
}

impl DecompilerContext {
    /// Creates an empty context with default [`LoadOptions`].
    #[must_use]
    pub fn new() -> DecompilerContext {
        DecompilerContext {
            state: None,
            options: LoadOptions::default(),
        }
    }

    /// Creates an empty context with the given options.
    #[must_use]
    pub fn with_options(options: LoadOptions) -> DecompilerContext {
        DecompilerContext {
            state: None,
            options,
        }
    }

    /// Loads and analyzes the binary at `path`, replacing any previous binary.
    ///
    /// Runs the full pipeline: maps the file, parses the container, and recovers the
    /// control-flow graph. The context is only updated if every stage succeeds; on
    /// failure a previously loaded binary remains intact.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] for I/O failures,
    /// [`crate::Error::NotSupported`] for containers that are not x86-64 ELF64, and
    /// [`crate::Error::Malformed`] for containers whose metadata fails validation.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::from_file(path)?;
        self.install(file)
    }

    /// Loads and analyzes a binary from an in-memory buffer.
    ///
    /// # Errors
    /// Same as [`DecompilerContext::load`], minus the I/O failures.
    pub fn load_from_mem(&mut self, data: Vec<u8>) -> Result<()> {
        let file = File::from_mem(data)?;
        self.install(file)
    }

    fn install(&mut self, file: File) -> Result<()> {
        let segments = elf::parse(file.data(), &self.options)?;

        let mut entries = vec![segments.entry_point()];
        entries.extend_from_slice(&self.options.extra_entry_points);
        if self.options.sweep_function_symbols {
            entries.extend(elf::function_symbols(file.data())?);
        }

        let graph = recovery::recover(file.data(), &segments, &entries, &self.options);

        let instructions: BTreeMap<u64, Arc<Instruction>> = graph
            .blocks()
            .flat_map(|block| {
                block
                    .instructions
                    .iter()
                    .map(|instruction| (instruction.address, Arc::clone(instruction)))
            })
            .collect();

        info!(
            "loaded {} segments, {} blocks, {} instructions",
            segments.len(),
            graph.block_count(),
            instructions.len()
        );

        // Everything succeeded; replace the previous binary in one step.
        self.state = Some(LoadedBinary {
            file,
            segments,
            graph,
            instructions,
        });
        Ok(())
    }

    /// Releases the loaded binary and all derived state, returning the context to
    /// empty. A no-op when nothing is loaded.
    pub fn unload(&mut self) {
        self.state = None;
    }

    /// Returns `true` while a binary is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Returns the raw byte image of the loaded binary.
    #[must_use]
    pub fn image(&self) -> Option<&[u8]> {
        self.state.as_ref().map(|loaded| loaded.file.data())
    }

    /// Returns the segment map of the loaded binary.
    #[must_use]
    pub fn segments(&self) -> Option<&SegmentMap> {
        self.state.as_ref().map(|loaded| &loaded.segments)
    }

    /// Returns the entry-point virtual address of the loaded binary.
    #[must_use]
    pub fn entry_point(&self) -> Option<u64> {
        self.state
            .as_ref()
            .map(|loaded| loaded.segments.entry_point())
    }

    /// Returns the recovered control-flow graph.
    #[must_use]
    pub fn cfg(&self) -> Option<&ControlFlowGraph> {
        self.state.as_ref().map(|loaded| &loaded.graph)
    }

    /// Returns the recovered instruction starting at `va`, if any.
    ///
    /// Addresses inside an instruction's encoding do not resolve; only the first byte
    /// does.
    #[must_use]
    pub fn instruction_at(&self, va: u64) -> Option<&Instruction> {
        self.state
            .as_ref()
            .and_then(|loaded| loaded.instructions.get(&va))
            .map(Arc::as_ref)
    }

    /// Iterates over every recovered instruction in ascending address order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.state
            .iter()
            .flat_map(|loaded| loaded.instructions.values())
            .map(Arc::as_ref)
    }

    /// Returns the total number of recovered instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.state
            .as_ref()
            .map_or(0, |loaded| loaded.instructions.len())
    }
}
