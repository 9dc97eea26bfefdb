#![warn(missing_docs)]
//! # rcdecomp
//!
//! A binary-loading and disassembly core for x86-64 ELF executables: byte image
//! management, container parsing, hand-written instruction decoding with EFLAGS
//! semantics, and control-flow graph recovery.
//!
//! The pipeline runs in fixed stages, each producing an immutable artifact the next
//! stage reads:
//!
//! 1. **[`file`]** - owns the raw bytes, from a memory-mapped file or an in-memory
//!    buffer, and provides bounds-checked access to them.
//! 2. **[`loader`]** - parses the ELF64 container and builds the [`loader::SegmentMap`]:
//!    the non-overlapping virtual-address layout plus the entry point.
//! 3. **[`disassembler`]** - decodes individual instructions and states their
//!    control-flow and flag semantics. Decoding is pure: same bytes, same address,
//!    same result.
//! 4. **[`analysis`]** - recovers the [`analysis::ControlFlowGraph`] reachable from
//!    the entry points, containing decode failures to the block they occur in.
//!
//! [`DecompilerContext`] owns one trip through that pipeline and the lifetime of
//! everything it produces.
//!
//! # Examples
//!
//! ```rust,no_run
//! use rcdecomp::DecompilerContext;
//! use std::path::Path;
//!
//! let mut context = DecompilerContext::new();
//! context.load(Path::new("/usr/bin/true"))?;
//!
//! let graph = context.cfg().unwrap();
//! for block in graph.blocks() {
//!     println!("{:#x}: {} instructions", block.start, block.len());
//!     for edge in graph.outgoing_edges(block.id) {
//!         println!("  -> {:#x} ({})", edge.target, edge.kind.label());
//!     }
//! }
//! # Ok::<(), rcdecomp::Error>(())
//! ```
//!
//! # Malformed input
//!
//! Every container descriptor is validated against the byte image before any derived
//! state is built, and every byte access during decoding is bounds-checked. Damaged
//! containers fail the load with [`Error::Malformed`]; damaged code bytes never do -
//! a failed decode terminates its basic block and recovery continues elsewhere.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod context;
pub mod disassembler;
pub mod file;
pub mod loader;

#[cfg(test)]
pub(crate) mod test;

pub use analysis::{BasicBlock, CfgEdge, ControlFlowGraph, EdgeKind};
pub use context::{DecompilerContext, LoadOptions};
pub use disassembler::{
    Condition, FlagEffects, Flags, FlowType, Instruction, Opcode, Operand, Register,
};
pub use error::Error;
pub use file::{File, Parser};
pub use loader::{Perms, Segment, SegmentMap};

/// Convenience alias for `Result<T, rcdecomp::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
