//! Instruction decoding and instruction-level semantics.
//!
//! The disassembler turns raw bytes into structured [`Instruction`] values and
//! attaches the semantic facts the analysis layer consumes: control-flow
//! classification ([`FlowType`]) and EFLAGS read/write/clobber sets
//! ([`FlagEffects`]). Decoding is stateless; all reachability and caching decisions
//! live in [`crate::analysis`].
//!
//! # Examples
//!
//! ```rust
//! use rcdecomp::{disassembler::decode_instruction, Parser};
//!
//! let bytes = [0x75, 0x05]; // jne +5
//! let mut parser = Parser::new(&bytes);
//! let instruction = decode_instruction(&mut parser, 0x1000)?;
//! assert_eq!(instruction.mnemonic(), "jne");
//! assert_eq!(instruction.branch_target(), Some(0x1007));
//! # Ok::<(), rcdecomp::Error>(())
//! ```

mod decoder;
pub(crate) mod flags;
mod instruction;

pub use decoder::{decode_instruction, decode_stream, MAX_INSTRUCTION_LEN};
pub use flags::{condition_reads, flag_effects, FlagEffects, Flags};
pub use instruction::{
    Condition, FlowType, Instruction, Opcode, Operand, Prefixes, Register, SegmentPrefix,
};
