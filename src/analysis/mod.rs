//! Control-flow recovery and the recovered graph.
//!
//! [`recovery`] walks the executable bytes from the entry points and produces the
//! [`ControlFlowGraph`] defined in [`cfg`]. The graph is immutable once built;
//! callers reach it through [`crate::context::DecompilerContext::cfg`].

pub(crate) mod cfg;
pub(crate) mod recovery;

pub use cfg::{BasicBlock, CfgEdge, ControlFlowGraph, EdgeKind};
