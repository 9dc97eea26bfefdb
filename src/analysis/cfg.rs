//! Basic blocks and the recovered control-flow graph.
//!
//! A [`BasicBlock`] is a maximal straight-line run of decoded instructions: control
//! enters only at the first instruction and leaves only after the last. The
//! [`ControlFlowGraph`] ties blocks together with labeled [`CfgEdge`]s and is the
//! final, immutable product of recovery; block identifiers are assigned in ascending
//! start-address order, so the same binary always produces the same graph.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::disassembler::Instruction;

/// The control-flow relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Execution runs off the end of the block into its successor
    FallThrough,
    /// Conditional branch, condition holds
    ConditionalTaken,
    /// Conditional branch, condition does not hold
    ConditionalNotTaken,
    /// Unconditional direct branch
    Unconditional,
    /// Direct call; the target starts a new entry point
    Call,
    /// Return to the caller. Returns terminate a recovery path, so the recoverer
    /// emits no edges of this kind; it exists for consumers that link call sites to
    /// their continuations.
    Return,
}

impl EdgeKind {
    /// Returns `true` for the two halves of a conditional branch.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            EdgeKind::ConditionalTaken | EdgeKind::ConditionalNotTaken
        )
    }

    /// Label used in DOT output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::FallThrough => "fallthrough",
            EdgeKind::ConditionalTaken => "taken",
            EdgeKind::ConditionalNotTaken => "not-taken",
            EdgeKind::Unconditional => "jump",
            EdgeKind::Call => "call",
            EdgeKind::Return => "return",
        }
    }
}

/// An outgoing edge of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgEdge {
    /// Start address of the successor block
    pub target: u64,
    /// Relationship between the blocks
    pub kind: EdgeKind,
}

/// A maximal single-entry, single-exit run of instructions.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Identifier, dense and ascending by start address
    pub id: usize,
    /// Virtual address of the first instruction
    pub start: u64,
    /// The instructions, in address order
    pub instructions: Vec<Arc<Instruction>>,
    /// `true` if the block ends because its next instruction failed to decode rather
    /// than at a control transfer
    pub truncated: bool,
}

impl BasicBlock {
    /// Returns the address one past the last instruction, or the start address for a
    /// block that decoded nothing.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.instructions
            .last()
            .map_or(self.start, |instruction| instruction.next_address())
    }

    /// Returns the number of instructions in this block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if no instruction decoded at this block's start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the final instruction, if any.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().map(Arc::as_ref)
    }

    /// Returns `true` if `va` is the address of one of this block's instructions.
    #[must_use]
    pub fn contains(&self, va: u64) -> bool {
        va >= self.start && va < self.end()
    }
}

/// The recovered control-flow graph of one binary.
///
/// Immutable once built. Every edge target is the start address of a block in the
/// graph; recovery guarantees this closure property before construction.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    edges: Vec<Vec<CfgEdge>>,
    predecessors: Vec<Vec<usize>>,
    entry: u64,
    index: BTreeMap<u64, usize>,
}

impl ControlFlowGraph {
    /// Assembles a graph from blocks and their outgoing edges.
    ///
    /// `blocks` must be sorted by start address with ids matching their positions, and
    /// `edges[i]` lists the outgoing edges of `blocks[i]`. Predecessor lists and the
    /// address index are derived here.
    pub(crate) fn new(blocks: Vec<BasicBlock>, edges: Vec<Vec<CfgEdge>>, entry: u64) -> Self {
        debug_assert_eq!(blocks.len(), edges.len());

        let index: BTreeMap<u64, usize> = blocks
            .iter()
            .map(|block| (block.start, block.id))
            .collect();

        let mut predecessors = vec![Vec::new(); blocks.len()];
        for (id, outgoing) in edges.iter().enumerate() {
            for edge in outgoing {
                if let Some(&target) = index.get(&edge.target) {
                    if !predecessors[target].contains(&id) {
                        predecessors[target].push(id);
                    }
                }
            }
        }

        ControlFlowGraph {
            blocks,
            edges,
            predecessors,
            entry,
            index,
        }
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the entry-point virtual address.
    #[must_use]
    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// Returns the block that recovery started from, if the entry point decoded.
    #[must_use]
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.block_at(self.entry)
    }

    /// Returns the block with the given identifier.
    #[must_use]
    pub fn block(&self, id: usize) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    /// Returns the block starting exactly at `va`.
    #[must_use]
    pub fn block_at(&self, va: u64) -> Option<&BasicBlock> {
        self.index.get(&va).map(|&id| &self.blocks[id])
    }

    /// Returns the block whose instruction range contains `va`.
    #[must_use]
    pub fn block_containing(&self, va: u64) -> Option<&BasicBlock> {
        self.index
            .range(..=va)
            .next_back()
            .map(|(_, &id)| &self.blocks[id])
            .filter(|block| block.contains(va))
    }

    /// Iterates over the blocks in ascending start-address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    /// Returns the outgoing edges of a block.
    #[must_use]
    pub fn outgoing_edges(&self, id: usize) -> &[CfgEdge] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }

    /// Returns the successor blocks of a block, in edge order.
    pub fn successors(&self, id: usize) -> impl Iterator<Item = &BasicBlock> {
        self.outgoing_edges(id)
            .iter()
            .filter_map(|edge| self.block_at(edge.target))
    }

    /// Returns the identifiers of the blocks with an edge into `id`.
    #[must_use]
    pub fn predecessors(&self, id: usize) -> &[usize] {
        self.predecessors.get(id).map_or(&[], Vec::as_slice)
    }

    /// Returns the total number of recovered instructions across all blocks.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::len).sum()
    }

    /// Renders the graph in Graphviz DOT format, one node per block.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph cfg {\n  node [shape=box fontname=monospace];\n");

        for block in &self.blocks {
            let mut body = format!("{:#x}:", block.start);
            for instruction in &block.instructions {
                let _ = write!(body, "\\l  {}", instruction.mnemonic());
            }
            if block.truncated {
                body.push_str("\\l  <decode error>");
            }
            let _ = writeln!(dot, "  b{} [label=\"{}\\l\"];", block.id, body);
        }

        for (id, outgoing) in self.edges.iter().enumerate() {
            for edge in outgoing {
                if let Some(target) = self.index.get(&edge.target) {
                    let _ = writeln!(
                        dot,
                        "  b{} -> b{} [label=\"{}\"];",
                        id,
                        target,
                        edge.kind.label()
                    );
                }
            }
        }

        dot.push_str("}\n");
        dot
    }
}
