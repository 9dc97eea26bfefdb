//! Control-flow recovery over the segment map.
//!
//! Recovery is a worklist algorithm over virtual addresses. Starting from the entry
//! points, it decodes straight-line runs of instructions until a control transfer,
//! queues the transfer's successors, and repeats until the worklist drains. Runs in
//! the same generation of the worklist decode in parallel into a shared cache;
//! because the decoder is pure, concurrent decodes of the same address produce
//! identical values and the order they land in the cache cannot be observed. All
//! classification happens afterwards, sequentially, in discovery order, so the
//! recovered graph is identical from run to run.
//!
//! Decode failures are contained: an address that fails to decode (or lies outside
//! every segment) becomes an empty block marked truncated, and recovery continues
//! with the rest of the worklist. The instruction budget is checked between
//! generations; exceeding it stops discovery cleanly with a warning.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    analysis::cfg::{BasicBlock, CfgEdge, ControlFlowGraph, EdgeKind},
    context::LoadOptions,
    disassembler::{decode_instruction, FlowType, Instruction, MAX_INSTRUCTION_LEN},
    file::Parser,
    loader::SegmentMap,
};

/// Per-address decode outcome in the shared cache.
#[derive(Debug, Clone)]
enum Outcome {
    Decoded(Arc<Instruction>),
    Failed,
}

/// Recovers the control-flow graph reachable from `entries`.
///
/// `entries` supplies the initial worklist in order; the container entry point comes
/// first by convention. Addresses are deduplicated, and every address ever queued
/// that yields a cache entry becomes a block leader, so jumping into the middle of an
/// already-decoded run splits the containing block.
pub(crate) fn recover(
    image: &[u8],
    map: &SegmentMap,
    entries: &[u64],
    options: &LoadOptions,
) -> ControlFlowGraph {
    let cache: DashMap<u64, Outcome> = DashMap::new();
    let failed = AtomicUsize::new(0);
    let mut queued: HashSet<u64> = HashSet::new();
    let mut integrated: HashSet<u64> = HashSet::new();

    let mut frontier: Vec<u64> = Vec::new();
    for &entry in entries {
        if queued.insert(entry) {
            frontier.push(entry);
        }
    }
    debug!("recovery seeded with {} entry points", frontier.len());

    while !frontier.is_empty() {
        // Failed entries occupy the cache but decode nothing; only decoded
        // instructions count against the budget.
        let decoded = cache.len() - failed.load(Ordering::Relaxed);
        if decoded >= options.max_instructions {
            warn!(
                "instruction budget of {} reached with {} addresses still queued; stopping recovery",
                options.max_instructions,
                frontier.len()
            );
            break;
        }

        // Decode this generation in parallel. Runs may overlap; the cache absorbs
        // duplicate work because decoding is pure.
        frontier
            .par_iter()
            .for_each(|&va| decode_run(image, map, va, &cache, &failed));

        // Classify sequentially, in the order the addresses were discovered.
        let mut next_frontier = Vec::new();
        for &va in &frontier {
            for successor in run_successors(va, &cache, &mut integrated) {
                if queued.insert(successor) {
                    next_frontier.push(successor);
                }
            }
        }
        frontier = next_frontier;
    }

    build_graph(map.entry_point(), &queued, &cache)
}

/// Decodes a straight-line run starting at `va` into the cache, stopping at the
/// first control transfer, decode failure, or already-cached address.
fn decode_run(
    image: &[u8],
    map: &SegmentMap,
    start: u64,
    cache: &DashMap<u64, Outcome>,
    failed: &AtomicUsize,
) {
    let mut va = start;

    loop {
        if cache.contains_key(&va) {
            return;
        }

        let Ok(window) = map.slice_at(image, va) else {
            if cache.insert(va, Outcome::Failed).is_none() {
                failed.fetch_add(1, Ordering::Relaxed);
            }
            return;
        };

        // The window never crosses the segment end, so a run that straddles it fails
        // at the boundary instead of reading into the neighbor.
        let window = &window[..window.len().min(MAX_INSTRUCTION_LEN)];
        let mut parser = Parser::new(window);

        match decode_instruction(&mut parser, va) {
            Ok(instruction) => {
                let flow = instruction.flow_type();
                let next = instruction.next_address();
                cache.insert(va, Outcome::Decoded(Arc::new(instruction)));
                if flow != FlowType::Sequential {
                    return;
                }
                va = next;
            }
            Err(_) => {
                if cache.insert(va, Outcome::Failed).is_none() {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
                return;
            }
        }
    }
}

/// Walks the cached run starting at `va` and returns the successor addresses of its
/// terminating transfer, if the walk reaches one.
///
/// Addresses already integrated by an earlier walk are skipped; the continuation
/// beyond them is identical and its successors were already collected.
fn run_successors(
    start: u64,
    cache: &DashMap<u64, Outcome>,
    integrated: &mut HashSet<u64>,
) -> Vec<u64> {
    let mut va = start;

    loop {
        if !integrated.insert(va) {
            return Vec::new();
        }

        let Some(outcome) = cache.get(&va) else {
            return Vec::new();
        };

        let instruction = match outcome.value() {
            Outcome::Decoded(instruction) => Arc::clone(instruction),
            Outcome::Failed => return Vec::new(),
        };
        drop(outcome);

        let next = instruction.next_address();
        match instruction.flow_type() {
            FlowType::Sequential => va = next,
            FlowType::ConditionalBranch => {
                let mut successors = Vec::new();
                if let Some(target) = instruction.branch_target() {
                    successors.push(target);
                }
                successors.push(next);
                return successors;
            }
            FlowType::UnconditionalBranch => {
                return instruction.branch_target().into_iter().collect();
            }
            FlowType::Call => {
                let mut successors = Vec::new();
                if let Some(target) = instruction.branch_target() {
                    successors.push(target);
                }
                successors.push(next);
                return successors;
            }
            FlowType::IndirectCall => return vec![next],
            FlowType::IndirectBranch | FlowType::Return | FlowType::Terminal => {
                return Vec::new();
            }
        }
    }
}

/// Assembles basic blocks and edges from the decode cache.
///
/// Leaders are the queued addresses that produced a cache entry. Blocks are walked
/// from each leader in ascending address order and cut at the next leader or control
/// transfer; identifiers follow that order.
fn build_graph(entry: u64, queued: &HashSet<u64>, cache: &DashMap<u64, Outcome>) -> ControlFlowGraph {
    let leaders: BTreeSet<u64> = queued
        .iter()
        .copied()
        .filter(|va| cache.contains_key(va))
        .collect();

    let mut blocks = Vec::with_capacity(leaders.len());
    let mut edges = Vec::with_capacity(leaders.len());

    for &leader in &leaders {
        let (block, outgoing) = build_block(blocks.len(), leader, &leaders, cache);
        blocks.push(block);
        edges.push(outgoing);
    }

    // Drop edges whose target never produced a block (budget cut before the target
    // was decoded); every remaining edge lands on a leader.
    for outgoing in &mut edges {
        outgoing.retain(|edge| leaders.contains(&edge.target));
    }

    debug!(
        "recovered {} blocks covering {} instructions",
        blocks.len(),
        blocks.iter().map(BasicBlock::len).sum::<usize>()
    );

    ControlFlowGraph::new(blocks, edges, entry)
}

fn build_block(
    id: usize,
    leader: u64,
    leaders: &BTreeSet<u64>,
    cache: &DashMap<u64, Outcome>,
) -> (BasicBlock, Vec<CfgEdge>) {
    let mut instructions = Vec::new();
    let mut truncated = false;
    let mut outgoing = Vec::new();
    let mut va = leader;

    loop {
        let Some(outcome) = cache.get(&va) else {
            break;
        };

        let instruction = match outcome.value() {
            Outcome::Decoded(instruction) => Arc::clone(instruction),
            Outcome::Failed => {
                truncated = true;
                break;
            }
        };
        drop(outcome);

        let next = instruction.next_address();
        let flow = instruction.flow_type();
        let target = instruction.branch_target();
        instructions.push(instruction);

        match flow {
            FlowType::Sequential => {
                if leaders.contains(&next) {
                    outgoing.push(CfgEdge {
                        target: next,
                        kind: EdgeKind::FallThrough,
                    });
                    break;
                }
                va = next;
            }
            FlowType::ConditionalBranch => {
                if let Some(target) = target {
                    outgoing.push(CfgEdge {
                        target,
                        kind: EdgeKind::ConditionalTaken,
                    });
                }
                outgoing.push(CfgEdge {
                    target: next,
                    kind: EdgeKind::ConditionalNotTaken,
                });
                break;
            }
            FlowType::UnconditionalBranch => {
                if let Some(target) = target {
                    outgoing.push(CfgEdge {
                        target,
                        kind: EdgeKind::Unconditional,
                    });
                }
                break;
            }
            FlowType::Call => {
                if let Some(target) = target {
                    outgoing.push(CfgEdge {
                        target,
                        kind: EdgeKind::Call,
                    });
                }
                outgoing.push(CfgEdge {
                    target: next,
                    kind: EdgeKind::FallThrough,
                });
                break;
            }
            FlowType::IndirectCall => {
                outgoing.push(CfgEdge {
                    target: next,
                    kind: EdgeKind::FallThrough,
                });
                break;
            }
            FlowType::IndirectBranch | FlowType::Return | FlowType::Terminal => break,
        }
    }

    (
        BasicBlock {
            id,
            start: leader,
            instructions,
            truncated,
        },
        outgoing,
    )
}
