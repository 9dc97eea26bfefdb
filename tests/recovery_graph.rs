//! Graph-level properties of control-flow recovery on whole binaries.

mod common;

use common::{ElfBuilder, PF_R, PF_X};
use rcdecomp::{DecompilerContext, EdgeKind, Flags};

/// A small function with a condition, a call, and a join point:
///
/// ```text
/// 0x401000: push rbp
/// 0x401001: mov rbp, rsp
/// 0x401004: cmp edi, 0
/// 0x401007: je 0x401010
/// 0x401009: call 0x401015
/// 0x40100e: jmp 0x401013
/// 0x401010: xor eax, eax
/// 0x401012: nop
/// 0x401013: pop rbp
/// 0x401014: ret
/// 0x401015: inc rdi
/// 0x401018: ret
/// ```
const PROGRAM: [u8; 25] = [
    0x55, 0x48, 0x89, 0xE5, 0x83, 0xFF, 0x00, 0x74, 0x07, 0xE8, 0x07, 0x00, 0x00, 0x00, 0xEB,
    0x03, 0x31, 0xC0, 0x90, 0x5D, 0xC3, 0x48, 0xFF, 0xC7, 0xC3,
];

fn load_program() -> DecompilerContext {
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &PROGRAM)
        .build();
    let mut context = DecompilerContext::new();
    context.load_from_mem(image).unwrap();
    context
}

#[test]
fn block_structure() {
    let context = load_program();
    let graph = context.cfg().unwrap();

    assert_eq!(graph.block_count(), 6);
    assert_eq!(graph.instruction_count(), 12);
    assert_eq!(context.instruction_count(), 12);

    // Identifiers are dense and ascend with the start addresses.
    let starts: Vec<u64> = graph.blocks().map(|block| block.start).collect();
    assert_eq!(
        starts,
        vec![0x401000, 0x401009, 0x40100E, 0x401010, 0x401013, 0x401015]
    );
    for (position, block) in graph.blocks().enumerate() {
        assert_eq!(block.id, position);
        assert!(!block.truncated);
    }
}

#[test]
fn edge_labels() {
    let context = load_program();
    let graph = context.cfg().unwrap();

    let entry = graph.entry_block().unwrap();
    let edges = graph.outgoing_edges(entry.id);
    assert!(edges.contains(&rcdecomp::CfgEdge {
        target: 0x401010,
        kind: EdgeKind::ConditionalTaken
    }));
    assert!(edges.contains(&rcdecomp::CfgEdge {
        target: 0x401009,
        kind: EdgeKind::ConditionalNotTaken
    }));

    let call_block = graph.block_at(0x401009).unwrap();
    let edges = graph.outgoing_edges(call_block.id);
    assert!(edges.contains(&rcdecomp::CfgEdge {
        target: 0x401015,
        kind: EdgeKind::Call
    }));
    assert!(edges.contains(&rcdecomp::CfgEdge {
        target: 0x40100E,
        kind: EdgeKind::FallThrough
    }));

    // The xor arm falls through into the join block.
    let join_arm = graph.block_at(0x401010).unwrap();
    assert_eq!(
        graph.outgoing_edges(join_arm.id),
        &[rcdecomp::CfgEdge {
            target: 0x401013,
            kind: EdgeKind::FallThrough
        }]
    );

    // Both return blocks are sinks.
    assert!(graph.outgoing_edges(graph.block_at(0x401013).unwrap().id).is_empty());
    assert!(graph.outgoing_edges(graph.block_at(0x401015).unwrap().id).is_empty());
}

#[test]
fn graph_is_closed() {
    let context = load_program();
    let graph = context.cfg().unwrap();

    // Every edge lands exactly on the start of a block in the graph.
    for block in graph.blocks() {
        for edge in graph.outgoing_edges(block.id) {
            assert!(
                graph.block_at(edge.target).is_some(),
                "edge from {:#x} to {:#x} has no target block",
                block.start,
                edge.target
            );
        }
    }

    // Predecessor lists agree with the edges.
    for block in graph.blocks() {
        for edge in graph.outgoing_edges(block.id) {
            let target = graph.block_at(edge.target).unwrap();
            assert!(graph.predecessors(target.id).contains(&block.id));
        }
    }
}

#[test]
fn instructions_stay_inside_their_segment() {
    let context = load_program();
    let graph = context.cfg().unwrap();
    let segments = context.segments().unwrap();

    for block in graph.blocks() {
        for instruction in &block.instructions {
            let first = segments.segment_at(instruction.address).unwrap();
            let last = segments
                .segment_at(instruction.address + u64::from(instruction.size) - 1)
                .unwrap();
            assert_eq!(first.vaddr, last.vaddr, "instruction straddles segments");
            assert!(first.is_executable());
        }
    }
}

#[test]
fn blocks_do_not_overlap() {
    let context = load_program();
    let graph = context.cfg().unwrap();

    let blocks: Vec<_> = graph.blocks().collect();
    for window in blocks.windows(2) {
        assert!(
            window[0].end() <= window[1].start,
            "blocks {:#x} and {:#x} overlap",
            window[0].start,
            window[1].start
        );
    }
}

#[test]
fn flag_effects_are_available_everywhere() {
    let context = load_program();
    let graph = context.cfg().unwrap();

    // Every recovered instruction reports its flag semantics without panicking.
    for block in graph.blocks() {
        for instruction in &block.instructions {
            let _ = instruction.flag_effects();
        }
    }

    // The compare defines what the branch consumes.
    let compare = context.instruction_at(0x401004).unwrap();
    assert!(compare.flag_effects().written.contains(Flags::ZF | Flags::CF));

    let branch = context.instruction_at(0x401007).unwrap();
    assert_eq!(branch.flag_effects().read, Flags::ZF);

    // xor defines ZF but leaves AF undefined.
    let xor = context.instruction_at(0x401010).unwrap();
    assert!(xor.flag_effects().written.contains(Flags::ZF));
    assert!(xor.flag_effects().clobbered.contains(Flags::AF));
}

#[test]
fn truncated_tail_is_contained() {
    // The segment ends in the middle of a mov encoding.
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0x90, 0x48, 0x8B])
        .build();

    let mut context = DecompilerContext::new();
    context.load_from_mem(image).unwrap();

    let graph = context.cfg().unwrap();
    assert_eq!(graph.block_count(), 1);

    let block = graph.entry_block().unwrap();
    assert_eq!(block.len(), 1);
    assert!(block.truncated);
    assert_eq!(block.terminator().unwrap().mnemonic(), "nop");
}

#[test]
fn invalid_arm_does_not_poison_the_graph() {
    // je skips over a ret onto an invalid opcode; only that arm is truncated.
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0x74, 0x02, 0xC3, 0x90, 0x06])
        .build();

    let mut context = DecompilerContext::new();
    context.load_from_mem(image).unwrap();

    let graph = context.cfg().unwrap();
    assert_eq!(graph.block_count(), 3);

    let broken = graph.block_at(0x401004).unwrap();
    assert!(broken.truncated);
    assert!(broken.is_empty());

    let healthy = graph.block_at(0x401002).unwrap();
    assert!(!healthy.truncated);
    assert_eq!(healthy.terminator().unwrap().mnemonic(), "ret");
}

#[test]
fn loads_are_reproducible() {
    let first = load_program();
    let second = load_program();

    let a = first.cfg().unwrap();
    let b = second.cfg().unwrap();

    assert_eq!(a.block_count(), b.block_count());
    for (block_a, block_b) in a.blocks().zip(b.blocks()) {
        assert_eq!(block_a.start, block_b.start);
        assert_eq!(block_a.instructions, block_b.instructions);
        assert_eq!(a.outgoing_edges(block_a.id), b.outgoing_edges(block_b.id));
    }
    assert_eq!(a.to_dot(), b.to_dot());
}

#[test]
fn dot_export_covers_all_blocks() {
    let context = load_program();
    let graph = context.cfg().unwrap();
    let dot = graph.to_dot();

    for block in graph.blocks() {
        assert!(dot.contains(&format!("b{}", block.id)));
    }
    assert!(dot.contains("taken"));
    assert!(dot.contains("call"));
}
