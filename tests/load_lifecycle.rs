//! End-to-end load lifecycle: file in, graph out, atomic replacement, teardown.

mod common;

use common::{ElfBuilder, PF_R, PF_W, PF_X};
use rcdecomp::{DecompilerContext, EdgeKind, Error, LoadOptions};

#[test]
fn load_two_segment_binary() {
    // Code segment: jmp 0x402000. Target segment: ret.
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0xE9, 0xFB, 0x0F, 0x00, 0x00])
        .segment(0x402000, PF_R | PF_X, &[0xC3])
        .build();

    let mut context = DecompilerContext::new();
    context.load_from_mem(image).unwrap();

    assert!(context.is_loaded());
    assert_eq!(context.entry_point(), Some(0x401000));

    let segments = context.segments().unwrap();
    assert_eq!(segments.len(), 2);
    assert!(segments.segment_at(0x401000).unwrap().is_executable());

    let graph = context.cfg().unwrap();
    assert_eq!(graph.block_count(), 2);

    let entry = graph.entry_block().unwrap();
    assert_eq!(entry.len(), 1);
    assert_eq!(entry.terminator().unwrap().mnemonic(), "jmp");

    let edges = graph.outgoing_edges(entry.id);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target, 0x402000);
    assert_eq!(edges[0].kind, EdgeKind::Unconditional);

    let target = graph.block_at(0x402000).unwrap();
    assert_eq!(target.terminator().unwrap().mnemonic(), "ret");
    assert!(graph.outgoing_edges(target.id).is_empty());
}

#[test]
fn load_from_disk() {
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0x55, 0x48, 0x89, 0xE5, 0x5D, 0xC3])
        .build();

    let path = std::env::temp_dir().join("rcdecomp_load_from_disk.bin");
    std::fs::write(&path, &image).unwrap();

    let mut context = DecompilerContext::new();
    context.load(&path).unwrap();
    assert_eq!(context.instruction_count(), 4);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn malformed_container_fails_load() {
    // The segment declares far more file bytes than the image holds.
    let image = ElfBuilder::new(0x401000)
        .segment_with_filesz(0x401000, PF_R | PF_X, &[0xC3], 0x10000)
        .build();

    let mut context = DecompilerContext::new();
    match context.load_from_mem(image) {
        Err(Error::Malformed { message, .. }) => {
            assert!(message.contains("beyond image size"), "{}", message);
        }
        other => panic!("expected Malformed, got {:?}", other),
    }
    assert!(!context.is_loaded());
}

#[test]
fn wrapping_segment_fails_load() {
    // The second segment's virtual range wraps past the end of the address space;
    // the load must fail cleanly, not overflow.
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0xC3])
        .segment(u64::MAX - 1, PF_R, &[0x00, 0x00])
        .build();

    let mut context = DecompilerContext::new();
    match context.load_from_mem(image) {
        Err(Error::Malformed { message, .. }) => {
            assert!(message.contains("wraps the address space"), "{}", message);
        }
        other => panic!("expected Malformed, got {:?}", other),
    }
    assert!(!context.is_loaded());
}

#[test]
fn failed_reload_keeps_previous_binary() {
    let good = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0x90, 0xC3])
        .build();
    let bad = ElfBuilder::new(0x401000)
        .segment_with_filesz(0x401000, PF_R | PF_X, &[0xC3], 0x10000)
        .build();

    let mut context = DecompilerContext::new();
    context.load_from_mem(good).unwrap();
    assert_eq!(context.instruction_count(), 2);

    assert!(context.load_from_mem(bad).is_err());

    // The earlier load is untouched by the failure.
    assert!(context.is_loaded());
    assert_eq!(context.entry_point(), Some(0x401000));
    assert_eq!(context.instruction_count(), 2);
    assert_eq!(context.cfg().unwrap().block_count(), 1);
}

#[test]
fn non_elf_input_is_rejected() {
    let mut context = DecompilerContext::new();
    assert!(matches!(
        context.load_from_mem(b"MZ\x90\x00not an elf".to_vec()),
        Err(Error::NotSupported)
    ));
    assert!(matches!(
        context.load_from_mem(Vec::new()),
        Err(Error::Empty)
    ));
    assert!(!context.is_loaded());
}

#[test]
fn missing_file_is_io_error() {
    let mut context = DecompilerContext::new();
    let result = context.load(std::path::Path::new("/nonexistent/rcdecomp/binary"));
    assert!(matches!(result, Err(Error::FileError(_))));
}

#[test]
fn drop_releases_everything() {
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0xC3])
        .build();

    let path = std::env::temp_dir().join("rcdecomp_drop_releases.bin");
    std::fs::write(&path, &image).unwrap();

    {
        let mut context = DecompilerContext::new();
        context.load(&path).unwrap();
        assert!(context.is_loaded());
    }

    // The mapping is gone with the context; the file can be removed.
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn unload_then_reload() {
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0xC3])
        .build();

    let mut context = DecompilerContext::new();
    context.load_from_mem(image.clone()).unwrap();
    context.unload();
    assert!(!context.is_loaded());
    assert!(context.instruction_at(0x401000).is_none());

    context.load_from_mem(image).unwrap();
    assert!(context.is_loaded());
}

#[test]
fn writable_data_segment_is_not_decoded() {
    // Entry returns immediately; the data segment holds byte garbage that would not
    // decode, and recovery never looks at it.
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0xC3])
        .segment(0x402000, PF_R | PF_W, &[0x06, 0x07, 0x08, 0x09])
        .build();

    let mut context = DecompilerContext::new();
    context.load_from_mem(image).unwrap();

    assert_eq!(context.segments().unwrap().len(), 2);
    assert_eq!(context.cfg().unwrap().block_count(), 1);
}

#[test]
fn segment_limit_is_enforced() {
    let image = ElfBuilder::new(0x401000)
        .segment(0x401000, PF_R | PF_X, &[0xC3])
        .segment(0x402000, PF_R, &[0x00])
        .build();

    let mut context = DecompilerContext::with_options(LoadOptions {
        max_segments: 1,
        ..LoadOptions::default()
    });
    assert!(matches!(
        context.load_from_mem(image),
        Err(Error::Malformed { .. })
    ));
}
