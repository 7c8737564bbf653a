//! End-to-end scenarios run through the full [`DisassemblyEngine::disassemble`]
//! pipeline over the in-memory test double in `support/`. Each scenario
//! corresponds to a concrete control-flow shape the engine has to recover
//! correctly: straight-line code, a conditional branch, a position-independent
//! "call next" idiom, a jump table, a tail call, and a classifier rejection.

mod support;

use xdisasm_core::config::EngineConfig;
use xdisasm_core::shadow::bits;
use xdisasm_core::xrefs::PREDICATE;
use xdisasm_core::DisassemblyEngine;

use support::*;

#[test]
fn s1_straight_line_then_ret_is_one_block_with_no_successors() {
    let mut image = TestImage::new().with_exec_section(0x1000, 0x1010);
    image.entry_points.push(0x1000);

    let mut decoder = TestDecoder::new();
    decoder.insert(pop_reg(0x1000, 1));
    decoder.insert(normal(0x1001, 1, xdisasm_core::decoder::InstructionClass::Mov));
    decoder.insert(ret(0x1002, 1));

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    let bb = engine.get_basic_block(0x1000).expect("block at entry");
    assert_eq!(bb.start_address, 0x1000);
    assert_eq!(bb.end_address, 0x1003);
    assert_eq!(bb.instruction_addresses, vec![0x1000, 0x1001, 0x1002]);
    assert_eq!(engine.basic_blocks().count(), 1);
    assert_eq!(engine.cfg().get_edges().count(), 0);
    assert!(engine.is_marked(0x1000, bits::FUNCTION));
}

#[test]
fn s2_conditional_branch_yields_predicated_taken_and_fallthrough_edges() {
    let mut image = TestImage::new().with_exec_section(0x2000, 0x2020);
    image.entry_points.push(0x2000);

    let mut decoder = TestDecoder::new();
    decoder.insert(jcc(0x2000, 2, 0x2010));
    decoder.insert(ret(0x2002, 1));
    decoder.insert(ret(0x2010, 1));

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    assert_eq!(engine.basic_blocks().count(), 3);
    assert!(engine.cfg().has_edge(0x2000, 0x2010));
    assert!(engine.cfg().has_edge(0x2000, 0x2002));
    assert_eq!(
        engine.xrefs().code_xrefs.get_edge_attribute(0x2000, 0x2010, PREDICATE),
        Some(xdisasm_core::graph::AttributeValue::Bool(true))
    );
    assert_eq!(
        engine.xrefs().code_xrefs.get_edge_attribute(0x2000, 0x2002, PREDICATE),
        Some(xdisasm_core::graph::AttributeValue::Bool(false))
    );
}

#[test]
fn s3_pic_call_next_does_not_mark_the_return_site_a_function() {
    let mut image = TestImage::new().with_exec_section(0x3000, 0x3010);
    image.entry_points.push(0x3000);

    let mut decoder = TestDecoder::new();
    // `call $+5` — a call whose target is its own next address, the
    // position-independent-code "get eip" idiom.
    decoder.insert(call_near(0x3000, 5, 0x3005));
    decoder.insert(pop_reg(0x3005, 1));
    decoder.insert(ret(0x3006, 1));

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    assert!(!engine.is_marked(0x3005, bits::FUNCTION));
    assert_eq!(engine.basic_blocks().count(), 1);
    let bb = engine.get_basic_block(0x3000).unwrap();
    assert_eq!(bb.instruction_addresses, vec![0x3000, 0x3005, 0x3006]);
}

#[test]
fn s4_jump_table_resolves_every_element_as_a_block_leader() {
    let mut image = TestImage::new()
        .with_exec_section(0x4000, 0x4040)
        .with_data_section(
            0x5000,
            0x500c,
            [le_u32(0x4010), le_u32(0x4020), le_u32(0x4030)]
                .into_iter()
                .flatten()
                .collect(),
        );
    image.entry_points.push(0x4000);

    let mut decoder = TestDecoder::new();
    decoder.insert(jmp_mem_indirect(0x4000, 6, 0x5000, 4));
    decoder.insert(ret(0x4010, 1));
    decoder.insert(ret(0x4020, 1));
    decoder.insert(ret(0x4030, 1));

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    assert_eq!(engine.basic_blocks().count(), 4);
    for target in [0x4010, 0x4020, 0x4030] {
        assert!(engine.cfg().has_edge(0x4000, target), "missing edge to {target:#x}");
        assert!(engine.is_marked(target, bits::BB_LEADER));
    }
    assert!(engine.xrefs().data_xrefs.has_edge(0x4000, 0x5000));
}

#[test]
fn s5_tail_call_into_a_declared_function_gets_no_cfg_edge() {
    let mut image = TestImage::new().with_exec_section(0x6000, 0x7010);
    image.entry_points.push(0x6000);
    image.functions.push(0x7000);

    let mut decoder = TestDecoder::new();
    decoder.insert(normal(0x6000, 1, xdisasm_core::decoder::InstructionClass::Mov));
    decoder.insert(jmp_direct(0x6001, 2, 0x7000));
    decoder.insert(ret(0x7000, 1));

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    assert!(engine.is_marked(0x6000, bits::FUNCTION));
    assert!(engine.is_marked(0x7000, bits::FUNCTION));
    assert!(!engine.cfg().has_edge(0x6000, 0x7000));
}

#[test]
fn tail_jump_to_an_undeclared_address_joins_the_callers_function_body() {
    let mut image = TestImage::new().with_exec_section(0x6000, 0x7010);
    image.entry_points.push(0x6000);

    let mut decoder = TestDecoder::new();
    decoder.insert(normal(0x6000, 1, xdisasm_core::decoder::InstructionClass::Mov));
    decoder.insert(jmp_direct(0x6001, 2, 0x7000));
    decoder.insert(ret(0x7000, 1));

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    assert!(engine.is_marked(0x7000, bits::BB_LEADER));
    assert!(!engine.is_marked(0x7000, bits::FUNCTION));
    assert!(engine.cfg().has_edge(0x6000, 0x7000));

    let body = engine.get_function(0x6000).expect("entry is a function");
    assert!(body.contains(&0x6000));
    assert!(body.contains(&0x7000));
}

#[test]
fn s6_classifier_rejects_a_non_prologue_shaped_probe_target() {
    let mut image = TestImage::new()
        .with_exec_section(0x8000, 0x8010)
        .with_exec_section(0x9000, 0x9010);
    image.entry_points.push(0x8000);

    let mut decoder = TestDecoder::new();
    // A native-width immediate that happens to point at executable memory,
    // but whose contents don't look like a function prologue.
    decoder.insert(immediate_normal(0x8000, 5, 0x9000, 32));
    decoder.insert(ret(0x8005, 1));
    for i in 0..4u64 {
        decoder.insert(normal(0x9000 + i, 1, xdisasm_core::decoder::InstructionClass::Other));
    }

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    assert!(!engine.is_marked(0x9000, bits::CODE));
    assert!(!engine.is_marked(0x9000, bits::ANALYZED));
    assert!(!engine.xrefs().data_xrefs.has_edge(0x8000, 0x9000));
}

#[test]
fn function_mark_always_implies_basic_block_leader() {
    let mut image = TestImage::new().with_exec_section(0x3000, 0x3010);
    image.entry_points.push(0x3000);

    let mut decoder = TestDecoder::new();
    decoder.insert(call_near(0x3000, 5, 0x3005));
    decoder.insert(pop_reg(0x3005, 1));
    decoder.insert(ret(0x3006, 1));

    let mut engine = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    engine.disassemble().unwrap();

    for range in 0x3000u64..0x3010 {
        if engine.is_marked(range, bits::FUNCTION) {
            assert!(engine.is_marked(range, bits::BB_LEADER), "{range:#x} is FUNCTION but not BB_LEADER");
        }
    }
}

#[test]
fn disassembling_the_same_image_twice_is_idempotent() {
    let mut image = TestImage::new().with_exec_section(0x2000, 0x2020);
    image.entry_points.push(0x2000);

    let mut decoder = TestDecoder::new();
    decoder.insert(jcc(0x2000, 2, 0x2010));
    decoder.insert(ret(0x2002, 1));
    decoder.insert(ret(0x2010, 1));

    let mut first = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    first.disassemble().unwrap();
    let mut second = DisassemblyEngine::new(&image, &decoder, cpu(), EngineConfig::default());
    second.disassemble().unwrap();

    let starts = |e: &DisassemblyEngine<'_, TestImage, TestDecoder>| {
        let mut v: Vec<_> = e.basic_blocks().map(|bb| bb.start_address).collect();
        v.sort();
        v
    };
    assert_eq!(starts(&first), starts(&second));

    let mut edges_a: Vec<_> = first.cfg().get_edges().collect();
    let mut edges_b: Vec<_> = second.cfg().get_edges().collect();
    edges_a.sort();
    edges_b.sort();
    assert_eq!(edges_a, edges_b);
}
