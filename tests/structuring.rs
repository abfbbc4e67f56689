//! Integration tests for control-flow structuring.
//!
//! Each test assembles a small method, builds its control flow graph and checks the
//! recovered region tree. Whatever the shape, every block must appear exactly once.

use std::sync::Arc;

use dexscope::{prelude::*, structure::LoopKind, utils::graph::NodeId};

fn structure(
    asm: &CodeAssembler,
    descriptor: &str,
    registers: u16,
) -> Result<(ControlFlowGraph, Structure)> {
    let method = asm.build_method("a.B", "f", descriptor, true, registers)?;
    let cfg = CfgBuilder::build(&method)?;
    let liveness = RegisterLiveness::compute(&cfg, method.registers);
    let structure = Structurer::new(&cfg, &method, &liveness).structure()?;
    Ok((cfg, structure))
}

/// Leaves of the tree, sorted, must equal the block set with no repeats.
fn assert_blocks_once(cfg: &ControlFlowGraph, structure: &Structure) {
    let mut leaves = structure.root().blocks();
    leaves.sort();
    let blocks: Vec<NodeId> = cfg.block_ids().collect();
    assert_eq!(leaves, blocks, "tree: {}", structure.root());
}

fn loop_kinds(structure: &Structure) -> Vec<LoopKind> {
    let mut kinds = Vec::new();
    structure.root().visit(&mut |region| {
        if let Region::Loop { kind, .. } = region {
            kinds.push(*kind);
        }
    });
    kinds
}

#[test]
fn test_if_else() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.if_cmp(IfCondition::Le, 0, 1, "else")
        .return_value(0)
        .label("else")
        .return_value(1);
    let (cfg, structure) = structure(&asm, "(II)I", 2)?;

    assert!(matches!(
        structure.root(),
        Region::If {
            else_region: Some(_),
            ..
        }
    ));
    assert!(!structure.has_goto());
    assert_blocks_once(&cfg, &structure);
    Ok(())
}

#[test]
fn test_while_loop() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.const_int(0, 0)
        .label("head")
        .if_cmp(IfCondition::Ge, 0, 1, "done")
        .binary_lit(BinaryOp::Add, 0, 0, 1)
        .goto("head")
        .label("done")
        .return_value(0);
    let (cfg, structure) = structure(&asm, "(I)I", 2)?;

    assert_eq!(loop_kinds(&structure), vec![LoopKind::While]);
    assert!(!structure.has_goto());
    assert!(structure.folds() > 0);
    assert_blocks_once(&cfg, &structure);
    Ok(())
}

#[test]
fn test_do_while_loop() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.const_int(0, 0)
        .label("body")
        .binary_lit(BinaryOp::Add, 0, 0, 1)
        .if_cmp(IfCondition::Lt, 0, 1, "body")
        .return_value(0);
    let (cfg, structure) = structure(&asm, "(I)I", 2)?;

    assert_eq!(loop_kinds(&structure), vec![LoopKind::DoWhile]);
    assert_blocks_once(&cfg, &structure);
    Ok(())
}

#[test]
fn test_switch() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.const_int(1, 0)
        .switch(0, &[(1, "one"), (2, "two"), (3, "three")])
        .label("done")
        .return_value(1)
        .label("one")
        .const_int(1, 1)
        .label("two")
        .const_int(1, 2)
        .goto("done")
        .label("three")
        .return_value(0);
    let (cfg, structure) = structure(&asm, "(I)I", 2)?;

    let mut keys = Vec::new();
    structure.root().visit(&mut |region| {
        if let Region::Switch { cases, .. } = region {
            keys.extend(cases.iter().map(|case| case.keys.clone()));
        }
    });
    assert_eq!(keys, vec![vec![1], vec![2], vec![3]]);
    assert_blocks_once(&cfg, &structure);
    Ok(())
}

#[test]
fn test_try_catch() -> Result<()> {
    let callee = MethodRef::new("a.C", "run", "()V")?;
    let mut asm = CodeAssembler::new();
    asm.label("start")
        .invoke(InvokeKind::Static, callee, &[])
        .label("end")
        .return_void()
        .label("handler")
        .move_exception(0)
        .return_void()
        .try_range("start", "end", "handler", Some("java.io.IOException"));
    let (cfg, structure) = structure(&asm, "()V", 1)?;

    let mut caught = Vec::new();
    structure.root().visit(&mut |region| {
        if let Region::TryCatch { catches, .. } = region {
            for clause in catches {
                caught.extend(clause.catch_types.iter().map(|ty| ty.name().to_string()));
            }
        }
    });
    assert_eq!(caught, vec!["java.io.IOException".to_string()]);
    assert_blocks_once(&cfg, &structure);
    Ok(())
}

#[test]
fn test_irreducible_flow_uses_goto() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.if_zero(IfCondition::Eq, 0, "b")
        .label("a")
        .binary_lit(BinaryOp::Add, 0, 0, -1)
        .if_zero(IfCondition::Ne, 0, "b")
        .return_value(0)
        .label("b")
        .binary_lit(BinaryOp::Add, 0, 0, 2)
        .if_zero(IfCondition::Ne, 0, "a")
        .return_value(0);
    let (cfg, structure) = structure(&asm, "(I)I", 1)?;

    assert!(structure.has_goto());
    assert_blocks_once(&cfg, &structure);

    // The jump rendering still reaches the writer.
    let method = asm.build_method("a.B", "f", "(I)I", true, 1)?;
    let outcome = Decompiler::new(DecompilerConfig::default(), Arc::new(ClassHierarchyMap::new()))
        .decompile_method(&method);
    assert!(outcome.status.has_source());
    let text = outcome.source().expect("source");
    assert!(text.contains("goto "), "{text}");
    Ok(())
}

#[test]
fn test_flat_structure_covers_every_block() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.const_int(0, 0)
        .label("head")
        .if_cmp(IfCondition::Ge, 0, 1, "done")
        .binary_lit(BinaryOp::Add, 0, 0, 1)
        .goto("head")
        .label("done")
        .return_value(0);
    let method = asm.build_method("a.B", "f", "(I)I", true, 2)?;
    let cfg = CfgBuilder::build(&method)?;

    let flat = Structure::flat(&cfg);
    assert!(flat.has_goto());
    assert_blocks_once(&cfg, &flat);
    Ok(())
}

fn decompile(method: &MethodCode, config: DecompilerConfig) -> Arc<MethodOutcome> {
    Decompiler::new(config, Arc::new(ClassHierarchyMap::new())).decompile_method(method)
}

fn no_structuring() -> DecompilerConfig {
    DecompilerConfig {
        max_structuring_iterations: 0,
        ..DecompilerConfig::default()
    }
}

/// `switch (v0) { case 1: case 2: default: } return v0;`
fn switch_to_follow() -> CodeAssembler {
    let mut asm = CodeAssembler::new();
    asm.switch(0, &[(1, "join"), (2, "join")])
        .label("join")
        .return_value(0);
    asm
}

/// `switch (v0) { case 1: return 10; case 2: return 20; default: return 0; }`
fn switch_with_returns() -> CodeAssembler {
    let mut asm = CodeAssembler::new();
    asm.switch(0, &[(1, "one"), (2, "two")])
        .const_int(1, 0)
        .return_value(1)
        .label("one")
        .const_int(1, 10)
        .return_value(1)
        .label("two")
        .const_int(1, 20)
        .return_value(1);
    asm
}

#[test]
fn test_switch_with_every_key_on_the_follow() -> Result<()> {
    let asm = switch_to_follow();
    let (cfg, structure) = structure(&asm, "(I)I", 1)?;
    assert!(!structure.has_goto());
    assert_blocks_once(&cfg, &structure);

    let method = asm.build_method("a.B", "f", "(I)I", true, 1)?;
    let outcome = decompile(&method, DecompilerConfig::default());
    assert_eq!(outcome.status, MethodStatus::Success);
    let text = outcome.source().expect("source");
    assert!(text.contains("return i;"), "{text}");

    let outcome = decompile(&method, no_structuring());
    assert_eq!(outcome.status, MethodStatus::Degraded(ErrorKind::Structuring));
    let text = outcome.source().expect("jump rendering");
    assert!(text.contains("return i;"), "{text}");
    Ok(())
}

#[test]
fn test_switch_cases_that_all_return() -> Result<()> {
    let asm = switch_with_returns();
    let (cfg, structure) = structure(&asm, "(I)I", 2)?;
    let mut switches = 0;
    structure.root().visit(&mut |region| {
        if matches!(region, Region::Switch { .. }) {
            switches += 1;
        }
    });
    assert_eq!(switches, 1);
    assert!(!structure.has_goto());
    assert_blocks_once(&cfg, &structure);

    let method = asm.build_method("a.B", "f", "(I)I", true, 2)?;
    let outcome = decompile(&method, DecompilerConfig::default());
    assert_eq!(outcome.status, MethodStatus::Success);
    let text = outcome.source().expect("source");
    assert!(text.contains("switch ("), "{text}");
    assert!(text.contains("return 20;"), "{text}");

    let outcome = decompile(&method, no_structuring());
    assert_eq!(outcome.status, MethodStatus::Degraded(ErrorKind::Structuring));
    let text = outcome.source().expect("jump rendering");
    assert!(text.contains("switch ("), "{text}");
    assert!(text.contains("goto "), "{text}");
    Ok(())
}

#[test]
fn test_flat_structure_with_switches() -> Result<()> {
    for (asm, registers) in [(switch_to_follow(), 1), (switch_with_returns(), 2)] {
        let method = asm.build_method("a.B", "f", "(I)I", true, registers)?;
        let cfg = CfgBuilder::build(&method)?;
        let flat = Structure::flat(&cfg);
        assert!(flat.has_goto());
        assert_blocks_once(&cfg, &flat);
    }
    Ok(())
}
