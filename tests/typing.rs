//! Integration tests for SSA construction and type inference.

use std::sync::Arc;

use dexscope::{
    analysis::{ConversionSite, SsaValueId},
    bytecode::ArrayKind,
    prelude::*,
};

struct Analyzed {
    cfg: ControlFlowGraph,
    ssa: SsaFunction,
    types: TypeAssignment,
}

fn analyze(method: &MethodCode) -> Result<Analyzed> {
    let cfg = CfgBuilder::build(method)?;
    let liveness = RegisterLiveness::compute(&cfg, method.registers);
    let ssa = SsaBuilder::build(&cfg, method, &liveness)?;
    let hierarchy = ClassHierarchyMap::new();
    let types = TypeInference::new(&cfg, &ssa, method, &hierarchy).solve()?;
    Ok(Analyzed { cfg, ssa, types })
}

/// `float f = flag ? B.small : B.medium; return f * x;` with byte and short fields.
fn narrow_phi() -> Result<MethodCode> {
    let small = FieldRef::new("a.B", "small", "B")?;
    let medium = FieldRef::new("a.B", "medium", "S")?;
    let mut asm = CodeAssembler::new();
    asm.if_zero(IfCondition::Eq, 2, "other")
        .static_get(0, small)
        .goto("join")
        .label("other")
        .static_get(0, medium)
        .label("join")
        .binary(BinaryOp::Mul, NumericKind::Float, 0, 0, 1)
        .return_value(0);
    asm.build_method("a.B", "scale", "(FZ)F", true, 3)
}

#[test]
fn test_phi_arity_matches_predecessors() -> Result<()> {
    let method = narrow_phi()?;
    let Analyzed { cfg, ssa, .. } = analyze(&method)?;

    assert!(ssa.phi_count() > 0);
    for (block, phi) in ssa.phis() {
        assert_eq!(phi.operands().len(), cfg.predecessors(block).count());
        let predecessors: Vec<_> = cfg.predecessors(block).collect();
        let operands: Vec<_> = phi.operands().iter().map(|op| op.predecessor).collect();
        assert_eq!(operands, predecessors);
    }
    Ok(())
}

#[test]
fn test_float_phi_converts_at_definitions() -> Result<()> {
    let method = narrow_phi()?;
    let Analyzed { ssa, types, .. } = analyze(&method)?;

    let (block, phi) = ssa.phis().next().expect("join phi");
    assert_eq!(types.type_of(phi.result()), JavaType::FLOAT);
    for operand in 0..phi.operands().len() {
        let site = ConversionSite::PhiOperand {
            block,
            phi: 0,
            operand,
        };
        assert_eq!(types.conversion(&site), Some(&JavaType::FLOAT));
    }
    Ok(())
}

#[test]
fn test_float_phi_renders_two_casts() -> Result<()> {
    let method = narrow_phi()?;
    let outcome = Decompiler::new(DecompilerConfig::default(), Arc::new(ClassHierarchyMap::new()))
        .decompile_method(&method);

    assert_eq!(outcome.status, MethodStatus::Success);
    let text = outcome.source().expect("source");
    assert!(text.contains("(float) B.small"), "{text}");
    assert!(text.contains("(float) B.medium"), "{text}");
    assert_eq!(text.matches("(float)").count(), 2, "{text}");
    Ok(())
}

#[test]
fn test_every_value_gets_a_concrete_type() -> Result<()> {
    // int[] a = new int[n]; a[0] = n; return a.length;
    let mut asm = CodeAssembler::new();
    asm.const_int(0, 0)
        .new_array(1, 2, JavaType::INT.array_of())
        .array_put(ArrayKind::Narrow, 2, 1, 0)
        .array_length(0, 1)
        .return_value(0);
    let method = asm.build_method("a.B", "fill", "(I)I", true, 3)?;
    let Analyzed { ssa, types, .. } = analyze(&method)?;

    for index in 0..ssa.value_count() {
        let ty = types.type_of(SsaValueId::new(index));
        assert_ne!(ty, JavaType::Void, "value {index}");
    }
    Ok(())
}

#[test]
fn test_reference_phi_joins_to_common_superclass() -> Result<()> {
    let mut asm = CodeAssembler::new();
    asm.if_zero(IfCondition::Eq, 1, "other")
        .new_instance(0, "java.lang.Integer")
        .goto("join")
        .label("other")
        .new_instance(0, "java.lang.Long")
        .label("join")
        .return_value(0);
    let method = asm.build_method("a.B", "pick", "(Z)Ljava/lang/Object;", true, 2)?;
    let Analyzed { ssa, types, .. } = analyze(&method)?;

    let (_, phi) = ssa.phis().next().expect("join phi");
    assert_eq!(types.type_of(phi.result()), JavaType::class("java.lang.Number"));
    Ok(())
}

#[test]
fn test_custom_hierarchy_is_consulted() -> Result<()> {
    let hierarchy = ClassHierarchyMap::new();
    hierarchy.insert(ClassInfo::class("a.Base", "java.lang.Object"));
    hierarchy.insert(ClassInfo::class("a.Left", "a.Base"));
    hierarchy.insert(ClassInfo::class("a.Right", "a.Base"));

    let mut asm = CodeAssembler::new();
    asm.if_zero(IfCondition::Eq, 1, "other")
        .new_instance(0, "a.Left")
        .goto("join")
        .label("other")
        .new_instance(0, "a.Right")
        .label("join")
        .return_value(0);
    let method = asm.build_method("a.B", "pick", "(Z)Ljava/lang/Object;", true, 2)?;
    let cfg = CfgBuilder::build(&method)?;
    let liveness = RegisterLiveness::compute(&cfg, method.registers);
    let ssa = SsaBuilder::build(&cfg, &method, &liveness)?;
    let types = TypeInference::new(&cfg, &ssa, &method, &hierarchy).solve()?;

    let (_, phi) = ssa.phis().next().expect("join phi");
    assert_eq!(types.type_of(phi.result()), JavaType::class("a.Base"));
    Ok(())
}
