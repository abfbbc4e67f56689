//! End-to-end tests of the decompilation pipeline.
//!
//! Methods are assembled with [`CodeAssembler`], run through a [`Decompiler`] and checked
//! on the rendered source, the per-method status and the diagnostics sink.

use std::sync::Arc;

use dexscope::prelude::*;

fn decompiler() -> Decompiler {
    Decompiler::new(
        DecompilerConfig::default().with_threads(2),
        Arc::new(ClassHierarchyMap::new()),
    )
}

fn max_method() -> Result<MethodCode> {
    let mut asm = CodeAssembler::new();
    asm.if_cmp(IfCondition::Le, 0, 1, "else")
        .return_value(0)
        .label("else")
        .return_value(1);
    asm.build_method("a.B", "max", "(II)I", true, 2)
}

fn broken_method() -> Result<MethodCode> {
    // The goto lands on the end of the code.
    let mut asm = CodeAssembler::new();
    asm.const_int(0, 1).goto("end").return_void().label("end");
    asm.build_method("a.B", "broken", "()V", true, 1)
}

#[test]
fn test_if_else_renders_source() -> Result<()> {
    let method = max_method()?;
    let outcome = decompiler().decompile_method(&method);

    assert_eq!(outcome.status, MethodStatus::Success);
    assert_eq!(outcome.key.to_string(), "a.B.max(II)I");
    let text = outcome.source().expect("structured source");
    assert!(text.starts_with("static int max(int i, int i2) {\n"), "{text}");
    assert!(text.contains("} else {"), "{text}");
    assert!(text.contains("return i;"), "{text}");
    assert!(text.contains("return i2;"), "{text}");
    assert!(!text.contains("goto"), "{text}");
    Ok(())
}

#[test]
fn test_decode_error_does_not_affect_siblings() -> Result<()> {
    let class = ClassCode::new(
        "a.B",
        vec![Arc::new(broken_method()?), Arc::new(max_method()?)],
    );
    let decompiler = decompiler();
    let outcomes = decompiler.decompile_classes(&[class])?;

    assert_eq!(outcomes.len(), 1);
    let methods = &outcomes[0].methods;
    assert_eq!(methods.len(), 2);

    assert_eq!(methods[0].status, MethodStatus::Failed(ErrorKind::Decode));
    assert!(methods[0].source().is_none());
    assert!(methods[0].artifact.text().contains("goto"));
    assert!(!methods[0].warnings.is_empty());

    assert_eq!(methods[1].status, MethodStatus::Success);
    assert!(!outcomes[0].is_clean());

    let rendered = outcomes[0].render();
    assert!(rendered.starts_with("class B {\n"));
    assert!(rendered.contains("static int max(int i, int i2)"));

    let diagnostics = decompiler.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics.count(MethodStatus::Success), 1);
    assert_eq!(diagnostics.problems().count(), 1);
    Ok(())
}

#[test]
fn test_effects_are_not_reordered() -> Result<()> {
    // int a = foo(); baz(bar(), a);
    let foo = MethodRef::new("a.C", "foo", "()I")?;
    let bar = MethodRef::new("a.C", "bar", "()I")?;
    let baz = MethodRef::new("a.C", "baz", "(II)V")?;
    let mut asm = CodeAssembler::new();
    asm.invoke(InvokeKind::Static, foo, &[])
        .move_result(0)
        .invoke(InvokeKind::Static, bar, &[])
        .move_result(1)
        .invoke(InvokeKind::Static, baz, &[1, 0])
        .return_void();
    let method = asm.build_method("a.B", "calls", "()V", true, 2)?;
    let outcome = decompiler().decompile_method(&method);

    let text = outcome.source().expect("structured source");
    let first = text.find("C.foo()").expect("foo call");
    let second = text.find("C.bar()").expect("bar call");
    assert!(first < second, "{text}");
    assert!(text.contains("C.baz(C.bar(), i)"), "{text}");
    Ok(())
}

#[test]
fn test_cache_serves_repeated_methods() -> Result<()> {
    let method = max_method()?;
    let cache = Arc::new(MemoryCache::new());
    let decompiler = decompiler().with_cache(cache.clone());

    let first = decompiler.decompile_method(&method);
    let second = decompiler.decompile_method(&method);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    let records: Vec<bool> = decompiler
        .diagnostics()
        .records()
        .map(|record| record.cached)
        .collect();
    assert_eq!(records, vec![false, true]);

    decompiler.begin_run();
    assert!(cache.is_empty());
    let third = decompiler.decompile_method(&method);
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
    Ok(())
}

#[test]
fn test_cache_can_be_disabled() -> Result<()> {
    let method = max_method()?;
    let cache = Arc::new(MemoryCache::new());
    let config = DecompilerConfig {
        use_cache: false,
        ..DecompilerConfig::default()
    };
    let decompiler =
        Decompiler::new(config, Arc::new(ClassHierarchyMap::new())).with_cache(cache.clone());

    decompiler.decompile_method(&method);
    decompiler.decompile_method(&method);
    assert!(cache.is_empty());
    assert!(decompiler.diagnostics().records().all(|record| !record.cached));
    Ok(())
}

#[test]
fn test_cancelled_methods_report_status() -> Result<()> {
    let token = CancellationToken::new();
    token.cancel();
    let cache = Arc::new(MemoryCache::new());
    let decompiler = decompiler()
        .with_cache(cache.clone())
        .with_cancellation(token);

    let class = ClassCode::new("a.B", vec![Arc::new(max_method()?)]);
    let outcomes = decompiler.decompile_classes(&[class])?;
    let outcome = &outcomes[0].methods[0];

    assert_eq!(outcome.status, MethodStatus::Cancelled);
    assert!(outcome.source().is_none());
    assert!(cache.is_empty());
    assert_eq!(decompiler.diagnostics().count(MethodStatus::Cancelled), 1);
    Ok(())
}

#[test]
fn test_batch_output_follows_input_order() -> Result<()> {
    let classes: Vec<ClassCode> = (0..8)
        .map(|index| -> Result<ClassCode> {
            let mut asm = CodeAssembler::new();
            asm.const_int(0, index).return_value(0);
            let method = asm.build_method(&format!("a.K{index}"), "value", "()I", true, 1)?;
            Ok(ClassCode::new(&format!("a.K{index}"), vec![Arc::new(method)]))
        })
        .collect::<Result<_>>()?;

    let outcomes = decompiler().decompile_classes(&classes)?;
    for (index, class) in outcomes.iter().enumerate() {
        assert_eq!(class.name.name(), format!("a.K{index}"));
        assert!(class.is_clean());
        let text = class.methods[0].source().expect("source");
        assert!(text.contains(&format!("return {index};")), "{text}");
    }
    Ok(())
}

#[test]
fn test_structuring_budget_degrades_to_jumps() -> Result<()> {
    let config = DecompilerConfig {
        max_structuring_iterations: 0,
        ..DecompilerConfig::default()
    };
    let decompiler = Decompiler::new(config, Arc::new(ClassHierarchyMap::new()));
    let outcome = decompiler.decompile_method(&max_method()?);

    assert_eq!(
        outcome.status,
        MethodStatus::Degraded(ErrorKind::Structuring)
    );
    assert!(outcome.status.has_source());
    let text = outcome.source().expect("jump rendering");
    assert!(text.contains("return i;"), "{text}");
    assert!(text.contains("return i2;"), "{text}");
    Ok(())
}
