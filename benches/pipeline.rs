//! Benchmarks for the decompilation pipeline.
//!
//! Measures single-method analysis stages and batch decompilation of a synthetic class set
//! with loops, branches and calls.

extern crate dexscope;

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dexscope::prelude::*;

/// `int sum = 0; for (i = 0; i < n; i++) { if (i % 3 == 0) sum += helper(i); } return sum;`
fn loop_method(class: &str) -> MethodCode {
    let helper = MethodRef::new(class, "helper", "(I)I").unwrap();
    let mut asm = CodeAssembler::new();
    asm.const_int(0, 0)
        .const_int(1, 0)
        .label("head")
        .if_cmp(IfCondition::Ge, 1, 4, "done")
        .binary_lit(BinaryOp::Rem, 2, 1, 3)
        .if_zero(IfCondition::Ne, 2, "next")
        .invoke(InvokeKind::Static, helper, &[1])
        .move_result(3)
        .binary(BinaryOp::Add, NumericKind::Int, 0, 0, 3)
        .label("next")
        .binary_lit(BinaryOp::Add, 1, 1, 1)
        .goto("head")
        .label("done")
        .return_value(0);
    asm.build_method(class, "sum", "(I)I", true, 5).unwrap()
}

fn switch_method(class: &str) -> MethodCode {
    let mut asm = CodeAssembler::new();
    asm.switch(1, &[(0, "zero"), (1, "one"), (2, "two")])
        .const_int(0, -1)
        .return_value(0)
        .label("zero")
        .const_int(0, 10)
        .return_value(0)
        .label("one")
        .const_int(0, 20)
        .return_value(0)
        .label("two")
        .const_int(0, 30)
        .return_value(0);
    asm.build_method(class, "pick", "(I)I", true, 2).unwrap()
}

fn classes(count: usize) -> Vec<ClassCode> {
    (0..count)
        .map(|index| {
            let name = format!("bench.C{index}");
            ClassCode::new(
                &name,
                vec![
                    Arc::new(loop_method(&name)),
                    Arc::new(switch_method(&name)),
                ],
            )
        })
        .collect()
}

fn bench_stages(c: &mut Criterion) {
    let method = loop_method("bench.C");
    let hierarchy = ClassHierarchyMap::new();

    c.bench_function("cfg_build", |b| {
        b.iter(|| CfgBuilder::build(black_box(&method)).unwrap())
    });

    let cfg = CfgBuilder::build(&method).unwrap();
    let liveness = RegisterLiveness::compute(&cfg, method.registers);

    c.bench_function("structure", |b| {
        b.iter(|| {
            Structurer::new(black_box(&cfg), &method, &liveness)
                .structure()
                .unwrap()
        })
    });

    c.bench_function("ssa_and_types", |b| {
        b.iter(|| {
            let ssa = SsaBuilder::build(black_box(&cfg), &method, &liveness).unwrap();
            TypeInference::new(&cfg, &ssa, &method, &hierarchy)
                .solve()
                .unwrap()
        })
    });
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompile_classes");
    for count in [16usize, 128] {
        let input = classes(count);
        group.throughput(Throughput::Elements((count * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| {
                let decompiler = Decompiler::new(
                    DecompilerConfig::default(),
                    Arc::new(ClassHierarchyMap::new()),
                );
                black_box(decompiler.decompile_classes(input).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_cached(c: &mut Criterion) {
    let input = classes(64);
    let decompiler = Decompiler::new(
        DecompilerConfig::default(),
        Arc::new(ClassHierarchyMap::new()),
    )
    .with_cache(Arc::new(MemoryCache::new()));
    decompiler.decompile_classes(&input).unwrap();

    c.bench_function("decompile_classes_cached", |b| {
        b.iter(|| black_box(decompiler.decompile_classes(&input).unwrap()))
    });
}

criterion_group!(benches, bench_stages, bench_batch, bench_cached);
criterion_main!(benches);
