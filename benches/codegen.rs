use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use adgen::emit::{CSyntax, Emitter};
use adgen::eval::jacobian_graph;
use adgen::ir::{BinOp, Graph, UnaryOp};
use adgen::naming::DefaultNamer;

/// Chain of `n` coupled oscillator updates over two inputs. Every stage
/// reuses the previous one twice, so the plan has many temporaries.
fn chain(n: usize) -> Graph {
    let mut g = Graph::new();
    let mut a = g.independent();
    let mut b = g.independent();
    let damping = g.constant(0.99);
    for _ in 0..n {
        let s = g.unary(UnaryOp::Sin, a).expect("record");
        let c = g.unary(UnaryOp::Cos, b).expect("record");
        let sum = g.binary(BinOp::Add, s, c).expect("record");
        let next_a = g.binary(BinOp::Mul, sum, damping).expect("record");
        let next_b = g.binary(BinOp::Sub, sum, a).expect("record");
        a = next_a;
        b = next_b;
    }
    g.mark_dependent(a).expect("dependent");
    g.mark_dependent(b).expect("dependent");
    g
}

fn bench_recording(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");
    for n in [16, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, &n| {
            b.iter(|| chain(black_box(n)));
        });
    }
    group.finish();
}

fn bench_emission(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    let namer = DefaultNamer::c();
    for n in [16, 256, 4096] {
        let graph = chain(n);
        group.bench_with_input(BenchmarkId::new("finalize_and_emit_c", n), &graph, |b, graph| {
            b.iter(|| {
                let mut graph = graph.clone();
                let plan = graph.finalize().expect("finalize");
                Emitter::new(CSyntax, &namer).emit(&plan).expect("emit")
            });
        });
    }
    group.finish();
}

fn bench_jacobian(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobian");
    for n in [16, 256] {
        let graph = chain(n);
        group.bench_with_input(BenchmarkId::new("dense", n), &graph, |b, graph| {
            b.iter(|| jacobian_graph(black_box(graph)).expect("jacobian"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_recording, bench_emission, bench_jacobian);
criterion_main!(benches);
