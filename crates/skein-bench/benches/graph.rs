use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skein_bench::{mx_layer, random_column, sx_chain};
use skein_expr::{AdMode, FunctionOptions, MxFunction, SxFunction, SxGraph};
use skein_sparse::Matrix;

const SIZES: [usize; 3] = [10, 100, 1000];

// ---------------------------------------------------------------------------
// 1. Graph construction
// ---------------------------------------------------------------------------

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/construction");

    for n in SIZES {
        group.bench_with_input(BenchmarkId::new("sx_chain", n), &n, |b, &n| {
            b.iter(|| black_box(sx_chain(n)))
        });
    }

    // Rebuilding an existing expression only hits the intern table
    group.bench_function("intern_hit_1000", |b| {
        let mut g = SxGraph::new();
        let x = g.sym("x");
        let s = g.sin(x);
        b.iter(|| {
            for _ in 0..1000 {
                black_box(g.mul(s, x));
            }
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Compilation
// ---------------------------------------------------------------------------

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/compilation");

    for n in SIZES {
        let (g, f) = sx_chain(n);
        group.bench_with_input(BenchmarkId::new("sx_chain", n), &f, |b, f| {
            b.iter(|| {
                let h = SxFunction::new(
                    &g,
                    f.inputs().to_vec(),
                    f.outputs().to_vec(),
                    FunctionOptions::default(),
                );
                black_box(h)
            })
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Numeric evaluation
// ---------------------------------------------------------------------------

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/evaluation");

    for n in SIZES {
        let (_, f) = sx_chain(n);
        let x = [random_column(n)];
        group.bench_with_input(BenchmarkId::new("sx_chain", n), &x, |b, x| {
            b.iter(|| black_box(f.eval(black_box(x))))
        });
    }

    let (mut g, f) = mx_layer(50, 50);
    let x = [random_column(50)];
    group.bench_function("mx_layer_50", |b| b.iter(|| black_box(f.eval(black_box(&x)))));

    let mut sx = SxGraph::new();
    let e = f.expand(&mut sx).unwrap();
    group.bench_function("mx_layer_50_expanded", |b| {
        b.iter(|| black_box(e.eval(black_box(&x))))
    });

    let dx = f.grad(&mut g, 0, 0).unwrap();
    let opts = FunctionOptions::new("grad_layer");
    let gr = MxFunction::new(&g, f.inputs().to_vec(), vec![dx], opts).unwrap();
    group.bench_function("mx_layer_50_gradient", |b| {
        b.iter(|| black_box(gr.eval(black_box(&x))))
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 4. Sparse Jacobians
// ---------------------------------------------------------------------------

fn bench_jacobian(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/jacobian");

    // Tridiagonal: three colors regardless of size when compressed
    for n in SIZES {
        for compress in [true, false] {
            let id = format!("sx_chain_{}", if compress { "colored" } else { "plain" });
            group.bench_with_input(BenchmarkId::new(id, n), &n, |b, &n| {
                b.iter_batched(
                    || {
                        let (g, f) = sx_chain(n);
                        let opts = FunctionOptions::new("chain")
                            .ad_mode(AdMode::Forward)
                            .compress(compress);
                        let f = SxFunction::new(
                            &g,
                            f.inputs().to_vec(),
                            f.outputs().to_vec(),
                            opts,
                        )
                        .unwrap();
                        (g, f)
                    },
                    |(mut g, f)| black_box(f.jac(&mut g, 0, 0, false, false)),
                    criterion::BatchSize::SmallInput,
                )
            });
        }
    }

    group.bench_function("mx_layer_50_hessian", |b| {
        b.iter_batched(
            || mx_layer(50, 50),
            |(mut g, f)| black_box(f.hess(&mut g, 0, 0)),
            criterion::BatchSize::SmallInput,
        )
    });

    group.bench_function("sx_chain_100_evaluate_jacobian", |b| {
        let (mut g, f) = sx_chain(100);
        let jf = f.jacobian(&mut g, 0, 0, false, false).unwrap();
        let x: [Matrix<f64>; 1] = [random_column(100)];
        b.iter(|| black_box(jf.eval(black_box(&x))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_construction,
    bench_compilation,
    bench_evaluation,
    bench_jacobian,
);
criterion_main!(benches);
