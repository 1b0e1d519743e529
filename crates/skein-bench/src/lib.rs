//! Shared helpers for skein benchmarks: seeded inputs and model builders.

use skein_expr::{FunctionOptions, MxFunction, MxGraph, SxFunction, SxGraph};
use skein_sparse::Matrix;

const SEED: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// `n` reproducible values in [-1, 1] from a SplitMix64 stream.
fn uniform(n: usize) -> Vec<f64> {
    let mut z = SEED;
    (0..n)
        .map(|_| {
            z = z.wrapping_add(0x9e3779b97f4a7c15);
            let mut y = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
            y = (y ^ (y >> 27)).wrapping_mul(0x94d049bb133111eb);
            ((y ^ (y >> 31)) >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        })
        .collect()
}

/// Column of `n` uniform values.
pub fn random_column(n: usize) -> Matrix<f64> {
    Matrix::column(uniform(n))
}

/// Discretized chain residual `r_i = x_{i-1} - 2 x_i + x_{i+1} + sin(x_i)`
/// with zero boundary values. Its Jacobian is tridiagonal.
pub fn sx_chain(n: usize) -> (SxGraph, SxFunction) {
    let mut g = SxGraph::new();
    let x = g.sym_column("x", n);
    let nz = x.nonzeros().to_vec();
    let two = g.lit(2.0);
    let mut r = Vec::with_capacity(n);
    for i in 0..n {
        let mut e = g.mul(two, nz[i]);
        e = g.neg(e);
        if i > 0 {
            e = g.add(e, nz[i - 1]);
        }
        if i + 1 < n {
            e = g.add(e, nz[i + 1]);
        }
        let s = g.sin(nz[i]);
        r.push(g.add(e, s));
    }
    let f = SxFunction::new(&g, vec![x], vec![Matrix::column(r)], FunctionOptions::new("chain"))
        .unwrap_or_else(|e| panic!("chain model: {e}"));
    (g, f)
}

/// `f(x) = sum(tanh(A x))` for a dense random `m x n` matrix `A`.
pub fn mx_layer(m: usize, n: usize) -> (MxGraph, MxFunction) {
    let mut g = MxGraph::new();
    let x = g.sym("x", n, 1);
    let a = g.constant(&Matrix::dense(m, n, uniform(m * n)));
    let ax = g
        .mtimes(a, x)
        .unwrap_or_else(|e| panic!("layer model: {e}"));
    let t = g.tanh(ax);
    let s = g.sum(t);
    let f = MxFunction::new(&g, vec![x], vec![s], FunctionOptions::new("layer"))
        .unwrap_or_else(|e| panic!("layer model: {e}"));
    (g, f)
}
