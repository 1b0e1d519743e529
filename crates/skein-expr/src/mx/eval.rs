//! Nonzero-level replay of matrix algorithms.
//!
//! Every matrix kernel is expressed through scalar [`Algebra`] calls, so
//! the same replay evaluates numerically and expands a matrix function
//! into a scalar graph.

use tracing::trace;

use crate::error::Result;
use crate::mx::algorithm::{MxCompiled, MxOp};
use crate::ops::{Algebra, BinaryOp};

fn add_into<A: Algebra>(alg: &mut A, acc: &mut Option<A::Value>, term: A::Value) {
    *acc = Some(match *acc {
        Some(s) => alg.binary(BinaryOp::Add, s, term),
        None => term,
    });
}

impl MxCompiled {
    /// Evaluate over `alg`. `args[i]` holds the nonzeros of input `i` on
    /// its declared pattern. Callers reject free variables beforehand.
    pub fn replay<A: Algebra>(
        &self,
        alg: &mut A,
        args: &[Vec<A::Value>],
        n_out: usize,
    ) -> Result<Vec<Vec<A::Value>>> {
        let mut w: Vec<Vec<A::Value>> = vec![Vec::new(); self.work_size];
        let mut out = vec![Vec::new(); n_out];

        for el in &self.algorithm {
            let res = el.res as usize;
            let arg = |k: usize| el.arg[k] as usize;
            let value = match &el.op {
                MxOp::Input(ind) => args[*ind as usize].clone(),
                MxOp::Output(ind) => {
                    out[*ind as usize] = w[arg(0)].clone();
                    continue;
                }
                MxOp::Const(values) => values.iter().map(|&v| alg.constant(v)).collect(),
                MxOp::Free(_) => {
                    let zero = alg.constant(0.0);
                    vec![zero; el.sparsity.nnz()]
                }
                MxOp::Unary(op) => w[arg(0)].iter().map(|&x| alg.unary(*op, x)).collect(),
                MxOp::Binary(op) => {
                    let (x, y) = (&w[arg(0)], &w[arg(1)]);
                    let pick = |v: &[A::Value], k: usize| if v.len() == 1 { v[0] } else { v[k] };
                    (0..el.sparsity.nnz())
                        .map(|k| alg.binary(*op, pick(x, k), pick(y, k)))
                        .collect()
                }
                MxOp::MatMul { lhs, rhs } => {
                    let (x, y) = (&w[arg(0)], &w[arg(1)]);
                    let mut acc: Vec<Option<A::Value>> = vec![None; el.sparsity.nnz()];
                    for j in 0..rhs.ncols() {
                        for q in rhs.colind()[j]..rhs.colind()[j + 1] {
                            let k = rhs.row()[q];
                            for p in lhs.colind()[k]..lhs.colind()[k + 1] {
                                let i = lhs.row()[p];
                                if let Some(r) = el.sparsity.get_nz(i, j) {
                                    let term = alg.binary(BinaryOp::Mul, x[p], y[q]);
                                    add_into(alg, &mut acc[r], term);
                                }
                            }
                        }
                    }
                    let zero = alg.constant(0.0);
                    acc.into_iter().map(|v| v.unwrap_or(zero)).collect()
                }
                MxOp::Gather(map) => {
                    let zero = alg.constant(0.0);
                    map.iter()
                        .map(|e| match *e {
                            Some((p, k)) => w[arg(p as usize)][k as usize],
                            None => zero,
                        })
                        .collect()
                }
                MxOp::Scatter(map) => {
                    let x = &w[arg(0)];
                    let mut acc: Vec<Option<A::Value>> = vec![None; el.sparsity.nnz()];
                    for (k, t) in map.iter().enumerate() {
                        if let Some(t) = t {
                            add_into(alg, &mut acc[*t as usize], x[k]);
                        }
                    }
                    let zero = alg.constant(0.0);
                    acc.into_iter().map(|v| v.unwrap_or(zero)).collect()
                }
                MxOp::Call { function, output } => {
                    let c = function.compiled()?;
                    let inner: Vec<&[A::Value]> =
                        el.arg.iter().map(|&s| w[s as usize].as_slice()).collect();
                    let mut outs = c.replay(alg, &inner, &[], &function.out_nnz());
                    trace!(function = %function.name(), output, "replayed embedded call");
                    outs.swap_remove(*output as usize)
                }
                MxOp::Lift => w[arg(0)].clone(),
            };
            w[res] = value;
        }
        Ok(out)
    }
}
