//! Jacobian sparsity of matrix functions.
//!
//! Same bitset propagation as the scalar flavor, with one mask per
//! nonzero of every matrix value.

use skein_sparse::Sparsity;

use crate::deps::{pattern_from_masks, DepMask};
use crate::error::{check_input, check_output, Result};
use crate::mx::algorithm::{MxCompiled, MxOp};
use crate::mx::function::MxFunction;

/// Nonzero `k` of an elementwise operand, repeating a broadcast value.
fn broadcast_nz<T>(v: &[T], k: usize) -> &T {
    if v.len() == 1 {
        &v[0]
    } else {
        &v[k]
    }
}

impl MxCompiled {
    pub(crate) fn dependency_masks(&self, iind: usize, oind: usize) -> Result<Vec<DepMask>> {
        let mut w: Vec<Vec<DepMask>> = vec![Vec::new(); self.work_size];
        let mut out = Vec::new();
        for el in &self.algorithm {
            let res = el.res as usize;
            let arg = |k: usize| el.arg[k] as usize;
            let nnz = el.sparsity.nnz();
            let value = match &el.op {
                MxOp::Input(ind) => {
                    if *ind as usize == iind {
                        (0..nnz).map(DepMask::unit).collect()
                    } else {
                        vec![DepMask::default(); nnz]
                    }
                }
                MxOp::Output(ind) => {
                    if *ind as usize == oind {
                        out = w[arg(0)].clone();
                    }
                    continue;
                }
                MxOp::Const(_) | MxOp::Free(_) => vec![DepMask::default(); nnz],
                MxOp::Unary(_) | MxOp::Lift => w[arg(0)].clone(),
                MxOp::Binary(_) => {
                    let (x, y) = (&w[arg(0)], &w[arg(1)]);
                    (0..nnz)
                        .map(|k| DepMask::union(broadcast_nz(x, k), broadcast_nz(y, k)))
                        .collect()
                }
                MxOp::MatMul { lhs, rhs } => {
                    let (x, y) = (&w[arg(0)], &w[arg(1)]);
                    let mut acc = vec![DepMask::default(); nnz];
                    for j in 0..rhs.ncols() {
                        for q in rhs.colind()[j]..rhs.colind()[j + 1] {
                            let k = rhs.row()[q];
                            for p in lhs.colind()[k]..lhs.colind()[k + 1] {
                                if let Some(r) = el.sparsity.get_nz(lhs.row()[p], j) {
                                    acc[r].union_with(&x[p]);
                                    acc[r].union_with(&y[q]);
                                }
                            }
                        }
                    }
                    acc
                }
                MxOp::Gather(map) => map
                    .iter()
                    .map(|e| match *e {
                        Some((p, k)) => w[arg(p as usize)][k as usize].clone(),
                        None => DepMask::default(),
                    })
                    .collect(),
                MxOp::Scatter(map) => {
                    let x = &w[arg(0)];
                    let mut acc = vec![DepMask::default(); nnz];
                    for (k, t) in map.iter().enumerate() {
                        if let Some(t) = t {
                            acc[*t as usize].union_with(&x[k]);
                        }
                    }
                    acc
                }
                MxOp::Call { function, output } => {
                    let mut acc = vec![DepMask::default(); nnz];
                    for (i, &s) in el.arg.iter().enumerate() {
                        let jp = function.dependency_pattern(i, *output as usize)?;
                        for j in 0..jp.ncols() {
                            for &r in jp.col_rows(j) {
                                acc[r].union_with(&w[s as usize][j]);
                            }
                        }
                    }
                    acc
                }
            };
            w[res] = value;
        }
        Ok(out)
    }
}

impl MxFunction {
    /// Structural Jacobian of output `oind` with respect to input `iind`
    /// at nonzero level: rows are output nonzeros, columns input nonzeros.
    pub fn dependency_pattern(&self, iind: usize, oind: usize) -> Result<Sparsity> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        let masks = self.compiled()?.dependency_masks(iind, oind)?;
        Ok(pattern_from_masks(&masks, self.in_sp[iind].nnz()))
    }
}
