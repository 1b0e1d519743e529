//! Jacobian sparsity via dependency propagation.

use skein_sparse::Sparsity;

use crate::deps::{pattern_from_masks, DepMask};
use crate::error::{check_input, check_output, Result};
use crate::sx::algorithm::{SxCompiled, SxOp};
use crate::sx::function::SxFunction;

impl SxCompiled {
    /// For each nonzero of output `oind`, the nonzeros of input `iind` it
    /// depends on.
    pub(crate) fn dependency_masks(
        &self,
        iind: usize,
        oind: usize,
        out_nnz: usize,
    ) -> Vec<DepMask> {
        let mut w = vec![DepMask::default(); self.work_size];
        let mut out = vec![DepMask::default(); out_nnz];
        for el in &self.algorithm {
            let [a, b] = el.arg.map(|s| s as usize);
            let res = el.res as usize;
            match el.op {
                SxOp::Input { ind, nz } => {
                    w[res] = if ind as usize == iind {
                        DepMask::unit(nz as usize)
                    } else {
                        DepMask::default()
                    };
                }
                SxOp::Const(_) | SxOp::Free(_) => w[res] = DepMask::default(),
                SxOp::Unary(_) => w[res] = w[a].clone(),
                SxOp::Binary(_) => w[res] = DepMask::union(&w[a], &w[b]),
                SxOp::Output { ind, nz } => {
                    if ind as usize == oind {
                        out[nz as usize] = w[a].clone();
                    }
                }
            }
        }
        out
    }
}

impl SxFunction {
    /// Structural Jacobian of output `oind` with respect to input `iind`
    /// at nonzero level: rows are output nonzeros, columns input nonzeros.
    pub fn dependency_pattern(&self, iind: usize, oind: usize) -> Result<Sparsity> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        let c = self.compiled()?;
        let masks = c.dependency_masks(iind, oind, self.out_sp[oind].nnz());
        Ok(pattern_from_masks(&masks, self.in_sp[iind].nnz()))
    }
}

#[cfg(test)]
mod tests {
    use skein_sparse::Matrix;

    use crate::options::FunctionOptions;
    use crate::sx::{SxFunction, SxGraph};

    #[test]
    fn pattern_follows_dependencies() {
        let mut g = SxGraph::new();
        let x = g.sym_column("x", 3);
        let nz = x.nonzeros().to_vec();
        let a = g.mul(nz[0], nz[2]);
        let b = g.tanh(nz[1]);
        let f = SxFunction::new(
            &g,
            vec![x],
            vec![Matrix::column(vec![a, b])],
            FunctionOptions::default(),
        )
        .unwrap();
        let sp = f.dependency_pattern(0, 0).unwrap();
        assert_eq!(sp.shape(), (2, 3));
        assert_eq!(sp.nnz(), 3);
        assert!(sp.get_nz(0, 0).is_some());
        assert!(sp.get_nz(0, 2).is_some());
        assert!(sp.get_nz(1, 1).is_some());
        assert!(sp.get_nz(1, 0).is_none());
    }

    #[test]
    fn constant_output_has_empty_pattern() {
        let mut g = SxGraph::new();
        let x = g.sym("x");
        let c = g.lit(3.0);
        let f = SxFunction::new(
            &g,
            vec![Matrix::scalar(x)],
            vec![Matrix::scalar(c)],
            FunctionOptions::default(),
        )
        .unwrap();
        assert_eq!(f.dependency_pattern(0, 0).unwrap().nnz(), 0);
    }
}
