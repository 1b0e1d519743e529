//! Conversion of matrix functions into scalar functions.
//!
//! The matrix algorithm is replayed with [`SxGraph`] as the algebra, so
//! every matrix kernel unrolls into scalar operations and the scalar
//! graph's own interning decides what is shared.

use skein_sparse::{Matrix, Sparsity};
use tracing::trace;

use crate::error::{shape_mismatch, Result};
use crate::mx::function::MxFunction;
use crate::sx::{ExprId, SxFunction, SxGraph, SxMatrix};

impl MxFunction {
    /// Equivalent scalar function in `sx`, on fresh symbols named after
    /// the inputs.
    pub fn expand(&self, sx: &mut SxGraph) -> Result<SxFunction> {
        let inputs = self
            .input_names
            .iter()
            .zip(&self.in_sp)
            .map(|(name, sp)| sx.sym_matrix(name, sp.clone()))
            .collect();
        self.expand_on(sx, inputs)
    }

    /// Equivalent scalar function on caller-provided symbols: one per
    /// structural nonzero of the inputs, input by input, each in
    /// column-major nonzero order.
    pub fn expand_with(&self, sx: &mut SxGraph, symbols: &[ExprId]) -> Result<SxFunction> {
        let total: usize = self.in_sp.iter().map(Sparsity::nnz).sum();
        if symbols.len() != total {
            return Err(shape_mismatch(
                "expand",
                format!("{total} symbols"),
                symbols.len(),
            ));
        }
        let mut rest = symbols;
        let inputs = self
            .in_sp
            .iter()
            .map(|sp| {
                let (head, tail) = rest.split_at(sp.nnz());
                rest = tail;
                Matrix::new(sp.clone(), head.to_vec())
            })
            .collect();
        self.expand_on(sx, inputs)
    }

    fn expand_on(&self, sx: &mut SxGraph, inputs: Vec<SxMatrix>) -> Result<SxFunction> {
        let c = self.compiled()?;
        self.no_free_vars()?;
        let args: Vec<Vec<ExprId>> = inputs.iter().map(|m| m.nonzeros().to_vec()).collect();
        let before = sx.len();
        let out = c.replay(sx, &args, self.n_out())?;
        trace!(
            name = %self.name(),
            instructions = c.algorithm.len(),
            new_nodes = sx.len() - before,
            "expanded matrix function"
        );
        let outputs = out
            .into_iter()
            .zip(&self.out_sp)
            .map(|(nz, sp)| Matrix::new(sp.clone(), nz))
            .collect();
        SxFunction::new(sx, inputs, outputs, self.options.clone())
    }
}

impl SxFunction {
    /// Scalar function built from a matrix function through
    /// [`MxFunction::expand`].
    pub fn try_from_mx(f: &MxFunction, sx: &mut SxGraph) -> Result<SxFunction> {
        f.expand(sx)
    }
}
