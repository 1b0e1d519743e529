//! Functions over scalar graphs.

use std::sync::{Arc, OnceLock};

use skein_sparse::{Matrix, Sparsity};
use tracing::{debug, warn};

use crate::error::{check_input, check_output, Error, Result};
use crate::function::check_arguments;
use crate::lineage::GraphRef;
use crate::ops::F64Algebra;
use crate::options::FunctionOptions;
use crate::sx::algorithm::{compile, ScalarAtomic, SxCompiled};
use crate::sx::graph::{SxGraph, SxMatrix};
use crate::sx::node::ExprId;

/// A function from symbolic input matrices to output matrices of one
/// [`SxGraph`], compiled into a scalar algorithm.
///
/// Construction is two-phase: [`declare`](Self::declare) records inputs
/// and outputs, [`init`](Self::init) compiles. [`new`](Self::new) does
/// both. Queries that need the algorithm fail with
/// [`Error::NotInitialized`] before `init`.
#[derive(Clone, Debug)]
pub struct SxFunction {
    pub(crate) options: FunctionOptions,
    pub(crate) graph: GraphRef,
    pub(crate) inputs: Vec<SxMatrix>,
    pub(crate) outputs: Vec<SxMatrix>,
    pub(crate) in_sp: Vec<Sparsity>,
    pub(crate) out_sp: Vec<Sparsity>,
    /// Inputs and outputs were dropped by [`clear_symbolic`](Self::clear_symbolic).
    pub(crate) cleared: bool,
    pub(crate) compiled: Option<SxCompiled>,
    pub(crate) fwd: OnceLock<Arc<SxFunction>>,
    pub(crate) rev: OnceLock<Arc<SxFunction>>,
    /// Private graph of generated derivative functions.
    pub(crate) standalone: Option<Arc<SxGraph>>,
}

impl SxFunction {
    /// Record inputs and outputs without compiling.
    pub fn declare(
        g: &SxGraph,
        inputs: Vec<SxMatrix>,
        outputs: Vec<SxMatrix>,
        options: FunctionOptions,
    ) -> Result<Self> {
        let mut max = 0u32;
        for m in inputs.iter().chain(&outputs) {
            for &e in m.nonzeros() {
                g.try_node(e)?;
                max = max.max(e.index());
            }
        }
        let in_sp = inputs.iter().map(|m| m.sparsity().clone()).collect();
        let out_sp = outputs.iter().map(|m| m.sparsity().clone()).collect();
        Ok(Self {
            options,
            graph: GraphRef { id: g.id(), max },
            inputs,
            outputs,
            in_sp,
            out_sp,
            cleared: false,
            compiled: None,
            fwd: OnceLock::new(),
            rev: OnceLock::new(),
            standalone: None,
        })
    }

    /// Compile the algorithm. Calling it again is a no-op.
    pub fn init(&mut self, g: &SxGraph) -> Result<()> {
        self.check_graph(g)?;
        if self.compiled.is_none() {
            let c = compile(g, &self.inputs, &self.outputs)?;
            debug!(
                name = %self.options.name,
                nodes = c.count_nodes(),
                work_size = c.work_size,
                free = c.free_vars.len(),
                "initialized scalar function"
            );
            if !c.free_names.is_empty() {
                warn!(
                    name = %self.options.name,
                    free = ?c.free_names,
                    "function has free variables"
                );
            }
            self.compiled = Some(c);
        }
        Ok(())
    }

    /// Declare and initialize in one step.
    pub fn new(
        g: &SxGraph,
        inputs: Vec<SxMatrix>,
        outputs: Vec<SxMatrix>,
        options: FunctionOptions,
    ) -> Result<Self> {
        let mut f = Self::declare(g, inputs, outputs, options)?;
        f.init(g)?;
        Ok(f)
    }

    pub(crate) fn check_graph(&self, g: &SxGraph) -> Result<()> {
        if g.lineage().shares(self.graph.id, self.graph.max) {
            Ok(())
        } else {
            Err(Error::ForeignGraph)
        }
    }

    /// Drop the symbolic inputs and outputs, keeping the compiled algorithm.
    ///
    /// Numeric evaluation, [`call`](Self::call) and the standalone
    /// derivative functions keep working; expression accessors and
    /// derivatives built in a caller's graph fail with
    /// [`Error::SymbolicCleared`] afterwards. Needs an initialized function.
    pub fn clear_symbolic(&mut self) -> Result<()> {
        self.compiled()?;
        self.inputs = Vec::new();
        self.outputs = Vec::new();
        self.standalone = None;
        self.cleared = true;
        debug!(name = %self.options.name, "cleared symbolic expressions");
        Ok(())
    }

    pub fn has_symbolic(&self) -> bool {
        !self.cleared
    }

    pub(crate) fn symbolic(&self) -> Result<()> {
        if self.cleared {
            Err(Error::SymbolicCleared(self.options.name.clone()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn compiled(&self) -> Result<&SxCompiled> {
        self.compiled
            .as_ref()
            .ok_or_else(|| Error::NotInitialized(self.options.name.clone()))
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &FunctionOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn n_in(&self) -> usize {
        self.in_sp.len()
    }

    pub fn n_out(&self) -> usize {
        self.out_sp.len()
    }

    /// Declared input `i`.
    pub fn input_expr(&self, i: usize) -> Result<&SxMatrix> {
        check_input(i, self.n_in())?;
        self.symbolic()?;
        Ok(&self.inputs[i])
    }

    /// Declared output `i`.
    pub fn output_expr(&self, i: usize) -> Result<&SxMatrix> {
        check_output(i, self.n_out())?;
        self.symbolic()?;
        Ok(&self.outputs[i])
    }

    /// Declared inputs, empty once cleared.
    pub fn inputs(&self) -> &[SxMatrix] {
        &self.inputs
    }

    /// Declared outputs, empty once cleared.
    pub fn outputs(&self) -> &[SxMatrix] {
        &self.outputs
    }

    pub fn input_sparsity(&self, i: usize) -> Result<&Sparsity> {
        check_input(i, self.n_in())?;
        Ok(&self.in_sp[i])
    }

    pub fn output_sparsity(&self, i: usize) -> Result<&Sparsity> {
        check_output(i, self.n_out())?;
        Ok(&self.out_sp[i])
    }

    /// The compiled instruction list.
    pub fn algorithm(&self) -> Result<&[ScalarAtomic]> {
        Ok(&self.compiled()?.algorithm)
    }

    /// Number of instructions that are not output stores.
    pub fn count_nodes(&self) -> Result<usize> {
        Ok(self.compiled()?.count_nodes())
    }

    /// Number of work slots the algorithm needs.
    pub fn work_size(&self) -> Result<usize> {
        Ok(self.compiled()?.work_size)
    }

    /// Symbols the outputs depend on that are not inputs, in discovery order.
    pub fn free_vars(&self) -> Result<&[ExprId]> {
        Ok(&self.compiled()?.free_vars)
    }

    /// Scalar functions are already expanded.
    pub fn expand(&self) -> SxFunction {
        self.clone()
    }

    /// Graph owning the expressions of a generated derivative function.
    pub fn standalone_graph(&self) -> Option<&SxGraph> {
        self.standalone.as_deref()
    }

    pub(crate) fn out_nnz(&self) -> Vec<usize> {
        self.out_sp.iter().map(Sparsity::nnz).collect()
    }

    pub(crate) fn in_nnz(&self) -> Vec<usize> {
        self.in_sp.iter().map(Sparsity::nnz).collect()
    }

    pub(crate) fn no_free_vars(&self) -> Result<()> {
        let c = self.compiled()?;
        if c.free_vars.is_empty() {
            Ok(())
        } else {
            Err(Error::FreeVariables(c.free_names.clone()))
        }
    }

    /// Evaluate numerically. Arguments must match the input shapes; values
    /// outside an input's pattern are ignored.
    pub fn eval(&self, args: &[Matrix<f64>]) -> Result<Vec<Matrix<f64>>> {
        let c = self.compiled()?;
        self.no_free_vars()?;
        check_arguments(&self.in_sp, args)?;
        let projected: Vec<Matrix<f64>> = args
            .iter()
            .zip(&self.in_sp)
            .map(|(a, sp)| a.project(sp, 0.0))
            .collect();
        let views: Vec<&[f64]> = projected.iter().map(|m| m.nonzeros()).collect();
        let out = c.replay(&mut F64Algebra, &views, &[], &self.out_nnz());
        Ok(self.wrap_outputs(out))
    }

    /// Re-express the function on symbolic arguments in `g`.
    ///
    /// Free variables are only available when `g` shares the function's
    /// own graph.
    pub fn call(&self, g: &mut SxGraph, args: &[SxMatrix]) -> Result<Vec<SxMatrix>> {
        let c = self.compiled()?;
        check_arguments(&self.in_sp, args)?;
        for a in args {
            for &e in a.nonzeros() {
                g.try_node(e)?;
            }
        }
        let free: &[ExprId] = if c.free_vars.is_empty() || self.check_graph(g).is_ok() {
            &c.free_vars
        } else {
            return Err(Error::FreeVariables(c.free_names.clone()));
        };
        let projected: Vec<SxMatrix> = args
            .iter()
            .zip(&self.in_sp)
            .map(|(a, sp)| a.project(sp, ExprId::ZERO))
            .collect();
        let views: Vec<&[ExprId]> = projected.iter().map(|m| m.nonzeros()).collect();
        let out = c.replay(g, &views, free, &self.out_nnz());
        Ok(self.wrap_outputs(out))
    }

    pub(crate) fn wrap_outputs<T>(&self, out: Vec<Vec<T>>) -> Vec<Matrix<T>> {
        out.into_iter()
            .zip(&self.out_sp)
            .map(|(nz, sp)| Matrix::new(sp.clone(), nz))
            .collect()
    }
}
