//! Functions over matrix graphs.

use skein_sparse::{Matrix, Sparsity};
use tracing::{debug, warn};

use crate::error::{check_input, check_output, Error, Result};
use crate::function::check_arguments;
use crate::lineage::GraphRef;
use crate::mx::algorithm::{compile, MxAlgEl, MxCompiled};
use crate::mx::graph::MxGraph;
use crate::mx::node::MxId;
use crate::ops::F64Algebra;
use crate::options::FunctionOptions;

/// A function from symbolic matrix inputs to matrix outputs of one
/// [`MxGraph`], compiled into a matrix algorithm.
///
/// Same two-phase lifecycle as [`SxFunction`](crate::sx::SxFunction).
#[derive(Clone, Debug)]
pub struct MxFunction {
    pub(crate) options: FunctionOptions,
    pub(crate) graph: GraphRef,
    pub(crate) inputs: Vec<MxId>,
    pub(crate) outputs: Vec<MxId>,
    pub(crate) in_sp: Vec<Sparsity>,
    pub(crate) out_sp: Vec<Sparsity>,
    pub(crate) input_names: Vec<String>,
    pub(crate) compiled: Option<MxCompiled>,
}

impl MxFunction {
    pub fn declare(
        g: &MxGraph,
        inputs: Vec<MxId>,
        outputs: Vec<MxId>,
        options: FunctionOptions,
    ) -> Result<Self> {
        let mut max = 0u32;
        for &e in inputs.iter().chain(&outputs) {
            g.try_node(e)?;
            max = max.max(e.index());
        }
        let in_sp = inputs.iter().map(|&e| g.sparsity(e).clone()).collect();
        let out_sp = outputs.iter().map(|&e| g.sparsity(e).clone()).collect();
        let input_names = inputs
            .iter()
            .enumerate()
            .map(|(i, &e)| g.name(e).map_or_else(|| format!("i{i}"), str::to_string))
            .collect();
        Ok(Self {
            options,
            graph: GraphRef { id: g.id(), max },
            inputs,
            outputs,
            in_sp,
            out_sp,
            input_names,
            compiled: None,
        })
    }

    pub fn init(&mut self, g: &MxGraph) -> Result<()> {
        self.check_graph(g)?;
        if self.compiled.is_none() {
            let c = compile(g, &self.inputs, &self.outputs)?;
            debug!(
                name = %self.options.name,
                nodes = c.algorithm.len(),
                work_size = c.work_size,
                free = c.free_vars.len(),
                "initialized matrix function"
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

    pub fn new(
        g: &MxGraph,
        inputs: Vec<MxId>,
        outputs: Vec<MxId>,
        options: FunctionOptions,
    ) -> Result<Self> {
        let mut f = Self::declare(g, inputs, outputs, options)?;
        f.init(g)?;
        Ok(f)
    }

    pub(crate) fn check_graph(&self, g: &MxGraph) -> Result<()> {
        if g.lineage().shares(self.graph.id, self.graph.max) {
            Ok(())
        } else {
            Err(Error::ForeignGraph)
        }
    }

    pub(crate) fn compiled(&self) -> Result<&MxCompiled> {
        self.compiled
            .as_ref()
            .ok_or_else(|| Error::NotInitialized(self.options.name.clone()))
    }

    pub(crate) fn no_free_vars(&self) -> Result<()> {
        let c = self.compiled()?;
        if c.free_vars.is_empty() {
            Ok(())
        } else {
            Err(Error::FreeVariables(c.free_names.clone()))
        }
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
        self.inputs.len()
    }

    pub fn n_out(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_expr(&self, i: usize) -> Result<MxId> {
        check_input(i, self.inputs.len())?;
        Ok(self.inputs[i])
    }

    pub fn output_expr(&self, i: usize) -> Result<MxId> {
        check_output(i, self.outputs.len())?;
        Ok(self.outputs[i])
    }

    pub fn inputs(&self) -> &[MxId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[MxId] {
        &self.outputs
    }

    pub fn input_sparsity(&self, i: usize) -> Result<&Sparsity> {
        check_input(i, self.inputs.len())?;
        Ok(&self.in_sp[i])
    }

    pub fn output_sparsity(&self, i: usize) -> Result<&Sparsity> {
        check_output(i, self.outputs.len())?;
        Ok(&self.out_sp[i])
    }

    pub fn algorithm(&self) -> Result<&[MxAlgEl]> {
        Ok(&self.compiled()?.algorithm)
    }

    /// Full algorithm length, output stores included.
    pub fn count_nodes(&self) -> Result<usize> {
        Ok(self.compiled()?.algorithm.len())
    }

    pub fn work_size(&self) -> Result<usize> {
        Ok(self.compiled()?.work_size)
    }

    pub fn free_vars(&self) -> Result<&[MxId]> {
        Ok(&self.compiled()?.free_vars)
    }

    /// Evaluate numerically.
    pub fn eval(&self, args: &[Matrix<f64>]) -> Result<Vec<Matrix<f64>>> {
        let c = self.compiled()?;
        self.no_free_vars()?;
        check_arguments(&self.in_sp, args)?;
        let nz: Vec<Vec<f64>> = args
            .iter()
            .zip(&self.in_sp)
            .map(|(a, sp)| a.project(sp, 0.0).into_nonzeros())
            .collect();
        let out = c.replay(&mut F64Algebra, &nz, self.n_out())?;
        Ok(out
            .into_iter()
            .zip(&self.out_sp)
            .map(|(v, sp)| Matrix::new(sp.clone(), v))
            .collect())
    }
}
