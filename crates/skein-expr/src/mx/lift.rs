//! Lifting of implicit variables.
//!
//! Every [`MxNode::Lift`] reachable from the outputs becomes an explicit
//! unknown `z_k`. The definition function returns the residual
//! `z_k - value_k` for each of them, followed by the original outputs,
//! with every lifted value replaced by its unknown. The initialization
//! function returns the initial guesses.

use std::collections::HashMap;

use tracing::trace;

use crate::error::Result;
use crate::mx::algorithm::MxOp;
use crate::mx::function::MxFunction;
use crate::mx::graph::MxGraph;
use crate::mx::node::{MxId, MxNode};

/// Result of [`MxFunction::generate_lifting_functions`].
#[derive(Clone, Debug)]
pub struct LiftingFunctions {
    /// `(inputs..., z...) -> (residuals..., outputs...)`
    pub vdef: MxFunction,
    /// `(inputs...) -> (guesses...)`
    pub vinit: MxFunction,
}

impl MxFunction {
    pub fn generate_lifting_functions(&self, g: &mut MxGraph) -> Result<LiftingFunctions> {
        self.check_graph(g)?;
        let c = self.compiled()?;

        let mut subst: HashMap<MxId, MxId> = HashMap::new();
        let mut unknowns = Vec::new();
        let mut residuals = Vec::new();
        let mut guesses = Vec::new();
        for (el, &e) in c.algorithm.iter().zip(&c.nodes) {
            match el.op {
                MxOp::Output(_) | MxOp::Input(_) | MxOp::Free(_) | MxOp::Const(_) => continue,
                _ => {}
            }
            let node = g.node(e).clone();
            if let MxNode::Lift { value, init } = node {
                let k = unknowns.len();
                let z = g.sym_sparse(format!("z_{k}"), el.sparsity.clone());
                let v = subst.get(&value).copied().unwrap_or(value);
                residuals.push(g.sub(z, v)?);
                guesses.push(init);
                unknowns.push(z);
                subst.insert(e, z);
                trace!(
                    function = %self.name(),
                    lifted = %e,
                    unknown = %z,
                    "lifted implicit variable"
                );
                continue;
            }
            let rebuilt = node.map_operands(|a| subst.get(&a).copied().unwrap_or(a));
            if rebuilt != node {
                let id = g.insert(rebuilt, el.sparsity.clone());
                subst.insert(e, id);
            }
        }

        let outputs: Vec<MxId> = self
            .outputs
            .iter()
            .map(|o| subst.get(o).copied().unwrap_or(*o))
            .collect();
        trace!(
            function = %self.name(),
            unknowns = unknowns.len(),
            rewritten = subst.len(),
            "generated lifting functions"
        );

        let vdef = MxFunction::new(
            g,
            [self.inputs.clone(), unknowns].concat(),
            [residuals, outputs].concat(),
            self.options.derived(format!("{}_vdef", self.name())),
        )?;
        let vinit = MxFunction::new(
            g,
            self.inputs.clone(),
            guesses,
            self.options.derived(format!("{}_vinit", self.name())),
        )?;
        Ok(LiftingFunctions { vdef, vinit })
    }
}
