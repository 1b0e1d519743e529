//! Compilation of matrix functions into a slot algorithm.
//!
//! Same scheduling as the scalar compiler, with one work slot holding all
//! nonzeros of a matrix value. Each element carries what its kernel needs
//! (patterns, maps, the embedded function), so the algorithm evaluates
//! without the graph.

use std::collections::HashMap;
use std::sync::Arc;

use skein_sparse::Sparsity;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mx::graph::MxGraph;
use crate::mx::node::{MxId, MxNode};
use crate::ops::{BinaryOp, UnaryOp};
use crate::schedule::{assign_slots, TopoSort};
use crate::sx::SxFunction;

/// Instruction kinds of a matrix algorithm.
#[derive(Clone, Debug)]
pub enum MxOp {
    Input(u32),
    Output(u32),
    Const(Vec<f64>),
    Free(u32),
    Unary(UnaryOp),
    /// Operands either match the result pattern or hold one broadcast value.
    Binary(BinaryOp),
    MatMul { lhs: Sparsity, rhs: Sparsity },
    Gather(Vec<Option<(u32, u32)>>),
    Scatter(Vec<Option<u32>>),
    Call { function: Arc<SxFunction>, output: u32 },
    Lift,
}

/// One instruction with its operand slots, result slot and result pattern.
#[derive(Clone, Debug)]
pub struct MxAlgEl {
    pub op: MxOp,
    pub res: u32,
    pub arg: Vec<u32>,
    pub sparsity: Sparsity,
}

#[derive(Clone, Debug)]
pub(crate) struct MxCompiled {
    pub algorithm: Vec<MxAlgEl>,
    /// Node evaluated by each element (the stored one for outputs).
    pub nodes: Vec<MxId>,
    pub free_vars: Vec<MxId>,
    pub free_names: Vec<String>,
    pub work_size: usize,
}

enum Item {
    Node(MxId),
    Output(u32, MxId),
}

pub(crate) fn compile(g: &MxGraph, inputs: &[MxId], outputs: &[MxId]) -> Result<MxCompiled> {
    let mut input_of: HashMap<MxId, u32> = HashMap::new();
    for (i, &e) in inputs.iter().enumerate() {
        if !g.try_node(e)?.is_symbolic() {
            return Err(Error::NotSymbolic { input: i });
        }
        if input_of.insert(e, i as u32).is_some() {
            return Err(Error::DuplicateInput { input: i });
        }
    }

    let mut topo = TopoSort::new();
    let mut order = Vec::new();
    let mut items = Vec::new();
    for (o, &e) in outputs.iter().enumerate() {
        g.try_node(e)?;
        let start = order.len();
        topo.visit(e, |id| g.node(id).eval_operands(), &mut order);
        items.extend(order[start..].iter().map(|&n| Item::Node(n)));
        items.push(Item::Output(o as u32, e));
    }

    let mut position: HashMap<MxId, usize> = HashMap::with_capacity(order.len());
    let mut ops = Vec::with_capacity(items.len());
    let mut instrs = Vec::with_capacity(items.len());
    let mut nodes = Vec::with_capacity(items.len());
    let mut free_vars = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let (op, operands, e) = match *item {
            Item::Node(e) => {
                position.insert(e, i);
                let node = g.node(e);
                let operands = node.eval_operands().iter().map(|a| position[a]).collect();
                let op = match node {
                    MxNode::Sym { .. } => match input_of.get(&e) {
                        Some(&ind) => MxOp::Input(ind),
                        None => {
                            free_vars.push(e);
                            MxOp::Free(free_vars.len() as u32 - 1)
                        }
                    },
                    MxNode::Const { values, .. } => {
                        MxOp::Const(values.iter().map(|&b| f64::from_bits(b)).collect())
                    }
                    MxNode::Unary(op, _) => MxOp::Unary(*op),
                    MxNode::Binary(op, _, _) => MxOp::Binary(*op),
                    MxNode::MatMul(a, b) => MxOp::MatMul {
                        lhs: g.sparsity(*a).clone(),
                        rhs: g.sparsity(*b).clone(),
                    },
                    MxNode::Gather { map, .. } => MxOp::Gather(map.clone()),
                    MxNode::Scatter { map, .. } => MxOp::Scatter(map.clone()),
                    MxNode::Call {
                        function, output, ..
                    } => MxOp::Call {
                        function: function.0.clone(),
                        output: *output,
                    },
                    MxNode::Lift { .. } => MxOp::Lift,
                };
                (op, operands, e)
            }
            Item::Output(ind, e) => (MxOp::Output(ind), vec![position[&e]], e),
        };
        let defines = !matches!(op, MxOp::Output(_));
        ops.push(op);
        instrs.push((operands, defines));
        nodes.push(e);
    }

    let slots = assign_slots(&instrs);
    let algorithm: Vec<MxAlgEl> = ops
        .into_iter()
        .zip(slots.args)
        .enumerate()
        .map(|(i, (op, arg))| MxAlgEl {
            op,
            res: slots.res[i],
            arg,
            sparsity: g.sparsity(nodes[i]).clone(),
        })
        .collect();

    let free_names = free_vars
        .iter()
        .map(|&e| g.name(e).unwrap_or("?").to_string())
        .collect();
    debug!(
        instructions = algorithm.len(),
        work_size = slots.work_size,
        free = free_vars.len(),
        "compiled matrix algorithm"
    );
    Ok(MxCompiled {
        algorithm,
        nodes,
        free_vars,
        free_names,
        work_size: slots.work_size,
    })
}
