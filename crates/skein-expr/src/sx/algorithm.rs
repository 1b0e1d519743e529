//! Compilation of scalar functions into a register-slot algorithm.
//!
//! The algorithm is a straight-line program: inputs are loaded into work
//! slots, operations read and write slots, outputs copy slots out. Node
//! order is a depth-first postorder from the outputs, so every operand is
//! computed before its reader and each shared node exactly once.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::ops::{Algebra, BinaryOp, UnaryOp};
use crate::schedule::{assign_slots, TopoSort, NO_SLOT};
use crate::sx::graph::{SxGraph, SxMatrix};
use crate::sx::node::{ExprId, Node};

/// Instruction kinds of a scalar algorithm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SxOp {
    /// Load nonzero `nz` of input `ind`.
    Input { ind: u32, nz: u32 },
    /// Store into nonzero `nz` of output `ind`.
    Output { ind: u32, nz: u32 },
    Const(f64),
    /// Load free variable `k` (a symbol that is not an input).
    Free(u32),
    Unary(UnaryOp),
    Binary(BinaryOp),
}

/// One instruction: `res` is the written slot, `arg` the read slots.
/// Unused positions hold `u32::MAX`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalarAtomic {
    pub op: SxOp,
    pub res: u32,
    pub arg: [u32; 2],
}

#[derive(Clone, Debug)]
pub(crate) struct SxCompiled {
    pub algorithm: Vec<ScalarAtomic>,
    pub free_vars: Vec<ExprId>,
    pub free_names: Vec<String>,
    pub work_size: usize,
}

enum Item {
    Node(ExprId),
    Output(u32, u32, ExprId),
}

pub(crate) fn compile(
    g: &SxGraph,
    inputs: &[SxMatrix],
    outputs: &[SxMatrix],
) -> Result<SxCompiled> {
    let mut input_of: HashMap<ExprId, (u32, u32)> = HashMap::new();
    for (i, m) in inputs.iter().enumerate() {
        for (k, &e) in m.nonzeros().iter().enumerate() {
            if !g.try_node(e)?.is_symbolic() {
                return Err(Error::NotSymbolic { input: i });
            }
            if input_of.insert(e, (i as u32, k as u32)).is_some() {
                return Err(Error::DuplicateInput { input: i });
            }
        }
    }

    let mut topo = TopoSort::new();
    let mut order = Vec::new();
    let mut items = Vec::new();
    for (o, m) in outputs.iter().enumerate() {
        for (k, &e) in m.nonzeros().iter().enumerate() {
            g.try_node(e)?;
            let start = order.len();
            topo.visit(e, |id| g.node(id).operands(), &mut order);
            items.extend(order[start..].iter().map(|&n| Item::Node(n)));
            items.push(Item::Output(o as u32, k as u32, e));
        }
    }

    let mut position: HashMap<ExprId, usize> = HashMap::with_capacity(order.len());
    let mut ops = Vec::with_capacity(items.len());
    let mut instrs = Vec::with_capacity(items.len());
    let mut free_vars = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let (op, operands) = match *item {
            Item::Node(e) => {
                position.insert(e, i);
                match g.node(e) {
                    Node::Sym(_) => match input_of.get(&e) {
                        Some(&(ind, nz)) => (SxOp::Input { ind, nz }, vec![]),
                        None => {
                            free_vars.push(e);
                            (SxOp::Free(free_vars.len() as u32 - 1), vec![])
                        }
                    },
                    Node::Lit(bits) => (SxOp::Const(f64::from_bits(bits)), vec![]),
                    Node::Unary(op, a) => (SxOp::Unary(op), vec![position[&a]]),
                    Node::Binary(op, a, b) => {
                        (SxOp::Binary(op), vec![position[&a], position[&b]])
                    }
                }
            }
            Item::Output(ind, nz, e) => (SxOp::Output { ind, nz }, vec![position[&e]]),
        };
        let defines = !matches!(op, SxOp::Output { .. });
        ops.push(op);
        instrs.push((operands, defines));
    }

    let slots = assign_slots(&instrs);
    let algorithm: Vec<ScalarAtomic> = ops
        .into_iter()
        .enumerate()
        .map(|(i, op)| {
            let a = &slots.args[i];
            ScalarAtomic {
                op,
                res: slots.res[i],
                arg: [
                    a.first().copied().unwrap_or(NO_SLOT),
                    a.get(1).copied().unwrap_or(NO_SLOT),
                ],
            }
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
        "compiled scalar algorithm"
    );
    Ok(SxCompiled {
        algorithm,
        free_vars,
        free_names,
        work_size: slots.work_size,
    })
}

impl SxCompiled {
    /// Evaluate the algorithm over any value domain.
    ///
    /// `args[i]` holds the nonzeros of input `i`, `free[k]` the value of
    /// free variable `k`; `out_nnz[o]` sizes output `o`.
    pub fn replay<A: Algebra>(
        &self,
        alg: &mut A,
        args: &[&[A::Value]],
        free: &[A::Value],
        out_nnz: &[usize],
    ) -> Vec<Vec<A::Value>> {
        let zero = alg.constant(0.0);
        let mut w = vec![zero; self.work_size];
        let mut out: Vec<Vec<A::Value>> = out_nnz.iter().map(|&n| vec![zero; n]).collect();
        for el in &self.algorithm {
            let [a, b] = el.arg.map(|s| s as usize);
            let res = el.res as usize;
            match el.op {
                SxOp::Input { ind, nz } => w[res] = args[ind as usize][nz as usize],
                SxOp::Output { ind, nz } => out[ind as usize][nz as usize] = w[a],
                SxOp::Const(v) => w[res] = alg.constant(v),
                SxOp::Free(k) => w[res] = free[k as usize],
                SxOp::Unary(op) => w[res] = alg.unary(op, w[a]),
                SxOp::Binary(op) => w[res] = alg.binary(op, w[a], w[b]),
            }
        }
        out
    }

    /// Instructions excluding output stores.
    pub fn count_nodes(&self) -> usize {
        self.algorithm
            .iter()
            .filter(|el| !matches!(el.op, SxOp::Output { .. }))
            .count()
    }
}
