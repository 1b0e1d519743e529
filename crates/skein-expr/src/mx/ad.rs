//! Symbolic forward and reverse sweeps over matrix algorithms.
//!
//! Sensitivities are matrix expressions in the function's own graph,
//! always carried on the pattern of the value they belong to. A missing
//! sensitivity is a structural zero and is never materialized unless an
//! embedded call needs it as an argument.

use std::collections::HashMap;

use skein_sparse::{Matrix, Sparsity};

use crate::error::{check_input, check_output, shape_mismatch, Result};
use crate::jacobian::{assembled_pattern, plan, seed_mask, Direction};
use crate::mx::algorithm::MxOp;
use crate::mx::function::MxFunction;
use crate::mx::graph::{Elementwise, MxGraph};
use crate::mx::node::{MxId, MxNode};
use crate::ops::{binary_partial, unary_partial, BinaryOp, UnaryOp};

/// Per direction, per input or output.
type Sens = Vec<Vec<Option<MxId>>>;

fn partial_unary(g: &mut MxGraph, op: UnaryOp, x: MxId, f: MxId) -> Result<MxId> {
    let mut alg = Elementwise::new(g);
    let p = unary_partial(&mut alg, op, x, f);
    alg.finish()?;
    Ok(p)
}

fn partial_binary(
    g: &mut MxGraph,
    op: BinaryOp,
    k: usize,
    x: MxId,
    y: MxId,
    f: MxId,
) -> Result<MxId> {
    let mut alg = Elementwise::new(g);
    let p = binary_partial(&mut alg, op, k, x, y, f);
    alg.finish()?;
    Ok(p)
}

/// Add `term` into the adjoint of `target`, on the target's pattern.
fn accumulate(
    g: &mut MxGraph,
    adj: &mut HashMap<MxId, MxId>,
    target: MxId,
    term: MxId,
) -> Result<()> {
    let sp = g.sparsity(target).clone();
    let term = g.project(term, &sp)?;
    let sum = match adj.get(&target) {
        Some(&a) => g.add(a, term)?,
        None => term,
    };
    adj.insert(target, sum);
    Ok(())
}

/// Constant with ones at the nonzeros in `group`.
fn seed(g: &mut MxGraph, sp: &Sparsity, group: &[usize]) -> MxId {
    let values = seed_mask(sp.nnz(), group)
        .into_iter()
        .map(|on| if on { 1.0 } else { 0.0 })
        .collect();
    g.constant(&Matrix::new(sp.clone(), values))
}

impl MxFunction {
    /// Forward sweep: output tangents for each direction of input
    /// tangents.
    pub(crate) fn forward_sweep(&self, g: &mut MxGraph, seeds: &Sens) -> Result<Sens> {
        let c = self.compiled()?;
        let ndir = seeds.len();
        let mut tan: Vec<HashMap<MxId, MxId>> = vec![HashMap::new(); ndir];
        let mut fsens = vec![vec![None; self.n_out()]; ndir];

        for (el, &e) in c.algorithm.iter().zip(&c.nodes) {
            match &el.op {
                MxOp::Output(ind) => {
                    for d in 0..ndir {
                        fsens[d][*ind as usize] = tan[d].get(&e).copied();
                    }
                    continue;
                }
                MxOp::Input(ind) => {
                    for d in 0..ndir {
                        if let Some(s) = seeds[d][*ind as usize] {
                            let s = g.project(s, &el.sparsity)?;
                            tan[d].insert(e, s);
                        }
                    }
                    continue;
                }
                MxOp::Const(_) | MxOp::Free(_) => continue,
                _ => {}
            }
            let sp = el.sparsity.clone();
            let node = g.node(e).clone();
            match node {
                MxNode::Unary(op, x) => {
                    let mut partial = None;
                    for td in tan.iter_mut() {
                        let Some(tx) = td.get(&x).copied() else {
                            continue;
                        };
                        let p = match partial {
                            Some(p) => p,
                            None => *partial.insert(partial_unary(g, op, x, e)?),
                        };
                        let t = g.mul(p, tx)?;
                        td.insert(e, g.broadcast(t, &sp)?);
                    }
                }
                MxNode::Binary(op, x, y) => {
                    let mut partials = [None, None];
                    for td in tan.iter_mut() {
                        let mut acc = None;
                        for (k, v) in [x, y].into_iter().enumerate() {
                            let Some(tv) = td.get(&v).copied() else {
                                continue;
                            };
                            let p = match partials[k] {
                                Some(p) => p,
                                None => *partials[k].insert(partial_binary(g, op, k, x, y, e)?),
                            };
                            let term = g.mul(p, tv)?;
                            let term = g.broadcast(term, &sp)?;
                            acc = Some(match acc {
                                Some(a) => g.add(a, term)?,
                                None => term,
                            });
                        }
                        if let Some(t) = acc {
                            td.insert(e, g.project(t, &sp)?);
                        }
                    }
                }
                MxNode::MatMul(x, y) => {
                    for td in tan.iter_mut() {
                        let (tx, ty) = (td.get(&x).copied(), td.get(&y).copied());
                        let left = tx.map(|tx| g.mtimes(tx, y)).transpose()?;
                        let right = ty.map(|ty| g.mtimes(x, ty)).transpose()?;
                        let t = match (left, right) {
                            (Some(a), Some(b)) => g.add(a, b)?,
                            (Some(a), None) | (None, Some(a)) => a,
                            (None, None) => continue,
                        };
                        td.insert(e, g.project(t, &sp)?);
                    }
                }
                MxNode::Gather { args, map, sparsity } => {
                    for td in tan.iter_mut() {
                        let targs: Vec<Option<MxId>> =
                            args.iter().map(|a| td.get(a).copied()).collect();
                        if targs.iter().all(Option::is_none) {
                            continue;
                        }
                        // placeholders for args without a tangent, dropped by the gather
                        let zero = g.fill(&Sparsity::scalar(), 0.0);
                        let present: Vec<MxId> =
                            targs.iter().map(|t| t.unwrap_or(zero)).collect();
                        let tmap = map
                            .iter()
                            .map(|m| m.filter(|&(p, _)| targs[p as usize].is_some()))
                            .collect();
                        td.insert(e, g.gather(&present, tmap, sparsity.clone()));
                    }
                }
                MxNode::Scatter { arg, map, sparsity } => {
                    for td in tan.iter_mut() {
                        if let Some(ta) = td.get(&arg).copied() {
                            td.insert(e, g.scatter(ta, map.clone(), sparsity.clone()));
                        }
                    }
                }
                MxNode::Call {
                    function,
                    args,
                    output,
                } => {
                    let fd = function.function().forward_derivative()?;
                    for td in tan.iter_mut() {
                        if args.iter().all(|a| !td.contains_key(a)) {
                            continue;
                        }
                        let mut fargs = args.clone();
                        for &a in &args {
                            let t = match td.get(&a) {
                                Some(&t) => t,
                                None => {
                                    let sp_a = g.sparsity(a).clone();
                                    g.fill(&sp_a, 0.0)
                                }
                            };
                            fargs.push(t);
                        }
                        td.insert(e, g.call_node(&fd, &fargs, output as usize));
                    }
                }
                MxNode::Lift { value, .. } => {
                    for td in tan.iter_mut() {
                        if let Some(t) = td.get(&value).copied() {
                            td.insert(e, t);
                        }
                    }
                }
                MxNode::Sym { .. } | MxNode::Const { .. } => {}
            }
        }
        Ok(fsens)
    }

    /// Reverse sweep: input adjoints for each direction of output
    /// adjoints.
    pub(crate) fn reverse_sweep(&self, g: &mut MxGraph, seeds: &Sens) -> Result<Sens> {
        let c = self.compiled()?;
        let ndir = seeds.len();
        let mut adj: Vec<HashMap<MxId, MxId>> = vec![HashMap::new(); ndir];
        let mut asens = vec![vec![None; self.n_in()]; ndir];

        for (el, &e) in c.algorithm.iter().zip(&c.nodes).rev() {
            match &el.op {
                MxOp::Output(ind) => {
                    for (d, ad) in adj.iter_mut().enumerate() {
                        if let Some(s) = seeds[d][*ind as usize] {
                            accumulate(g, ad, e, s)?;
                        }
                    }
                    continue;
                }
                MxOp::Input(ind) => {
                    for (d, ad) in adj.iter_mut().enumerate() {
                        asens[d][*ind as usize] = ad.remove(&e);
                    }
                    continue;
                }
                MxOp::Const(_) | MxOp::Free(_) => continue,
                _ => {}
            }
            let sp = el.sparsity.clone();
            let node = g.node(e).clone();
            let mut partials: [Option<MxId>; 2] = [None, None];
            for ad in adj.iter_mut() {
                let Some(s) = ad.remove(&e) else {
                    continue;
                };
                match &node {
                    MxNode::Unary(op, x) => {
                        let p = match partials[0] {
                            Some(p) => p,
                            None => *partials[0].insert(partial_unary(g, *op, *x, e)?),
                        };
                        let term = g.mul(p, s)?;
                        accumulate(g, ad, *x, term)?;
                    }
                    MxNode::Binary(op, x, y) => {
                        for (k, v) in [*x, *y].into_iter().enumerate() {
                            let p = match partials[k] {
                                Some(p) => p,
                                None => {
                                    *partials[k].insert(partial_binary(g, *op, k, *x, *y, e)?)
                                }
                            };
                            let mut term = g.mul(p, s)?;
                            if g.sparsity(v).is_scalar() && !sp.is_scalar() {
                                term = g.sum(term);
                            }
                            accumulate(g, ad, v, term)?;
                        }
                    }
                    MxNode::MatMul(x, y) => {
                        let yt = g.transpose(*y);
                        let sx = g.mtimes(s, yt)?;
                        accumulate(g, ad, *x, sx)?;
                        let xt = g.transpose(*x);
                        let sy = g.mtimes(xt, s)?;
                        accumulate(g, ad, *y, sy)?;
                    }
                    MxNode::Gather { args, map, .. } => {
                        for (p, &a) in args.iter().enumerate() {
                            let smap = map
                                .iter()
                                .map(|m| match *m {
                                    Some((q, k)) if q as usize == p => Some(k),
                                    _ => None,
                                })
                                .collect();
                            let sp_a = g.sparsity(a).clone();
                            let term = g.scatter(s, smap, sp_a);
                            accumulate(g, ad, a, term)?;
                        }
                    }
                    MxNode::Scatter { arg, map, .. } => {
                        let gmap = map.iter().map(|t| t.map(|t| (0, t))).collect();
                        let sp_a = g.sparsity(*arg).clone();
                        let term = g.gather(&[s], gmap, sp_a);
                        accumulate(g, ad, *arg, term)?;
                    }
                    MxNode::Call {
                        function,
                        args,
                        output,
                    } => {
                        let f = function.function();
                        let rd = f.reverse_derivative()?;
                        let mut rargs = args.clone();
                        for o in 0..f.n_out() {
                            rargs.push(if o == *output as usize {
                                s
                            } else {
                                let sp_o = f.out_sp[o].clone();
                                g.fill(&sp_o, 0.0)
                            });
                        }
                        for (i, &a) in args.iter().enumerate() {
                            let term = g.call_node(&rd, &rargs, i);
                            accumulate(g, ad, a, term)?;
                        }
                    }
                    MxNode::Lift { value, .. } => accumulate(g, ad, *value, s)?,
                    MxNode::Sym { .. } | MxNode::Const { .. } => {}
                }
            }
        }
        Ok(asens)
    }

    /// Jacobian of output `oind` with respect to input `iind`, as a new
    /// expression in `g`. Layout follows
    /// [`SxFunction::jac`](crate::sx::SxFunction::jac).
    ///
    /// `symmetric` is trusted, not checked: asserting it for a
    /// non-symmetric Jacobian gives wrong entries.
    pub fn jac(
        &self,
        g: &mut MxGraph,
        iind: usize,
        oind: usize,
        compact: bool,
        symmetric: bool,
    ) -> Result<MxId> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        self.check_graph(g)?;
        let jnz = self.dependency_pattern(iind, oind)?;
        let p = plan(&jnz, &self.options, symmetric);
        let (sp_in, sp_out) = (self.in_sp[iind].clone(), self.out_sp[oind].clone());

        let sens: Vec<MxId> = match p.direction {
            Direction::Forward => {
                let mut seeds = Vec::with_capacity(p.sweeps.len());
                for grp in &p.sweeps {
                    let mut dir = vec![None; self.n_in()];
                    dir[iind] = Some(seed(g, &sp_in, grp));
                    seeds.push(dir);
                }
                let fsens = self.forward_sweep(g, &seeds)?;
                fsens
                    .into_iter()
                    .map(|mut d| d.swap_remove(oind).unwrap_or_else(|| g.fill(&sp_out, 0.0)))
                    .collect()
            }
            Direction::Reverse => {
                let mut seeds = Vec::with_capacity(p.sweeps.len());
                for grp in &p.sweeps {
                    let mut dir = vec![None; self.n_out()];
                    dir[oind] = Some(seed(g, &sp_out, grp));
                    seeds.push(dir);
                }
                let asens = self.reverse_sweep(g, &seeds)?;
                asens
                    .into_iter()
                    .map(|mut d| d.swap_remove(iind).unwrap_or_else(|| g.fill(&sp_in, 0.0)))
                    .collect()
            }
        };
        let map = p
            .lookup
            .iter()
            .map(|&(s, k)| Some((s as u32, k as u32)))
            .collect();
        let sp = assembled_pattern(&jnz, &sp_out, &sp_in, compact);
        Ok(g.gather(&sens, map, sp))
    }

    /// Gradient of 1x1 output `oind`, shaped like input `iind`.
    pub fn grad(&self, g: &mut MxGraph, iind: usize, oind: usize) -> Result<MxId> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        self.check_graph(g)?;
        let sp_out = &self.out_sp[oind];
        if sp_out.shape() != (1, 1) {
            let (r, c) = sp_out.shape();
            return Err(shape_mismatch("grad", "1x1 output", format!("{r}x{c}")));
        }
        let mut dir = vec![None; self.n_out()];
        dir[oind] = Some(g.fill(sp_out, 1.0));
        let mut asens = self.reverse_sweep(g, &vec![dir])?;
        Ok(match asens.swap_remove(0).swap_remove(iind) {
            Some(a) => a,
            None => g.fill(&self.in_sp[iind], 0.0),
        })
    }

    /// Derivative of output `oind` along 1x1 input `iind`, shaped like the
    /// output.
    pub fn tang(&self, g: &mut MxGraph, iind: usize, oind: usize) -> Result<MxId> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        self.check_graph(g)?;
        let sp_in = &self.in_sp[iind];
        if sp_in.shape() != (1, 1) {
            let (r, c) = sp_in.shape();
            return Err(shape_mismatch("tang", "1x1 input", format!("{r}x{c}")));
        }
        let mut dir = vec![None; self.n_in()];
        dir[iind] = Some(g.fill(sp_in, 1.0));
        let mut fsens = self.forward_sweep(g, &vec![dir])?;
        Ok(match fsens.swap_remove(0).swap_remove(oind) {
            Some(t) => t,
            None => g.fill(&self.out_sp[oind], 0.0),
        })
    }

    /// Hessian of 1x1 output `oind`: the symmetric Jacobian of the
    /// gradient.
    pub fn hess(&self, g: &mut MxGraph, iind: usize, oind: usize) -> Result<MxId> {
        let gr = self.grad(g, iind, oind)?;
        let gf = MxFunction::new(
            g,
            self.inputs.clone(),
            vec![gr],
            self.options.derived(format!("grad_{}", self.name())),
        )?;
        gf.jac(g, iind, 0, false, true)
    }

    pub fn jacobian(
        &self,
        g: &mut MxGraph,
        iind: usize,
        oind: usize,
        compact: bool,
        symmetric: bool,
    ) -> Result<MxFunction> {
        let j = self.jac(g, iind, oind, compact, symmetric)?;
        MxFunction::new(
            g,
            self.inputs.clone(),
            vec![j],
            self.options.derived(format!("jac_{}", self.name())),
        )
    }
}
