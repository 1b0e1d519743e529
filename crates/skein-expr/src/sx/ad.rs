//! Forward and reverse sweeps over scalar algorithms.
//!
//! Sweeps are generic over [`Algebra`]: replayed into an [`SxGraph`] they
//! build derivative expressions, over `f64` they compute numbers. Several
//! directions share one pass over the algorithm.

use std::sync::Arc;

use skein_sparse::{Matrix, Sparsity};

use crate::error::{check_input, check_output, shape_mismatch, Result};
use crate::jacobian::{assembled_pattern, plan, seed_mask, Direction};
use crate::ops::{binary_partial, unary_partial, Algebra, BinaryOp};
use crate::sx::algorithm::{SxCompiled, SxOp};
use crate::sx::function::SxFunction;
use crate::sx::graph::{SxGraph, SxMatrix};
use crate::sx::node::ExprId;

/// One fresh symbolic matrix per pattern, named `{prefix}{i}`.
fn fresh_like(g: &mut SxGraph, prefix: &str, like: &[Sparsity]) -> Vec<SxMatrix> {
    like.iter()
        .enumerate()
        .map(|(i, sp)| g.sym_matrix(&format!("{prefix}{i}"), sp.clone()))
        .collect()
}

/// Per direction, per input or output, per nonzero.
pub(crate) type Seeds<V> = Vec<Vec<Vec<V>>>;

fn accumulate<A: Algebra>(alg: &mut A, acc: Option<A::Value>, term: A::Value) -> A::Value {
    match acc {
        Some(s) => alg.binary(BinaryOp::Add, s, term),
        None => term,
    }
}

impl SxCompiled {
    /// Forward sweep: primal outputs and one output tangent per seed
    /// direction.
    pub(crate) fn forward<A: Algebra>(
        &self,
        alg: &mut A,
        args: &[&[A::Value]],
        free: &[A::Value],
        seeds: &Seeds<A::Value>,
        out_nnz: &[usize],
    ) -> (Vec<Vec<A::Value>>, Seeds<A::Value>) {
        let ndir = seeds.len();
        let zero = alg.constant(0.0);
        let mut w = vec![zero; self.work_size];
        let mut t = vec![vec![zero; self.work_size]; ndir];
        let mut out: Vec<Vec<A::Value>> = out_nnz.iter().map(|&n| vec![zero; n]).collect();
        let mut fsens: Seeds<A::Value> = vec![out.clone(); ndir];

        for el in &self.algorithm {
            let [a, b] = el.arg.map(|s| s as usize);
            let res = el.res as usize;
            match el.op {
                SxOp::Input { ind, nz } => {
                    let (ind, nz) = (ind as usize, nz as usize);
                    w[res] = args[ind][nz];
                    for d in 0..ndir {
                        t[d][res] = seeds[d][ind][nz];
                    }
                }
                SxOp::Output { ind, nz } => {
                    let (ind, nz) = (ind as usize, nz as usize);
                    out[ind][nz] = w[a];
                    for d in 0..ndir {
                        fsens[d][ind][nz] = t[d][a];
                    }
                }
                SxOp::Const(v) => {
                    w[res] = alg.constant(v);
                    for td in t.iter_mut() {
                        td[res] = zero;
                    }
                }
                SxOp::Free(k) => {
                    w[res] = free[k as usize];
                    for td in t.iter_mut() {
                        td[res] = zero;
                    }
                }
                SxOp::Unary(op) => {
                    let x = w[a];
                    let f = alg.unary(op, x);
                    let mut partial = None;
                    for td in t.iter_mut() {
                        let ta = td[a];
                        td[res] = if alg.is_zero(ta) {
                            zero
                        } else {
                            let p = *partial.get_or_insert_with(|| unary_partial(alg, op, x, f));
                            alg.binary(BinaryOp::Mul, p, ta)
                        };
                    }
                    w[res] = f;
                }
                SxOp::Binary(op) => {
                    let (x, y) = (w[a], w[b]);
                    let f = alg.binary(op, x, y);
                    let mut partials = [None, None];
                    for td in t.iter_mut() {
                        let mut acc = None;
                        for (k, slot) in [a, b].into_iter().enumerate() {
                            let ts = td[slot];
                            if alg.is_zero(ts) {
                                continue;
                            }
                            let p = *partials[k]
                                .get_or_insert_with(|| binary_partial(alg, op, k, x, y, f));
                            let term = alg.binary(BinaryOp::Mul, p, ts);
                            acc = Some(accumulate(alg, acc, term));
                        }
                        td[res] = acc.unwrap_or(zero);
                    }
                    w[res] = f;
                }
            }
        }
        (out, fsens)
    }

    /// Reverse sweep: primal outputs and one input adjoint per output
    /// seed direction.
    pub(crate) fn reverse<A: Algebra>(
        &self,
        alg: &mut A,
        args: &[&[A::Value]],
        free: &[A::Value],
        aseeds: &Seeds<A::Value>,
        in_nnz: &[usize],
        out_nnz: &[usize],
    ) -> (Vec<Vec<A::Value>>, Seeds<A::Value>) {
        let ndir = aseeds.len();
        let zero = alg.constant(0.0);

        // Forward pass, keeping operands and result of every instruction.
        let mut w = vec![zero; self.work_size];
        let mut out: Vec<Vec<A::Value>> = out_nnz.iter().map(|&n| vec![zero; n]).collect();
        let mut prim = Vec::with_capacity(self.algorithm.len());
        for el in &self.algorithm {
            let [a, b] = el.arg.map(|s| s as usize);
            let res = el.res as usize;
            let mut rec = [zero; 3];
            match el.op {
                SxOp::Input { ind, nz } => w[res] = args[ind as usize][nz as usize],
                SxOp::Output { ind, nz } => out[ind as usize][nz as usize] = w[a],
                SxOp::Const(v) => w[res] = alg.constant(v),
                SxOp::Free(k) => w[res] = free[k as usize],
                SxOp::Unary(op) => {
                    rec[0] = w[a];
                    w[res] = alg.unary(op, w[a]);
                    rec[2] = w[res];
                }
                SxOp::Binary(op) => {
                    rec[0] = w[a];
                    rec[1] = w[b];
                    w[res] = alg.binary(op, w[a], w[b]);
                    rec[2] = w[res];
                }
            }
            prim.push(rec);
        }

        let mut adj = vec![vec![zero; self.work_size]; ndir];
        let mut asens: Seeds<A::Value> =
            vec![in_nnz.iter().map(|&n| vec![zero; n]).collect(); ndir];
        for (el, &[x, y, f]) in self.algorithm.iter().zip(&prim).rev() {
            let [a, b] = el.arg.map(|s| s as usize);
            let res = el.res as usize;
            match el.op {
                SxOp::Output { ind, nz } => {
                    for d in 0..ndir {
                        let s = aseeds[d][ind as usize][nz as usize];
                        if !alg.is_zero(s) {
                            adj[d][a] = alg.binary(BinaryOp::Add, adj[d][a], s);
                        }
                    }
                }
                SxOp::Input { ind, nz } => {
                    for d in 0..ndir {
                        asens[d][ind as usize][nz as usize] =
                            std::mem::replace(&mut adj[d][res], zero);
                    }
                }
                SxOp::Const(_) | SxOp::Free(_) => {
                    for ad in adj.iter_mut() {
                        ad[res] = zero;
                    }
                }
                SxOp::Unary(op) => {
                    let mut partial = None;
                    for ad in adj.iter_mut() {
                        let s = std::mem::replace(&mut ad[res], zero);
                        if alg.is_zero(s) {
                            continue;
                        }
                        let p = *partial.get_or_insert_with(|| unary_partial(alg, op, x, f));
                        let term = alg.binary(BinaryOp::Mul, p, s);
                        ad[a] = alg.binary(BinaryOp::Add, ad[a], term);
                    }
                }
                SxOp::Binary(op) => {
                    let mut partials = [None, None];
                    for ad in adj.iter_mut() {
                        let s = std::mem::replace(&mut ad[res], zero);
                        if alg.is_zero(s) {
                            continue;
                        }
                        for (k, slot) in [a, b].into_iter().enumerate() {
                            let p = *partials[k]
                                .get_or_insert_with(|| binary_partial(alg, op, k, x, y, f));
                            let term = alg.binary(BinaryOp::Mul, p, s);
                            ad[slot] = alg.binary(BinaryOp::Add, ad[slot], term);
                        }
                    }
                }
            }
        }
        (out, asens)
    }
}

/// One seed direction: ONE where `mask` is set on argument `which`, ZERO
/// everywhere else.
fn unit_seeds(nnz: &[usize], which: usize, mask: &[bool]) -> Vec<Vec<ExprId>> {
    nnz.iter()
        .enumerate()
        .map(|(i, &n)| {
            if i == which {
                mask.iter()
                    .map(|&on| if on { ExprId::ONE } else { ExprId::ZERO })
                    .collect()
            } else {
                vec![ExprId::ZERO; n]
            }
        })
        .collect()
}

impl SxFunction {
    /// Symbolic arguments for sweeps in the function's own graph.
    fn own_args(&self) -> Vec<&[ExprId]> {
        self.inputs.iter().map(|m| m.nonzeros()).collect()
    }

    /// Jacobian of output `oind` with respect to input `iind`, as a new
    /// matrix expression in `g`.
    ///
    /// Rows follow the output's column-major linear indices and columns
    /// the input's; with `compact` they follow nonzeros instead.
    /// `symmetric` asserts the result is symmetric (Hessians), enabling
    /// star-colored seeding.
    pub fn jac(
        &self,
        g: &mut SxGraph,
        iind: usize,
        oind: usize,
        compact: bool,
        symmetric: bool,
    ) -> Result<SxMatrix> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        self.check_graph(g)?;
        self.symbolic()?;
        let c = self.compiled()?;

        let jnz = self.dependency_pattern(iind, oind)?;
        let p = plan(&jnz, &self.options, symmetric);
        let (in_nnz, out_nnz) = (self.in_nnz(), self.out_nnz());
        let args = self.own_args();

        let sens: Vec<Vec<ExprId>> = match p.direction {
            Direction::Forward => {
                let seeds: Seeds<ExprId> = p
                    .sweeps
                    .iter()
                    .map(|grp| unit_seeds(&in_nnz, iind, &seed_mask(in_nnz[iind], grp)))
                    .collect();
                let (_, fsens) = c.forward(g, &args, &c.free_vars, &seeds, &out_nnz);
                fsens.into_iter().map(|mut d| d.swap_remove(oind)).collect()
            }
            Direction::Reverse => {
                let seeds: Seeds<ExprId> = p
                    .sweeps
                    .iter()
                    .map(|grp| unit_seeds(&out_nnz, oind, &seed_mask(out_nnz[oind], grp)))
                    .collect();
                let (_, asens) = c.reverse(g, &args, &c.free_vars, &seeds, &in_nnz, &out_nnz);
                asens.into_iter().map(|mut d| d.swap_remove(iind)).collect()
            }
        };
        let nz = p.lookup.iter().map(|&(s, k)| sens[s][k]).collect();
        let sp = assembled_pattern(&jnz, &self.out_sp[oind], &self.in_sp[iind], compact);
        Ok(Matrix::new(sp, nz))
    }

    /// Gradient of scalar output `oind`, shaped like input `iind`.
    pub fn grad(&self, g: &mut SxGraph, iind: usize, oind: usize) -> Result<SxMatrix> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        self.check_graph(g)?;
        self.symbolic()?;
        let out = &self.out_sp[oind];
        if out.shape() != (1, 1) {
            let (r, c) = out.shape();
            return Err(shape_mismatch("grad", "1x1 output", format!("{r}x{c}")));
        }
        let c = self.compiled()?;
        let (in_nnz, out_nnz) = (self.in_nnz(), self.out_nnz());
        let seeds = vec![unit_seeds(&out_nnz, oind, &vec![true; out_nnz[oind]])];
        let (_, mut asens) =
            c.reverse(g, &self.own_args(), &c.free_vars, &seeds, &in_nnz, &out_nnz);
        let nz = asens.swap_remove(0).swap_remove(iind);
        Ok(Matrix::new(self.in_sp[iind].clone(), nz))
    }

    /// Derivative of output `oind` along scalar input `iind`, shaped like
    /// the output.
    pub fn tang(&self, g: &mut SxGraph, iind: usize, oind: usize) -> Result<SxMatrix> {
        check_input(iind, self.n_in())?;
        check_output(oind, self.n_out())?;
        self.check_graph(g)?;
        self.symbolic()?;
        let inp = &self.in_sp[iind];
        if inp.shape() != (1, 1) {
            let (r, c) = inp.shape();
            return Err(shape_mismatch("tang", "1x1 input", format!("{r}x{c}")));
        }
        let c = self.compiled()?;
        let (in_nnz, out_nnz) = (self.in_nnz(), self.out_nnz());
        let seeds = vec![unit_seeds(&in_nnz, iind, &vec![true; in_nnz[iind]])];
        let (_, mut fsens) = c.forward(g, &self.own_args(), &c.free_vars, &seeds, &out_nnz);
        let nz = fsens.swap_remove(0).swap_remove(oind);
        Ok(Matrix::new(self.out_sp[oind].clone(), nz))
    }

    /// Hessian of scalar output `oind` with respect to input `iind`:
    /// the symmetric Jacobian of the gradient.
    pub fn hess(&self, g: &mut SxGraph, iind: usize, oind: usize) -> Result<SxMatrix> {
        let gr = self.grad(g, iind, oind)?;
        let gf = SxFunction::new(
            g,
            self.inputs.clone(),
            vec![gr],
            self.options.derived(format!("grad_{}", self.name())),
        )?;
        gf.jac(g, iind, 0, false, true)
    }

    /// A new function with the same inputs and the Jacobian as its only
    /// output.
    pub fn jacobian(
        &self,
        g: &mut SxGraph,
        iind: usize,
        oind: usize,
        compact: bool,
        symmetric: bool,
    ) -> Result<SxFunction> {
        let j = self.jac(g, iind, oind, compact, symmetric)?;
        SxFunction::new(
            g,
            self.inputs.clone(),
            vec![j],
            self.options.derived(format!("jac_{}", self.name())),
        )
    }

    /// Standalone forward-derivative function.
    ///
    /// Inputs are the original inputs followed by one tangent per input;
    /// outputs are the output tangents. Built once and cached.
    pub fn forward_derivative(&self) -> Result<Arc<SxFunction>> {
        if let Some(f) = self.fwd.get() {
            return Ok(f.clone());
        }
        let c = self.compiled()?;
        self.no_free_vars()?;
        let mut g = SxGraph::new();
        let xs = fresh_like(&mut g, "x", &self.in_sp);
        let ts = fresh_like(&mut g, "t", &self.in_sp);
        let args: Vec<&[ExprId]> = xs.iter().map(|m| m.nonzeros()).collect();
        let seeds = vec![ts.iter().map(|m| m.nonzeros().to_vec()).collect()];
        let (_, mut fsens) = c.forward(&mut g, &args, &[], &seeds, &self.out_nnz());
        let outs = self.wrap_outputs(fsens.swap_remove(0));
        let f = self.standalone_function(g, [xs, ts].concat(), outs, "fwd")?;
        Ok(self.fwd.get_or_init(|| f).clone())
    }

    /// Standalone reverse-derivative function.
    ///
    /// Inputs are the original inputs followed by one adjoint seed per
    /// output; outputs are the input adjoints. Built once and cached.
    pub fn reverse_derivative(&self) -> Result<Arc<SxFunction>> {
        if let Some(f) = self.rev.get() {
            return Ok(f.clone());
        }
        let c = self.compiled()?;
        self.no_free_vars()?;
        let mut g = SxGraph::new();
        let xs = fresh_like(&mut g, "x", &self.in_sp);
        let bars = fresh_like(&mut g, "a", &self.out_sp);
        let args: Vec<&[ExprId]> = xs.iter().map(|m| m.nonzeros()).collect();
        let seeds = vec![bars.iter().map(|m| m.nonzeros().to_vec()).collect()];
        let (_, mut asens) =
            c.reverse(&mut g, &args, &[], &seeds, &self.in_nnz(), &self.out_nnz());
        let outs = asens
            .swap_remove(0)
            .into_iter()
            .zip(&self.in_sp)
            .map(|(nz, sp)| Matrix::new(sp.clone(), nz))
            .collect();
        let f = self.standalone_function(g, [xs, bars].concat(), outs, "rev")?;
        Ok(self.rev.get_or_init(|| f).clone())
    }

    fn standalone_function(
        &self,
        g: SxGraph,
        inputs: Vec<SxMatrix>,
        outputs: Vec<SxMatrix>,
        prefix: &str,
    ) -> Result<Arc<SxFunction>> {
        let mut f = SxFunction::new(
            &g,
            inputs,
            outputs,
            self.options.derived(format!("{prefix}_{}", self.name())),
        )?;
        f.standalone = Some(Arc::new(g));
        Ok(Arc::new(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ops::F64Algebra;
    use crate::options::{AdMode, FunctionOptions};

    /// f(x) = [x0 * x1, sin(x0), exp(x2)]
    fn vector_fn() -> (SxGraph, SxFunction) {
        let mut g = SxGraph::new();
        let x = g.sym_column("x", 3);
        let [x0, x1, x2] = [x.nonzeros()[0], x.nonzeros()[1], x.nonzeros()[2]];
        let a = g.mul(x0, x1);
        let b = g.sin(x0);
        let c = g.exp(x2);
        let f = SxFunction::new(
            &g,
            vec![x],
            vec![Matrix::column(vec![a, b, c])],
            FunctionOptions::new("f"),
        )
        .unwrap();
        (g, f)
    }

    fn eval_matrix(g: &SxGraph, f: &SxFunction, m: &SxMatrix, x: &[f64]) -> Matrix<f64> {
        let jf = SxFunction::new(
            g,
            f.inputs().to_vec(),
            vec![m.clone()],
            FunctionOptions::default(),
        )
        .unwrap();
        jf.eval(&[Matrix::column(x.to_vec())]).unwrap().remove(0)
    }

    #[test]
    fn jacobian_pattern_and_values() {
        let (mut g, f) = vector_fn();
        let j = f.jac(&mut g, 0, 0, false, false).unwrap();
        assert_eq!(j.shape(), (3, 3));
        assert_eq!(j.nnz(), 4);
        let x = [0.5, 2.0, -1.0];
        let v = eval_matrix(&g, &f, &j, &x);
        assert!((v.at(0, 0) - 2.0).abs() < 1e-12);
        assert!((v.at(0, 1) - 0.5).abs() < 1e-12);
        assert!((v.at(1, 0) - 0.5f64.cos()).abs() < 1e-12);
        assert!((v.at(2, 2) - (-1f64).exp()).abs() < 1e-12);
        assert!(v.get(1, 1).is_none());
    }

    #[test]
    fn forward_and_reverse_agree() {
        let (mut g, f) = vector_fn();
        let mut fwd = f.clone();
        fwd.options = fwd.options.clone().ad_mode(AdMode::Forward);
        let mut rev = f.clone();
        rev.options = rev.options.clone().ad_mode(AdMode::Reverse);
        let jf = fwd.jac(&mut g, 0, 0, false, false).unwrap();
        let jr = rev.jac(&mut g, 0, 0, false, false).unwrap();
        // same interned expressions
        assert_eq!(jf, jr);
    }

    #[test]
    fn gradient_requires_scalar_output() {
        let (mut g, f) = vector_fn();
        assert!(matches!(
            f.grad(&mut g, 0, 0),
            Err(Error::ShapeMismatch { context: "grad", .. })
        ));
    }

    #[test]
    fn tangent_requires_scalar_input() {
        let (mut g, f) = vector_fn();
        assert!(matches!(
            f.tang(&mut g, 0, 0),
            Err(Error::ShapeMismatch { context: "tang", .. })
        ));
    }

    #[test]
    fn tangent_of_scalar_input() {
        let mut g = SxGraph::new();
        let t = g.sym("t");
        let s = g.sin(t);
        let c = g.cos(t);
        let f = SxFunction::new(
            &g,
            vec![Matrix::scalar(t)],
            vec![Matrix::column(vec![s, c])],
            FunctionOptions::default(),
        )
        .unwrap();
        let d = f.tang(&mut g, 0, 0).unwrap();
        assert_eq!(g.fmt_expr(d.nonzeros()[0]), "cos(t)");
        assert_eq!(g.fmt_expr(d.nonzeros()[1]), "(-sin(t))");
    }

    #[test]
    fn hessian_is_symmetric() {
        let mut g = SxGraph::new();
        let x = g.sym_column("x", 2);
        let [a, b] = [x.nonzeros()[0], x.nonzeros()[1]];
        let ab = g.mul(a, b);
        let e = g.exp(a);
        let f = g.mul(ab, e);
        let func = SxFunction::new(&g, vec![x], vec![Matrix::scalar(f)], FunctionOptions::default())
            .unwrap();
        let h = func.hess(&mut g, 0, 0).unwrap();
        assert_eq!(h.shape(), (2, 2));
        let v = eval_matrix(&g, &func, &h, &[0.3, 1.7]);
        assert!((v.at(0, 1) - v.at(1, 0)).abs() < 1e-12);
        // d2/da2 (a b e^a) = b e^a (a + 2)
        let want = 1.7 * 0.3f64.exp() * 2.3;
        assert!((v.at(0, 0) - want).abs() < 1e-12);
    }

    #[test]
    fn numeric_sweeps_match() {
        let (_, f) = vector_fn();
        let c = f.compiled().unwrap();
        let x = [0.5, 2.0, -1.0];
        let seeds = vec![vec![vec![1.0, 0.0, 0.0]]];
        let (_, fs) = c.forward(&mut F64Algebra, &[&x[..]], &[], &seeds, &[3]);
        let aseeds = vec![vec![vec![0.0, 1.0, 0.0]]];
        let (_, as_) = c.reverse(&mut F64Algebra, &[&x[..]], &[], &aseeds, &[3], &[3]);
        // d f1 / d x0 both ways
        assert!((fs[0][0][1] - as_[0][0][0]).abs() < 1e-15);
    }

    #[test]
    fn derivative_functions_are_cached() {
        let (_, f) = vector_fn();
        let d1 = f.forward_derivative().unwrap();
        let d2 = f.forward_derivative().unwrap();
        assert!(Arc::ptr_eq(&d1, &d2));
        assert_eq!(d1.n_in(), 2);
        assert_eq!(d1.n_out(), 1);

        let r = f.reverse_derivative().unwrap();
        assert_eq!(r.n_in(), 2);
        let x = Matrix::column(vec![0.5, 2.0, -1.0]);
        let bar = Matrix::column(vec![1.0, 0.0, 0.0]);
        let out = r.eval(&[x, bar]).unwrap();
        // adjoint of x0*x1 seeded on row 0: (x1, x0, 0)
        assert_eq!(out[0].nonzeros(), &[2.0, 0.5, 0.0]);
        assert!(r.standalone_graph().is_some());
    }

    #[test]
    fn jacobian_function() {
        let (mut g, f) = vector_fn();
        let jf = f.jacobian(&mut g, 0, 0, true, false).unwrap();
        assert_eq!(jf.name(), "jac_f");
        assert_eq!(jf.output_sparsity(0).unwrap(), &f.dependency_pattern(0, 0).unwrap());
    }
}
