//! Matrix expression graph with structural interning.

use std::collections::HashMap;
use std::sync::Arc;

use skein_sparse::{Matrix, Sparsity};

use crate::error::{shape_mismatch, Error, Result};
use crate::lineage::{GraphId, Lineage};
use crate::mx::node::{FunctionRef, MxId, MxNode};
use crate::ops::{Algebra, BinaryOp, UnaryOp};
use crate::sx::SxFunction;

fn fmt_shape(sp: &Sparsity) -> String {
    format!("{}x{}", sp.nrows(), sp.ncols())
}

/// Sparsity of `op(a, b)` under the broadcasting rules.
fn binary_pattern(op: BinaryOp, sa: &Sparsity, sb: &Sparsity) -> Result<Sparsity> {
    let dense = |sp: &Sparsity| Sparsity::dense(sp.nrows(), sp.ncols());
    if sa.shape() == sb.shape() {
        Ok(if !op.zero_both() {
            dense(sa)
        } else if op.zero_left() && op.zero_right() {
            sa.intersection(sb)
        } else {
            sa.union(sb)
        })
    } else if sa.is_scalar() {
        Ok(if op.zero_right() { sb.clone() } else { dense(sb) })
    } else if sb.is_scalar() {
        Ok(if op.zero_left() { sa.clone() } else { dense(sa) })
    } else {
        Err(shape_mismatch(
            "elementwise operation",
            fmt_shape(sa),
            fmt_shape(sb),
        ))
    }
}

/// Arena-based matrix expression graph.
///
/// Nodes are interned like in the scalar graph, and each one carries a
/// sparsity pattern. Operations whose result shape depends on operand
/// shapes return `Result`.
#[derive(Debug)]
pub struct MxGraph {
    lineage: Lineage,
    nodes: Vec<MxNode>,
    sparsity: Vec<Sparsity>,
    intern: HashMap<MxNode, MxId>,
    names: Vec<String>,
}

impl MxGraph {
    pub fn new() -> Self {
        Self {
            lineage: Lineage::new(),
            nodes: Vec::new(),
            sparsity: Vec::new(),
            intern: HashMap::new(),
            names: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn id(&self) -> GraphId {
        self.lineage.id()
    }

    pub(crate) fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    #[inline]
    pub fn node(&self, id: MxId) -> &MxNode {
        &self.nodes[id.0 as usize]
    }

    pub fn try_node(&self, id: MxId) -> Result<&MxNode> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(Error::UnknownExpression(id.0))
    }

    #[inline]
    pub fn sparsity(&self, id: MxId) -> &Sparsity {
        &self.sparsity[id.0 as usize]
    }

    #[inline]
    pub fn shape(&self, id: MxId) -> (usize, usize) {
        self.sparsity(id).shape()
    }

    pub fn name(&self, id: MxId) -> Option<&str> {
        match self.try_node(id).ok()? {
            MxNode::Sym { serial, .. } => Some(self.names[*serial as usize].as_str()),
            _ => None,
        }
    }

    pub fn is_symbolic(&self, id: MxId) -> bool {
        self.try_node(id).is_ok_and(MxNode::is_symbolic)
    }

    pub(crate) fn insert(&mut self, node: MxNode, sparsity: Sparsity) -> MxId {
        if let Some(&id) = self.intern.get(&node) {
            return id;
        }
        let id = MxId(self.nodes.len() as u32);
        self.nodes.push(node.clone());
        self.sparsity.push(sparsity);
        self.intern.insert(node, id);
        id
    }

    /// Fresh dense symbol.
    pub fn sym(&mut self, name: impl Into<String>, nrows: usize, ncols: usize) -> MxId {
        self.sym_sparse(name, Sparsity::dense(nrows, ncols))
    }

    /// Fresh symbol with the given pattern.
    pub fn sym_sparse(&mut self, name: impl Into<String>, sparsity: Sparsity) -> MxId {
        let serial = self.names.len() as u32;
        self.names.push(name.into());
        self.insert(
            MxNode::Sym {
                serial,
                sparsity: sparsity.clone(),
            },
            sparsity,
        )
    }

    pub fn constant(&mut self, m: &Matrix<f64>) -> MxId {
        let sparsity = m.sparsity().clone();
        let values = m.nonzeros().iter().map(|v| v.to_bits()).collect();
        self.insert(
            MxNode::Const {
                sparsity: sparsity.clone(),
                values,
            },
            sparsity,
        )
    }

    /// 1x1 constant.
    pub fn scalar(&mut self, v: f64) -> MxId {
        self.constant(&Matrix::scalar(v))
    }

    /// Constant with every structural nonzero of `sp` set to `v`.
    pub fn fill(&mut self, sp: &Sparsity, v: f64) -> MxId {
        self.constant(&Matrix::new(sp.clone(), vec![v; sp.nnz()]))
    }

    pub(crate) fn constant_values(&self, id: MxId) -> Option<Vec<f64>> {
        match self.node(id) {
            MxNode::Const { values, .. } => {
                Some(values.iter().map(|&b| f64::from_bits(b)).collect())
            }
            _ => None,
        }
    }

    /// General nonzero gather. Duplicate arguments are merged, an identity
    /// gather returns its argument and an all-zero gather becomes a
    /// constant.
    pub(crate) fn gather(
        &mut self,
        args: &[MxId],
        map: Vec<Option<(u32, u32)>>,
        sparsity: Sparsity,
    ) -> MxId {
        if map.iter().all(Option::is_none) {
            return self.fill(&sparsity, 0.0);
        }
        let mut uniq: Vec<MxId> = Vec::new();
        let mut remap = Vec::with_capacity(args.len());
        for &a in args {
            let pos = match uniq.iter().position(|&u| u == a) {
                Some(p) => p,
                None => {
                    uniq.push(a);
                    uniq.len() - 1
                }
            };
            remap.push(pos as u32);
        }
        // drop arguments no entry refers to
        let mut used = vec![false; uniq.len()];
        for &(p, _) in map.iter().flatten() {
            used[remap[p as usize] as usize] = true;
        }
        let mut compact = vec![0u32; uniq.len()];
        let mut kept = Vec::new();
        for (i, &u) in uniq.iter().enumerate() {
            if used[i] {
                compact[i] = kept.len() as u32;
                kept.push(u);
            }
        }
        let map: Vec<Option<(u32, u32)>> = map
            .into_iter()
            .map(|e| e.map(|(p, k)| (compact[remap[p as usize] as usize], k)))
            .collect();

        if kept.len() == 1
            && *self.sparsity(kept[0]) == sparsity
            && map
                .iter()
                .enumerate()
                .all(|(k, e)| *e == Some((0, k as u32)))
        {
            return kept[0];
        }
        self.insert(
            MxNode::Gather {
                args: kept,
                map,
                sparsity: sparsity.clone(),
            },
            sparsity,
        )
    }

    /// Sum nonzeros of `arg` into the pattern `sparsity`.
    pub(crate) fn scatter(&mut self, arg: MxId, map: Vec<Option<u32>>, sparsity: Sparsity) -> MxId {
        if map.iter().all(Option::is_none) {
            return self.fill(&sparsity, 0.0);
        }
        self.insert(
            MxNode::Scatter {
                arg,
                map,
                sparsity: sparsity.clone(),
            },
            sparsity,
        )
    }

    /// Re-express `a` on another pattern of the same shape: entries the
    /// target lacks are dropped, new ones are zero.
    pub fn project(&mut self, a: MxId, sp: &Sparsity) -> Result<MxId> {
        let src = self.sparsity(a);
        if src.shape() != sp.shape() {
            return Err(shape_mismatch("project", fmt_shape(sp), fmt_shape(src)));
        }
        if src == sp {
            return Ok(a);
        }
        let map = src
            .project_map(sp)
            .into_iter()
            .map(|k| k.map(|k| (0, k as u32)))
            .collect();
        Ok(self.gather(&[a], map, sp.clone()))
    }

    pub fn densify(&mut self, a: MxId) -> MxId {
        let (r, c) = self.shape(a);
        let dense = Sparsity::dense(r, c);
        let map = self
            .sparsity(a)
            .project_map(&dense)
            .into_iter()
            .map(|k| k.map(|k| (0, k as u32)))
            .collect();
        self.gather(&[a], map, dense)
    }

    /// Re-express `a` on `sp`; a 1x1 `a` is repeated into every nonzero.
    pub(crate) fn broadcast(&mut self, a: MxId, sp: &Sparsity) -> Result<MxId> {
        if self.sparsity(a).shape() == sp.shape() {
            return self.project(a, sp);
        }
        if !self.sparsity(a).is_scalar() {
            return Err(shape_mismatch(
                "broadcast",
                fmt_shape(sp),
                fmt_shape(self.sparsity(a)),
            ));
        }
        let s = self.densify(a);
        Ok(self.gather(&[s], vec![Some((0, 0)); sp.nnz()], sp.clone()))
    }

    pub fn unary(&mut self, op: UnaryOp, a: MxId) -> MxId {
        let a = if op.preserves_zero() { a } else { self.densify(a) };
        if let Some(vals) = self.constant_values(a) {
            let sp = self.sparsity(a).clone();
            let folded = vals.into_iter().map(|v| op.apply(v)).collect();
            return self.constant(&Matrix::new(sp, folded));
        }
        let sp = self.sparsity(a).clone();
        self.insert(MxNode::Unary(op, a), sp)
    }

    /// Elementwise binary operation. Operands must have equal shapes, or
    /// one of them must be 1x1.
    pub fn binary(&mut self, op: BinaryOp, a: MxId, b: MxId) -> Result<MxId> {
        let (sa, sb) = (self.sparsity(a).clone(), self.sparsity(b).clone());
        let sp = binary_pattern(op, &sa, &sb)?;
        let same = sa.shape() == sb.shape();
        let a = if same || !sa.is_scalar() {
            self.project(a, &sp)?
        } else {
            self.densify(a)
        };
        let b = if same || !sb.is_scalar() {
            self.project(b, &sp)?
        } else {
            self.densify(b)
        };
        if let (Some(x), Some(y)) = (self.constant_values(a), self.constant_values(b)) {
            let pick = |v: &[f64], k: usize| if v.len() == 1 { v[0] } else { v[k] };
            let folded = (0..sp.nnz())
                .map(|k| op.apply(pick(&x, k), pick(&y, k)))
                .collect();
            return Ok(self.constant(&Matrix::new(sp, folded)));
        }
        Ok(self.insert(MxNode::Binary(op, a, b), sp))
    }

    pub fn add(&mut self, a: MxId, b: MxId) -> Result<MxId> {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: MxId, b: MxId) -> Result<MxId> {
        self.binary(BinaryOp::Sub, a, b)
    }

    /// Elementwise product.
    pub fn mul(&mut self, a: MxId, b: MxId) -> Result<MxId> {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: MxId, b: MxId) -> Result<MxId> {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn pow(&mut self, a: MxId, b: MxId) -> Result<MxId> {
        self.binary(BinaryOp::Pow, a, b)
    }

    pub fn neg(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Neg, a)
    }

    pub fn sqrt(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Sqrt, a)
    }

    pub fn sin(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Sin, a)
    }

    pub fn cos(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Cos, a)
    }

    pub fn tan(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Tan, a)
    }

    pub fn exp(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Exp, a)
    }

    pub fn log(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Log, a)
    }

    pub fn tanh(&mut self, a: MxId) -> MxId {
        self.unary(UnaryOp::Tanh, a)
    }

    /// Matrix product.
    pub fn mtimes(&mut self, a: MxId, b: MxId) -> Result<MxId> {
        let (sa, sb) = (self.sparsity(a), self.sparsity(b));
        if sa.ncols() != sb.nrows() {
            return Err(shape_mismatch(
                "mtimes",
                format!("{} rows", sa.ncols()),
                fmt_shape(sb),
            ));
        }
        let sp = sa.mtimes(sb);
        Ok(self.insert(MxNode::MatMul(a, b), sp))
    }

    pub fn transpose(&mut self, a: MxId) -> MxId {
        let (t, src) = self.sparsity(a).transpose();
        let map = src.into_iter().map(|k| Some((0, k as u32))).collect();
        self.gather(&[a], map, t)
    }

    /// Stack blocks with equal column counts on top of each other.
    pub fn vertcat(&mut self, parts: &[MxId]) -> Result<MxId> {
        let sps: Vec<Sparsity> = parts.iter().map(|&p| self.sparsity(p).clone()).collect();
        let Some(first) = sps.first() else {
            return Ok(self.fill(&Sparsity::empty(0, 0), 0.0));
        };
        let ncols = first.ncols();
        if let Some(bad) = sps.iter().find(|s| s.ncols() != ncols) {
            return Err(shape_mismatch(
                "vertcat",
                format!("{ncols} columns"),
                fmt_shape(bad),
            ));
        }
        let sp = Sparsity::vertcat(&sps.iter().collect::<Vec<_>>());
        let mut map = Vec::with_capacity(sp.nnz());
        for j in 0..ncols {
            for (p, s) in sps.iter().enumerate() {
                for k in s.colind()[j]..s.colind()[j + 1] {
                    map.push(Some((p as u32, k as u32)));
                }
            }
        }
        Ok(self.gather(parts, map, sp))
    }

    /// Place blocks with equal row counts side by side.
    pub fn horzcat(&mut self, parts: &[MxId]) -> Result<MxId> {
        let sps: Vec<Sparsity> = parts.iter().map(|&p| self.sparsity(p).clone()).collect();
        let Some(first) = sps.first() else {
            return Ok(self.fill(&Sparsity::empty(0, 0), 0.0));
        };
        let nrows = first.nrows();
        if let Some(bad) = sps.iter().find(|s| s.nrows() != nrows) {
            return Err(shape_mismatch(
                "horzcat",
                format!("{nrows} rows"),
                fmt_shape(bad),
            ));
        }
        let sp = Sparsity::horzcat(&sps.iter().collect::<Vec<_>>());
        let map = sps
            .iter()
            .enumerate()
            .flat_map(|(p, s)| (0..s.nnz()).map(move |k| Some((p as u32, k as u32))))
            .collect();
        Ok(self.gather(parts, map, sp))
    }

    /// Element `(r, c)` as a 1x1 expression (zero if structurally absent).
    pub fn element(&mut self, a: MxId, r: usize, c: usize) -> Result<MxId> {
        let sp = self.sparsity(a);
        if r >= sp.nrows() || c >= sp.ncols() {
            return Err(shape_mismatch(
                "element",
                format!("index within {}", fmt_shape(sp)),
                format!("({r}, {c})"),
            ));
        }
        let entry = sp.get_nz(r, c).map(|k| (0, k as u32));
        Ok(self.gather(&[a], vec![entry], Sparsity::scalar()))
    }

    /// Column vector of selected nonzeros of `a`.
    pub fn nonzeros(&mut self, a: MxId, indices: &[usize]) -> Result<MxId> {
        let nnz = self.sparsity(a).nnz();
        if let Some(&bad) = indices.iter().find(|&&k| k >= nnz) {
            return Err(shape_mismatch(
                "nonzeros",
                format!("index below {nnz}"),
                bad,
            ));
        }
        let map = indices.iter().map(|&k| Some((0, k as u32))).collect();
        Ok(self.gather(&[a], map, Sparsity::column(indices.len())))
    }

    /// Sum of all nonzeros, as a 1x1 expression.
    pub fn sum(&mut self, a: MxId) -> MxId {
        let map = vec![Some(0); self.sparsity(a).nnz()];
        self.scatter(a, map, Sparsity::scalar())
    }

    /// Mark `value` as an implicit variable with initial guess `init`.
    pub fn lift(&mut self, value: MxId, init: MxId) -> Result<MxId> {
        let sp = self.sparsity(value).clone();
        if self.shape(init) != sp.shape() {
            return Err(shape_mismatch(
                "lift",
                fmt_shape(&sp),
                fmt_shape(self.sparsity(init)),
            ));
        }
        let init = self.project(init, &sp)?;
        Ok(self.insert(MxNode::Lift { value, init }, sp))
    }

    /// Embed a scalar function: one expression per output of `f`.
    pub fn call(&mut self, f: &Arc<SxFunction>, args: &[MxId]) -> Result<Vec<MxId>> {
        let args = self.call_args(f, args)?;
        Ok((0..f.n_out())
            .map(|o| self.call_node(f, &args, o))
            .collect())
    }

    /// Projected call arguments, after checking `f` can be embedded.
    pub(crate) fn call_args(&mut self, f: &Arc<SxFunction>, args: &[MxId]) -> Result<Vec<MxId>> {
        f.compiled()?;
        f.no_free_vars()?;
        if args.len() != f.n_in() {
            return Err(shape_mismatch(
                "call",
                format!("{} arguments", f.n_in()),
                args.len(),
            ));
        }
        args.iter()
            .zip(&f.in_sp)
            .map(|(&a, want)| {
                if self.shape(a) != want.shape() {
                    let got = fmt_shape(self.sparsity(a));
                    return Err(shape_mismatch("call", fmt_shape(want), got));
                }
                self.project(a, want)
            })
            .collect()
    }

    pub(crate) fn call_node(&mut self, f: &Arc<SxFunction>, args: &[MxId], output: usize) -> MxId {
        let sp = f.out_sp[output].clone();
        self.insert(
            MxNode::Call {
                function: FunctionRef(f.clone()),
                args: args.to_vec(),
                output: output as u32,
            },
            sp,
        )
    }
}

impl Default for MxGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning forks the graph, see [`SxGraph`](crate::sx::SxGraph).
impl Clone for MxGraph {
    fn clone(&self) -> Self {
        Self {
            lineage: self.lineage.fork(self.nodes.len()),
            nodes: self.nodes.clone(),
            sparsity: self.sparsity.clone(),
            intern: self.intern.clone(),
            names: self.names.clone(),
        }
    }
}

/// Elementwise algebra over matrix expressions, used to build partial
/// derivatives. The first shape error is kept and reported by `finish`.
pub(crate) struct Elementwise<'a> {
    pub graph: &'a mut MxGraph,
    error: Option<Error>,
}

impl<'a> Elementwise<'a> {
    pub fn new(graph: &'a mut MxGraph) -> Self {
        Self { graph, error: None }
    }

    pub fn finish(self) -> Result<()> {
        self.error.map_or(Ok(()), Err)
    }
}

impl Algebra for Elementwise<'_> {
    type Value = MxId;

    fn constant(&mut self, v: f64) -> MxId {
        self.graph.scalar(v)
    }

    fn unary(&mut self, op: UnaryOp, x: MxId) -> MxId {
        self.graph.unary(op, x)
    }

    fn binary(&mut self, op: BinaryOp, x: MxId, y: MxId) -> MxId {
        match self.graph.binary(op, x, y) {
            Ok(id) => id,
            Err(e) => {
                self.error.get_or_insert(e);
                x
            }
        }
    }

    fn is_zero(&self, _v: MxId) -> bool {
        false
    }
}
