//! Scalar expression graph with structural interning (automatic CSE).

use std::collections::HashMap;

use skein_sparse::{Matrix, Sparsity};

use crate::error::{Error, Result};
use crate::lineage::{GraphId, Lineage};
use crate::ops::{Algebra, BinaryOp, UnaryOp};
use crate::sx::node::{ExprId, Node};

/// Sparse matrix of scalar expressions.
pub type SxMatrix = Matrix<ExprId>;

/// Arena-based scalar expression graph with structural interning.
///
/// Identical subexpressions always return the same `ExprId`. Builders also
/// fold literals and drop trivial identities (`x + 0`, `x * 1`, `x * 0`,
/// `-(-x)`), so derivative sweeps never grow the graph with dead zeros.
#[derive(Debug)]
pub struct SxGraph {
    lineage: Lineage,
    nodes: Vec<Node>,
    intern: HashMap<Node, ExprId>,
    /// Symbol names, indexed by symbol serial.
    names: Vec<String>,
}

impl SxGraph {
    /// Create a new graph pre-populated with ZERO, ONE, TWO.
    pub fn new() -> Self {
        let mut g = Self {
            lineage: Lineage::new(),
            nodes: Vec::new(),
            intern: HashMap::new(),
            names: Vec::new(),
        };
        let z = g.insert(Node::lit(0.0));
        debug_assert_eq!(z, ExprId::ZERO);
        let o = g.insert(Node::lit(1.0));
        debug_assert_eq!(o, ExprId::ONE);
        let t = g.insert(Node::lit(2.0));
        debug_assert_eq!(t, ExprId::TWO);
        g
    }

    /// Total number of nodes in the graph.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty (it never is after construction).
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

    /// Look up the node for an ExprId.
    #[inline]
    pub fn node(&self, id: ExprId) -> Node {
        self.nodes[id.0 as usize]
    }

    /// Like [`node`](Self::node), for handles that may come from elsewhere.
    pub fn try_node(&self, id: ExprId) -> Result<Node> {
        self.nodes
            .get(id.0 as usize)
            .copied()
            .ok_or(Error::UnknownExpression(id.0))
    }

    /// Name of a symbol, `None` for any other node.
    pub fn name(&self, id: ExprId) -> Option<&str> {
        match self.try_node(id).ok()? {
            Node::Sym(serial) => Some(self.names[serial as usize].as_str()),
            _ => None,
        }
    }

    pub fn is_symbolic(&self, id: ExprId) -> bool {
        self.try_node(id).is_ok_and(|n| n.is_symbolic())
    }

    /// Literal value of a node, if it is one.
    #[inline]
    pub fn literal(&self, id: ExprId) -> Option<f64> {
        self.node(id).as_f64()
    }

    fn insert(&mut self, node: Node) -> ExprId {
        if let Some(&id) = self.intern.get(&node) {
            return id;
        }
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.intern.insert(node, id);
        id
    }

    /// Create a fresh symbol. Symbols are never interned together, even
    /// under the same name.
    pub fn sym(&mut self, name: impl Into<String>) -> ExprId {
        let serial = self.names.len() as u32;
        self.names.push(name.into());
        self.insert(Node::Sym(serial))
    }

    /// Matrix of fresh symbols `name_0, name_1, ...`, one per nonzero.
    pub fn sym_matrix(&mut self, name: &str, sparsity: Sparsity) -> SxMatrix {
        let nz = (0..sparsity.nnz())
            .map(|k| self.sym(format!("{name}_{k}")))
            .collect();
        Matrix::new(sparsity, nz)
    }

    /// Dense column of fresh symbols.
    pub fn sym_column(&mut self, name: &str, n: usize) -> SxMatrix {
        self.sym_matrix(name, Sparsity::column(n))
    }

    /// Create a literal node.
    #[inline]
    pub fn lit(&mut self, v: f64) -> ExprId {
        self.insert(Node::lit(v))
    }

    pub fn unary(&mut self, op: UnaryOp, a: ExprId) -> ExprId {
        if let Some(x) = self.literal(a) {
            return self.lit(op.apply(x));
        }
        if let (UnaryOp::Neg, Node::Unary(UnaryOp::Neg, inner)) = (op, self.node(a)) {
            return inner;
        }
        self.insert(Node::Unary(op, a))
    }

    pub fn binary(&mut self, op: BinaryOp, a: ExprId, b: ExprId) -> ExprId {
        if let (Some(x), Some(y)) = (self.literal(a), self.literal(b)) {
            return self.lit(op.apply(x, y));
        }
        let (zero, one) = (ExprId::ZERO, ExprId::ONE);
        match op {
            BinaryOp::Add if a == zero => return b,
            BinaryOp::Add if b == zero => return a,
            BinaryOp::Sub if b == zero => return a,
            BinaryOp::Sub if a == zero => return self.unary(UnaryOp::Neg, b),
            BinaryOp::Sub if a == b => return zero,
            BinaryOp::Mul if a == zero || b == zero => return zero,
            BinaryOp::Mul if a == one => return b,
            BinaryOp::Mul if b == one => return a,
            BinaryOp::Div if a == zero => return zero,
            BinaryOp::Div if b == one => return a,
            BinaryOp::Pow if b == one => return a,
            BinaryOp::Pow if b == zero => return one,
            _ => {}
        }
        self.insert(Node::Binary(op, a, b))
    }

    #[inline]
    pub fn add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Add, a, b)
    }

    #[inline]
    pub fn sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Sub, a, b)
    }

    #[inline]
    pub fn mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Mul, a, b)
    }

    #[inline]
    pub fn div(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Div, a, b)
    }

    #[inline]
    pub fn pow(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Pow, a, b)
    }

    #[inline]
    pub fn neg(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Neg, a)
    }

    #[inline]
    pub fn sqrt(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Sqrt, a)
    }

    #[inline]
    pub fn sin(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Sin, a)
    }

    #[inline]
    pub fn cos(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Cos, a)
    }

    #[inline]
    pub fn tan(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Tan, a)
    }

    #[inline]
    pub fn exp(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Exp, a)
    }

    #[inline]
    pub fn log(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Log, a)
    }

    #[inline]
    pub fn tanh(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Tanh, a)
    }

    /// Sum of all nonzeros of `m` (ZERO if there are none).
    pub fn sum(&mut self, m: &SxMatrix) -> ExprId {
        m.nonzeros()
            .iter()
            .fold(ExprId::ZERO, |acc, &e| self.add(acc, e))
    }
}

impl Default for SxGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning forks the graph: handles created before the clone are valid
/// in both copies, handles created after it only in their own.
impl Clone for SxGraph {
    fn clone(&self) -> Self {
        Self {
            lineage: self.lineage.fork(self.nodes.len()),
            nodes: self.nodes.clone(),
            intern: self.intern.clone(),
            names: self.names.clone(),
        }
    }
}

impl Algebra for SxGraph {
    type Value = ExprId;

    #[inline]
    fn constant(&mut self, v: f64) -> ExprId {
        self.lit(v)
    }

    #[inline]
    fn unary(&mut self, op: UnaryOp, x: ExprId) -> ExprId {
        SxGraph::unary(self, op, x)
    }

    #[inline]
    fn binary(&mut self, op: BinaryOp, x: ExprId, y: ExprId) -> ExprId {
        SxGraph::binary(self, op, x, y)
    }

    #[inline]
    fn is_zero(&self, v: ExprId) -> bool {
        v == ExprId::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_populated() {
        let g = SxGraph::new();
        assert_eq!(g.node(ExprId::ZERO).as_f64(), Some(0.0));
        assert_eq!(g.node(ExprId::ONE).as_f64(), Some(1.0));
        assert_eq!(g.node(ExprId::TWO).as_f64(), Some(2.0));
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn interning() {
        let mut g = SxGraph::new();
        let x = g.sym("x");
        let a = g.add(x, ExprId::ONE);
        let a2 = g.add(x, ExprId::ONE);
        assert_eq!(a, a2);
        assert_eq!(g.lit(1.0), ExprId::ONE);
    }

    #[test]
    fn symbols_are_distinct() {
        let mut g = SxGraph::new();
        let a = g.sym("x");
        let b = g.sym("x");
        assert_ne!(a, b);
        assert_eq!(g.name(a), Some("x"));
        assert!(g.is_symbolic(b));
        assert!(!g.is_symbolic(ExprId::ONE));
    }

    #[test]
    fn identities_fold() {
        let mut g = SxGraph::new();
        let x = g.sym("x");
        assert_eq!(g.add(x, ExprId::ZERO), x);
        assert_eq!(g.mul(ExprId::ONE, x), x);
        assert_eq!(g.mul(x, ExprId::ZERO), ExprId::ZERO);
        assert_eq!(g.sub(x, x), ExprId::ZERO);
        let n = g.neg(x);
        assert_eq!(g.neg(n), x);
        let four = g.add(ExprId::TWO, ExprId::TWO);
        assert_eq!(g.literal(four), Some(4.0));
        assert_eq!(g.pow(x, ExprId::ZERO), ExprId::ONE);
    }

    #[test]
    fn clone_forks_identity() {
        let mut g = SxGraph::new();
        let x = g.sym("x");
        let h = g.clone();
        assert_ne!(g.id(), h.id());
        assert!(h.lineage().shares(g.id(), x.index()));
        assert_eq!(h.name(x), Some("x"));
    }

    #[test]
    fn unknown_handle() {
        let g = SxGraph::new();
        assert_eq!(g.try_node(ExprId(99)), Err(Error::UnknownExpression(99)));
    }
}
