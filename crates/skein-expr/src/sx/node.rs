//! Scalar expression nodes and the ExprId handle.

use std::fmt;

use crate::ops::{BinaryOp, UnaryOp};

/// Handle into an [`SxGraph`](super::SxGraph). Lightweight (4 bytes), Copy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

/// Well-known node indices, pre-populated in every graph.
impl ExprId {
    /// The constant 0.0 (index 0).
    pub const ZERO: Self = Self(0);
    /// The constant 1.0 (index 1).
    pub const ONE: Self = Self(1);
    /// The constant 2.0 (index 2).
    pub const TWO: Self = Self(2);

    /// The raw index of this expression in its graph.
    #[inline]
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl Default for ExprId {
    fn default() -> Self {
        Self::ZERO
    }
}

/// A node in the scalar graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    /// Symbol by creation serial. Every `sym` call makes a new one.
    Sym(u32),
    /// Literal f64 value stored as bits for Hash/Eq.
    Lit(u64),
    Unary(UnaryOp, ExprId),
    Binary(BinaryOp, ExprId, ExprId),
}

impl Node {
    /// Create a `Lit` node from an f64 value.
    #[inline]
    pub fn lit(v: f64) -> Self {
        Self::Lit(v.to_bits())
    }

    /// Extract f64 value from a `Lit` node, or `None`.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Lit(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Sym(_))
    }

    /// Operands, left to right.
    pub fn operands(&self) -> Vec<ExprId> {
        match *self {
            Self::Sym(_) | Self::Lit(_) => Vec::new(),
            Self::Unary(_, a) => vec![a],
            Self::Binary(_, a, b) => vec![a, b],
        }
    }
}
