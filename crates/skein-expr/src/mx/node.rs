//! Matrix expression nodes and the MxId handle.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use skein_sparse::Sparsity;

use crate::ops::{BinaryOp, UnaryOp};
use crate::sx::SxFunction;

/// Handle into an [`MxGraph`](super::MxGraph). Lightweight (4 bytes), Copy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MxId(pub(crate) u32);

impl MxId {
    /// The raw index of this expression in its graph.
    #[inline]
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for MxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

impl fmt::Display for MxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Embedded scalar function, compared by identity.
#[derive(Clone, Debug)]
pub struct FunctionRef(pub(crate) Arc<SxFunction>);

impl FunctionRef {
    pub fn function(&self) -> &Arc<SxFunction> {
        &self.0
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FunctionRef {}

impl Hash for FunctionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// A node in the matrix graph. Every node has a fixed sparsity, stored by
/// the graph next to it.
///
/// Elementwise operands always carry exactly the result's sparsity, or
/// are 1x1 and broadcast. The builders insert projections to keep it so.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MxNode {
    /// Symbol by creation serial.
    Sym { serial: u32, sparsity: Sparsity },
    /// Constant nonzeros, stored as bits for Hash/Eq.
    Const { sparsity: Sparsity, values: Vec<u64> },
    Unary(UnaryOp, MxId),
    Binary(BinaryOp, MxId, MxId),
    MatMul(MxId, MxId),
    /// Result nonzero `k` is nonzero `map[k].1` of `args[map[k].0]`, or
    /// zero. Covers indexing, concatenation, transposition and projection.
    Gather {
        args: Vec<MxId>,
        map: Vec<Option<(u32, u32)>>,
        sparsity: Sparsity,
    },
    /// Argument nonzero `k` is added into result nonzero `map[k]`.
    Scatter {
        arg: MxId,
        map: Vec<Option<u32>>,
        sparsity: Sparsity,
    },
    /// Output `output` of an embedded scalar function.
    Call {
        function: FunctionRef,
        args: Vec<MxId>,
        output: u32,
    },
    /// Evaluates to `value`; marks it as an implicit variable with
    /// initial guess `init`.
    Lift { value: MxId, init: MxId },
}

impl MxNode {
    /// All operands, left to right.
    pub fn operands(&self) -> Vec<MxId> {
        match self {
            Self::Sym { .. } | Self::Const { .. } => Vec::new(),
            Self::Unary(_, a) => vec![*a],
            Self::Binary(_, a, b) | Self::MatMul(a, b) => vec![*a, *b],
            Self::Gather { args, .. } | Self::Call { args, .. } => args.clone(),
            Self::Scatter { arg, .. } => vec![*arg],
            Self::Lift { value, init } => vec![*value, *init],
        }
    }

    /// Operands needed to compute the value. A lift's initial guess is
    /// not one of them.
    pub(crate) fn eval_operands(&self) -> Vec<MxId> {
        match self {
            Self::Lift { value, .. } => vec![*value],
            _ => self.operands(),
        }
    }

    /// Same node with every operand passed through `f`.
    pub(crate) fn map_operands(&self, mut f: impl FnMut(MxId) -> MxId) -> MxNode {
        match self {
            Self::Sym { .. } | Self::Const { .. } => self.clone(),
            Self::Unary(op, a) => Self::Unary(*op, f(*a)),
            Self::Binary(op, a, b) => Self::Binary(*op, f(*a), f(*b)),
            Self::MatMul(a, b) => Self::MatMul(f(*a), f(*b)),
            Self::Gather {
                args,
                map,
                sparsity,
            } => Self::Gather {
                args: args.iter().map(|&a| f(a)).collect(),
                map: map.clone(),
                sparsity: sparsity.clone(),
            },
            Self::Scatter { arg, map, sparsity } => Self::Scatter {
                arg: f(*arg),
                map: map.clone(),
                sparsity: sparsity.clone(),
            },
            Self::Call {
                function,
                args,
                output,
            } => Self::Call {
                function: function.clone(),
                args: args.iter().map(|&a| f(a)).collect(),
                output: *output,
            },
            Self::Lift { value, init } => Self::Lift {
                value: f(*value),
                init: f(*init),
            },
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Sym { .. })
    }
}
