//! Scalar expression graphs (SX): every node is a single scalar.

mod ad;
pub(crate) mod algorithm;
mod display;
pub(crate) mod function;
mod graph;
mod node;
mod sparsity;

pub use algorithm::{ScalarAtomic, SxOp};
pub use function::SxFunction;
pub use graph::{SxGraph, SxMatrix};
pub use node::{ExprId, Node};
