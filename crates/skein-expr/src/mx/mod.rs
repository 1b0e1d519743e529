//! Matrix expression graphs (MX): every node is a sparse matrix value.

mod ad;
pub(crate) mod algorithm;
mod eval;
mod expand;
pub(crate) mod function;
pub(crate) mod graph;
mod lift;
mod node;
mod sparsity;

pub use algorithm::{MxAlgEl, MxOp};
pub use function::MxFunction;
pub use graph::MxGraph;
pub use lift::LiftingFunctions;
pub use node::{FunctionRef, MxId, MxNode};
