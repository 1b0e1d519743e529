//! Scalar and matrix expression graphs with compiled
//! algorithms and sparse automatic differentiation.
//!
//! Two graph flavors share one function facade. In an [`SxGraph`] every
//! node is a scalar; in an [`MxGraph`] every node is a sparse matrix and
//! may embed compiled scalar functions. Both intern nodes on
//! construction, compile functions into slot-allocated algorithms, and
//! answer Jacobian, gradient, tangent and Hessian requests with new
//! expressions in the same graph.
//!
//! # Quick start
//!
//! ```
//! use skein_expr::{FunctionOptions, SxFunction, SxGraph};
//! use skein_sparse::Matrix;
//!
//! let mut g = SxGraph::new();
//! let x = g.sym("x");
//! let y = g.sym("y");
//! let xy = g.mul(x, y);
//! let sx = g.sin(x);
//! let f = g.add(xy, sx);
//!
//! let func = SxFunction::new(
//!     &g,
//!     vec![Matrix::scalar(x), Matrix::scalar(y)],
//!     vec![Matrix::scalar(f)],
//!     FunctionOptions::new("f"),
//! )?;
//!
//! // Symbolic gradient with respect to x
//! let df = func.grad(&mut g, 0, 0)?;
//! assert_eq!(g.fmt_expr(df.nonzeros()[0]), "(cos(x) + y)");
//!
//! let out = func.eval(&[Matrix::scalar(1.0), Matrix::scalar(2.0)])?;
//! assert!((out[0].at(0, 0) - (2.0 + 1f64.sin())).abs() < 1e-12);
//! # Ok::<(), skein_expr::Error>(())
//! ```

mod deps;
mod error;
mod function;
mod jacobian;
mod lineage;
pub mod mx;
pub mod ops;
mod options;
mod schedule;
pub mod sx;

pub use error::{Error, Result};
pub use function::{Differentiable, Function, FunctionInfo, FunctionKind};
pub use lineage::GraphId;
pub use mx::{LiftingFunctions, MxFunction, MxGraph, MxId};
pub use options::{AdMode, FunctionOptions};
pub use sx::{ExprId, SxFunction, SxGraph, SxMatrix};
