//! The function facade shared by both graph flavors.
//!
//! [`SxFunction`] and [`MxFunction`] are the concrete implementations.
//! [`Function`] holds either one; asking it for the wrong flavor is a
//! [`Error::TypeMismatch`], never a coercion.

use std::fmt;

use skein_sparse::{Matrix, Sparsity};

use crate::error::{shape_mismatch, Error, Result};
use crate::mx::{LiftingFunctions, MxFunction, MxGraph, MxId};
use crate::sx::{SxFunction, SxGraph, SxMatrix};

/// Graph flavor a function was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Sx,
    Mx,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sx => "scalar-graph",
            Self::Mx => "matrix-graph",
        })
    }
}

/// Arguments must match the declared input shapes one to one.
pub(crate) fn check_arguments<T>(expected: &[Sparsity], args: &[Matrix<T>]) -> Result<()> {
    if args.len() != expected.len() {
        return Err(shape_mismatch(
            "arguments",
            format!("{} arguments", expected.len()),
            args.len(),
        ));
    }
    for (i, (sp, a)) in expected.iter().zip(args).enumerate() {
        if a.shape() != sp.shape() {
            let ((er, ec), (gr, gc)) = (sp.shape(), a.shape());
            return Err(shape_mismatch(
                "arguments",
                format!("{er}x{ec} for argument {i}"),
                format!("{gr}x{gc}"),
            ));
        }
    }
    Ok(())
}

/// Introspection and evaluation common to both flavors.
pub trait FunctionInfo {
    fn name(&self) -> &str;
    fn n_in(&self) -> usize;
    fn n_out(&self) -> usize;
    fn input_sparsity(&self, i: usize) -> Result<&Sparsity>;
    fn output_sparsity(&self, i: usize) -> Result<&Sparsity>;
    fn is_initialized(&self) -> bool;
    fn count_nodes(&self) -> Result<usize>;
    fn work_size(&self) -> Result<usize>;
    /// Number of free variables.
    fn n_free(&self) -> Result<usize>;
    fn eval(&self, args: &[Matrix<f64>]) -> Result<Vec<Matrix<f64>>>;
}

/// Derivative requests, answered with expressions in the function's own
/// graph flavor.
pub trait Differentiable: FunctionInfo {
    type Graph;
    type Expr;

    /// See [`SxFunction::jac`]. `symmetric` is caller-asserted.
    fn jac(
        &self,
        g: &mut Self::Graph,
        iind: usize,
        oind: usize,
        compact: bool,
        symmetric: bool,
    ) -> Result<Self::Expr>;
    fn grad(&self, g: &mut Self::Graph, iind: usize, oind: usize) -> Result<Self::Expr>;
    fn tang(&self, g: &mut Self::Graph, iind: usize, oind: usize) -> Result<Self::Expr>;
    fn hess(&self, g: &mut Self::Graph, iind: usize, oind: usize) -> Result<Self::Expr>;
}

// Inherent methods take precedence, so these bodies forward rather than
// recurse.
macro_rules! impl_function_info {
    ($ty:ty) => {
        impl FunctionInfo for $ty {
            fn name(&self) -> &str {
                self.name()
            }
            fn n_in(&self) -> usize {
                self.n_in()
            }
            fn n_out(&self) -> usize {
                self.n_out()
            }
            fn input_sparsity(&self, i: usize) -> Result<&Sparsity> {
                self.input_sparsity(i)
            }
            fn output_sparsity(&self, i: usize) -> Result<&Sparsity> {
                self.output_sparsity(i)
            }
            fn is_initialized(&self) -> bool {
                self.is_initialized()
            }
            fn count_nodes(&self) -> Result<usize> {
                self.count_nodes()
            }
            fn work_size(&self) -> Result<usize> {
                self.work_size()
            }
            fn n_free(&self) -> Result<usize> {
                Ok(self.free_vars()?.len())
            }
            fn eval(&self, args: &[Matrix<f64>]) -> Result<Vec<Matrix<f64>>> {
                self.eval(args)
            }
        }
    };
}

macro_rules! impl_differentiable {
    ($ty:ty, $graph:ty, $expr:ty) => {
        impl Differentiable for $ty {
            type Graph = $graph;
            type Expr = $expr;

            fn jac(
                &self,
                g: &mut $graph,
                iind: usize,
                oind: usize,
                compact: bool,
                symmetric: bool,
            ) -> Result<$expr> {
                self.jac(g, iind, oind, compact, symmetric)
            }
            fn grad(&self, g: &mut $graph, iind: usize, oind: usize) -> Result<$expr> {
                self.grad(g, iind, oind)
            }
            fn tang(&self, g: &mut $graph, iind: usize, oind: usize) -> Result<$expr> {
                self.tang(g, iind, oind)
            }
            fn hess(&self, g: &mut $graph, iind: usize, oind: usize) -> Result<$expr> {
                self.hess(g, iind, oind)
            }
        }
    };
}

impl_function_info!(SxFunction);
impl_function_info!(MxFunction);
impl_differentiable!(SxFunction, SxGraph, SxMatrix);
impl_differentiable!(MxFunction, MxGraph, MxId);

/// A function of either flavor.
#[derive(Clone, Debug)]
pub enum Function {
    Sx(SxFunction),
    Mx(MxFunction),
}

impl Function {
    pub fn kind(&self) -> FunctionKind {
        match self {
            Self::Sx(_) => FunctionKind::Sx,
            Self::Mx(_) => FunctionKind::Mx,
        }
    }

    pub fn is_sx(&self) -> bool {
        matches!(self, Self::Sx(_))
    }

    pub fn is_mx(&self) -> bool {
        matches!(self, Self::Mx(_))
    }

    pub fn as_sx(&self) -> Result<&SxFunction> {
        match self {
            Self::Sx(f) => Ok(f),
            Self::Mx(_) => Err(Error::TypeMismatch {
                expected: FunctionKind::Sx,
                got: FunctionKind::Mx,
            }),
        }
    }

    pub fn as_mx(&self) -> Result<&MxFunction> {
        match self {
            Self::Mx(f) => Ok(f),
            Self::Sx(_) => Err(Error::TypeMismatch {
                expected: FunctionKind::Mx,
                got: FunctionKind::Sx,
            }),
        }
    }

    /// Scalar-graph equivalent. A scalar function expands to itself;
    /// a matrix function is converted into `sx`.
    pub fn expand(&self, sx: &mut SxGraph) -> Result<SxFunction> {
        match self {
            Self::Sx(f) => Ok(f.expand()),
            Self::Mx(f) => f.expand(sx),
        }
    }

    /// Only matrix functions carry lifted variables.
    pub fn generate_lifting_functions(&self, g: &mut MxGraph) -> Result<LiftingFunctions> {
        self.as_mx()?.generate_lifting_functions(g)
    }
}

impl From<SxFunction> for Function {
    fn from(f: SxFunction) -> Self {
        Self::Sx(f)
    }
}

impl From<MxFunction> for Function {
    fn from(f: MxFunction) -> Self {
        Self::Mx(f)
    }
}

impl TryFrom<Function> for SxFunction {
    type Error = Error;

    fn try_from(f: Function) -> Result<Self> {
        match f {
            Function::Sx(f) => Ok(f),
            Function::Mx(_) => Err(Error::TypeMismatch {
                expected: FunctionKind::Sx,
                got: FunctionKind::Mx,
            }),
        }
    }
}

impl TryFrom<Function> for MxFunction {
    type Error = Error;

    fn try_from(f: Function) -> Result<Self> {
        match f {
            Function::Mx(f) => Ok(f),
            Function::Sx(_) => Err(Error::TypeMismatch {
                expected: FunctionKind::Mx,
                got: FunctionKind::Sx,
            }),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $f:ident => $body:expr) => {
        match $self {
            Function::Sx($f) => $body,
            Function::Mx($f) => $body,
        }
    };
}

impl FunctionInfo for Function {
    fn name(&self) -> &str {
        dispatch!(self, f => f.name())
    }
    fn n_in(&self) -> usize {
        dispatch!(self, f => f.n_in())
    }
    fn n_out(&self) -> usize {
        dispatch!(self, f => f.n_out())
    }
    fn input_sparsity(&self, i: usize) -> Result<&Sparsity> {
        dispatch!(self, f => f.input_sparsity(i))
    }
    fn output_sparsity(&self, i: usize) -> Result<&Sparsity> {
        dispatch!(self, f => f.output_sparsity(i))
    }
    fn is_initialized(&self) -> bool {
        dispatch!(self, f => f.is_initialized())
    }
    fn count_nodes(&self) -> Result<usize> {
        dispatch!(self, f => f.count_nodes())
    }
    fn work_size(&self) -> Result<usize> {
        dispatch!(self, f => f.work_size())
    }
    fn n_free(&self) -> Result<usize> {
        dispatch!(self, f => FunctionInfo::n_free(f))
    }
    fn eval(&self, args: &[Matrix<f64>]) -> Result<Vec<Matrix<f64>>> {
        dispatch!(self, f => f.eval(args))
    }
}
