//! Error types for skein-expr.

use std::fmt;

use crate::function::FunctionKind;

/// Errors raised by graph construction, compilation and differentiation.
///
/// All of these indicate a contract violation by the caller; none are
/// transient.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A function of one graph flavor was presented where the other was required.
    TypeMismatch { expected: FunctionKind, got: FunctionKind },
    /// Input index beyond the declared number of inputs.
    InputIndex { index: usize, count: usize },
    /// Output index beyond the declared number of outputs.
    OutputIndex { index: usize, count: usize },
    /// Algorithm queried before the function was initialized.
    NotInitialized(String),
    /// Symbolic expressions requested after the function dropped them.
    SymbolicCleared(String),
    /// Operand shapes or cardinalities do not fit the operation.
    ShapeMismatch {
        context: &'static str,
        expected: String,
        got: String,
    },
    /// A function input is not a purely symbolic expression.
    NotSymbolic { input: usize },
    /// The same symbol appears twice among the function inputs.
    DuplicateInput { input: usize },
    /// Evaluation needs values for symbols the function does not declare.
    FreeVariables(Vec<String>),
    /// Handle or function used with a graph other than the one that owns it.
    ForeignGraph,
    /// Handle does not refer to a node of the graph.
    UnknownExpression(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {expected} function, got {got} function")
            }
            Self::InputIndex { index, count } => {
                write!(f, "input index {index} out of range [0, {count})")
            }
            Self::OutputIndex { index, count } => {
                write!(f, "output index {index} out of range [0, {count})")
            }
            Self::NotInitialized(name) => write!(f, "function '{name}' is not initialized"),
            Self::SymbolicCleared(name) => {
                write!(f, "function '{name}' has no symbolic expressions")
            }
            Self::ShapeMismatch {
                context,
                expected,
                got,
            } => write!(f, "{context}: expected {expected}, got {got}"),
            Self::NotSymbolic { input } => {
                write!(f, "function input {input} is not purely symbolic")
            }
            Self::DuplicateInput { input } => {
                write!(f, "function input {input} repeats a symbol of an earlier input")
            }
            Self::FreeVariables(names) => {
                write!(f, "function has free variables: [{}]", names.join(", "))
            }
            Self::ForeignGraph => write!(f, "expression belongs to a different graph"),
            Self::UnknownExpression(id) => write!(f, "no node with index {id} in graph"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn shape_mismatch(
    context: &'static str,
    expected: impl fmt::Display,
    got: impl fmt::Display,
) -> Error {
    Error::ShapeMismatch {
        context,
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

/// `index` must be below `count`.
pub(crate) fn check_input(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(Error::InputIndex { index, count })
    }
}

pub(crate) fn check_output(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(Error::OutputIndex { index, count })
    }
}
