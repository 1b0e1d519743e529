//! Elementary operations shared by both graph flavors.
//!
//! Each operation knows its numeric kernel, its structural-zero behavior
//! and its partial derivatives. Partials are written once against the
//! [`Algebra`] trait, so the same rules build symbolic derivative
//! expressions (in an [`SxGraph`](crate::SxGraph)) and plain numbers.

use std::fmt;

/// Single-argument operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Tanh,
}

impl UnaryOp {
    /// Numeric kernel.
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Neg => -x,
            Self::Sqrt => x.sqrt(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Tanh => x.tanh(),
        }
    }

    /// Whether `f(0) == 0`, so structural zeros stay zero.
    #[inline]
    pub fn preserves_zero(self) -> bool {
        matches!(
            self,
            Self::Neg | Self::Sqrt | Self::Sin | Self::Tan | Self::Tanh
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Sqrt => "sqrt",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Tanh => "tanh",
        }
    }
}

/// Two-argument operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    #[inline]
    pub fn apply(self, x: f64, y: f64) -> f64 {
        match self {
            Self::Add => x + y,
            Self::Sub => x - y,
            Self::Mul => x * y,
            Self::Div => x / y,
            Self::Pow => x.powf(y),
        }
    }

    /// `f(0, 0) == 0`.
    #[inline]
    pub fn zero_both(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul)
    }

    /// `f(0, y) == 0` for every finite `y` that keeps the result defined.
    #[inline]
    pub fn zero_left(self) -> bool {
        matches!(self, Self::Mul | Self::Div)
    }

    /// `f(x, 0) == 0` for every `x`.
    #[inline]
    pub fn zero_right(self) -> bool {
        matches!(self, Self::Mul)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A value domain an algorithm can be replayed over.
///
/// Numeric evaluation uses [`F64Algebra`]; symbolic replay (derivative
/// construction, expansion of matrix graphs) uses an `SxGraph`, whose
/// values are expression handles.
pub trait Algebra {
    type Value: Copy;

    fn constant(&mut self, v: f64) -> Self::Value;
    fn unary(&mut self, op: UnaryOp, x: Self::Value) -> Self::Value;
    fn binary(&mut self, op: BinaryOp, x: Self::Value, y: Self::Value) -> Self::Value;

    /// Whether `v` is known to be exactly zero. Lets sweeps skip work on
    /// structurally zero seeds.
    fn is_zero(&self, v: Self::Value) -> bool;
}

/// Plain `f64` arithmetic.
#[derive(Clone, Copy, Debug, Default)]
pub struct F64Algebra;

impl Algebra for F64Algebra {
    type Value = f64;

    #[inline]
    fn constant(&mut self, v: f64) -> f64 {
        v
    }

    #[inline]
    fn unary(&mut self, op: UnaryOp, x: f64) -> f64 {
        op.apply(x)
    }

    #[inline]
    fn binary(&mut self, op: BinaryOp, x: f64, y: f64) -> f64 {
        op.apply(x, y)
    }

    #[inline]
    fn is_zero(&self, _v: f64) -> bool {
        // Numeric zeros still carry NaN/inf through products.
        false
    }
}

/// `d op(x) / dx`, given the operand `x` and the result `f = op(x)`.
pub fn unary_partial<A: Algebra>(alg: &mut A, op: UnaryOp, x: A::Value, f: A::Value) -> A::Value {
    match op {
        UnaryOp::Neg => alg.constant(-1.0),
        UnaryOp::Sqrt => {
            let half = alg.constant(0.5);
            alg.binary(BinaryOp::Div, half, f)
        }
        UnaryOp::Sin => alg.unary(UnaryOp::Cos, x),
        UnaryOp::Cos => {
            let s = alg.unary(UnaryOp::Sin, x);
            alg.unary(UnaryOp::Neg, s)
        }
        UnaryOp::Tan => {
            let one = alg.constant(1.0);
            let f2 = alg.binary(BinaryOp::Mul, f, f);
            alg.binary(BinaryOp::Add, one, f2)
        }
        UnaryOp::Exp => f,
        UnaryOp::Log => {
            let one = alg.constant(1.0);
            alg.binary(BinaryOp::Div, one, x)
        }
        UnaryOp::Tanh => {
            let one = alg.constant(1.0);
            let f2 = alg.binary(BinaryOp::Mul, f, f);
            alg.binary(BinaryOp::Sub, one, f2)
        }
    }
}

/// Partial of `f = op(x, y)` with respect to operand `arg` (0 for `x`,
/// 1 for `y`).
pub fn binary_partial<A: Algebra>(
    alg: &mut A,
    op: BinaryOp,
    arg: usize,
    x: A::Value,
    y: A::Value,
    f: A::Value,
) -> A::Value {
    match (op, arg) {
        (BinaryOp::Add, _) | (BinaryOp::Sub, 0) => alg.constant(1.0),
        (BinaryOp::Sub, _) => alg.constant(-1.0),
        (BinaryOp::Mul, 0) => y,
        (BinaryOp::Mul, _) => x,
        (BinaryOp::Div, 0) => {
            let one = alg.constant(1.0);
            alg.binary(BinaryOp::Div, one, y)
        }
        (BinaryOp::Div, _) => {
            // -f / y
            let q = alg.binary(BinaryOp::Div, f, y);
            alg.unary(UnaryOp::Neg, q)
        }
        (BinaryOp::Pow, 0) => {
            // y * x^(y - 1)
            let one = alg.constant(1.0);
            let ym1 = alg.binary(BinaryOp::Sub, y, one);
            let p = alg.binary(BinaryOp::Pow, x, ym1);
            alg.binary(BinaryOp::Mul, y, p)
        }
        (BinaryOp::Pow, _) => {
            // f * ln(x)
            let l = alg.unary(UnaryOp::Log, x);
            alg.binary(BinaryOp::Mul, f, l)
        }
    }
}
