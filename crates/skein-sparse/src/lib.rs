//! Sparsity patterns, sparse matrices and colorings for skein.
//!
//! Compressed-column storage throughout. [`Sparsity`] is the structural
//! part only and is hashable, so expression graphs can key nodes on it.

#![no_std]

extern crate alloc;

pub mod coloring;
mod matrix;
mod pattern;

pub use coloring::Coloring;
pub use matrix::Matrix;
pub use pattern::Sparsity;
