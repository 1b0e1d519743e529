use alloc::vec::Vec;

use crate::Sparsity;

/// Sparse matrix: a sparsity pattern plus one value per structural nonzero.
///
/// Value-generic, so the same container holds numbers (`Matrix<f64>`) or
/// symbolic handles into an expression graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T> {
    sparsity: Sparsity,
    nz: Vec<T>,
}

impl<T> Matrix<T> {
    /// Create from a pattern and its nonzeros (column-major nonzero order).
    pub fn new(sparsity: Sparsity, nz: Vec<T>) -> Self {
        assert_eq!(sparsity.nnz(), nz.len(), "Matrix: nonzero count mismatch");
        Self { sparsity, nz }
    }

    /// Dense matrix from column-major data.
    pub fn dense(nrows: usize, ncols: usize, data: Vec<T>) -> Self {
        Self::new(Sparsity::dense(nrows, ncols), data)
    }

    /// Dense column vector.
    pub fn column(data: Vec<T>) -> Self {
        let n = data.len();
        Self::new(Sparsity::column(n), data)
    }

    /// 1x1 matrix.
    pub fn scalar(v: T) -> Self {
        Self::new(Sparsity::scalar(), alloc::vec![v])
    }

    #[inline]
    pub fn sparsity(&self) -> &Sparsity {
        &self.sparsity
    }

    #[inline]
    pub fn nonzeros(&self) -> &[T] {
        &self.nz
    }

    #[inline]
    pub fn into_nonzeros(self) -> Vec<T> {
        self.nz
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.nz.len()
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.sparsity.shape()
    }

    /// Element `(r, c)` if structurally present.
    pub fn get(&self, r: usize, c: usize) -> Option<&T> {
        self.sparsity.get_nz(r, c).map(|k| &self.nz[k])
    }

    /// Apply `f` to every nonzero, keeping the pattern.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Matrix<U> {
        Matrix {
            sparsity: self.sparsity.clone(),
            nz: self.nz.iter().map(f).collect(),
        }
    }
}

impl<T: Clone> Matrix<T> {
    /// Column-major dense data, with `zero` at structural zeros.
    pub fn to_dense(&self, zero: T) -> Vec<T> {
        let mut data = alloc::vec![zero; self.sparsity.numel()];
        for (k, lin) in self.sparsity.linear_indices().into_iter().enumerate() {
            data[lin] = self.nz[k].clone();
        }
        data
    }

    /// Re-express on another pattern of the same shape, filling new
    /// entries with `zero` and dropping entries the target lacks.
    pub fn project(&self, target: &Sparsity, zero: T) -> Matrix<T> {
        let nz = self
            .sparsity
            .project_map(target)
            .into_iter()
            .map(|src| match src {
                Some(k) => self.nz[k].clone(),
                None => zero.clone(),
            })
            .collect();
        Matrix {
            sparsity: target.clone(),
            nz,
        }
    }
}

impl Matrix<f64> {
    /// Element `(r, c)`, zero where structurally absent.
    pub fn at(&self, r: usize, c: usize) -> f64 {
        self.get(r, c).copied().unwrap_or(0.0)
    }
}
