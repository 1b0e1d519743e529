use alloc::vec;
use alloc::vec::Vec;

/// Compressed-column sparsity pattern.
///
/// Nonzero `k` of column `j` lives at `colind[j] <= k < colind[j + 1]` and
/// sits in row `row[k]`. Row indices are strictly increasing within each
/// column, which makes the pattern canonical: two patterns with the same
/// structure compare (and hash) equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sparsity {
    nrows: usize,
    ncols: usize,
    colind: Vec<usize>, // length ncols + 1
    row: Vec<usize>,    // length nnz
}

impl Sparsity {
    /// Create from raw compressed-column arrays.
    pub fn new(nrows: usize, ncols: usize, colind: Vec<usize>, row: Vec<usize>) -> Self {
        assert_eq!(colind.len(), ncols + 1, "Sparsity: colind length mismatch");
        assert_eq!(colind[0], 0, "Sparsity: colind must start at zero");
        assert_eq!(colind[ncols], row.len(), "Sparsity: colind/row mismatch");
        for j in 0..ncols {
            assert!(colind[j] <= colind[j + 1], "Sparsity: colind not monotone");
            for k in colind[j]..colind[j + 1] {
                assert!(row[k] < nrows, "Sparsity: row index out of bounds");
                if k > colind[j] {
                    assert!(row[k - 1] < row[k], "Sparsity: rows not sorted");
                }
            }
        }
        Self { nrows, ncols, colind, row }
    }

    /// Fully populated pattern.
    pub fn dense(nrows: usize, ncols: usize) -> Self {
        let colind = (0..=ncols).map(|j| j * nrows).collect();
        let mut row = Vec::with_capacity(nrows * ncols);
        for _ in 0..ncols {
            row.extend(0..nrows);
        }
        Self { nrows, ncols, colind, row }
    }

    /// Pattern with no structural nonzeros.
    pub fn empty(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            colind: vec![0; ncols + 1],
            row: Vec::new(),
        }
    }

    /// Dense 1x1 pattern.
    pub fn scalar() -> Self {
        Self::dense(1, 1)
    }

    /// Dense column vector.
    pub fn column(n: usize) -> Self {
        Self::dense(n, 1)
    }

    /// Square diagonal pattern.
    pub fn diag(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            colind: (0..=n).collect(),
            row: (0..n).collect(),
        }
    }

    /// Build from (row, col) pairs. Duplicates are merged.
    pub fn from_triplets(nrows: usize, ncols: usize, rows: &[usize], cols: &[usize]) -> Self {
        assert_eq!(rows.len(), cols.len(), "Sparsity: triplet length mismatch");
        let mut col_counts = vec![0usize; ncols + 1];
        for (&r, &c) in rows.iter().zip(cols) {
            assert!(r < nrows && c < ncols, "Sparsity: triplet out of bounds");
            col_counts[c + 1] += 1;
        }
        for j in 1..=ncols {
            col_counts[j] += col_counts[j - 1];
        }

        let mut bucket = vec![0usize; rows.len()];
        let mut offsets = col_counts.clone();
        for (&r, &c) in rows.iter().zip(cols) {
            bucket[offsets[c]] = r;
            offsets[c] += 1;
        }

        // Sort and dedupe each column
        let mut colind = Vec::with_capacity(ncols + 1);
        let mut row = Vec::with_capacity(rows.len());
        colind.push(0);
        for j in 0..ncols {
            let col = &mut bucket[col_counts[j]..col_counts[j + 1]];
            col.sort_unstable();
            let mut last = None;
            for &r in col.iter() {
                if last != Some(r) {
                    row.push(r);
                    last = Some(r);
                }
            }
            colind.push(row.len());
        }
        Self { nrows, ncols, colind, row }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of structural nonzeros.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.row.len()
    }

    /// Number of elements, structural zeros included.
    #[inline]
    pub fn numel(&self) -> usize {
        self.nrows * self.ncols
    }

    #[inline]
    pub fn colind(&self) -> &[usize] {
        &self.colind
    }

    #[inline]
    pub fn row(&self) -> &[usize] {
        &self.row
    }

    /// Shape `(nrows, ncols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// 1x1, regardless of whether the element is structurally present.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.nrows == 1 && self.ncols == 1
    }

    #[inline]
    pub fn is_dense(&self) -> bool {
        self.nnz() == self.numel()
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    /// Row indices of column `j`.
    #[inline]
    pub fn col_rows(&self, j: usize) -> &[usize] {
        &self.row[self.colind[j]..self.colind[j + 1]]
    }

    /// Nonzero index of element `(r, c)`, if structurally present.
    pub fn get_nz(&self, r: usize, c: usize) -> Option<usize> {
        if r >= self.nrows || c >= self.ncols {
            return None;
        }
        let start = self.colind[c];
        self.col_rows(c)
            .binary_search(&r)
            .ok()
            .map(|offset| start + offset)
    }

    /// Column of every nonzero.
    pub fn nz_cols(&self) -> Vec<usize> {
        let mut cols = Vec::with_capacity(self.nnz());
        for j in 0..self.ncols {
            for _ in self.colind[j]..self.colind[j + 1] {
                cols.push(j);
            }
        }
        cols
    }

    /// Column-major linear index `row + col * nrows` of every nonzero.
    pub fn linear_indices(&self) -> Vec<usize> {
        let mut ind = Vec::with_capacity(self.nnz());
        for j in 0..self.ncols {
            for &r in self.col_rows(j) {
                ind.push(r + j * self.nrows);
            }
        }
        ind
    }

    /// For each nonzero of `target`, the nonzero of `self` at the same
    /// position, or `None` if `self` has a structural zero there.
    pub fn project_map(&self, target: &Sparsity) -> Vec<Option<usize>> {
        assert_eq!(self.shape(), target.shape(), "Sparsity: projection shape mismatch");
        let mut map = Vec::with_capacity(target.nnz());
        for j in 0..self.ncols {
            let mine = self.col_rows(j);
            let start = self.colind[j];
            let mut p = 0;
            for &r in target.col_rows(j) {
                while p < mine.len() && mine[p] < r {
                    p += 1;
                }
                if p < mine.len() && mine[p] == r {
                    map.push(Some(start + p));
                } else {
                    map.push(None);
                }
            }
        }
        map
    }

    /// Merge two same-shape patterns column by column.
    fn combine(&self, other: &Sparsity, keep: impl Fn(bool, bool) -> bool) -> Sparsity {
        assert_eq!(self.shape(), other.shape(), "Sparsity: shape mismatch");
        let mut colind = Vec::with_capacity(self.ncols + 1);
        let mut row = Vec::new();
        colind.push(0);
        for j in 0..self.ncols {
            let a = self.col_rows(j);
            let b = other.col_rows(j);
            let (mut p, mut q) = (0, 0);
            while p < a.len() || q < b.len() {
                let ra = a.get(p).copied().unwrap_or(usize::MAX);
                let rb = b.get(q).copied().unwrap_or(usize::MAX);
                let r = ra.min(rb);
                let in_a = ra == r;
                let in_b = rb == r;
                if keep(in_a, in_b) {
                    row.push(r);
                }
                if in_a {
                    p += 1;
                }
                if in_b {
                    q += 1;
                }
            }
            colind.push(row.len());
        }
        Sparsity {
            nrows: self.nrows,
            ncols: self.ncols,
            colind,
            row,
        }
    }

    /// Entries present in either pattern.
    pub fn union(&self, other: &Sparsity) -> Sparsity {
        if self == other {
            return self.clone();
        }
        self.combine(other, |a, b| a || b)
    }

    /// Entries present in both patterns.
    pub fn intersection(&self, other: &Sparsity) -> Sparsity {
        if self == other {
            return self.clone();
        }
        self.combine(other, |a, b| a && b)
    }

    /// Whether every nonzero of `self` is also a nonzero of `other`.
    pub fn is_subset(&self, other: &Sparsity) -> bool {
        self.shape() == other.shape()
            && self.project_map(other).iter().flatten().count() == self.nnz()
    }

    /// Transposed pattern, plus the map `map[k_t] = k` from each nonzero of
    /// the transpose to the corresponding nonzero of `self`.
    pub fn transpose(&self) -> (Sparsity, Vec<usize>) {
        let nnz = self.nnz();
        let mut row_counts = vec![0usize; self.nrows + 1];
        for &r in &self.row {
            row_counts[r + 1] += 1;
        }
        for i in 1..=self.nrows {
            row_counts[i] += row_counts[i - 1];
        }
        let mut t_row = vec![0usize; nnz];
        let mut map = vec![0usize; nnz];
        let mut offsets = row_counts.clone();
        for j in 0..self.ncols {
            for k in self.colind[j]..self.colind[j + 1] {
                let r = self.row[k];
                let pos = offsets[r];
                t_row[pos] = j;
                map[pos] = k;
                offsets[r] += 1;
            }
        }
        let t = Sparsity {
            nrows: self.ncols,
            ncols: self.nrows,
            colind: row_counts,
            row: t_row,
        };
        (t, map)
    }

    /// Pattern of the matrix product `self * other`.
    pub fn mtimes(&self, other: &Sparsity) -> Sparsity {
        assert_eq!(self.ncols, other.nrows, "Sparsity: inner dimension mismatch");
        let mut mark = vec![usize::MAX; self.nrows];
        let mut colind = Vec::with_capacity(other.ncols + 1);
        let mut row = Vec::new();
        colind.push(0);
        for j in 0..other.ncols {
            let start = row.len();
            for &k in other.col_rows(j) {
                for &i in self.col_rows(k) {
                    if mark[i] != j {
                        mark[i] = j;
                        row.push(i);
                    }
                }
            }
            row[start..].sort_unstable();
            colind.push(row.len());
        }
        Sparsity {
            nrows: self.nrows,
            ncols: other.ncols,
            colind,
            row,
        }
    }

    /// Stack patterns on top of each other. All must share `ncols`.
    pub fn vertcat(parts: &[&Sparsity]) -> Sparsity {
        let ncols = parts.first().map_or(0, |p| p.ncols);
        let nrows = parts.iter().map(|p| p.nrows).sum();
        let mut colind = Vec::with_capacity(ncols + 1);
        let mut row = Vec::new();
        colind.push(0);
        for j in 0..ncols {
            let mut offset = 0;
            for p in parts {
                assert_eq!(p.ncols, ncols, "Sparsity: vertcat column mismatch");
                row.extend(p.col_rows(j).iter().map(|&r| r + offset));
                offset += p.nrows;
            }
            colind.push(row.len());
        }
        Sparsity { nrows, ncols, colind, row }
    }

    /// Place patterns side by side. All must share `nrows`.
    pub fn horzcat(parts: &[&Sparsity]) -> Sparsity {
        let nrows = parts.first().map_or(0, |p| p.nrows);
        let ncols = parts.iter().map(|p| p.ncols).sum();
        let mut colind = Vec::with_capacity(ncols + 1);
        let mut row = Vec::new();
        colind.push(0);
        for p in parts {
            assert_eq!(p.nrows, nrows, "Sparsity: horzcat row mismatch");
            for j in 0..p.ncols {
                row.extend_from_slice(p.col_rows(j));
                colind.push(row.len());
            }
        }
        Sparsity { nrows, ncols, colind, row }
    }
}
