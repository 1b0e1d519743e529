//! Graph colorings for compressed derivative sweeps.
//!
//! A Jacobian with pattern `J` can be recovered from fewer directional
//! sweeps than it has columns when columns that never share a row are
//! seeded together. Symmetric (Hessian) patterns admit the cheaper star
//! coloring, where each entry is recovered from either its column or its
//! mirrored row.

use alloc::vec;
use alloc::vec::Vec;

use crate::Sparsity;

const NONE: usize = usize::MAX;

/// Color assignment for the columns of a pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coloring {
    colors: Vec<usize>,
    count: usize,
}

impl Coloring {
    /// One color per column: the uncompressed seeding.
    pub fn identity(n: usize) -> Self {
        Self {
            colors: (0..n).collect(),
            count: n,
        }
    }

    /// Color of column `j`.
    #[inline]
    pub fn color(&self, j: usize) -> usize {
        self.colors[j]
    }

    #[inline]
    pub fn colors(&self) -> &[usize] {
        &self.colors
    }

    /// Number of distinct colors, i.e. number of sweeps.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Columns grouped by color.
    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.count];
        for (j, &c) in self.colors.iter().enumerate() {
            groups[c].push(j);
        }
        groups
    }
}

/// Greedy distance-2 column coloring: two columns that share a row never
/// share a color, so each entry `(i, j)` is the row-`i` component of the
/// sweep seeded with color `color(j)`.
pub fn column_coloring(sp: &Sparsity) -> Coloring {
    let (t, _) = sp.transpose();
    let ncols = sp.ncols();
    let mut colors = vec![NONE; ncols];
    let mut forbidden = vec![NONE; ncols.max(1)];
    let mut count = 0;

    for j in 0..ncols {
        for &i in sp.col_rows(j) {
            for &k in t.col_rows(i) {
                let c = colors[k];
                if c != NONE {
                    forbidden[c] = j;
                }
            }
        }
        let c = (0..).find(|&c| c >= count || forbidden[c] != j).unwrap_or(count);
        colors[j] = c;
        if c == count {
            count += 1;
        }
    }
    Coloring { colors, count }
}

/// Greedy star coloring of a square, structurally symmetric pattern.
///
/// A distance-1 coloring in which every path on four vertices uses at
/// least three colors. The pattern is symmetrized first.
pub fn star_coloring(sp: &Sparsity) -> Coloring {
    assert!(sp.is_square(), "star_coloring: pattern must be square");
    let n = sp.ncols();
    let sym = sp.union(&sp.transpose().0);
    let adj: Vec<Vec<usize>> = (0..n)
        .map(|j| sym.col_rows(j).iter().copied().filter(|&i| i != j).collect())
        .collect();

    let mut colors = vec![NONE; n];
    let mut forbidden = vec![NONE; n.max(1)];
    let mut count = 0;

    for v in 0..n {
        for &w in &adj[v] {
            let cw = colors[w];
            if cw == NONE {
                continue;
            }
            forbidden[cw] = v;
            // v at the end of a path v - w - x - y colored (c, b, c, b)
            for &x in &adj[w] {
                let cx = colors[x];
                if x == v || cx == NONE {
                    continue;
                }
                if adj[x].iter().any(|&y| y != w && colors[y] == cw) {
                    forbidden[cx] = v;
                }
            }
        }
        // v in the middle of a path u - v - w - x colored (b, c, b, c)
        for (p, &u) in adj[v].iter().enumerate() {
            let cu = colors[u];
            if cu == NONE {
                continue;
            }
            for &w in &adj[v][p + 1..] {
                if colors[w] != cu {
                    continue;
                }
                for &x in adj[w].iter().chain(adj[u].iter()) {
                    if x != v && colors[x] != NONE {
                        forbidden[colors[x]] = v;
                    }
                }
            }
        }
        let c = (0..).find(|&c| c >= count || forbidden[c] != v).unwrap_or(count);
        colors[v] = c;
        if c == count {
            count += 1;
        }
    }
    Coloring { colors, count }
}

/// Where to read each nonzero of a symmetric pattern from the compressed
/// column sweeps of a star coloring.
///
/// Returns, per nonzero `(i, j)` of `sp` in storage order, the pair
/// `(sweep, row)`: the entry equals component `row` of the sweep seeded
/// with color `sweep`. Returns `None` if the coloring cannot recover
/// some entry.
pub fn symmetric_recovery(sp: &Sparsity, coloring: &Coloring) -> Option<Vec<(usize, usize)>> {
    let sym = sp.union(&sp.transpose().0);
    // Is `j` the only member of row i (with i itself) carrying color(j)?
    let unique = |i: usize, j: usize| {
        let c = coloring.color(j);
        sym.col_rows(i)
            .iter()
            .chain(core::iter::once(&i))
            .all(|&k| k == j || coloring.color(k) != c)
    };

    let mut out = Vec::with_capacity(sp.nnz());
    for j in 0..sp.ncols() {
        for &i in sp.col_rows(j) {
            if unique(i, j) {
                out.push((coloring.color(j), i));
            } else if unique(j, i) {
                out.push((coloring.color(i), j));
            } else {
                return None;
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_needs_one_color() {
        let c = column_coloring(&Sparsity::diag(5));
        assert_eq!(c.count(), 1);
    }

    #[test]
    fn dense_needs_all_colors() {
        let c = column_coloring(&Sparsity::dense(3, 4));
        assert_eq!(c.count(), 4);
        assert_eq!(c.groups().len(), 4);
    }

    #[test]
    fn column_coloring_is_valid() {
        // Tridiagonal 6x6
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for j in 0..6usize {
            for i in j.saturating_sub(1)..(j + 2).min(6) {
                rows.push(i);
                cols.push(j);
            }
        }
        let sp = Sparsity::from_triplets(6, 6, &rows, &cols);
        let c = column_coloring(&sp);
        assert_eq!(c.count(), 3);
        // No two columns of the same color share a row
        for i in 0..6 {
            let mut seen = Vec::new();
            for j in 0..6 {
                if sp.get_nz(i, j).is_some() {
                    assert!(!seen.contains(&c.color(j)));
                    seen.push(c.color(j));
                }
            }
        }
    }

    #[test]
    fn star_coloring_arrow_pattern() {
        // Arrowhead: dense first row/column plus diagonal
        let n = 6;
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for k in 0..n {
            rows.extend([k, 0, k]);
            cols.extend([k, k, 0]);
        }
        let sp = Sparsity::from_triplets(n, n, &rows, &cols);
        let star = star_coloring(&sp);
        let plain = column_coloring(&sp);
        assert_eq!(plain.count(), n);
        assert_eq!(star.count(), 2);
        assert!(symmetric_recovery(&sp, &star).is_some());
    }

    #[test]
    fn star_coloring_recovers_dense() {
        let sp = Sparsity::dense(3, 3);
        let star = star_coloring(&sp);
        assert_eq!(star.count(), 3);
        let rec = symmetric_recovery(&sp, &star).unwrap();
        assert_eq!(rec.len(), 9);
    }
}
