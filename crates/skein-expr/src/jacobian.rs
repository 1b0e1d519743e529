//! Sweep planning for sparse Jacobians.
//!
//! Both graph flavors detect the nonzero-level pattern `Jnz` (rows are
//! output nonzeros, columns input nonzeros), ask [`plan`] for a seeding,
//! run the sweeps and read each entry back through `lookup`.

use skein_sparse::coloring::{column_coloring, star_coloring, symmetric_recovery};
use skein_sparse::{Coloring, Sparsity};
use tracing::debug;

use crate::options::{AdMode, FunctionOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Seed input nonzeros, read output sensitivities.
    Forward,
    /// Seed output nonzeros, read input adjoints.
    Reverse,
}

#[derive(Debug)]
pub(crate) struct JacobianPlan {
    pub direction: Direction,
    /// Seeded components per sweep.
    pub sweeps: Vec<Vec<usize>>,
    /// Per nonzero of `Jnz` in storage order: `(sweep, component)` to read.
    pub lookup: Vec<(usize, usize)>,
}

pub(crate) fn plan(jnz: &Sparsity, options: &FunctionOptions, symmetric: bool) -> JacobianPlan {
    if symmetric && jnz.is_square() {
        let star = if options.compress {
            star_coloring(jnz)
        } else {
            Coloring::identity(jnz.ncols())
        };
        if let Some(lookup) = symmetric_recovery(jnz, &star) {
            debug!(
                nnz = jnz.nnz(),
                sweeps = star.count(),
                "symmetric jacobian via star coloring"
            );
            return JacobianPlan {
                direction: Direction::Forward,
                sweeps: star.groups(),
                lookup,
            };
        }
    }

    let (cols, rows) = if options.compress {
        (column_coloring(jnz), column_coloring(&jnz.transpose().0))
    } else {
        (
            Coloring::identity(jnz.ncols()),
            Coloring::identity(jnz.nrows()),
        )
    };
    let w = options.ad_weight;
    let direction = match options.ad_mode {
        AdMode::Forward => Direction::Forward,
        AdMode::Reverse => Direction::Reverse,
        AdMode::Automatic => {
            if w * cols.count() as f64 <= (1.0 - w) * rows.count() as f64 {
                Direction::Forward
            } else {
                Direction::Reverse
            }
        }
    };
    debug!(
        nnz = jnz.nnz(),
        fwd_sweeps = cols.count(),
        adj_sweeps = rows.count(),
        ?direction,
        "jacobian seeding"
    );

    let mut lookup = Vec::with_capacity(jnz.nnz());
    for j in 0..jnz.ncols() {
        for &i in jnz.col_rows(j) {
            lookup.push(match direction {
                Direction::Forward => (cols.color(j), i),
                Direction::Reverse => (rows.color(i), j),
            });
        }
    }
    let sweeps = match direction {
        Direction::Forward => cols.groups(),
        Direction::Reverse => rows.groups(),
    };
    JacobianPlan {
        direction,
        sweeps,
        lookup,
    }
}

/// Pattern of the assembled Jacobian.
///
/// Compact Jacobians index rows and columns by nonzero; otherwise rows are
/// column-major linear indices of the output and columns those of the
/// input. Both mappings are increasing, so the storage order of `jnz`
/// carries over unchanged.
pub(crate) fn assembled_pattern(
    jnz: &Sparsity,
    out: &Sparsity,
    inp: &Sparsity,
    compact: bool,
) -> Sparsity {
    if compact {
        return jnz.clone();
    }
    let out_lin = out.linear_indices();
    let in_lin = inp.linear_indices();
    let mut rows = Vec::with_capacity(jnz.nnz());
    let mut cols = Vec::with_capacity(jnz.nnz());
    for j in 0..jnz.ncols() {
        for &i in jnz.col_rows(j) {
            rows.push(out_lin[i]);
            cols.push(in_lin[j]);
        }
    }
    Sparsity::from_triplets(out.numel(), inp.numel(), &rows, &cols)
}

/// 0/1 seed over `n` components with ones at `group`.
pub(crate) fn seed_mask(n: usize, group: &[usize]) -> Vec<bool> {
    let mut mask = vec![false; n];
    for &k in group {
        mask[k] = true;
    }
    mask
}
