//! Dependency bitsets for Jacobian sparsity detection.
//!
//! Each value of an algorithm carries the set of seeded input nonzeros it
//! depends on. Sets grow as needed, so there is no cap on the number of
//! input nonzeros.

use skein_sparse::Sparsity;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct DepMask(Vec<u64>);

impl DepMask {
    /// Set containing only `bit`.
    pub fn unit(bit: usize) -> Self {
        let mut words = vec![0u64; bit / 64 + 1];
        words[bit / 64] = 1u64 << (bit % 64);
        Self(words)
    }

    pub fn union_with(&mut self, other: &DepMask) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (w, o) in self.0.iter_mut().zip(&other.0) {
            *w |= o;
        }
    }

    pub fn union(a: &DepMask, b: &DepMask) -> DepMask {
        let mut m = a.clone();
        m.union_with(b);
        m
    }

    /// Set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &word)| {
            (0..64)
                .filter(move |b| word & (1u64 << b) != 0)
                .map(move |b| w * 64 + b)
        })
    }
}

/// Pattern with row `i` holding the bits of `masks[i]`.
pub(crate) fn pattern_from_masks(masks: &[DepMask], ncols: usize) -> Sparsity {
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    for (i, m) in masks.iter().enumerate() {
        for j in m.ones() {
            rows.push(i);
            cols.push(j);
        }
    }
    Sparsity::from_triplets(masks.len(), ncols, &rows, &cols)
}
