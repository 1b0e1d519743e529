//! Instruction ordering and work-slot assignment shared by both compilers.

use std::collections::HashSet;
use std::hash::Hash;

/// Slot index marking "no result" (output instructions).
pub const NO_SLOT: u32 = u32::MAX;

/// Incremental depth-first postorder over a DAG.
///
/// Roots are visited one at a time so callers can interleave their own
/// instructions (outputs) between roots. Operands are explored left to
/// right; each node is emitted once, after all its operands.
pub(crate) struct TopoSort<I> {
    visited: HashSet<I>,
}

impl<I: Copy + Eq + Hash> TopoSort<I> {
    pub fn new() -> Self {
        Self {
            visited: HashSet::new(),
        }
    }

    /// Append to `out` every node reachable from `root` not yet emitted.
    pub fn visit(&mut self, root: I, mut children: impl FnMut(I) -> Vec<I>, out: &mut Vec<I>) {
        if !self.visited.insert(root) {
            return;
        }
        let mut stack = vec![(root, children(root), 0usize)];
        while let Some(top) = stack.last_mut() {
            match top.1.get(top.2).copied() {
                Some(child) => {
                    top.2 += 1;
                    if self.visited.insert(child) {
                        let grand = children(child);
                        stack.push((child, grand, 0));
                    }
                }
                None => {
                    out.push(top.0);
                    stack.pop();
                }
            }
        }
    }
}

/// Slot assignment for a straight-line program.
#[derive(Debug)]
pub(crate) struct Slots {
    /// Result slot per instruction, `NO_SLOT` if it defines nothing.
    pub res: Vec<u32>,
    /// Operand slots per instruction.
    pub args: Vec<Vec<u32>>,
    pub work_size: usize,
}

/// Assign work slots by live range.
///
/// `instrs[i] = (operands, defines)` where operands are indices of the
/// earlier instructions whose results are read. A value's slot returns to
/// a LIFO free list right after its last reader; operands are released
/// before the reader's own result is allocated, so an instruction may
/// write the slot it reads.
pub(crate) fn assign_slots(instrs: &[(Vec<usize>, bool)]) -> Slots {
    let n = instrs.len();
    let mut last_use: Vec<Option<usize>> = vec![None; n];
    for (i, (ops, _)) in instrs.iter().enumerate() {
        for &p in ops {
            last_use[p] = Some(i);
        }
    }

    let mut res = vec![NO_SLOT; n];
    let mut args = Vec::with_capacity(n);
    let mut free: Vec<u32> = Vec::new();
    let mut work_size = 0usize;

    for (i, (ops, defines)) in instrs.iter().enumerate() {
        args.push(ops.iter().map(|&p| res[p]).collect::<Vec<_>>());
        for (k, &p) in ops.iter().enumerate() {
            // release once even if the same operand is read twice
            if last_use[p] == Some(i) && !ops[..k].contains(&p) {
                free.push(res[p]);
            }
        }
        if *defines {
            let slot = free.pop().unwrap_or_else(|| {
                work_size += 1;
                (work_size - 1) as u32
            });
            res[i] = slot;
            if last_use[i].is_none() {
                free.push(slot);
            }
        }
    }

    Slots {
        res,
        args,
        work_size,
    }
}
