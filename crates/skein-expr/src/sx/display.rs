//! Pretty-printing for scalar expressions.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use crate::ops::{BinaryOp, UnaryOp};
use crate::sx::graph::SxGraph;
use crate::sx::node::{ExprId, Node};

impl SxGraph {
    /// Format an expression as a human-readable string.
    ///
    /// Operations with several readers are bound once and referenced by
    /// name: `sin(x) * sin(x) + sin(x)` prints as `@1=sin(x), ((@1 * @1) + @1)`.
    pub fn fmt_expr(&self, expr: ExprId) -> String {
        let mut uses: HashMap<ExprId, usize> = HashMap::new();
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(expr, false)];
        while let Some((e, done)) = stack.pop() {
            if done {
                order.push(e);
                continue;
            }
            if !seen.insert(e) {
                continue;
            }
            stack.push((e, true));
            for op in self.node(e).operands() {
                *uses.entry(op).or_default() += 1;
                if !seen.contains(&op) {
                    stack.push((op, false));
                }
            }
        }

        let mut text: HashMap<ExprId, String> = HashMap::with_capacity(order.len());
        let mut bindings = String::new();
        let mut n_bound = 0;
        for e in order {
            let s = self.fmt_node(e, &text);
            let shared = uses.get(&e).is_some_and(|&n| n > 1);
            if shared && e != expr && !self.node(e).operands().is_empty() {
                n_bound += 1;
                let _ = write!(bindings, "@{n_bound}={s}, ");
                text.insert(e, format!("@{n_bound}"));
            } else {
                text.insert(e, s);
            }
        }
        bindings + &text[&expr]
    }

    fn fmt_node(&self, e: ExprId, text: &HashMap<ExprId, String>) -> String {
        match self.node(e) {
            Node::Sym(_) => self.name(e).unwrap_or("?").to_string(),
            Node::Lit(bits) => {
                let v = f64::from_bits(bits);
                if v == v.trunc() && v.abs() < 1e15 {
                    format!("{}", v as i64)
                } else {
                    format!("{v}")
                }
            }
            Node::Unary(UnaryOp::Neg, a) => format!("(-{})", text[&a]),
            Node::Unary(op, a) => format!("{op}({})", text[&a]),
            Node::Binary(BinaryOp::Pow, a, b) => format!("pow({}, {})", text[&a], text[&b]),
            Node::Binary(op, a, b) => format!("({} {op} {})", text[&a], text[&b]),
        }
    }
}
