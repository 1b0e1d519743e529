//! Property-based tests over random expression trees.
//!
//! Each case builds the same trees in both graph flavors and checks that
//! values and Jacobians agree across AD modes and flavors.

use proptest::prelude::*;
use skein_expr::ops::{BinaryOp, UnaryOp};
use skein_expr::{AdMode, ExprId, FunctionOptions, MxFunction, MxGraph, MxId, SxFunction, SxGraph};
use skein_sparse::Matrix;

const N_VARS: usize = 3;

#[derive(Clone, Debug)]
enum Tree {
    Var(usize),
    Lit(f64),
    Unary(UnaryOp, Box<Tree>),
    Binary(BinaryOp, Box<Tree>, Box<Tree>),
}

impl Tree {
    fn value(&self, x: &[f64]) -> f64 {
        match self {
            Tree::Var(i) => x[*i],
            Tree::Lit(v) => *v,
            Tree::Unary(op, a) => op.apply(a.value(x)),
            Tree::Binary(op, a, b) => op.apply(a.value(x), b.value(x)),
        }
    }

    fn build_sx(&self, g: &mut SxGraph, vars: &[ExprId]) -> ExprId {
        match self {
            Tree::Var(i) => vars[*i],
            Tree::Lit(v) => g.lit(*v),
            Tree::Unary(op, a) => {
                let a = a.build_sx(g, vars);
                g.unary(*op, a)
            }
            Tree::Binary(op, a, b) => {
                let a = a.build_sx(g, vars);
                let b = b.build_sx(g, vars);
                g.binary(*op, a, b)
            }
        }
    }

    fn build_mx(&self, g: &mut MxGraph, vars: &[MxId]) -> MxId {
        match self {
            Tree::Var(i) => vars[*i],
            Tree::Lit(v) => g.scalar(*v),
            Tree::Unary(op, a) => {
                let a = a.build_mx(g, vars);
                g.unary(*op, a)
            }
            Tree::Binary(op, a, b) => {
                let a = a.build_mx(g, vars);
                let b = b.build_mx(g, vars);
                g.binary(*op, a, b).unwrap()
            }
        }
    }
}

fn un(op: UnaryOp, a: Tree) -> Tree {
    Tree::Unary(op, Box::new(a))
}

fn bin(op: BinaryOp, a: Tree, b: Tree) -> Tree {
    Tree::Binary(op, Box::new(a), Box::new(b))
}

/// `1 + a*a`, at least one.
fn one_plus_square(a: Tree) -> Tree {
    bin(BinaryOp::Add, Tree::Lit(1.0), bin(BinaryOp::Mul, a.clone(), a))
}

/// `2 + sin(a)`, within [1, 3].
fn two_plus_sin(a: Tree) -> Tree {
    bin(BinaryOp::Add, Tree::Lit(2.0), un(UnaryOp::Sin, a))
}

/// Operations that stay finite on bounded arguments. Sqrt, Log, Tan, Exp,
/// Div and Pow only appear with arguments kept inside their domain.
fn arb_tree(depth: u32) -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![
        (0..N_VARS).prop_map(Tree::Var),
        (-2.0..2.0f64).prop_map(Tree::Lit),
    ];
    leaf.prop_recursive(depth, 32, 2, |inner| {
        let unary = prop_oneof![
            Just(UnaryOp::Neg),
            Just(UnaryOp::Sin),
            Just(UnaryOp::Cos),
            Just(UnaryOp::Tanh),
        ];
        let binary = prop_oneof![Just(BinaryOp::Add), Just(BinaryOp::Sub), Just(BinaryOp::Mul)];
        let guarded = prop_oneof![
            inner.clone().prop_map(|a| un(UnaryOp::Sqrt, one_plus_square(a))),
            inner.clone().prop_map(|a| un(UnaryOp::Log, one_plus_square(a))),
            inner.clone().prop_map(|a| un(UnaryOp::Exp, un(UnaryOp::Sin, a))),
            inner.clone().prop_map(|a| {
                let half_sin = bin(BinaryOp::Mul, Tree::Lit(0.5), un(UnaryOp::Sin, a));
                un(UnaryOp::Tan, half_sin)
            }),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| bin(BinaryOp::Div, a, two_plus_sin(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| {
                bin(BinaryOp::Pow, two_plus_sin(a), un(UnaryOp::Sin, b))
            }),
        ];
        prop_oneof![
            (unary, inner.clone()).prop_map(|(op, a)| un(op, a)),
            (binary, inner.clone(), inner).prop_map(|(op, a, b)| bin(op, a, b)),
            guarded,
        ]
    })
}

fn arb_point() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1.0..1.0f64, N_VARS)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
}

/// Dense Jacobian of `trees` at `x` through a scalar graph.
fn sx_jacobian(trees: &[Tree], x: &[f64], mode: AdMode) -> Vec<f64> {
    let mut g = SxGraph::new();
    let v = g.sym_column("x", N_VARS);
    let vars = v.nonzeros().to_vec();
    let outs: Vec<ExprId> = trees.iter().map(|t| t.build_sx(&mut g, &vars)).collect();
    let f = SxFunction::new(
        &g,
        vec![v],
        vec![Matrix::column(outs)],
        FunctionOptions::new("f").ad_mode(mode),
    )
    .unwrap();
    let jf = f.jacobian(&mut g, 0, 0, false, false).unwrap();
    jf.eval(&[Matrix::column(x.to_vec())]).unwrap()[0].to_dense(0.0)
}

/// Dense Jacobian of `trees` at `x` through a matrix graph.
fn mx_jacobian(trees: &[Tree], x: &[f64], mode: AdMode) -> Vec<f64> {
    let mut g = MxGraph::new();
    let v = g.sym("x", N_VARS, 1);
    let vars: Vec<MxId> = (0..N_VARS).map(|i| g.element(v, i, 0).unwrap()).collect();
    let outs: Vec<MxId> = trees.iter().map(|t| t.build_mx(&mut g, &vars)).collect();
    let out = g.vertcat(&outs).unwrap();
    let opts = FunctionOptions::new("f").ad_mode(mode);
    let f = MxFunction::new(&g, vec![v], vec![out], opts).unwrap();
    let jf = f.jacobian(&mut g, 0, 0, false, false).unwrap();
    jf.eval(&[Matrix::column(x.to_vec())]).unwrap()[0].to_dense(0.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sx_eval_matches_tree(t in arb_tree(4), x in arb_point()) {
        let mut g = SxGraph::new();
        let v = g.sym_column("x", N_VARS);
        let e = t.build_sx(&mut g, v.nonzeros());
        let f = SxFunction::new(&g, vec![v], vec![Matrix::scalar(e)], FunctionOptions::default())
            .unwrap();
        let got = f.eval(&[Matrix::column(x.clone())]).unwrap()[0].at(0, 0);
        prop_assert!(close(got, t.value(&x)), "{} vs {}", got, t.value(&x));
    }

    #[test]
    fn prop_mx_eval_matches_sx(t in arb_tree(4), x in arb_point()) {
        let mut g = MxGraph::new();
        let v = g.sym("x", N_VARS, 1);
        let vars: Vec<MxId> = (0..N_VARS).map(|i| g.element(v, i, 0).unwrap()).collect();
        let e = t.build_mx(&mut g, &vars);
        let f = MxFunction::new(&g, vec![v], vec![e], FunctionOptions::default()).unwrap();
        let got = f.eval(&[Matrix::column(x.clone())]).unwrap()[0].at(0, 0);
        prop_assert!(close(got, t.value(&x)));
    }

    #[test]
    fn prop_forward_reverse_agree_sx(
        trees in prop::collection::vec(arb_tree(3), 1..4),
        x in arb_point(),
    ) {
        let fwd = sx_jacobian(&trees, &x, AdMode::Forward);
        let rev = sx_jacobian(&trees, &x, AdMode::Reverse);
        prop_assert_eq!(fwd.len(), rev.len());
        for (a, b) in fwd.iter().zip(&rev) {
            prop_assert!(close(*a, *b), "{} vs {}", a, b);
        }
    }

    #[test]
    fn prop_forward_reverse_agree_mx(
        trees in prop::collection::vec(arb_tree(3), 1..4),
        x in arb_point(),
    ) {
        let fwd = mx_jacobian(&trees, &x, AdMode::Forward);
        let rev = mx_jacobian(&trees, &x, AdMode::Reverse);
        for (a, b) in fwd.iter().zip(&rev) {
            prop_assert!(close(*a, *b), "{} vs {}", a, b);
        }
    }

    #[test]
    fn prop_flavors_agree_on_jacobians(
        trees in prop::collection::vec(arb_tree(3), 1..4),
        x in arb_point(),
    ) {
        let s = sx_jacobian(&trees, &x, AdMode::Automatic);
        let m = mx_jacobian(&trees, &x, AdMode::Automatic);
        prop_assert_eq!(s.len(), m.len());
        for (a, b) in s.iter().zip(&m) {
            prop_assert!(close(*a, *b), "{} vs {}", a, b);
        }
    }
}
