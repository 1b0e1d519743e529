//! Derivatives against finite differences, on both graph flavors.

use skein_expr::{AdMode, FunctionOptions, MxFunction, MxGraph, SxFunction, SxGraph, SxMatrix};
use skein_sparse::{Matrix, Sparsity};

const H: f64 = 1e-6;

/// f(x, y) = x * y + sin(x)
fn f(x: f64, y: f64) -> f64 {
    x * y + x.sin()
}

fn sx_sample() -> (SxGraph, SxFunction) {
    let mut g = SxGraph::new();
    let x = g.sym("x");
    let y = g.sym("y");
    let xy = g.mul(x, y);
    let s = g.sin(x);
    let out = g.add(xy, s);
    let func = SxFunction::new(
        &g,
        vec![Matrix::scalar(x), Matrix::scalar(y)],
        vec![Matrix::scalar(out)],
        FunctionOptions::new("f"),
    )
    .unwrap();
    (g, func)
}

/// Evaluate an expression of `g` as a function of the inputs of `f`.
fn eval_sx(g: &SxGraph, f: &SxFunction, m: &SxMatrix, args: &[Matrix<f64>]) -> Matrix<f64> {
    SxFunction::new(g, f.inputs().to_vec(), vec![m.clone()], FunctionOptions::default())
        .unwrap()
        .eval(args)
        .unwrap()
        .remove(0)
}

#[test]
fn scalar_gradient_matches_finite_differences() {
    let (mut g, func) = sx_sample();
    let args = [Matrix::scalar(1.0), Matrix::scalar(2.0)];
    let dx = func.grad(&mut g, 0, 0).unwrap();
    let dy = func.grad(&mut g, 1, 0).unwrap();
    let gx = eval_sx(&g, &func, &dx, &args).at(0, 0);
    let gy = eval_sx(&g, &func, &dy, &args).at(0, 0);

    let fdx = (f(1.0 + H, 2.0) - f(1.0 - H, 2.0)) / (2.0 * H);
    let fdy = (f(1.0, 2.0 + H) - f(1.0, 2.0 - H)) / (2.0 * H);
    assert!((gx - fdx).abs() < 1e-6, "{gx} vs {fdx}");
    assert!((gy - fdy).abs() < 1e-6, "{gy} vs {fdy}");
    assert!((gx - (2.0 + 1f64.cos())).abs() < 1e-12);
}

#[test]
fn matrix_gradient_matches_finite_differences() {
    let mut g = MxGraph::new();
    let v = g.sym("v", 2, 1);
    let x = g.element(v, 0, 0).unwrap();
    let y = g.element(v, 1, 0).unwrap();
    let xy = g.mul(x, y).unwrap();
    let s = g.sin(x);
    let out = g.add(xy, s).unwrap();
    let func = MxFunction::new(&g, vec![v], vec![out], FunctionOptions::new("f")).unwrap();

    let gr = func.grad(&mut g, 0, 0).unwrap();
    let gf = MxFunction::new(&g, vec![v], vec![gr], FunctionOptions::default()).unwrap();
    let val = gf.eval(&[Matrix::column(vec![1.0, 2.0])]).unwrap().remove(0);

    let fdx = (f(1.0 + H, 2.0) - f(1.0 - H, 2.0)) / (2.0 * H);
    let fdy = (f(1.0, 2.0 + H) - f(1.0, 2.0 - H)) / (2.0 * H);
    assert!((val.nonzeros()[0] - fdx).abs() < 1e-6);
    assert!((val.nonzeros()[1] - fdy).abs() < 1e-6);
}

#[test]
fn forward_and_reverse_jacobians_agree() {
    // r(x) = [x0 * x1 * x2, exp(x0) - x2, x1 / (1 + x2^2)]
    let mut g = SxGraph::new();
    let x = g.sym_column("x", 3);
    let [a, b, c] = [x.nonzeros()[0], x.nonzeros()[1], x.nonzeros()[2]];
    let ab = g.mul(a, b);
    let r0 = g.mul(ab, c);
    let ea = g.exp(a);
    let r1 = g.sub(ea, c);
    let c2 = g.mul(c, c);
    let one = g.lit(1.0);
    let den = g.add(one, c2);
    let r2 = g.div(b, den);
    let out = Matrix::column(vec![r0, r1, r2]);

    let at = [Matrix::column(vec![0.4, -1.1, 0.7])];
    let mut dense = Vec::new();
    for mode in [AdMode::Forward, AdMode::Reverse] {
        let func = SxFunction::new(
            &g,
            vec![x.clone()],
            vec![out.clone()],
            FunctionOptions::new("r").ad_mode(mode),
        )
        .unwrap();
        let j = func.jac(&mut g, 0, 0, false, false).unwrap();
        dense.push(eval_sx(&g, &func, &j, &at).to_dense(0.0));
    }
    for (p, q) in dense[0].iter().zip(&dense[1]) {
        assert!((p - q).abs() < 1e-12);
    }
    // dr2/dx2 = -2 x1 x2 / (1 + x2^2)^2, column-major entry (2, 2)
    let want = -2.0 * -1.1 * 0.7 / (1.0f64 + 0.49).powi(2);
    assert!((dense[0][8] - want).abs() < 1e-12);
}

#[test]
fn uncompressed_seeding_gives_the_same_jacobian() {
    let mut g = SxGraph::new();
    let x = g.sym_column("x", 4);
    let nz = x.nonzeros().to_vec();
    // banded: y_i = sin(x_i) * x_{i+1}
    let ys: Vec<_> = (0..3)
        .map(|i| {
            let s = g.sin(nz[i]);
            g.mul(s, nz[i + 1])
        })
        .collect();
    let y = Matrix::column(ys);
    let at = [Matrix::column(vec![0.1, 0.2, 0.3, 0.4])];
    let mut values = Vec::new();
    for compress in [true, false] {
        let func = SxFunction::new(
            &g,
            vec![x.clone()],
            vec![y.clone()],
            FunctionOptions::new("band").ad_mode(AdMode::Forward).compress(compress),
        )
        .unwrap();
        let j = func.jac(&mut g, 0, 0, false, false).unwrap();
        assert_eq!(j.nnz(), 6);
        values.push(eval_sx(&g, &func, &j, &at));
    }
    assert_eq!(values[0].sparsity(), values[1].sparsity());
    for (p, q) in values[0].nonzeros().iter().zip(values[1].nonzeros()) {
        assert!((p - q).abs() < 1e-14);
    }
}

#[test]
fn hessian_matches_differenced_gradient() {
    // f(x) = x0^2 x1 + x1^3 / 3 + sin(x0 x1)
    let mut g = SxGraph::new();
    let x = g.sym_column("x", 2);
    let [a, b] = [x.nonzeros()[0], x.nonzeros()[1]];
    let a2 = g.mul(a, a);
    let t0 = g.mul(a2, b);
    let three = g.lit(3.0);
    let b3 = g.pow(b, three);
    let t1 = g.div(b3, three);
    let ab = g.mul(a, b);
    let t2 = g.sin(ab);
    let s = g.add(t0, t1);
    let f = g.add(s, t2);
    let func = SxFunction::new(
        &g,
        vec![x.clone()],
        vec![Matrix::scalar(f)],
        FunctionOptions::new("f"),
    )
    .unwrap();

    let gr = func.grad(&mut g, 0, 0).unwrap();
    let h = func.hess(&mut g, 0, 0).unwrap();
    let p = [0.6, -0.3];
    let hv = eval_sx(&g, &func, &h, &[Matrix::column(p.to_vec())]);

    let grad_at = |q: [f64; 2]| eval_sx(&g, &func, &gr, &[Matrix::column(q.to_vec())]);
    for j in 0..2 {
        let (mut up, mut dn) = (p, p);
        up[j] += H;
        dn[j] -= H;
        let (gu, gd) = (grad_at(up), grad_at(dn));
        for i in 0..2 {
            let fd = (gu.at(i, 0) - gd.at(i, 0)) / (2.0 * H);
            assert!((hv.at(i, j) - fd).abs() < 1e-5, "H[{i},{j}]");
        }
    }
    assert!((hv.at(0, 1) - hv.at(1, 0)).abs() < 1e-12);
}

#[test]
fn sparse_hessian_matches_differenced_gradient() {
    // f(x) = x0 * sum(x_i^2) + sum(sin(x_i) x_{i+1}): arrowhead plus band
    const N: usize = 6;
    let mut g = SxGraph::new();
    let x = g.sym_column("x", N);
    let nz = x.nonzeros().to_vec();
    let squares: Vec<_> = nz.iter().map(|&e| g.mul(e, e)).collect();
    let norm = g.sum(&Matrix::column(squares));
    let mut f = g.mul(nz[0], norm);
    for i in 0..N - 1 {
        let s = g.sin(nz[i]);
        let t = g.mul(s, nz[i + 1]);
        f = g.add(f, t);
    }

    let p: Vec<f64> = (0..N).map(|i| 0.2 + 0.3 * i as f64 - 0.1 * (i % 2) as f64).collect();
    let mut hessians = Vec::new();
    for compress in [true, false] {
        let func = SxFunction::new(
            &g,
            vec![x.clone()],
            vec![Matrix::scalar(f)],
            FunctionOptions::new("arrow").compress(compress),
        )
        .unwrap();
        let h = func.hess(&mut g, 0, 0).unwrap();
        // first row and column, diagonal, off-diagonal band
        assert_eq!(h.nnz(), 2 * N - 1 + (N - 1) + 2 * (N - 2));
        let hv = eval_sx(&g, &func, &h, &[Matrix::column(p.clone())]);

        let gr = func.grad(&mut g, 0, 0).unwrap();
        let grad_at = |q: &[f64]| eval_sx(&g, &func, &gr, &[Matrix::column(q.to_vec())]);
        for j in 0..N {
            let (mut up, mut dn) = (p.clone(), p.clone());
            up[j] += H;
            dn[j] -= H;
            let (gu, gd) = (grad_at(&up[..]), grad_at(&dn[..]));
            for i in 0..N {
                let fd = (gu.at(i, 0) - gd.at(i, 0)) / (2.0 * H);
                assert!((hv.at(i, j) - fd).abs() < 1e-5, "H[{i},{j}] compress={compress}");
            }
        }
        hessians.push(hv);
    }
    assert_eq!(hessians[0].sparsity(), hessians[1].sparsity());
    for (a, b) in hessians[0].nonzeros().iter().zip(hessians[1].nonzeros()) {
        assert!((a - b).abs() < 1e-12);
    }
}

/// tanh(D' ((D v)^2 .* exp(v) + sum(D) v / 2)) for diagonal `d` and dense `v`.
fn diagonal_model(d: &[f64; 3], v: &[f64; 3]) -> [f64; 3] {
    let s: f64 = d.iter().sum();
    core::array::from_fn(|i| {
        let inner = (d[i] * v[i]).powi(2) * v[i].exp() + s * v[i] / 2.0;
        (d[i] * inner).tanh()
    })
}

#[test]
fn sparse_matrix_jacobian_matches_finite_differences() {
    let d0 = [0.7, -0.4, 1.2];
    let v0 = [0.3, -0.8, 0.5];
    for mode in [AdMode::Forward, AdMode::Reverse] {
        let mut g = MxGraph::new();
        let d = g.sym_sparse("d", Sparsity::diag(3));
        let v = g.sym("v", 3, 1);
        let dv = g.mtimes(d, v).unwrap();
        let two = g.scalar(2.0);
        let sq = g.pow(dv, two).unwrap();
        let ev = g.exp(v);
        let lhs = g.mul(sq, ev).unwrap();
        let sd = g.sum(d);
        let sv = g.mul(sd, v).unwrap();
        let rhs = g.div(sv, two).unwrap();
        let inner = g.add(lhs, rhs).unwrap();
        let dt = g.transpose(d);
        let m = g.mtimes(dt, inner).unwrap();
        let out = g.tanh(m);
        let opts = FunctionOptions::new("diag").ad_mode(mode);
        let func = MxFunction::new(&g, vec![d, v], vec![out], opts).unwrap();
        let at = [
            Matrix::new(Sparsity::diag(3), d0.to_vec()),
            Matrix::column(v0.to_vec()),
        ];

        for iind in 0..2 {
            let sp = func.input_sparsity(iind).unwrap().clone();
            let lin = sp.linear_indices();
            for compact in [true, false] {
                let jf = func.jacobian(&mut g, iind, 0, compact, false).unwrap();
                let j = jf.eval(&at).unwrap().remove(0);
                let cols = if compact { sp.nnz() } else { sp.numel() };
                assert_eq!(j.shape(), (3, cols));
                for k in 0..sp.nnz() {
                    let (mut d_up, mut d_dn, mut v_up, mut v_dn) = (d0, d0, v0, v0);
                    if iind == 0 {
                        d_up[k] += H;
                        d_dn[k] -= H;
                    } else {
                        v_up[k] += H;
                        v_dn[k] -= H;
                    }
                    let hi = diagonal_model(&d_up, &v_up);
                    let lo = diagonal_model(&d_dn, &v_dn);
                    let col = if compact { k } else { lin[k] };
                    for i in 0..3 {
                        let fd = (hi[i] - lo[i]) / (2.0 * H);
                        let got = j.at(i, col);
                        assert!(
                            (got - fd).abs() < 1e-6,
                            "{mode:?} input {iind} compact={compact} ({i}, {k}): {got} vs {fd}"
                        );
                    }
                }
            }
        }
    }
}

/// sqrt(x) tan(y) + log(x y) + x^y
fn mixed(x: f64, y: f64) -> f64 {
    x.sqrt() * y.tan() + (x * y).ln() + x.powf(y)
}

#[test]
fn restricted_domain_partials_match_finite_differences() {
    let (x0, y0): (f64, f64) = (1.7, 0.4);
    let want = [
        0.5 / x0.sqrt() * y0.tan() + 1.0 / x0 + y0 * x0.powf(y0 - 1.0),
        x0.sqrt() / y0.cos().powi(2) + 1.0 / y0 + x0.powf(y0) * x0.ln(),
    ];
    let fd = [
        (mixed(x0 + H, y0) - mixed(x0 - H, y0)) / (2.0 * H),
        (mixed(x0, y0 + H) - mixed(x0, y0 - H)) / (2.0 * H),
    ];
    for k in 0..2 {
        assert!((fd[k] - want[k]).abs() < 1e-6, "{} vs {}", fd[k], want[k]);
    }

    let mut g = SxGraph::new();
    let x = g.sym("x");
    let y = g.sym("y");
    let rx = g.sqrt(x);
    let ty = g.tan(y);
    let a = g.mul(rx, ty);
    let xy = g.mul(x, y);
    let b = g.log(xy);
    let c = g.pow(x, y);
    let ab = g.add(a, b);
    let e = g.add(ab, c);
    let func = SxFunction::new(
        &g,
        vec![Matrix::scalar(x), Matrix::scalar(y)],
        vec![Matrix::scalar(e)],
        FunctionOptions::new("mixed"),
    )
    .unwrap();
    let args = [Matrix::scalar(x0), Matrix::scalar(y0)];
    for (k, w) in want.iter().enumerate() {
        let d = func.grad(&mut g, k, 0).unwrap();
        let got = eval_sx(&g, &func, &d, &args).at(0, 0);
        assert!((got - w).abs() < 1e-10, "scalar d/d{k}: {got} vs {w}");
    }

    let mut g = MxGraph::new();
    let v = g.sym("v", 2, 1);
    let x = g.element(v, 0, 0).unwrap();
    let y = g.element(v, 1, 0).unwrap();
    let rx = g.sqrt(x);
    let ty = g.tan(y);
    let a = g.mul(rx, ty).unwrap();
    let xy = g.mul(x, y).unwrap();
    let b = g.log(xy);
    let c = g.pow(x, y).unwrap();
    let ab = g.add(a, b).unwrap();
    let e = g.add(ab, c).unwrap();
    let func = MxFunction::new(&g, vec![v], vec![e], FunctionOptions::new("mixed")).unwrap();
    let gr = func.grad(&mut g, 0, 0).unwrap();
    let gf = MxFunction::new(&g, vec![v], vec![gr], FunctionOptions::default()).unwrap();
    let got = gf.eval(&[Matrix::column(vec![x0, y0])]).unwrap().remove(0);
    for (k, w) in want.iter().enumerate() {
        assert!((got.at(k, 0) - w).abs() < 1e-10, "matrix d/d{k}: {} vs {w}", got.at(k, 0));
    }
}

#[test]
fn derivative_functions_evaluate_directional_derivatives() {
    let (_, func) = sx_sample();
    let fwd = func.forward_derivative().unwrap();
    let rev = func.reverse_derivative().unwrap();
    assert_eq!(fwd.name(), "fwd_f");
    assert_eq!(rev.name(), "rev_f");

    let (x, y) = (0.3, -1.4);
    let (tx, ty) = (0.5, 2.0);
    let t = fwd
        .eval(&[
            Matrix::scalar(x),
            Matrix::scalar(y),
            Matrix::scalar(tx),
            Matrix::scalar(ty),
        ])
        .unwrap();
    let want = (y + x.cos()) * tx + x * ty;
    assert!((t[0].at(0, 0) - want).abs() < 1e-12);

    let a = rev
        .eval(&[Matrix::scalar(x), Matrix::scalar(y), Matrix::scalar(3.0)])
        .unwrap();
    assert!((a[0].at(0, 0) - 3.0 * (y + x.cos())).abs() < 1e-12);
    assert!((a[1].at(0, 0) - 3.0 * x).abs() < 1e-12);
}

#[test]
fn free_variables_differentiate_as_constants() {
    let mut g = SxGraph::new();
    let x = g.sym("x");
    let p = g.sym("p");
    let e = g.mul(x, p);
    let func = SxFunction::new(
        &g,
        vec![Matrix::scalar(x)],
        vec![Matrix::scalar(e)],
        FunctionOptions::default(),
    )
    .unwrap();
    let d = func.grad(&mut g, 0, 0).unwrap();
    assert_eq!(d.nonzeros()[0], p);
}
