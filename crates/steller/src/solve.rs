//! Preconditioned conjugate gradient for the symmetric systems of stress majorization.

use steller_sparse::SparseMatrix;
use tracing::{debug, trace, warn};

/// A linear map `y = Op(x)` on vectors of one fixed length.
pub trait Operator {
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

fn spmv(a: &SparseMatrix, x: &[f64], y: &mut [f64]) {
    for (i, yi) in y.iter_mut().enumerate().take(a.rows()) {
        let mut sum = 0.0;
        for k in a.row_range(i) {
            sum += a.value(k) * x[a.ja()[k]];
        }
        *yi = sum;
    }
}

/// `y = A x`.
#[derive(Debug, Clone, Copy)]
pub struct MatMul<'a>(pub &'a SparseMatrix);

impl Operator for MatMul<'_> {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        spmv(self.0, x, y);
    }
}

/// `y = A x + alpha (m x - sum(x))`: the Laplacian plus a uniform all-pairs term.
#[derive(Debug, Clone, Copy)]
pub struct UniformStressMatMul<'a> {
    pub a: &'a SparseMatrix,
    pub alpha: f64,
}

impl Operator for UniformStressMatMul<'_> {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        spmv(self.a, x, y);
        let m = self.a.rows();
        let xsum: f64 = x[..m].iter().sum();
        for i in 0..m {
            y[i] += self.alpha * (m as f64 * x[i] - xsum);
        }
    }
}

/// Jacobi preconditioner `y = x / diag`.
#[derive(Debug, Clone)]
pub struct DiagPrecon {
    inv_diag: Vec<f64>,
}

impl DiagPrecon {
    /// `1 / a_ii`, or one where the diagonal is zero or absent.
    pub fn new(a: &SparseMatrix) -> Self {
        Self::build(a, 1.0, |aii| 1.0 / aii)
    }

    /// Preconditioner matching [`UniformStressMatMul`]: `1 / ((m - 1) alpha + a_ii)`.
    pub fn uniform_stress(a: &SparseMatrix, alpha: f64) -> Self {
        let m1 = a.rows().saturating_sub(1).max(1) as f64;
        Self::build(a, 1.0 / m1, |aii| 1.0 / (m1 * alpha + aii))
    }

    fn build(a: &SparseMatrix, fallback: f64, invert: impl Fn(f64) -> f64) -> Self {
        let mut inv_diag = vec![fallback; a.rows()];
        for (i, d) in inv_diag.iter_mut().enumerate() {
            for k in a.row_range(i) {
                let v = a.value(k);
                if a.ja()[k] == i && v.abs() > 0.0 {
                    *d = invert(v);
                }
            }
        }
        Self { inv_diag }
    }
}

impl Operator for DiagPrecon {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for ((yi, xi), d) in y.iter_mut().zip(x).zip(&self.inv_diag) {
            *yi = xi * d;
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solves `A x = rhs` in place, starting from `x`.
///
/// Iterates while `iter < maxit` and the residual `|r| / n` exceeds `tol` times its initial
/// value. Returns the final residual; running out of iterations is not an error.
pub fn conjugate_gradient<A, M>(
    a: &A,
    precon: &M,
    x: &mut [f64],
    rhs: &[f64],
    tol: f64,
    maxit: usize,
) -> f64
where
    A: Operator + ?Sized,
    M: Operator + ?Sized,
{
    let n = x.len();
    if n == 0 {
        return 0.0;
    }
    let mut r = vec![0.0; n];
    let mut z = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut q = vec![0.0; n];

    a.apply(x, &mut r);
    for (ri, bi) in r.iter_mut().zip(rhs) {
        *ri = bi - *ri;
    }
    let res0 = dot(&r, &r).sqrt() / n as f64;
    let mut res = res0;
    let mut rho_old = 1.0;
    let mut iter = 0;

    while iter < maxit && res > tol * res0 {
        iter += 1;
        precon.apply(&r, &mut z);
        let rho = dot(&r, &z);
        if iter > 1 {
            let beta = rho / rho_old;
            for (pi, zi) in p.iter_mut().zip(&z) {
                *pi = zi + beta * *pi;
            }
        } else {
            p.copy_from_slice(&z);
        }
        a.apply(&p, &mut q);
        let pq = dot(&p, &q);
        if pq == 0.0 || !pq.is_finite() {
            warn!(iter, pq, "CG breakdown, keeping current iterate");
            break;
        }
        let alpha = rho / pq;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * q[i];
        }
        res = dot(&r, &r).sqrt() / n as f64;
        trace!(iter, res, "CG step");
        rho_old = rho;
    }
    debug!(n, iter, res, res0, "CG finished");
    res
}

/// Runs [`conjugate_gradient`] on each of the `dim` columns of the row-major `n x dim` system.
///
/// The solution overwrites `rhs`; `x0` is the starting guess. Returns the summed residuals.
#[allow(clippy::too_many_arguments)]
pub fn cg<A, M>(
    a: &A,
    precon: &M,
    n: usize,
    dim: usize,
    x0: &[f64],
    rhs: &mut [f64],
    tol: f64,
    maxit: usize,
) -> f64
where
    A: Operator + ?Sized,
    M: Operator + ?Sized,
{
    let mut x = vec![0.0; n];
    let mut b = vec![0.0; n];
    let mut res = 0.0;
    for k in 0..dim {
        for i in 0..n {
            x[i] = x0[i * dim + k];
            b[i] = rhs[i * dim + k];
        }
        res += conjugate_gradient(a, precon, &mut x, &b, tol, maxit);
        for i in 0..n {
            rhs[i * dim + k] = x[i];
        }
    }
    res
}

/// Jacobi-preconditioned CG on a sparse matrix; the solution overwrites `rhs`.
pub fn solve(
    a: &SparseMatrix,
    dim: usize,
    x0: &[f64],
    rhs: &mut [f64],
    tol: f64,
    maxit: usize,
) -> f64 {
    let precon = DiagPrecon::new(a);
    cg(&MatMul(a), &precon, a.rows(), dim, x0, rhs, tol, maxit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    fn spd5() -> (SparseMatrix, DMatrix<f64>) {
        #[rustfmt::skip]
        let dense = [
            6.0, -1.0, 0.0, 0.5, 0.0,
            -1.0, 5.0, -2.0, 0.0, 0.0,
            0.0, -2.0, 7.0, -1.0, 1.0,
            0.5, 0.0, -1.0, 4.0, -0.5,
            0.0, 0.0, 1.0, -0.5, 3.0,
        ];
        let sparse = SparseMatrix::from_dense(5, 5, &dense).unwrap();
        (sparse, DMatrix::from_row_slice(5, 5, &dense))
    }

    #[test]
    fn five_by_five_spd_system_is_exact_within_n_iterations() {
        let (a, dense) = spd5();
        let b = [1.0, -2.0, 3.0, 0.5, 4.0];
        let expected = dense
            .clone()
            .cholesky()
            .expect("test matrix is SPD")
            .solve(&DVector::from_row_slice(&b));

        let mut x = vec![0.0; 5];
        conjugate_gradient(&MatMul(&a), &DiagPrecon::new(&a), &mut x, &b, 1e-14, 5);
        for i in 0..5 {
            assert!(
                (x[i] - expected[i]).abs() < 1e-8,
                "component {i}: got {}, expected {}",
                x[i],
                expected[i]
            );
        }
    }

    #[test]
    fn solve_handles_every_column() {
        let (a, dense) = spd5();
        let x_true = [1.0, 2.0, -1.0, 0.0, 3.0, 1.0, -2.0, 0.5, 1.0, 1.0];
        // rhs = A * X for a 5 x 2 X.
        let mut rhs = a.multiply_dense(&x_true, 2).unwrap();
        let x0 = vec![0.0; 10];
        let res = solve(&a, 2, &x0, &mut rhs, 1e-14, 20);
        assert!(res < 1e-10);
        for (got, want) in rhs.iter().zip(&x_true) {
            assert!((got - want).abs() < 1e-8);
        }
        assert_eq!(dense.nrows(), 5);
    }

    #[test]
    fn zero_residual_start_returns_immediately() {
        let (a, _) = spd5();
        let mut x = vec![0.0; 5];
        let precon = DiagPrecon::new(&a);
        let res = conjugate_gradient(&MatMul(&a), &precon, &mut x, &[0.0; 5], 1e-6, 10);
        assert_eq!(res, 0.0);
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn uniform_stress_operator_adds_alpha_laplacian_of_complete_graph() {
        let (a, dense) = spd5();
        let alpha = 0.3;
        let x = [1.0, -1.0, 2.0, 0.0, 0.5];
        let mut y = [0.0; 5];
        UniformStressMatMul { a: &a, alpha }.apply(&x, &mut y);
        let ones = DMatrix::from_element(5, 5, 1.0);
        let full = &dense + (DMatrix::identity(5, 5) * 5.0 - ones) * alpha;
        let want = full * DVector::from_row_slice(&x);
        for i in 0..5 {
            assert!((y[i] - want[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn diagonal_preconditioner_falls_back_to_one() {
        let a = SparseMatrix::from_dense(2, 2, &[0.0, 1.0, 1.0, 4.0]).unwrap();
        let mut y = [0.0; 2];
        DiagPrecon::new(&a).apply(&[3.0, 8.0], &mut y);
        assert_eq!(y, [3.0, 2.0]);
        DiagPrecon::uniform_stress(&a, 0.5).apply(&[3.0, 8.0], &mut y);
        assert_eq!(y[0], 3.0);
        assert!((y[1] - 8.0 / 4.5).abs() < 1e-15);
    }
}
