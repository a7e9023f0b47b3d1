//! Post-processing applied after the multilevel layout.

use steller_sparse::{SparseMatrix, Values};
use tracing::{debug, warn};

use crate::error::{Error, Result, check_coordinates};
use crate::quadtree::point_distance;
use crate::rng::XorShift64Star;
use crate::spring::{Smoothing, SpringElectricalControl, spring_electrical_spring_embedding};
use crate::stress::{IdealDistance, StressMajorizationSmoother};

/// Penalty tying each node to its pre-smoothing position.
const STRESS_LAMBDA0: f64 = 0.05;
const STRESS_MAXIT: usize = 50;
const STRESS_TOL: f64 = 0.001;

/// Edge lengths derived from the graph structure: `deg(i) + deg(j) - |N(i) and N(j)|`.
///
/// The lengths are rescaled so that their mean equals the mean current edge length in `x`.
/// Diagonal entries of `a` get zero.
pub fn ideal_distance_matrix(a: &SparseMatrix, dim: usize, x: &[f64]) -> Result<SparseMatrix> {
    if !a.is_square() {
        return Err(Error::NotSquare {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    let m = a.rows();
    check_coordinates(m, dim, x)?;
    let p = |i: usize| &x[i * dim..(i + 1) * dim];

    let mut d = vec![0.0; a.nz()];
    let mut mask = vec![usize::MAX; m];
    let (mut sum_current, mut sum_ideal, mut count) = (0.0, 0.0, 0usize);
    for i in 0..m {
        mask[i] = i;
        for &k in a.row(i) {
            mask[k] = i;
        }
        for kk in a.row_range(i) {
            let k = a.ja()[kk];
            if k == i {
                continue;
            }
            let common = a.row(k).iter().filter(|&&l| mask[l] == i).count();
            let len = (a.degree(i) + a.degree(k)) as f64 - common as f64;
            d[kk] = len;
            sum_ideal += len;
            sum_current += point_distance(p(i), p(k));
            count += 1;
        }
    }
    if count > 0 && sum_ideal > 0.0 {
        let factor = sum_current / sum_ideal;
        for v in &mut d {
            *v *= factor;
        }
    }
    Ok(SparseMatrix::from_csr(
        m,
        m,
        a.ia().to_vec(),
        a.ja().to_vec(),
        Values::Real(d),
    )?)
}

/// Short spring-electrical run with target lengths on every pair at most two hops apart.
#[derive(Debug, Clone)]
pub struct SpringSmoother {
    d: SparseMatrix,
    ctrl: SpringElectricalControl,
}

impl SpringSmoother {
    pub fn new(
        a: &SparseMatrix,
        dim: usize,
        ctrl: &SpringElectricalControl,
        x: &[f64],
    ) -> Result<Self> {
        let ideal = ideal_distance_matrix(a, dim, x)?;
        let m = a.rows();

        let mut ia = Vec::with_capacity(m + 1);
        ia.push(0);
        let mut ja = Vec::new();
        let mut vals = Vec::new();
        let mut mask = vec![usize::MAX; m];
        for i in 0..m {
            mask[i] = i;
            for j in a.row_range(i) {
                let k = a.ja()[j];
                if mask[k] != i {
                    mask[k] = i;
                    ja.push(k);
                    vals.push(ideal.value(j));
                }
            }
            for j in a.row_range(i) {
                let k = a.ja()[j];
                for l in a.row_range(k) {
                    let t = a.ja()[l];
                    if mask[t] != i {
                        mask[t] = i;
                        ja.push(t);
                        vals.push(ideal.value(j) + ideal.value(l));
                    }
                }
            }
            ia.push(ja.len());
        }
        let d = SparseMatrix::from_csr(m, m, ia, ja, Values::Real(vals))?;

        let mut ctrl = ctrl.clone();
        ctrl.random_start = false;
        ctrl.multilevels = 1;
        ctrl.step /= 2.0;
        ctrl.maxiter = 20;
        Ok(Self { d, ctrl })
    }

    /// Target distances over the 2-hop neighbourhoods.
    pub fn distances(&self) -> &SparseMatrix {
        &self.d
    }

    pub fn smooth(&self, a: &SparseMatrix, dim: usize, x: &mut [f64]) -> Result<()> {
        let mut ctrl = self.ctrl.clone();
        spring_electrical_spring_embedding(dim, a, &self.d, &mut ctrl, x)
    }
}

/// Applies `ctrl.smoothing` to the layout `x` of the symmetric, loop-free graph `a`.
///
/// Stress smoothing on a layout whose edges all have length zero is skipped with a warning.
pub fn post_process_smoothing(
    dim: usize,
    a: &SparseMatrix,
    ctrl: &SpringElectricalControl,
    x: &mut [f64],
) -> Result<()> {
    let ideal = match ctrl.smoothing {
        Smoothing::None => return Ok(()),
        _ if a.nz() == 0 => return Ok(()),
        Smoothing::Spring => {
            debug!(n = a.rows(), "spring smoothing");
            return SpringSmoother::new(a, dim, ctrl, x)?.smooth(a, dim, x);
        }
        Smoothing::StressMajorizationGraphDist => IdealDistance::GraphDist,
        Smoothing::StressMajorizationAvgDist => IdealDistance::AvgDist,
        Smoothing::StressMajorizationPowerDist => IdealDistance::PowerDist,
    };
    debug!(n = a.rows(), ?ideal, "stress majorization smoothing");
    let sm = match StressMajorizationSmoother::new(a, dim, STRESS_LAMBDA0, x, ideal) {
        Ok(sm) => sm,
        Err(Error::DegenerateScaling) => {
            warn!("layout has no extent, skipping stress smoothing");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    let mut rng = XorShift64Star::new(ctrl.random_seed);
    sm.smooth(dim, x, STRESS_MAXIT, STRESS_TOL, &mut rng)?;
    Ok(())
}
