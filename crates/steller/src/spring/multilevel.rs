use steller_sparse::{SparseMatrix, ValueKind};
use tracing::debug;

use super::embedding::{
    spring_electrical_embedding, spring_electrical_embedding_fast,
    spring_electrical_embedding_slow,
};
use super::{
    POWER_LAW_P, QUAD_TREE_HYBRID_SIZE, QuadTreeScheme, SpringElectricalControl, pcp_rotate,
    power_law_graph, rotate,
};
use crate::error::{Error, Result, check_coordinates};
use crate::multilevel::{Multilevel, MultilevelControl};
use crate::rng::XorShift64Star;
use crate::smoothing::post_process_smoothing;

/// Moves every node halfway towards the mean of its neighbours, in node order and in place.
pub fn interpolate_coord(dim: usize, a: &SparseMatrix, x: &mut [f64]) {
    let alpha = 0.5;
    let mut y = vec![0.0; dim];
    for i in 0..a.rows() {
        y.fill(0.0);
        let mut nz = 0;
        for &j in a.row(i) {
            if j == i {
                continue;
            }
            nz += 1;
            for k in 0..dim {
                y[k] += x[j * dim + k];
            }
        }
        if nz > 0 {
            let beta = (1.0 - alpha) / nz as f64;
            for k in 0..dim {
                x[i * dim + k] = alpha * x[i * dim + k] + beta * y[k];
            }
        }
    }
}

/// Lifts coarse coordinates `xc` onto the finer level.
///
/// `a` and `r` belong to the fine level, `p` to the coarse one. Every cluster member except the
/// first is jittered by `delta * (u - 0.5)` so that merged nodes do not coincide.
pub fn prolongate(
    dim: usize,
    a: &SparseMatrix,
    p: &SparseMatrix,
    r: &SparseMatrix,
    xc: &[f64],
    delta: f64,
    rng: &mut XorShift64Star,
) -> Result<Vec<f64>> {
    let mut y = p.multiply_dense(xc, dim)?;
    interpolate_coord(dim, a, &mut y);
    for i in 0..r.rows() {
        for k in r.row_range(i).skip(1) {
            let j = r.ja()[k];
            for c in 0..dim {
                y[j * dim + c] += delta * (rng.next_f64_unit() - 0.5);
            }
        }
    }
    Ok(y)
}

fn embed_level(
    dim: usize,
    a: &SparseMatrix,
    ctrl: &mut SpringElectricalControl,
    x: &mut [f64],
) -> Result<()> {
    match ctrl.tscheme {
        QuadTreeScheme::None => spring_electrical_embedding_slow(dim, a, ctrl, x),
        QuadTreeScheme::Fast => spring_electrical_embedding_fast(dim, a, ctrl, x),
        QuadTreeScheme::Hybrid if a.rows() > QUAD_TREE_HYBRID_SIZE => {
            debug!(n = a.rows(), "hybrid scheme switches to cell-cell forces");
            spring_electrical_embedding_fast(dim, a, ctrl, x)
        }
        QuadTreeScheme::Hybrid | QuadTreeScheme::Normal => {
            spring_electrical_embedding(dim, a, ctrl, x)
        }
    }
}

/// Multilevel spring-electrical layout of `a` into `x` (`n * dim`, row-major).
///
/// The graph is coarsened, the coarsest level laid out, and the result prolongated and refined
/// level by level. The finished layout is smoothed as `ctrl.smoothing` asks, rotated onto its
/// principal axis in 2-D and finally rotated by `ctrl.rotation` degrees. `ctrl` itself is left
/// unchanged.
pub fn multilevel_spring_electrical_embedding(
    dim: usize,
    a: &SparseMatrix,
    d: Option<&SparseMatrix>,
    ctrl: &SpringElectricalControl,
    x: &mut [f64],
    rng: &mut XorShift64Star,
) -> Result<()> {
    multilevel_spring_electrical_embedding_with(
        dim,
        a,
        d,
        ctrl,
        &MultilevelControl::default(),
        x,
        rng,
    )
}

/// [`multilevel_spring_electrical_embedding`] with explicit coarsening settings.
///
/// A non-zero `ctrl.multilevels` still overrides `mctrl.maxlevel`.
pub fn multilevel_spring_electrical_embedding_with(
    dim: usize,
    a: &SparseMatrix,
    d: Option<&SparseMatrix>,
    ctrl: &SpringElectricalControl,
    mctrl: &MultilevelControl,
    x: &mut [f64],
    rng: &mut XorShift64Star,
) -> Result<()> {
    if !a.is_square() {
        return Err(Error::NotSquare {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    let n = a.rows();
    check_coordinates(n, dim, x)?;
    if n == 0 {
        return Ok(());
    }

    let mut ctrl = ctrl.clone();
    let a = if !a.is_symmetric(false) || a.kind() != ValueKind::Real {
        a.get_real_adjacency_matrix_symmetrized()?
    } else {
        a.remove_diagonal()
    };

    let mut mctrl = mctrl.clone();
    if ctrl.multilevels > 0 {
        mctrl.maxlevel = ctrl.multilevels;
    }
    let hierarchy = Multilevel::new(&a, d, &mctrl, rng)?;

    if ctrl.p.is_none() {
        let p = if power_law_graph(&a) { POWER_LAW_P } else { -1.0 };
        ctrl.p = Some(p);
    }

    let mut level = hierarchy.coarsest_index();
    let mut xc = if level == 0 {
        x.to_vec()
    } else {
        vec![0.0; hierarchy.coarsest().n() * dim]
    };
    loop {
        let current = hierarchy.level(level);
        debug!(level, n = current.n(), "laying out level");
        embed_level(dim, &current.a, &mut ctrl, &mut xc)?;
        if hierarchy.is_finest(level) {
            break;
        }
        let fine = hierarchy.level(level - 1);
        let (Some(p), Some(r)) = (current.p.as_ref(), fine.r.as_ref()) else {
            unreachable!("levels above the finest always carry transfer operators");
        };
        let k = ctrl.k.unwrap_or(1.0);
        xc = prolongate(dim, &fine.a, p, r, &xc, k * 0.001, rng)?;
        level -= 1;

        ctrl.random_start = false;
        ctrl.k = Some(k * 0.75);
        ctrl.adaptive_cooling = false;
        ctrl.step = 0.1;
    }
    x.copy_from_slice(&xc);

    post_process_smoothing(dim, &a, &ctrl, x)?;
    if dim == 2 {
        pcp_rotate(dim, x);
    }
    if ctrl.rotation != 0.0 {
        rotate(dim, x, ctrl.rotation);
    }
    Ok(())
}
