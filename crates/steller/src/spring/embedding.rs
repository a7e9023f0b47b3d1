use std::borrow::Cow;
use std::f64::consts::PI;

use steller_sparse::SparseMatrix;
use tracing::{debug, trace};

use super::{OnedOptimizer, SpringElectricalControl, average_edge_length};
use crate::error::{Error, Result, check_coordinates};
use crate::quadtree::{
    MINDIST, QuadTree, RepulsiveForce, Supernodes, distance_cropped, point_distance,
    repulsion_denominator,
};
use crate::rng::XorShift64Star;

/// Force constants resolved from the control.
#[derive(Debug, Clone, Copy)]
struct Forces {
    p: f64,
    /// `K^(1 - p)`.
    kp: f64,
    /// `C^((2 - p) / 3) / K`.
    crk: f64,
}

/// Validates the input, applies the random start and resolves `K`, `C` and `p`, writing the
/// resolved values back into `ctrl`. `None` means there is nothing to do.
fn prepare<'a>(
    dim: usize,
    a: &'a SparseMatrix,
    ctrl: &mut SpringElectricalControl,
    x: &mut [f64],
) -> Result<Option<(Cow<'a, SparseMatrix>, Forces)>> {
    if !a.is_square() {
        return Err(Error::NotSquare {
            rows: a.rows(),
            cols: a.cols(),
        });
    }
    check_coordinates(a.rows(), dim, x)?;
    if a.rows() == 0 || ctrl.maxiter == 0 {
        return Ok(None);
    }
    let a = a.symmetrize(true)?;

    if ctrl.random_start {
        XorShift64Star::new(ctrl.random_seed).fill_unit(x);
    }
    let k = match ctrl.k {
        Some(k) if k > 0.0 => k,
        _ => average_edge_length(&a, dim, x),
    };
    ctrl.k = Some(k);
    if ctrl.c < 0.0 {
        ctrl.c = 0.2;
    }
    let p = match ctrl.p {
        Some(p) if p < 0.0 => p,
        _ => -1.0,
    };
    ctrl.p = Some(p);

    let forces = Forces {
        p,
        kp: k.powf(1.0 - p),
        crk: ctrl.c.powf((2.0 - p) / 3.0) / k,
    };
    Ok(Some((a, forces)))
}

pub(crate) fn update_step(
    adaptive_cooling: bool,
    step: f64,
    fnorm: f64,
    fnorm0: f64,
    cool: f64,
) -> f64 {
    if !adaptive_cooling {
        return cool * step;
    }
    if fnorm >= fnorm0 {
        cool * step
    } else if fnorm > 0.95 * fnorm0 {
        step
    } else {
        0.99 * step / cool
    }
}

/// `f -= CRK * |x_i - x_j| * (x_i - x_j)` over the neighbours of `i`.
fn add_attraction(a: &SparseMatrix, dim: usize, x: &[f64], i: usize, crk: f64, f: &mut [f64]) {
    let xi = &x[i * dim..(i + 1) * dim];
    for &j in a.row(i) {
        if j == i {
            continue;
        }
        let xj = &x[j * dim..(j + 1) * dim];
        let dist = point_distance(xi, xj);
        for k in 0..dim {
            f[k] -= crk * (xi[k] - xj[k]) * dist;
        }
    }
}

/// Exact repulsion on `i` from every other node.
fn add_repulsion(dim: usize, x: &[f64], i: usize, forces: Forces, f: &mut [f64]) {
    let n = x.len() / dim;
    let xi = &x[i * dim..(i + 1) * dim];
    for j in 0..n {
        if j == i {
            continue;
        }
        let xj = &x[j * dim..(j + 1) * dim];
        let scale = forces.kp / repulsion_denominator(distance_cropped(xi, xj), forces.p);
        for k in 0..dim {
            f[k] += scale * (xi[k] - xj[k]);
        }
    }
}

fn add_supernode_repulsion(
    dim: usize,
    xi: &[f64],
    supernodes: &Supernodes,
    forces: Forces,
    f: &mut [f64],
) {
    for j in 0..supernodes.len() {
        let center = &supernodes.centers[j * dim..(j + 1) * dim];
        let dist = supernodes.distances[j].max(MINDIST);
        let scale = supernodes.weights[j] * forces.kp / repulsion_denominator(dist, forces.p);
        for k in 0..dim {
            f[k] += scale * (xi[k] - center[k]);
        }
    }
}

/// Moves `xi` by `step` along the normalized `f`; returns `|f|`.
fn move_node(xi: &mut [f64], f: &mut [f64], step: f64) -> f64 {
    let norm = f.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in f.iter_mut() {
            *v /= norm;
        }
    }
    for (x, v) in xi.iter_mut().zip(f.iter()) {
        *x += step * v;
    }
    norm
}

/// Exact all-pairs forces, computed for every node before any of them moves.
pub fn spring_electrical_embedding_slow(
    dim: usize,
    a: &SparseMatrix,
    ctrl: &mut SpringElectricalControl,
    x: &mut [f64],
) -> Result<()> {
    let Some((a, forces)) = prepare(dim, a, ctrl, x)? else {
        return Ok(());
    };
    let n = a.rows();
    let mut force = vec![0.0; n * dim];
    let mut step = ctrl.step;
    let mut fnorm = 0.0;
    let mut iter = 0;
    loop {
        iter += 1;
        let fnorm0 = fnorm;
        fnorm = 0.0;
        force.fill(0.0);
        for i in 0..n {
            let f = &mut force[i * dim..(i + 1) * dim];
            add_repulsion(dim, x, i, forces, f);
            add_attraction(&a, dim, x, i, forces.crk, f);
        }
        for i in 0..n {
            fnorm += move_node(
                &mut x[i * dim..(i + 1) * dim],
                &mut force[i * dim..(i + 1) * dim],
                step,
            );
        }
        trace!(iter, step, fnorm, "spring-electrical (exact) iteration");
        step = update_step(ctrl.adaptive_cooling, step, fnorm, fnorm0, ctrl.cool);
        if step <= ctrl.tol || iter >= ctrl.maxiter {
            break;
        }
    }
    debug!(n, iter, step, fnorm, "spring-electrical (exact) finished");
    if ctrl.beautify_leaves {
        beautify_leaves(dim, &a, x);
    }
    Ok(())
}

/// Node-by-node embedding. Repulsion is exact below `quadtree_size` nodes and comes from
/// Barnes-Hut supernodes above it.
pub fn spring_electrical_embedding(
    dim: usize,
    a: &SparseMatrix,
    ctrl: &mut SpringElectricalControl,
    x: &mut [f64],
) -> Result<()> {
    let Some((a, forces)) = prepare(dim, a, ctrl, x)? else {
        return Ok(());
    };
    let n = a.rows();
    let use_qt = n >= ctrl.quadtree_size;
    let mut optimizer = OnedOptimizer::new(ctrl.max_qtree_level);
    let mut max_qtree_level = ctrl.max_qtree_level;
    let mut supernodes = Supernodes::default();
    let mut f = vec![0.0; dim];
    let mut step = ctrl.step;
    let mut fnorm = 0.0;
    let mut iter = 0;
    loop {
        iter += 1;
        let fnorm0 = fnorm;
        fnorm = 0.0;
        let qt = if use_qt {
            max_qtree_level = optimizer.get();
            Some(QuadTree::from_points(dim, x, max_qtree_level))
        } else {
            None
        };
        let mut nsuper_total = 0usize;
        let mut visited_total = 0usize;

        for i in 0..n {
            f.fill(0.0);
            add_attraction(&a, dim, x, i, forces.crk, &mut f);
            match &qt {
                Some(qt) => {
                    let xi = &x[i * dim..(i + 1) * dim];
                    qt.collect_supernodes(ctrl.bh, xi, i, &mut supernodes);
                    nsuper_total += supernodes.len();
                    visited_total += supernodes.visited;
                    add_supernode_repulsion(dim, xi, &supernodes, forces, &mut f);
                }
                None => add_repulsion(dim, x, i, forces, &mut f),
            }
            fnorm += move_node(&mut x[i * dim..(i + 1) * dim], &mut f, step);
        }

        if use_qt {
            let nsuper_avg = nsuper_total as f64 / n as f64;
            let counts_avg = visited_total as f64 / n as f64;
            optimizer.train(5.0 * nsuper_avg + counts_avg);
            trace!(iter, step, fnorm, nsuper_avg, max_qtree_level, "spring-electrical iteration");
        } else {
            trace!(iter, step, fnorm, "spring-electrical iteration");
        }
        step = update_step(ctrl.adaptive_cooling, step, fnorm, fnorm0, ctrl.cool);
        if step <= ctrl.tol || iter >= ctrl.maxiter {
            break;
        }
    }
    debug!(n, iter, step, fnorm, use_qt, "spring-electrical finished");
    if ctrl.beautify_leaves {
        beautify_leaves(dim, &a, x);
    }
    if use_qt {
        ctrl.max_qtree_level = max_qtree_level;
    }
    Ok(())
}

/// Embedding with cell-cell Barnes-Hut repulsion; every node moves after all forces are known.
pub fn spring_electrical_embedding_fast(
    dim: usize,
    a: &SparseMatrix,
    ctrl: &mut SpringElectricalControl,
    x: &mut [f64],
) -> Result<()> {
    let Some((a, forces)) = prepare(dim, a, ctrl, x)? else {
        return Ok(());
    };
    let n = a.rows();
    let mut optimizer = OnedOptimizer::new(ctrl.max_qtree_level);
    let mut max_qtree_level;
    let mut step = ctrl.step;
    let mut fnorm = 0.0;
    let mut iter = 0;
    loop {
        iter += 1;
        let fnorm0 = fnorm;
        fnorm = 0.0;
        max_qtree_level = optimizer.get();
        let qt = QuadTree::from_points(dim, x, max_qtree_level);
        let RepulsiveForce {
            forces: mut force,
            counts,
        } = qt.get_repulsive_force(ctrl.bh, forces.p, forces.kp);

        for i in 0..n {
            add_attraction(&a, dim, x, i, forces.crk, &mut force[i * dim..(i + 1) * dim]);
        }
        for i in 0..n {
            fnorm += move_node(
                &mut x[i * dim..(i + 1) * dim],
                &mut force[i * dim..(i + 1) * dim],
                step,
            );
        }

        optimizer.train(counts[0] + 0.85 * counts[1] + 3.3 * counts[2]);
        trace!(iter, step, fnorm, max_qtree_level, ?counts, "spring-electrical (fast) iteration");
        step = update_step(ctrl.adaptive_cooling, step, fnorm, fnorm0, ctrl.cool);
        if step <= ctrl.tol || iter >= ctrl.maxiter {
            break;
        }
    }
    debug!(n, iter, step, fnorm, "spring-electrical (fast) finished");
    if ctrl.beautify_leaves {
        beautify_leaves(dim, &a, x);
    }
    ctrl.max_qtree_level = max_qtree_level;
    Ok(())
}

/// Spring-electrical embedding with an extra spring pulling each pair stored in `d` towards its
/// value there, `±0.2 * CRK * (x_i - x_j) * (dist - d_ij)^2 / dist`.
pub fn spring_electrical_spring_embedding(
    dim: usize,
    a: &SparseMatrix,
    d: &SparseMatrix,
    ctrl: &mut SpringElectricalControl,
    x: &mut [f64],
) -> Result<()> {
    if d.rows() != a.rows() || d.cols() != a.cols() {
        return Err(steller_sparse::Error::DimensionMismatch {
            op: "spring_electrical_spring_embedding",
            left_rows: a.rows(),
            left_cols: a.cols(),
            right_rows: d.rows(),
            right_cols: d.cols(),
        }
        .into());
    }
    let Some((a, forces)) = prepare(dim, a, ctrl, x)? else {
        return Ok(());
    };
    let n = a.rows();
    let use_qt = n >= ctrl.quadtree_size;
    let mut supernodes = Supernodes::default();
    let mut f = vec![0.0; dim];
    let mut step = ctrl.step;
    let mut fnorm = 0.0;
    let mut iter = 0;
    loop {
        iter += 1;
        let fnorm0 = fnorm;
        fnorm = 0.0;
        let qt = use_qt.then(|| QuadTree::from_points(dim, x, ctrl.max_qtree_level));

        for i in 0..n {
            f.fill(0.0);
            add_attraction(&a, dim, x, i, forces.crk, &mut f);

            let xi = &x[i * dim..(i + 1) * dim];
            for k in d.row_range(i) {
                let j = d.ja()[k];
                if j == i {
                    continue;
                }
                let xj = &x[j * dim..(j + 1) * dim];
                let dist = distance_cropped(xi, xj);
                let dij = d.value(k);
                let mut scale = 0.2 * forces.crk * (dist - dij) * (dist - dij) / dist;
                if dist >= dij {
                    scale = -scale;
                }
                for c in 0..dim {
                    f[c] += scale * (xi[c] - xj[c]);
                }
            }

            match &qt {
                Some(qt) => {
                    qt.collect_supernodes(ctrl.bh, xi, i, &mut supernodes);
                    add_supernode_repulsion(dim, xi, &supernodes, forces, &mut f);
                }
                None => add_repulsion(dim, x, i, forces, &mut f),
            }
            fnorm += move_node(&mut x[i * dim..(i + 1) * dim], &mut f, step);
        }

        trace!(iter, step, fnorm, "spring embedding iteration");
        step = update_step(ctrl.adaptive_cooling, step, fnorm, fnorm0, ctrl.cool);
        if step <= ctrl.tol || iter >= ctrl.maxiter {
            break;
        }
    }
    debug!(n, iter, step, fnorm, "spring embedding finished");
    if ctrl.beautify_leaves {
        beautify_leaves(dim, &a, x);
    }
    Ok(())
}

/// Fans the degree-one neighbours of each node evenly around it, at their average distance.
///
/// Only the first two coordinates are rewritten.
pub(crate) fn beautify_leaves(dim: usize, a: &SparseMatrix, x: &mut [f64]) {
    if dim < 2 {
        return;
    }
    let m = a.rows();
    let degree = |i: usize| a.row(i).iter().filter(|&&j| j != i).count();
    let mut checked = vec![false; m];
    let mut leaves = Vec::new();
    for i in 0..m {
        if degree(i) != 1 || checked[i] {
            continue;
        }
        let Some(&p) = a.row(i).iter().find(|&&j| j != i) else {
            continue;
        };
        if checked[p] {
            continue;
        }
        checked[p] = true;
        leaves.clear();
        let mut dist = 0.0;
        for &j in a.row(p) {
            if j != p && degree(j) == 1 {
                checked[j] = true;
                dist += point_distance(&x[p * dim..(p + 1) * dim], &x[j * dim..(j + 1) * dim]);
                leaves.push(j);
            }
        }
        dist /= leaves.len() as f64;

        // Leave a small gap so the fan does not close on itself.
        let pad = 0.1;
        let mut ang = pad;
        let step = if leaves.len() > 1 {
            (2.0 * PI - 2.0 * pad) / leaves.len() as f64
        } else {
            0.0
        };
        for &leaf in &leaves {
            x[leaf * dim] = ang.cos() * dist + x[p * dim];
            x[leaf * dim + 1] = ang.sin() * dist + x[p * dim + 1];
            ang += step;
        }
    }
}
