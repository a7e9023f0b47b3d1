use nalgebra::Matrix2;
use steller_sparse::SparseMatrix;

use crate::quadtree::point_distance;

/// Mean length over the stored entries of `a`; one when `a` has no entries.
pub fn average_edge_length(a: &SparseMatrix, dim: usize, x: &[f64]) -> f64 {
    if a.nz() == 0 {
        return 1.0;
    }
    let mut total = 0.0;
    for i in 0..a.rows() {
        for &j in a.row(i) {
            total += point_distance(&x[i * dim..(i + 1) * dim], &x[j * dim..(j + 1) * dim]);
        }
    }
    total / a.nz() as f64
}

/// Whether degree-one nodes dominate the degree distribution.
///
/// True when they are more than 80% as common as the most common degree and make up more
/// than 30% of the nodes. Self loops do not count towards the degree.
pub fn power_law_graph(a: &SparseMatrix) -> bool {
    let m = a.rows();
    let mut mask = vec![0usize; m + 1];
    let mut max = 0;
    for i in 0..m {
        let deg = a.row(i).iter().filter(|&&j| j != i).count();
        if deg >= mask.len() {
            mask.resize(deg + 1, 0);
        }
        mask[deg] += 1;
        max = max.max(mask[deg]);
    }
    let leaves = mask.get(1).copied().unwrap_or(0) as f64;
    leaves > 0.8 * max as f64 && leaves > 0.3 * m as f64
}

fn center_points(dim: usize, x: &mut [f64]) {
    let n = x.len() / dim;
    let mut center = vec![0.0; dim];
    for p in x.chunks_exact(dim) {
        for (c, v) in center.iter_mut().zip(p) {
            *c += v;
        }
    }
    for c in &mut center {
        *c /= n as f64;
    }
    for p in x.chunks_exact_mut(dim) {
        for (v, c) in p.iter_mut().zip(&center) {
            *v -= c;
        }
    }
}

/// Maps `axis` onto the positive x direction.
fn align_axis(x: &mut [f64], axis: [f64; 2]) {
    for p in x.chunks_exact_mut(2) {
        let x0 = p[0] * axis[0] + p[1] * axis[1];
        let x1 = -p[0] * axis[1] + p[1] * axis[0];
        p[0] = x0;
        p[1] = x1;
    }
}

/// Centers a 2-D layout and rotates its principal axis onto the x axis.
///
/// Other dimensions are left untouched.
pub fn pcp_rotate(dim: usize, x: &mut [f64]) {
    if dim != 2 || x.is_empty() {
        return;
    }
    center_points(dim, x);
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in x.chunks_exact(2) {
        sxx += p[0] * p[0];
        sxy += p[0] * p[1];
        syy += p[1] * p[1];
    }
    let eigen = Matrix2::new(sxx, sxy, sxy, syy).symmetric_eigen();
    let major = eigen.eigenvalues.imax();
    let v = eigen.eigenvectors.column(major);
    let len = (v[0] * v[0] + v[1] * v[1]).sqrt();
    if len == 0.0 || !len.is_finite() {
        return;
    }
    // Pick the sign with a non-negative y component.
    let sign = if v[1] < 0.0 || (v[1] == 0.0 && v[0] < 0.0) {
        -1.0
    } else {
        1.0
    };
    align_axis(x, [sign * v[0] / len, sign * v[1] / len]);
}

/// Centers a 2-D layout and rotates it counter-clockwise by `angle` degrees.
pub fn rotate(dim: usize, x: &mut [f64], angle: f64) {
    if dim != 2 || x.is_empty() {
        return;
    }
    center_points(dim, x);
    let radian = -angle.to_radians();
    align_axis(x, [radian.cos(), radian.sin()]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use steller_sparse::{CoordinateMatrix, ValueKind};

    fn star(leaves: usize) -> SparseMatrix {
        let n = leaves + 1;
        let mut c = CoordinateMatrix::new(n, n, ValueKind::Real);
        for l in 1..n {
            c.add_entry(0, l, 1.0).unwrap();
            c.add_entry(l, 0, 1.0).unwrap();
        }
        SparseMatrix::from_coordinate_format(&c)
    }

    #[test]
    fn average_edge_length_uses_every_coordinate() {
        let a = star(2);
        let x = [0.0, 0.0, 3.0, 4.0, 0.0, 2.0];
        // Edges 0-1 (length 5) and 0-2 (length 2), each stored twice.
        assert!((average_edge_length(&a, 2, &x) - 3.5).abs() < 1e-12);
        let empty = SparseMatrix::new(3, 3, ValueKind::Real);
        assert_eq!(average_edge_length(&empty, 2, &x), 1.0);
    }

    #[test]
    fn stars_are_power_law_but_paths_are_not() {
        assert!(power_law_graph(&star(9)));
        let mut c = CoordinateMatrix::new(6, 6, ValueKind::Real);
        for i in 0..5 {
            c.add_entry(i, i + 1, 1.0).unwrap();
            c.add_entry(i + 1, i, 1.0).unwrap();
        }
        assert!(!power_law_graph(&SparseMatrix::from_coordinate_format(&c)));
    }

    #[test]
    fn pcp_rotate_lays_a_diagonal_line_flat() {
        let mut x: Vec<f64> = (0..5).flat_map(|i| [i as f64 + 1.0, i as f64 + 1.0]).collect();
        pcp_rotate(2, &mut x);
        let sum_x: f64 = x.chunks(2).map(|p| p[0]).sum();
        assert!(sum_x.abs() < 1e-12);
        for p in x.chunks(2) {
            assert!(p[1].abs() < 1e-9, "point {p:?} is off the x axis");
        }
        let spread = x[8] - x[0];
        assert!((spread.abs() - 4.0 * 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn rotate_quarter_turn() {
        let mut x = vec![1.0, 0.0, -1.0, 0.0];
        rotate(2, &mut x, 90.0);
        assert!(x[0].abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
        assert!((x[3] + 1.0).abs() < 1e-12);
    }
}
