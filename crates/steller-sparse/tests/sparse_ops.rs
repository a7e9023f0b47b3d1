use steller_sparse::{CoordinateMatrix, SparseMatrix, ValueKind, Values};

fn ring(n: usize) -> SparseMatrix {
    let mut c = CoordinateMatrix::with_capacity(n, n, ValueKind::Real, n);
    for i in 0..n {
        c.add_entry(i, (i + 1) % n, 1.0).unwrap();
    }
    SparseMatrix::from_coordinate_format(&c)
}

#[test]
fn compaction_counts_distinct_pairs_only() {
    let irn = vec![0, 1, 0, 2, 1, 0];
    let jcn = vec![1, 2, 1, 0, 2, 1];
    let vals = Values::Real(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let a = SparseMatrix::from_coordinate_arrays(3, 3, irn, jcn, vals).unwrap();
    assert_eq!(a.nz(), 3);
    let total: f64 = a.real_values().unwrap().iter().sum();
    assert_eq!(total, 21.0);
    assert_eq!(a.real_values().unwrap(), &[10.0, 7.0, 4.0]);
}

#[test]
fn symmetrize_is_idempotent() {
    let a = ring(6);
    assert!(!a.is_symmetric(false));
    let once = a.symmetrize(false).unwrap().into_owned();
    let twice = once.symmetrize(false).unwrap();
    assert_eq!(once.ia(), twice.ia());
    assert_eq!(once.ja(), twice.ja());
    assert_eq!(once.values(), twice.values());
    assert!(once.is_symmetric(false));
    for i in 0..6 {
        assert_eq!(once.degree(i), 2, "node {i} should have both ring neighbours");
    }
}

#[test]
fn transpose_twice_is_identity() {
    let a = ring(5);
    let back = a.transpose().transpose();
    assert_eq!(a.ia(), back.ia());
    assert_eq!(a.ja(), back.ja());
    assert_eq!(a.values(), back.values());
}

#[test]
fn cycle_has_one_component_and_ring_distances() {
    let a = ring(8);
    let comps = a.weakly_connected_components().unwrap();
    assert_eq!(comps.len(), 1);
    let d = a.distance_matrix(false).unwrap();
    assert!(d.connected);
    assert_eq!(d.get(0, 4), 4.0);
    assert_eq!(d.get(0, 7), 1.0);
    assert_eq!(d.get(3, 6), 3.0);
}

#[test]
fn prolongation_product_has_expected_shape() {
    // P maps 4 fine nodes onto 2 clusters; R A P is the 2x2 coarse matrix.
    let p = SparseMatrix::from_coordinate_arrays(
        4,
        2,
        vec![0, 1, 2, 3],
        vec![0, 0, 1, 1],
        Values::Real(vec![1.0; 4]),
    )
    .unwrap();
    let a = ring(4).symmetrize(false).unwrap().into_owned();
    let r = p.transpose();
    let coarse = r.multiply3(&a, &p).unwrap();
    assert_eq!((coarse.rows(), coarse.cols()), (2, 2));
    assert!(coarse.is_symmetric(false));
    let sum: f64 = coarse.real_values().unwrap().iter().sum();
    assert_eq!(sum, 8.0);
}
