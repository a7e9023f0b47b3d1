use std::borrow::Cow;
use std::ops::Range;

use crate::coordinate::CoordinateMatrix;
use crate::error::{Error, Result};
use crate::values::{ValueKind, Values};

/// Absolute tolerance used when comparing mirrored values in [`SparseMatrix::is_symmetric`].
pub const SYMMETRY_EPSILON: f64 = 1e-7;

const UNSET: usize = usize::MAX;

/// An `m x n` matrix in compressed sparse row form.
///
/// Row `i` occupies `ja[ia[i]..ia[i + 1]]`. The symmetry flags are hints: when set they are
/// trusted, when clear the structure is inspected.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    m: usize,
    n: usize,
    ia: Vec<usize>,
    ja: Vec<usize>,
    values: Values,
    symmetric: bool,
    pattern_symmetric: bool,
    undirected: bool,
}

impl SparseMatrix {
    /// An empty `m x n` matrix.
    pub fn new(m: usize, n: usize, kind: ValueKind) -> Self {
        Self::from_parts(m, n, vec![0; m + 1], Vec::new(), Values::with_capacity(kind, 0))
    }

    fn from_parts(m: usize, n: usize, ia: Vec<usize>, ja: Vec<usize>, values: Values) -> Self {
        Self {
            m,
            n,
            ia,
            ja,
            values,
            symmetric: false,
            pattern_symmetric: false,
            undirected: false,
        }
    }

    /// Wraps existing CSR arrays after validating them.
    pub fn from_csr(
        m: usize,
        n: usize,
        ia: Vec<usize>,
        ja: Vec<usize>,
        values: Values,
    ) -> Result<Self> {
        if ia.len() != m + 1 {
            return Err(Error::LengthMismatch {
                what: "row pointer array",
                expected: m + 1,
                actual: ia.len(),
            });
        }
        if ia[0] != 0 || ia.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::MalformedStructure {
                reason: "row pointers must start at zero and never decrease",
            });
        }
        if ia[m] != ja.len() {
            return Err(Error::MalformedStructure {
                reason: "last row pointer must equal the number of entries",
            });
        }
        if let Some(len) = values.len() {
            if len != ja.len() {
                return Err(Error::LengthMismatch {
                    what: "value array",
                    expected: ja.len(),
                    actual: len,
                });
            }
        }
        for i in 0..m {
            for &j in &ja[ia[i]..ia[i + 1]] {
                if j >= n {
                    return Err(Error::IndexOutOfBounds {
                        row: i,
                        col: j,
                        rows: m,
                        cols: n,
                    });
                }
            }
        }
        Ok(Self::from_parts(m, n, ia, ja, values))
    }

    /// Every entry of a row-major dense array becomes a stored entry, zeros included.
    pub fn from_dense(m: usize, n: usize, x: &[f64]) -> Result<Self> {
        if x.len() != m * n {
            return Err(Error::LengthMismatch {
                what: "dense array",
                expected: m * n,
                actual: x.len(),
            });
        }
        let ia = (0..=m).map(|i| i * n).collect();
        let ja = (0..m).flat_map(|_| 0..n).collect();
        Ok(Self::from_parts(m, n, ia, ja, Values::Real(x.to_vec())))
    }

    /// Compacts coordinate entries into CSR, summing repeated `(i, j)` pairs.
    ///
    /// Column indices come out sorted within each row.
    pub fn from_coordinate_format(coo: &CoordinateMatrix) -> Self {
        let raw = Self::from_coordinate_format_not_compacted(coo);
        let mut ia = Vec::with_capacity(raw.m + 1);
        ia.push(0);
        let mut ja = Vec::with_capacity(raw.nz());
        let mut values = Values::with_capacity(raw.kind(), raw.nz());
        let mut scratch: Vec<(usize, usize)> = Vec::new();
        for i in 0..raw.m {
            scratch.clear();
            scratch.extend(raw.row_range(i).map(|k| (raw.ja[k], k)));
            // Stable so equal columns keep insertion order when summed.
            scratch.sort_by_key(|&(j, _)| j);
            let row_start = ja.len();
            for &(j, k) in &scratch {
                if ja.len() > row_start && ja[ja.len() - 1] == j {
                    values.add_from(ja.len() - 1, &raw.values, k);
                } else {
                    ja.push(j);
                    values.push_from(&raw.values, k);
                }
            }
            ia.push(ja.len());
        }
        Self::from_parts(raw.m, raw.n, ia, ja, values)
    }

    /// CSR view of the coordinate entries with duplicates kept, in insertion order per row.
    pub fn from_coordinate_format_not_compacted(coo: &CoordinateMatrix) -> Self {
        let (m, n) = (coo.rows(), coo.cols());
        let irn = coo.row_indices();
        let jcn = coo.col_indices();
        let mut ia = vec![0usize; m + 1];
        for &i in irn {
            ia[i + 1] += 1;
        }
        for i in 0..m {
            ia[i + 1] += ia[i];
        }
        let mut next = ia[..m].to_vec();
        let mut ja = vec![0usize; irn.len()];
        let mut order = vec![0usize; irn.len()];
        for (k, (&i, &j)) in irn.iter().zip(jcn).enumerate() {
            let slot = next[i];
            ja[slot] = j;
            order[slot] = k;
            next[i] += 1;
        }
        let values = coo.values().gather(&order);
        Self::from_parts(m, n, ia, ja, values)
    }

    pub fn from_coordinate_arrays(
        m: usize,
        n: usize,
        irn: Vec<usize>,
        jcn: Vec<usize>,
        values: Values,
    ) -> Result<Self> {
        let coo = CoordinateMatrix::from_arrays(m, n, irn, jcn, values)?;
        Ok(Self::from_coordinate_format(&coo))
    }

    pub fn rows(&self) -> usize {
        self.m
    }

    pub fn cols(&self) -> usize {
        self.n
    }

    pub fn nz(&self) -> usize {
        self.ja.len()
    }

    pub fn is_square(&self) -> bool {
        self.m == self.n
    }

    pub fn ia(&self) -> &[usize] {
        &self.ia
    }

    pub fn ja(&self) -> &[usize] {
        &self.ja
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn kind(&self) -> ValueKind {
        self.values.kind()
    }

    pub fn real_values(&self) -> Option<&[f64]> {
        self.values.as_real()
    }

    pub fn real_values_mut(&mut self) -> Option<&mut [f64]> {
        self.values.as_real_mut()
    }

    pub fn row_range(&self, i: usize) -> Range<usize> {
        self.ia[i]..self.ia[i + 1]
    }

    /// Column indices stored in row `i`.
    pub fn row(&self, i: usize) -> &[usize] {
        &self.ja[self.ia[i]..self.ia[i + 1]]
    }

    pub fn degree(&self, i: usize) -> usize {
        self.ia[i + 1] - self.ia[i]
    }

    /// Value of stored entry `k` as `f64` (pattern entries are one).
    pub fn value(&self, k: usize) -> f64 {
        self.values.get_f64(k)
    }

    pub fn known_symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn known_pattern_symmetric(&self) -> bool {
        self.pattern_symmetric
    }

    pub fn known_undirected(&self) -> bool {
        self.undirected
    }

    pub fn set_symmetric(&mut self, symmetric: bool) {
        self.symmetric = symmetric;
    }

    pub fn set_pattern_symmetric(&mut self, pattern_symmetric: bool) {
        self.pattern_symmetric = pattern_symmetric;
    }

    pub fn set_undirected(&mut self, undirected: bool) {
        self.undirected = undirected;
    }

    pub(crate) fn ensure_square(&self) -> Result<()> {
        if self.m != self.n {
            return Err(Error::NotSquare {
                rows: self.m,
                cols: self.n,
            });
        }
        Ok(())
    }

    fn ensure_same_kind(&self, other: &SparseMatrix) -> Result<()> {
        if self.kind() != other.kind() {
            return Err(Error::ValueKindMismatch {
                left: self.kind(),
                right: other.kind(),
            });
        }
        Ok(())
    }

    fn dimension_mismatch(&self, op: &'static str, other: &SparseMatrix) -> Error {
        Error::DimensionMismatch {
            op,
            left_rows: self.m,
            left_cols: self.n,
            right_rows: other.m,
            right_cols: other.n,
        }
    }

    /// Keeps the entries for which `keep(row, col)` holds.
    fn filter_entries(&self, keep: impl Fn(usize, usize) -> bool) -> SparseMatrix {
        let mut ia = Vec::with_capacity(self.m + 1);
        ia.push(0);
        let mut ja = Vec::with_capacity(self.nz());
        let mut kept = Vec::with_capacity(self.nz());
        for i in 0..self.m {
            for k in self.row_range(i) {
                let j = self.ja[k];
                if keep(i, j) {
                    ja.push(j);
                    kept.push(k);
                }
            }
            ia.push(ja.len());
        }
        let values = self.values.gather(&kept);
        Self::from_parts(self.m, self.n, ia, ja, values)
    }

    pub fn transpose(&self) -> SparseMatrix {
        let nz = self.nz();
        let mut ib = vec![0usize; self.n + 1];
        for &j in &self.ja {
            ib[j + 1] += 1;
        }
        for j in 0..self.n {
            ib[j + 1] += ib[j];
        }
        let mut next = ib[..self.n].to_vec();
        let mut jb = vec![0usize; nz];
        let mut order = vec![0usize; nz];
        for i in 0..self.m {
            for k in self.row_range(i) {
                let j = self.ja[k];
                let slot = next[j];
                jb[slot] = i;
                order[slot] = k;
                next[j] += 1;
            }
        }
        let mut out = Self::from_parts(self.n, self.m, ib, jb, self.values.gather(&order));
        out.symmetric = self.symmetric;
        out.pattern_symmetric = self.pattern_symmetric;
        out.undirected = self.undirected;
        out
    }

    /// `A + B`: union of the patterns with coincident values summed.
    pub fn add(&self, other: &SparseMatrix) -> Result<SparseMatrix> {
        if self.m != other.m || self.n != other.n {
            return Err(self.dimension_mismatch("add", other));
        }
        self.ensure_same_kind(other)?;

        let mut mask = vec![UNSET; self.n];
        let mut ic = Vec::with_capacity(self.m + 1);
        ic.push(0);
        let mut jc = Vec::with_capacity(self.nz() + other.nz());
        let mut vc = Values::with_capacity(self.kind(), self.nz() + other.nz());
        for i in 0..self.m {
            let row_start = jc.len();
            for k in self.row_range(i) {
                let j = self.ja[k];
                mask[j] = jc.len();
                jc.push(j);
                vc.push_from(&self.values, k);
            }
            for k in other.row_range(i) {
                let j = other.ja[k];
                if mask[j] != UNSET && mask[j] >= row_start {
                    vc.add_from(mask[j], &other.values, k);
                } else {
                    mask[j] = jc.len();
                    jc.push(j);
                    vc.push_from(&other.values, k);
                }
            }
            ic.push(jc.len());
        }
        Ok(Self::from_parts(self.m, self.n, ic, jc, vc))
    }

    /// `A * B` by row-wise accumulation.
    pub fn multiply(&self, other: &SparseMatrix) -> Result<SparseMatrix> {
        if self.n != other.m {
            return Err(self.dimension_mismatch("multiply", other));
        }
        self.ensure_same_kind(other)?;

        let mut mask = vec![UNSET; other.n];
        let mut ic = Vec::with_capacity(self.m + 1);
        ic.push(0);
        let mut jc = Vec::new();
        let mut vc = Values::with_capacity(self.kind(), self.nz());
        for i in 0..self.m {
            let row_start = jc.len();
            for ka in self.row_range(i) {
                let l = self.ja[ka];
                for kb in other.row_range(l) {
                    let j = other.ja[kb];
                    if mask[j] != UNSET && mask[j] >= row_start {
                        vc.add_product(mask[j], &self.values, ka, &other.values, kb);
                    } else {
                        mask[j] = jc.len();
                        jc.push(j);
                        vc.push_product(&self.values, ka, &other.values, kb);
                    }
                }
            }
            ic.push(jc.len());
        }
        Ok(Self::from_parts(self.m, other.n, ic, jc, vc))
    }

    /// `A * B * C`.
    pub fn multiply3(&self, b: &SparseMatrix, c: &SparseMatrix) -> Result<SparseMatrix> {
        if self.n != b.m {
            return Err(self.dimension_mismatch("multiply3", b));
        }
        if b.n != c.m {
            return Err(b.dimension_mismatch("multiply3", c));
        }
        self.multiply(b)?.multiply(c)
    }

    /// Structural (and, unless `pattern_only`, numerical) symmetry test.
    ///
    /// Values are compared with [`SYMMETRY_EPSILON`]. Non-square matrices are never symmetric.
    pub fn is_symmetric(&self, pattern_only: bool) -> bool {
        if self.symmetric {
            return true;
        }
        if pattern_only && self.pattern_symmetric {
            return true;
        }
        if self.m != self.n {
            return false;
        }

        let b = self.transpose();
        let compare_values = !pattern_only && self.kind() != ValueKind::Pattern;
        let mut mask = vec![UNSET; self.n];
        for i in 0..self.m {
            if self.degree(i) != b.degree(i) {
                return false;
            }
            let row_start = self.ia[i];
            for k in self.row_range(i) {
                mask[self.ja[k]] = k;
            }
            for kb in b.row_range(i) {
                let ka = mask[b.ja[kb]];
                if ka == UNSET || ka < row_start {
                    return false;
                }
                if compare_values && (self.value(ka) - b.value(kb)).abs() > SYMMETRY_EPSILON {
                    return false;
                }
            }
        }
        true
    }

    /// `A + Aᵗ`, or `A` itself when it is already symmetric.
    pub fn symmetrize(&self, pattern_only: bool) -> Result<Cow<'_, SparseMatrix>> {
        if self.is_symmetric(pattern_only) {
            return Ok(Cow::Borrowed(self));
        }
        let mut out = self.add(&self.transpose())?;
        out.symmetric = true;
        out.pattern_symmetric = true;
        Ok(Cow::Owned(out))
    }

    pub fn symmetrize_nodiag(&self) -> Result<SparseMatrix> {
        Ok(self.symmetrize(false)?.remove_diagonal())
    }

    /// Same structure with no values.
    pub fn to_pattern(&self) -> SparseMatrix {
        let mut out = Self::from_parts(
            self.m,
            self.n,
            self.ia.clone(),
            self.ja.clone(),
            Values::Pattern,
        );
        out.pattern_symmetric = self.pattern_symmetric || self.symmetric;
        out.undirected = self.undirected;
        out
    }

    /// Replaces every stored value with `1.0`.
    pub fn set_entries_to_real_one(&mut self) {
        self.values = Values::Real(vec![1.0; self.nz()]);
        self.symmetric = self.pattern_symmetric;
    }

    /// Unit-weight adjacency matrix: symmetric pattern, no self loops, real values of one.
    pub fn get_real_adjacency_matrix_symmetrized(&self) -> Result<SparseMatrix> {
        self.ensure_square()?;
        let pattern = self.to_pattern();
        let mut out = pattern.symmetrize(true)?.remove_diagonal();
        out.pattern_symmetric = true;
        out.set_entries_to_real_one();
        Ok(out)
    }

    pub fn remove_diagonal(&self) -> SparseMatrix {
        let mut out = self.filter_entries(|i, j| i != j);
        out.symmetric = self.symmetric;
        out.pattern_symmetric = self.pattern_symmetric;
        out.undirected = self.undirected;
        out
    }

    /// Keeps the strictly lower triangle.
    pub fn remove_upper(&self) -> SparseMatrix {
        self.filter_entries(|i, j| j < i)
    }

    /// Symmetrized strictly lower triangle flagged as an undirected edge list.
    pub fn make_undirected(&self) -> Result<SparseMatrix> {
        let mut out = self.symmetrize(true)?.remove_upper();
        out.undirected = true;
        Ok(out)
    }

    pub fn has_diagonal(&self) -> bool {
        (0..self.m).any(|i| self.row(i).contains(&i))
    }

    /// Divides each row by its number of stored entries.
    pub fn divide_row_by_degree(&mut self) -> Result<()> {
        let kind = self.kind();
        match &mut self.values {
            Values::Real(a) => {
                for i in 0..self.m {
                    let deg = self.ia[i + 1] - self.ia[i];
                    if deg == 0 {
                        continue;
                    }
                    for v in &mut a[self.ia[i]..self.ia[i + 1]] {
                        *v /= deg as f64;
                    }
                }
                self.symmetric = false;
                Ok(())
            }
            Values::Pattern => Ok(()),
            Values::Integer(_) => Err(Error::UnsupportedValueKind {
                op: "divide_row_by_degree",
                kind,
            }),
        }
    }

    /// Applies `f` to every real value in place.
    pub fn apply_fun(&mut self, f: impl Fn(f64) -> f64) -> Result<()> {
        let kind = self.kind();
        let a = self
            .values
            .as_real_mut()
            .ok_or(Error::UnsupportedValueKind {
                op: "apply_fun",
                kind,
            })?;
        for v in a.iter_mut() {
            *v = f(*v);
        }
        Ok(())
    }

    /// `A * v`; `None` multiplies by the all-ones vector.
    pub fn multiply_vector(&self, v: Option<&[f64]>) -> Result<Vec<f64>> {
        if let Some(v) = v {
            if v.len() != self.n {
                return Err(Error::LengthMismatch {
                    what: "vector",
                    expected: self.n,
                    actual: v.len(),
                });
            }
        }
        let mut out = vec![0.0; self.m];
        for (i, o) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for k in self.row_range(i) {
                let x = v.map_or(1.0, |v| v[self.ja[k]]);
                sum += self.value(k) * x;
            }
            *o = sum;
        }
        Ok(out)
    }

    /// `A * X` where `X` is `n x dim`, row-major; the result is `m x dim`, row-major.
    pub fn multiply_dense(&self, x: &[f64], dim: usize) -> Result<Vec<f64>> {
        if x.len() != self.n * dim {
            return Err(Error::LengthMismatch {
                what: "dense operand",
                expected: self.n * dim,
                actual: x.len(),
            });
        }
        let mut out = vec![0.0; self.m * dim];
        for i in 0..self.m {
            for k in self.row_range(i) {
                let j = self.ja[k];
                let a = self.value(k);
                for d in 0..dim {
                    out[i * dim + d] += a * x[j * dim + d];
                }
            }
        }
        Ok(out)
    }

    /// Rows and columns selected (and renumbered) by the given index lists; `None` keeps all.
    pub fn get_submatrix(
        &self,
        rows: Option<&[usize]>,
        cols: Option<&[usize]>,
    ) -> Result<SparseMatrix> {
        let row_list: Vec<usize> = match rows {
            Some(r) => r.to_vec(),
            None => (0..self.m).collect(),
        };
        let mut col_map = vec![UNSET; self.n];
        let nc = match cols {
            Some(c) => {
                for (new, &old) in c.iter().enumerate() {
                    if old >= self.n {
                        return Err(Error::IndexOutOfBounds {
                            row: 0,
                            col: old,
                            rows: self.m,
                            cols: self.n,
                        });
                    }
                    col_map[old] = new;
                }
                c.len()
            }
            None => {
                for (j, slot) in col_map.iter_mut().enumerate() {
                    *slot = j;
                }
                self.n
            }
        };

        let mut ia = Vec::with_capacity(row_list.len() + 1);
        ia.push(0);
        let mut ja = Vec::new();
        let mut kept = Vec::new();
        for &i in &row_list {
            if i >= self.m {
                return Err(Error::IndexOutOfBounds {
                    row: i,
                    col: 0,
                    rows: self.m,
                    cols: self.n,
                });
            }
            for k in self.row_range(i) {
                let j = col_map[self.ja[k]];
                if j != UNSET {
                    ja.push(j);
                    kept.push(k);
                }
            }
            ia.push(ja.len());
        }
        let values = self.values.gather(&kept);
        Ok(Self::from_parts(row_list.len(), nc, ia, ja, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(m: usize, n: usize, entries: &[(usize, usize, f64)]) -> SparseMatrix {
        let mut c = CoordinateMatrix::new(m, n, ValueKind::Real);
        for &(i, j, v) in entries {
            c.add_entry(i, j, v).unwrap();
        }
        SparseMatrix::from_coordinate_format(&c)
    }

    fn dense(a: &SparseMatrix) -> Vec<f64> {
        let mut out = vec![0.0; a.rows() * a.cols()];
        for i in 0..a.rows() {
            for k in a.row_range(i) {
                out[i * a.cols() + a.ja()[k]] += a.value(k);
            }
        }
        out
    }

    #[test]
    fn coordinate_compaction_sums_repeated_entries() {
        let a = real(
            3,
            3,
            &[(0, 1, 1.0), (2, 0, 2.0), (0, 1, 2.5), (0, 0, 1.0), (2, 0, -1.0)],
        );
        assert_eq!(a.nz(), 3);
        assert_eq!(a.ia(), &[0, 2, 2, 3]);
        assert_eq!(a.ja(), &[0, 1, 0]);
        assert_eq!(a.real_values().unwrap(), &[1.0, 3.5, 1.0]);
    }

    #[test]
    fn not_compacted_keeps_duplicates_in_insertion_order() {
        let mut c = CoordinateMatrix::new(2, 2, ValueKind::Real);
        c.add_entry(1, 1, 1.0).unwrap();
        c.add_entry(0, 1, 2.0).unwrap();
        c.add_entry(1, 1, 3.0).unwrap();
        let a = SparseMatrix::from_coordinate_format_not_compacted(&c);
        assert_eq!(a.nz(), 3);
        assert_eq!(a.row(1), &[1, 1]);
        assert_eq!(a.real_values().unwrap(), &[2.0, 1.0, 3.0]);
    }

    #[test]
    fn from_csr_rejects_bad_row_pointers() {
        let err = SparseMatrix::from_csr(2, 2, vec![0, 2, 1], vec![0], Values::Pattern);
        assert!(err.is_err());
        let err = SparseMatrix::from_csr(1, 2, vec![0, 1], vec![5], Values::Pattern);
        assert!(matches!(err, Err(Error::IndexOutOfBounds { col: 5, .. })));
    }

    #[test]
    fn transpose_swaps_rows_and_columns() {
        let a = real(2, 3, &[(0, 2, 4.0), (1, 0, 5.0), (1, 2, 6.0)]);
        let t = a.transpose();
        assert_eq!((t.rows(), t.cols()), (3, 2));
        assert_eq!(dense(&t), vec![0.0, 5.0, 0.0, 0.0, 4.0, 6.0]);
    }

    #[test]
    fn add_unions_patterns_and_sums_values() {
        let a = real(2, 2, &[(0, 0, 1.0), (0, 1, 2.0)]);
        let b = real(2, 2, &[(0, 1, 3.0), (1, 0, 4.0)]);
        let c = a.add(&b).unwrap();
        assert_eq!(c.nz(), 3);
        assert_eq!(dense(&c), vec![1.0, 5.0, 4.0, 0.0]);
    }

    #[test]
    fn add_and_multiply_report_dimension_mismatch() {
        let a = real(2, 3, &[(0, 0, 1.0)]);
        let b = real(2, 2, &[(0, 0, 1.0)]);
        assert!(matches!(
            a.add(&b),
            Err(Error::DimensionMismatch { op: "add", .. })
        ));
        assert!(matches!(
            a.multiply(&b),
            Err(Error::DimensionMismatch { op: "multiply", .. })
        ));
        assert!(b.multiply(&a).is_ok());
    }

    #[test]
    fn multiply_matches_dense_product() {
        let a = real(2, 3, &[(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0)]);
        let b = real(3, 2, &[(0, 1, 4.0), (1, 0, 5.0), (2, 0, 6.0), (2, 1, 7.0)]);
        let c = a.multiply(&b).unwrap();
        assert_eq!(dense(&c), vec![12.0, 18.0, 15.0, 0.0]);

        let i2 = real(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let abc = i2.multiply3(&a, &b).unwrap();
        assert_eq!(dense(&abc), dense(&c));
    }

    #[test]
    fn multiply_requires_matching_value_kinds() {
        let a = real(2, 2, &[(0, 0, 1.0)]);
        let p = a.to_pattern();
        assert!(matches!(
            a.multiply(&p),
            Err(Error::ValueKindMismatch { .. })
        ));
    }

    #[test]
    fn symmetry_test_uses_value_tolerance() {
        let a = real(2, 2, &[(0, 1, 1.0), (1, 0, 1.0 + 1e-9)]);
        assert!(a.is_symmetric(false));
        let b = real(2, 2, &[(0, 1, 1.0), (1, 0, 2.0)]);
        assert!(!b.is_symmetric(false));
        assert!(b.is_symmetric(true));
        let c = real(2, 3, &[(0, 1, 1.0)]);
        assert!(!c.is_symmetric(true));
    }

    #[test]
    fn symmetrize_borrows_when_already_symmetric() {
        let a = real(2, 2, &[(0, 1, 1.0), (1, 0, 1.0)]);
        assert!(matches!(a.symmetrize(false).unwrap(), Cow::Borrowed(_)));

        let b = real(2, 2, &[(0, 1, 1.0)]);
        let s = b.symmetrize(false).unwrap();
        assert!(matches!(s, Cow::Owned(_)));
        assert!(s.known_symmetric());
        assert_eq!(dense(&s), vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn symmetrize_nodiag_drops_self_loops() {
        let a = real(3, 3, &[(0, 0, 2.0), (0, 1, 1.0), (2, 1, 3.0)]);
        let s = a.symmetrize_nodiag().unwrap();
        assert!(!s.has_diagonal());
        assert_eq!(
            dense(&s),
            vec![0.0, 1.0, 0.0, 1.0, 0.0, 3.0, 0.0, 3.0, 0.0]
        );
    }

    #[test]
    fn real_adjacency_is_unit_symmetric_without_diagonal() {
        let a = real(3, 3, &[(0, 0, 5.0), (0, 1, 7.0), (0, 1, 1.0), (1, 2, -2.0)]);
        let adj = a.get_real_adjacency_matrix_symmetrized().unwrap();
        assert_eq!(
            dense(&adj),
            vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]
        );
        assert!(adj.is_symmetric(false));
        let rect = real(2, 3, &[(0, 1, 1.0)]);
        assert!(matches!(
            rect.get_real_adjacency_matrix_symmetrized(),
            Err(Error::NotSquare { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn remove_upper_keeps_strict_lower_triangle() {
        let a = real(3, 3, &[(0, 1, 1.0), (1, 0, 1.0), (2, 2, 1.0), (2, 0, 4.0)]);
        let l = a.remove_upper();
        assert_eq!(l.nz(), 2);
        assert_eq!(l.row(1), &[0]);
        assert_eq!(l.row(2), &[0]);
    }

    #[test]
    fn divide_row_by_degree_normalizes_rows() {
        let mut a = real(2, 3, &[(0, 0, 2.0), (0, 2, 4.0), (1, 1, 9.0)]);
        a.divide_row_by_degree().unwrap();
        assert_eq!(a.real_values().unwrap(), &[1.0, 2.0, 9.0]);

        let mut p = a.to_pattern();
        p.divide_row_by_degree().unwrap();
        assert_eq!(p.values(), &Values::Pattern);
    }

    #[test]
    fn multiply_vector_defaults_to_ones() {
        let a = real(2, 2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0)]);
        assert_eq!(a.multiply_vector(None).unwrap(), vec![3.0, 3.0]);
        assert_eq!(
            a.multiply_vector(Some(&[2.0, -1.0])).unwrap(),
            vec![0.0, -3.0]
        );
        assert!(a.multiply_vector(Some(&[1.0])).is_err());
    }

    #[test]
    fn multiply_dense_is_row_major() {
        let a = real(2, 2, &[(0, 1, 2.0), (1, 0, 1.0)]);
        let x = [1.0, 10.0, 2.0, 20.0];
        assert_eq!(a.multiply_dense(&x, 2).unwrap(), vec![4.0, 40.0, 1.0, 10.0]);
    }

    #[test]
    fn from_dense_stores_every_entry() {
        let a = SparseMatrix::from_dense(2, 2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(a.nz(), 4);
        assert!(a.has_diagonal());
        assert!(a.is_symmetric(false));
    }

    #[test]
    fn submatrix_renumbers_selection() {
        let a = real(3, 3, &[(0, 1, 1.0), (1, 2, 2.0), (2, 0, 3.0), (2, 2, 4.0)]);
        let s = a.get_submatrix(Some(&[2, 1]), Some(&[2, 0])).unwrap();
        assert_eq!((s.rows(), s.cols()), (2, 2));
        assert_eq!(dense(&s), vec![4.0, 3.0, 2.0, 0.0]);
        assert!(a.get_submatrix(Some(&[3]), None).is_err());
    }

    #[test]
    fn apply_fun_rejects_patterns() {
        let mut a = real(1, 2, &[(0, 0, -1.0), (0, 1, 2.0)]);
        a.apply_fun(f64::abs).unwrap();
        assert_eq!(a.real_values().unwrap(), &[1.0, 2.0]);
        let mut p = a.to_pattern();
        assert!(p.apply_fun(f64::abs).is_err());
    }
}
