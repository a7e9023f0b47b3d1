use crate::error::{Error, Result};
use crate::values::{ValueKind, Values};

/// Triplet (coordinate) form used to assemble a [`crate::SparseMatrix`].
///
/// Entries may repeat; compaction into CSR sums them.
#[derive(Debug, Clone)]
pub struct CoordinateMatrix {
    m: usize,
    n: usize,
    irn: Vec<usize>,
    jcn: Vec<usize>,
    values: Values,
}

impl CoordinateMatrix {
    pub fn new(m: usize, n: usize, kind: ValueKind) -> Self {
        Self::with_capacity(m, n, kind, 0)
    }

    pub fn with_capacity(m: usize, n: usize, kind: ValueKind, capacity: usize) -> Self {
        Self {
            m,
            n,
            irn: Vec::with_capacity(capacity),
            jcn: Vec::with_capacity(capacity),
            values: Values::with_capacity(kind, capacity),
        }
    }

    pub fn rows(&self) -> usize {
        self.m
    }

    pub fn cols(&self) -> usize {
        self.n
    }

    pub fn len(&self) -> usize {
        self.irn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.irn.is_empty()
    }

    pub fn kind(&self) -> ValueKind {
        self.values.kind()
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.irn
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.jcn
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    fn check_index(&self, i: usize, j: usize) -> Result<()> {
        if i >= self.m || j >= self.n {
            return Err(Error::IndexOutOfBounds {
                row: i,
                col: j,
                rows: self.m,
                cols: self.n,
            });
        }
        Ok(())
    }

    /// Appends a real entry. On a pattern matrix the value is dropped.
    pub fn add_entry(&mut self, i: usize, j: usize, value: f64) -> Result<()> {
        self.check_index(i, j)?;
        match &mut self.values {
            Values::Real(v) => v.push(value),
            Values::Pattern => {}
            Values::Integer(_) => {
                return Err(Error::ValueKindMismatch {
                    left: ValueKind::Integer,
                    right: ValueKind::Real,
                });
            }
        }
        self.irn.push(i);
        self.jcn.push(j);
        Ok(())
    }

    pub fn add_integer_entry(&mut self, i: usize, j: usize, value: i64) -> Result<()> {
        self.check_index(i, j)?;
        match &mut self.values {
            Values::Integer(v) => v.push(value),
            Values::Pattern => {}
            Values::Real(_) => {
                return Err(Error::ValueKindMismatch {
                    left: ValueKind::Real,
                    right: ValueKind::Integer,
                });
            }
        }
        self.irn.push(i);
        self.jcn.push(j);
        Ok(())
    }

    /// Builds a coordinate matrix from parallel arrays, checking every index.
    pub fn from_arrays(
        m: usize,
        n: usize,
        irn: Vec<usize>,
        jcn: Vec<usize>,
        values: Values,
    ) -> Result<Self> {
        if irn.len() != jcn.len() {
            return Err(Error::LengthMismatch {
                what: "column index array",
                expected: irn.len(),
                actual: jcn.len(),
            });
        }
        if let Some(len) = values.len() {
            if len != irn.len() {
                return Err(Error::LengthMismatch {
                    what: "value array",
                    expected: irn.len(),
                    actual: len,
                });
            }
        }
        let out = Self {
            m,
            n,
            irn,
            jcn,
            values,
        };
        for (&i, &j) in out.irn.iter().zip(&out.jcn) {
            out.check_index(i, j)?;
        }
        Ok(out)
    }
}
