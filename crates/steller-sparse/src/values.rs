use std::fmt;

/// Numeric payload of a sparse matrix, one value per stored entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Real(Vec<f64>),
    Integer(Vec<i64>),
    /// Structure only; every stored entry reads as one.
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Real,
    Integer,
    Pattern,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Real => "real",
            ValueKind::Integer => "integer",
            ValueKind::Pattern => "pattern",
        };
        f.write_str(s)
    }
}

impl Values {
    pub fn with_capacity(kind: ValueKind, capacity: usize) -> Self {
        match kind {
            ValueKind::Real => Values::Real(Vec::with_capacity(capacity)),
            ValueKind::Integer => Values::Integer(Vec::with_capacity(capacity)),
            ValueKind::Pattern => Values::Pattern,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Values::Real(_) => ValueKind::Real,
            Values::Integer(_) => ValueKind::Integer,
            Values::Pattern => ValueKind::Pattern,
        }
    }

    /// Number of stored values, `None` for a pattern.
    pub fn len(&self) -> Option<usize> {
        match self {
            Values::Real(v) => Some(v.len()),
            Values::Integer(v) => Some(v.len()),
            Values::Pattern => None,
        }
    }

    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            Values::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_real_mut(&mut self) -> Option<&mut [f64]> {
        match self {
            Values::Real(v) => Some(v),
            _ => None,
        }
    }

    /// Value `k` widened to `f64`; pattern entries read as one.
    pub fn get_f64(&self, k: usize) -> f64 {
        match self {
            Values::Real(v) => v[k],
            Values::Integer(v) => v[k] as f64,
            Values::Pattern => 1.0,
        }
    }

    pub(crate) fn gather(&self, indices: &[usize]) -> Values {
        match self {
            Values::Real(v) => Values::Real(indices.iter().map(|&k| v[k]).collect()),
            Values::Integer(v) => Values::Integer(indices.iter().map(|&k| v[k]).collect()),
            Values::Pattern => Values::Pattern,
        }
    }

    // The binary helpers below assume both sides share a kind; callers check that up front.

    pub(crate) fn push_from(&mut self, src: &Values, k: usize) {
        match (self, src) {
            (Values::Real(dst), Values::Real(s)) => dst.push(s[k]),
            (Values::Integer(dst), Values::Integer(s)) => dst.push(s[k]),
            _ => {}
        }
    }

    pub(crate) fn add_from(&mut self, pos: usize, src: &Values, k: usize) {
        match (self, src) {
            (Values::Real(dst), Values::Real(s)) => dst[pos] += s[k],
            (Values::Integer(dst), Values::Integer(s)) => dst[pos] += s[k],
            _ => {}
        }
    }

    pub(crate) fn push_product(&mut self, a: &Values, ka: usize, b: &Values, kb: usize) {
        match (self, a, b) {
            (Values::Real(dst), Values::Real(x), Values::Real(y)) => dst.push(x[ka] * y[kb]),
            (Values::Integer(dst), Values::Integer(x), Values::Integer(y)) => {
                dst.push(x[ka] * y[kb])
            }
            _ => {}
        }
    }

    pub(crate) fn add_product(
        &mut self,
        pos: usize,
        a: &Values,
        ka: usize,
        b: &Values,
        kb: usize,
    ) {
        match (self, a, b) {
            (Values::Real(dst), Values::Real(x), Values::Real(y)) => dst[pos] += x[ka] * y[kb],
            (Values::Integer(dst), Values::Integer(x), Values::Integer(y)) => {
                dst[pos] += x[ka] * y[kb]
            }
            _ => {}
        }
    }
}
