use crate::values::ValueKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "dimension mismatch in {op}: {left_rows}x{left_cols} against {right_rows}x{right_cols}"
    )]
    DimensionMismatch {
        op: &'static str,
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("entry ({row}, {col}) lies outside a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("value kinds differ: {left} against {right}")]
    ValueKindMismatch { left: ValueKind, right: ValueKind },
    #[error("{op} does not support {kind} values")]
    UnsupportedValueKind { op: &'static str, kind: ValueKind },
    #[error("{what} has length {actual}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("malformed CSR structure: {reason}")]
    MalformedStructure { reason: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
