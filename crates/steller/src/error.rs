#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sparse(#[from] steller_sparse::Error),
    #[error("layout requires a square adjacency matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("unsupported embedding dimension {dim}")]
    InvalidDimension { dim: usize },
    #[error(
        "coordinate array has length {actual}, expected {expected} for {n} nodes in {dim} dimensions"
    )]
    CoordinateLength {
        expected: usize,
        actual: usize,
        n: usize,
        dim: usize,
    },
    #[error("stress majorization found no edge with a positive ideal length")]
    DegenerateScaling,
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn check_coordinates(n: usize, dim: usize, x: &[f64]) -> Result<()> {
    if dim == 0 {
        return Err(Error::InvalidDimension { dim });
    }
    if x.len() != n * dim {
        return Err(Error::CoordinateLength {
            expected: n * dim,
            actual: x.len(),
            n,
            dim,
        });
    }
    Ok(())
}
