#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("graph contains an edge with a missing endpoint: {edge_id}")]
    MissingEndpoint { edge_id: String },
    #[error("graph contains more than one node with id {node_id}")]
    DuplicateNode { node_id: String },
    #[error(transparent)]
    Layout(#[from] steller::Error),
    #[error(transparent)]
    Sparse(#[from] steller_sparse::Error),
    #[error(transparent)]
    Overlap(#[from] steller_vpsc::Error),
    #[error("invalid layout configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
