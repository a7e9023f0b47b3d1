#![forbid(unsafe_code)]

//! Compressed sparse row matrices for graph layout.
//!
//! Matrices are assembled from coordinate triplets (repeated entries are summed), then used as
//! weighted adjacency structures by the layout solvers in `steller`. Graph-flavoured queries such
//! as breadth-first level sets and connected components operate on square matrices, treating row
//! `i` as the neighbour list of node `i`.

pub mod coordinate;
pub mod error;
pub mod graph;
pub mod matrix;
pub mod values;

pub use coordinate::CoordinateMatrix;
pub use error::{Error, Result};
pub use graph::{AllPairsDistances, Components, LevelSets, Supervariables};
pub use matrix::{SYMMETRY_EPSILON, SparseMatrix};
pub use values::{ValueKind, Values};
