#![forbid(unsafe_code)]

//! Force-directed layout of graphs given as sparse adjacency matrices.
//!
//! The entry point is [`multilevel_spring_electrical_embedding`]: the graph is coarsened into a
//! hierarchy, laid out from the coarsest level down with the spring-electrical model, and
//! optionally smoothed by stress majorization. Coordinates are flat row-major `n * dim` arrays.

pub mod error;
pub mod multilevel;
pub mod quadtree;
pub mod rng;
pub mod smoothing;
pub mod solve;
pub mod spring;
pub mod stress;

pub use error::{Error, Result};
pub use multilevel::{Multilevel, MultilevelControl};
pub use quadtree::QuadTree;
pub use rng::XorShift64Star;
pub use smoothing::{SpringSmoother, post_process_smoothing};
pub use spring::{
    QuadTreeScheme, Smoothing, SpringElectricalControl, multilevel_spring_electrical_embedding,
    multilevel_spring_electrical_embedding_with,
    spring_electrical_embedding, spring_electrical_embedding_fast,
    spring_electrical_embedding_slow, spring_electrical_spring_embedding,
};
pub use stress::{
    IdealDistance, SparseStressMajorizationSmoother, StressMajorizationSmoother, StressScheme,
    stress_model,
};
