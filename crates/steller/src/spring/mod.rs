//! Spring-electrical embedding (the sfdp model) and its multilevel driver.
//!
//! Attraction along each edge is `C^((2 - p) / 3) / K * |x_i - x_j| * (x_j - x_i)`, repulsion
//! between every pair is `K^(1 - p) / |x_i - x_j|^(1 - p) * (x_i - x_j)`. Each node moves by a
//! fixed step in the direction of its net force and the step is cooled every iteration.

mod embedding;
mod geometry;
mod multilevel;
mod oned_optimizer;

use serde::{Deserialize, Serialize};

pub use embedding::{
    spring_electrical_embedding, spring_electrical_embedding_fast,
    spring_electrical_embedding_slow, spring_electrical_spring_embedding,
};
pub use geometry::{average_edge_length, pcp_rotate, power_law_graph, rotate};
pub use multilevel::{
    interpolate_coord, multilevel_spring_electrical_embedding,
    multilevel_spring_electrical_embedding_with, prolongate,
};
pub use oned_optimizer::OnedOptimizer;

/// Above this many nodes [`QuadTreeScheme::Hybrid`] switches to the cell-cell force scheme.
pub const QUAD_TREE_HYBRID_SIZE: usize = 10000;

/// Repulsion exponent used for graphs dominated by degree-one nodes.
pub const POWER_LAW_P: f64 = -1.8;

/// Post-processing applied to the finished multilevel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Smoothing {
    #[default]
    None,
    StressMajorizationGraphDist,
    StressMajorizationAvgDist,
    StressMajorizationPowerDist,
    Spring,
}

/// How repulsive forces are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuadTreeScheme {
    /// Exact all-pairs forces, nodes moved together after every sweep.
    None,
    /// Per-node Barnes-Hut supernodes once the graph reaches `quadtree_size` nodes.
    Normal,
    /// Cell-cell Barnes-Hut forces every iteration.
    Fast,
    /// `Fast` above [`QUAD_TREE_HYBRID_SIZE`] nodes, `Normal` otherwise.
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpringElectricalControl {
    /// Repulsion exponent, negative. `None` picks `-1`, or [`POWER_LAW_P`] for power-law graphs.
    pub p: Option<f64>,
    /// Attraction exponent. Accepted so that existing configurations load; the forces always
    /// use quadratic attraction, so the value has no effect on the layout.
    pub q: f64,
    /// Replace the input coordinates with uniform random values before the first iteration.
    pub random_start: bool,
    /// Natural spring length. `None` (or a non-positive value) uses the average edge length.
    pub k: Option<f64>,
    /// Relative strength of attraction against repulsion.
    pub c: f64,
    /// Maximum number of hierarchy levels; `0` means unlimited.
    pub multilevels: usize,
    /// Node count from which the `Normal` scheme uses a quadtree.
    pub quadtree_size: usize,
    pub max_qtree_level: usize,
    /// Barnes-Hut opening ratio.
    pub bh: f64,
    pub tol: f64,
    pub maxiter: usize,
    pub cool: f64,
    pub step: f64,
    pub adaptive_cooling: bool,
    pub random_seed: u64,
    pub beautify_leaves: bool,
    pub smoothing: Smoothing,
    pub tscheme: QuadTreeScheme,
    /// Final counter-clockwise rotation in degrees.
    pub rotation: f64,
}

impl Default for SpringElectricalControl {
    fn default() -> Self {
        Self {
            p: None,
            q: 2.0,
            random_start: true,
            k: None,
            c: 0.2,
            multilevels: 0,
            quadtree_size: 10000,
            max_qtree_level: 10,
            bh: 0.2,
            tol: 0.0001,
            maxiter: 200,
            cool: 0.9,
            step: 0.1,
            adaptive_cooling: true,
            random_seed: 123,
            beautify_leaves: false,
            smoothing: Smoothing::None,
            tscheme: QuadTreeScheme::Hybrid,
            rotation: 0.0,
        }
    }
}
