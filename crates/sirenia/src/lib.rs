#![forbid(unsafe_code)]

//! Headless multilevel graph layout.
//!
//! `sirenia` turns a [`Graph`] of sized nodes and weighted edges into node positions. The
//! layout itself comes from `steller` (multilevel spring-electrical embedding, stress model);
//! overlapping node boxes can be separated afterwards with `steller-vpsc`.

pub mod config;
pub mod error;
pub mod graph;
mod layout;

pub use config::{LayoutConfig, LayoutMode, OverlapConfig};
pub use error::{Error, Result};
pub use graph::{Edge, Graph, LayoutResult, Node, Point};

/// Headless layout entry point.
pub fn layout(graph: &Graph, config: &LayoutConfig) -> Result<LayoutResult> {
    layout::layout(graph, config)
}
