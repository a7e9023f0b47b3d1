use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use steller_sparse::{CoordinateMatrix, SparseMatrix, ValueKind};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn validate(&self) -> Result<()> {
        let mut node_exists: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
        for n in &self.nodes {
            if !node_exists.insert(n.id.as_str()) {
                return Err(Error::DuplicateNode {
                    node_id: n.id.clone(),
                });
            }
        }
        for e in &self.edges {
            if !node_exists.contains(e.source.as_str()) || !node_exists.contains(e.target.as_str())
            {
                return Err(Error::MissingEndpoint {
                    edge_id: e.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Position of each node id in `nodes`.
    pub fn node_index(&self) -> FxHashMap<&str, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect()
    }

    /// Symmetric weighted adjacency matrix in node order.
    ///
    /// Parallel edges have their weights summed; self-loops are dropped. Edges with a missing
    /// endpoint are reported as [`Error::MissingEndpoint`].
    pub fn adjacency(&self) -> Result<SparseMatrix> {
        let n = self.nodes.len();
        let index = self.node_index();
        let mut coo = CoordinateMatrix::with_capacity(n, n, ValueKind::Real, 2 * self.edges.len());
        for e in &self.edges {
            let (Some(&i), Some(&j)) = (index.get(e.source.as_str()), index.get(e.target.as_str()))
            else {
                return Err(Error::MissingEndpoint {
                    edge_id: e.id.clone(),
                });
            };
            if i == j {
                continue;
            }
            coo.add_entry(i, j, e.weight)?;
            coo.add_entry(j, i, e.weight)?;
        }
        Ok(SparseMatrix::from_coordinate_format(&coo))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub id: String,
    pub width: f64,
    pub height: f64,
    /// Initial position (center), used when the layout does not start from random coordinates.
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    /// Node centres by id: the first two coordinates, `y = 0` for one-dimensional layouts.
    pub positions: BTreeMap<String, Point>,
    /// Raw `nodes.len() * dim` coordinates in node order.
    pub coordinates: Vec<f64>,
    pub dim: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            ..Node::default()
        }
    }

    fn edge(id: &str, source: &str, target: &str, weight: f64) -> Edge {
        Edge {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            weight,
        }
    }

    #[test]
    fn validate_rejects_duplicates_and_dangling_edges() {
        let g = Graph {
            nodes: vec![node("a"), node("b"), node("a")],
            edges: vec![],
        };
        assert!(matches!(
            g.validate(),
            Err(Error::DuplicateNode { node_id }) if node_id == "a"
        ));

        let g = Graph {
            nodes: vec![node("a"), node("b")],
            edges: vec![edge("e1", "a", "c", 1.0)],
        };
        assert!(matches!(
            g.validate(),
            Err(Error::MissingEndpoint { edge_id }) if edge_id == "e1"
        ));
    }

    #[test]
    fn adjacency_sums_parallel_edges_and_drops_loops() {
        let g = Graph {
            nodes: vec![node("a"), node("b"), node("c")],
            edges: vec![
                edge("e1", "a", "b", 1.0),
                edge("e2", "b", "a", 2.0),
                edge("e3", "c", "c", 5.0),
                edge("e4", "b", "c", 0.5),
            ],
        };
        let a = g.adjacency().unwrap();
        assert_eq!(a.rows(), 3);
        assert!(a.is_symmetric(false));
        assert_eq!(a.nz(), 4);
        assert_eq!(a.row(0), &[1]);
        assert_eq!(a.real_values().unwrap()[0], 3.0);
        assert!(a.row(2).iter().all(|&j| j != 2));
    }

    #[test]
    fn graphs_load_from_json_with_defaults() {
        let g: Graph = serde_json::from_str(
            r#"{"nodes": [{"id": "a", "width": 10}, {"id": "b"}],
                "edges": [{"id": "e", "source": "a", "target": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(g.nodes[0].width, 10.0);
        assert_eq!(g.nodes[1].height, 0.0);
        assert_eq!(g.edges[0].weight, 1.0);
    }
}
