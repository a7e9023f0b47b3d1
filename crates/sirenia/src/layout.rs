//! The layout pipeline: adjacency, multilevel embedding, optional stress pass, overlap removal.
//!
//! Disconnected graphs are laid out one component at a time and the components are then packed
//! into rows, largest first.

use std::cmp::Reverse;

use steller::spring::average_edge_length;
use steller::{XorShift64Star, multilevel_spring_electrical_embedding_with, stress_model};
use steller_sparse::SparseMatrix;
use steller_vpsc::{Rectangle, remove_overlaps};
use tracing::debug;

use crate::config::{LayoutConfig, LayoutMode, OverlapConfig};
use crate::error::Result;
use crate::graph::{Graph, LayoutResult, Point};

/// A laid-out component: its node indices and their coordinates, `dim` per node.
struct Placed<'a> {
    nodes: &'a [usize],
    x: Vec<f64>,
}

pub fn layout(graph: &Graph, config: &LayoutConfig) -> Result<LayoutResult> {
    graph.validate()?;
    let dim = config.dim;
    if dim == 0 {
        return Err(steller::Error::InvalidDimension { dim }.into());
    }
    let n = graph.nodes.len();
    debug!(nodes = n, edges = graph.edges.len(), dim, mode = ?config.mode, "layout");

    let a = graph.adjacency()?;
    let mut x = initial_coordinates(graph, dim, config.spring.random_start);
    let mut rng = XorShift64Star::new(config.spring.random_seed);
    let components = a.weakly_connected_components()?;

    if components.len() <= 1 {
        let nodes: Vec<usize> = (0..n).collect();
        lay_out_component(graph, &nodes, &a, config, &mut x, &mut rng)?;
    } else {
        let mut order: Vec<&[usize]> = (0..components.len())
            .map(|c| components.component(c))
            .collect();
        order.sort_by_key(|nodes| Reverse(nodes.len()));
        debug!(components = order.len(), "laying out components separately");

        let mut placed = Vec::with_capacity(order.len());
        let mut edge_lengths = Vec::new();
        let mut small = Vec::new();
        for nodes in order {
            if nodes.len() <= 2 {
                small.push(nodes);
                continue;
            }
            let sub = a.get_submatrix(Some(nodes), Some(nodes))?;
            let mut xs = gather(&x, nodes, dim);
            lay_out_component(graph, nodes, &sub, config, &mut xs, &mut rng)?;
            edge_lengths.push(average_edge_length(&sub, dim, &xs));
            placed.push(Placed { nodes, x: xs });
        }

        let unit = match config.spring.k {
            Some(k) if k > 0.0 => k,
            _ if !edge_lengths.is_empty() => {
                edge_lengths.iter().sum::<f64>() / edge_lengths.len() as f64
            }
            _ => 1.0,
        };
        for nodes in small {
            let sub = a.get_submatrix(Some(nodes), Some(nodes))?;
            let mut xs = vec![0.0; nodes.len() * dim];
            if nodes.len() == 2 {
                xs[dim] = match config.mode {
                    LayoutMode::StressMajorization if sub.nz() > 0 => sub.value(0),
                    _ => unit,
                };
            }
            if let Some(overlap) = &config.overlap {
                if dim >= 2 {
                    separate_boxes(graph, nodes, dim, overlap, &mut xs)?;
                }
            }
            placed.push(Placed { nodes, x: xs });
        }

        let gap = config.overlap.as_ref().map_or(0.0, |o| o.gap.max(0.0));
        pack(graph, dim, unit + gap, &placed, &mut x);
    }

    let positions = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let p = &x[i * dim..(i + 1) * dim];
            let point = Point {
                x: p.first().copied().unwrap_or(0.0),
                y: p.get(1).copied().unwrap_or(0.0),
            };
            (node.id.clone(), point)
        })
        .collect();
    Ok(LayoutResult {
        positions,
        coordinates: x,
        dim,
    })
}

/// Runs the selected mode on one connected piece of the graph. `nodes[i]` is the graph node
/// behind row `i` of `a` and of `x`.
fn lay_out_component(
    graph: &Graph,
    nodes: &[usize],
    a: &SparseMatrix,
    config: &LayoutConfig,
    x: &mut [f64],
    rng: &mut XorShift64Star,
) -> Result<()> {
    let dim = config.dim;
    multilevel_spring_electrical_embedding_with(
        dim,
        a,
        None,
        &config.spring,
        &config.multilevel,
        x,
        rng,
    )?;

    if config.mode == LayoutMode::StressMajorization && a.nz() > 0 {
        stress_model(dim, a, x, config.stress_maxit, config.stress_tol, rng)?;
    }

    if let Some(overlap) = &config.overlap {
        if dim >= 2 {
            separate_boxes(graph, nodes, dim, overlap, x)?;
        }
    }
    Ok(())
}

/// Node positions as given when the layout does not start at random, otherwise zeros.
fn initial_coordinates(graph: &Graph, dim: usize, random_start: bool) -> Vec<f64> {
    let mut x = vec![0.0; graph.nodes.len() * dim];
    if random_start {
        return x;
    }
    for (i, node) in graph.nodes.iter().enumerate() {
        let p = &mut x[i * dim..(i + 1) * dim];
        p[0] = node.x;
        if dim > 1 {
            p[1] = node.y;
        }
    }
    x
}

fn gather(x: &[f64], nodes: &[usize], dim: usize) -> Vec<f64> {
    nodes
        .iter()
        .flat_map(|&v| x[v * dim..(v + 1) * dim].iter().copied())
        .collect()
}

fn separate_boxes(
    graph: &Graph,
    nodes: &[usize],
    dim: usize,
    overlap: &OverlapConfig,
    x: &mut [f64],
) -> Result<()> {
    let mut rects: Vec<Rectangle> = nodes
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let node = &graph.nodes[v];
            Rectangle::from_centre(x[i * dim], x[i * dim + 1], node.width, node.height)
        })
        .collect();
    remove_overlaps(&mut rects, overlap.gap)?;
    for (i, r) in rects.iter().enumerate() {
        x[i * dim] = r.centre_x();
        x[i * dim + 1] = r.centre_y();
    }
    Ok(())
}

/// Bounding box of a component over the first two axes, node boxes included.
fn bounding_box(graph: &Graph, dim: usize, part: &Placed<'_>) -> ([f64; 2], [f64; 2]) {
    let mut lo = [f64::INFINITY; 2];
    let mut hi = [f64::NEG_INFINITY; 2];
    for (i, &v) in part.nodes.iter().enumerate() {
        let node = &graph.nodes[v];
        let half = [node.width / 2.0, node.height / 2.0];
        for k in 0..dim.min(2) {
            let c = part.x[i * dim + k];
            lo[k] = lo[k].min(c - half[k]);
            hi[k] = hi[k].max(c + half[k]);
        }
    }
    if dim < 2 {
        lo[1] = 0.0;
        hi[1] = 0.0;
    }
    (lo, hi)
}

/// Shelf packing: components go left to right with `margin` between their boxes, starting a
/// new row below once the row is wider than the square root of the total padded area.
fn pack(graph: &Graph, dim: usize, margin: f64, placed: &[Placed<'_>], x: &mut [f64]) {
    let boxes: Vec<([f64; 2], [f64; 2])> = placed
        .iter()
        .map(|part| bounding_box(graph, dim, part))
        .collect();
    let row_limit = if dim < 2 {
        f64::INFINITY
    } else {
        let area: f64 = boxes
            .iter()
            .map(|(lo, hi)| (hi[0] - lo[0] + margin) * (hi[1] - lo[1] + margin))
            .sum();
        let widest = boxes
            .iter()
            .map(|(lo, hi)| hi[0] - lo[0])
            .fold(0.0, f64::max);
        area.sqrt().max(widest)
    };

    let (mut cursor_x, mut cursor_y, mut row_height) = (0.0, 0.0, 0.0f64);
    for (part, (lo, hi)) in placed.iter().zip(&boxes) {
        let (w, h) = (hi[0] - lo[0], hi[1] - lo[1]);
        if cursor_x > 0.0 && cursor_x + w > row_limit {
            cursor_y -= row_height + margin;
            cursor_x = 0.0;
            row_height = 0.0;
        }
        let shift = [cursor_x - lo[0], cursor_y - hi[1]];
        for (i, &v) in part.nodes.iter().enumerate() {
            for k in 0..dim.min(2) {
                x[v * dim + k] = part.x[i * dim + k] + shift[k];
            }
            for k in 2..dim {
                x[v * dim + k] = part.x[i * dim + k];
            }
        }
        cursor_x += w + margin;
        row_height = row_height.max(h);
    }
}
