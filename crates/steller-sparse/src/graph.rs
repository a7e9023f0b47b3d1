//! Graph queries over square sparse matrices.
//!
//! Row `i` lists the neighbours of node `i`. Self loops are ignored by the traversals.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::matrix::SparseMatrix;

/// Breadth-first levels from a root: level `l` is `nodes[ptr[l]..ptr[l + 1]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSets {
    pub ptr: Vec<usize>,
    pub nodes: Vec<usize>,
}

impl LevelSets {
    pub fn num_levels(&self) -> usize {
        self.ptr.len() - 1
    }

    pub fn level(&self, l: usize) -> &[usize] {
        &self.nodes[self.ptr[l]..self.ptr[l + 1]]
    }
}

/// Weakly connected components: component `c` is `nodes[ptr[c]..ptr[c + 1]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    pub ptr: Vec<usize>,
    pub nodes: Vec<usize>,
}

impl Components {
    pub fn len(&self) -> usize {
        self.ptr.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn component(&self, c: usize) -> &[usize] {
        &self.nodes[self.ptr[c]..self.ptr[c + 1]]
    }

    /// Component index of every node.
    pub fn component_ids(&self) -> Vec<usize> {
        let mut ids = vec![0; self.nodes.len()];
        for c in 0..self.len() {
            for &v in self.component(c) {
                ids[v] = c;
            }
        }
        ids
    }
}

/// Columns grouped by identical row patterns: group `g` is `members[ptr[g]..ptr[g + 1]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supervariables {
    pub ptr: Vec<usize>,
    pub members: Vec<usize>,
}

impl Supervariables {
    pub fn len(&self) -> usize {
        self.ptr.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn group(&self, g: usize) -> &[usize] {
        &self.members[self.ptr[g]..self.ptr[g + 1]]
    }
}

/// Dense all-pairs distances; unreachable pairs hold `-1`.
#[derive(Debug, Clone)]
pub struct AllPairsDistances {
    pub n: usize,
    pub distances: Vec<f64>,
    pub connected: bool,
}

impl AllPairsDistances {
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.distances[i * self.n + j]
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    dist: f64,
    node: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed so `BinaryHeap` pops the closest node first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl SparseMatrix {
    fn check_node(&self, root: usize) -> Result<()> {
        if root >= self.rows() {
            return Err(Error::IndexOutOfBounds {
                row: root,
                col: root,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(())
    }

    pub(crate) fn level_sets_from(&self, root: usize, visited: &mut [bool]) -> LevelSets {
        let mut nodes = vec![root];
        visited[root] = true;
        let mut ptr = vec![0, 1];
        let mut start = 0;
        loop {
            let end = nodes.len();
            for idx in start..end {
                let i = nodes[idx];
                for &j in self.row(i) {
                    if j != i && !visited[j] {
                        visited[j] = true;
                        nodes.push(j);
                    }
                }
            }
            if nodes.len() == end {
                break;
            }
            ptr.push(nodes.len());
            start = end;
        }
        LevelSets { ptr, nodes }
    }

    /// Breadth-first level structure rooted at `root`.
    pub fn level_sets(&self, root: usize) -> Result<LevelSets> {
        self.ensure_square()?;
        self.check_node(root)?;
        let mut visited = vec![false; self.rows()];
        Ok(self.level_sets_from(root, &mut visited))
    }

    /// Components of the pattern-symmetrized graph, discovered in node order.
    pub fn weakly_connected_components(&self) -> Result<Components> {
        self.ensure_square()?;
        let sym = self.symmetrize(true)?;
        let n = sym.rows();
        let mut visited = vec![false; n];
        let mut ptr = vec![0];
        let mut nodes = Vec::with_capacity(n);
        for root in 0..n {
            if visited[root] {
                continue;
            }
            let levels = sym.level_sets_from(root, &mut visited);
            nodes.extend_from_slice(&levels.nodes);
            ptr.push(nodes.len());
        }
        Ok(Components { ptr, nodes })
    }

    /// Single-source shortest paths over `|a_ij|` (pattern entries weigh one).
    ///
    /// Unreachable nodes get `-1`.
    pub fn dijkstra(&self, root: usize) -> Result<Vec<f64>> {
        self.ensure_square()?;
        self.check_node(root)?;
        let n = self.rows();
        let mut dist = vec![f64::INFINITY; n];
        let mut done = vec![false; n];
        let mut heap = BinaryHeap::new();
        dist[root] = 0.0;
        heap.push(HeapEntry {
            dist: 0.0,
            node: root,
        });
        while let Some(HeapEntry { dist: d, node: i }) = heap.pop() {
            if done[i] {
                continue;
            }
            done[i] = true;
            for k in self.row_range(i) {
                let j = self.ja()[k];
                if j == i || done[j] {
                    continue;
                }
                let cand = d + self.value(k).abs();
                if cand < dist[j] {
                    dist[j] = cand;
                    heap.push(HeapEntry {
                        dist: cand,
                        node: j,
                    });
                }
            }
        }
        for d in &mut dist {
            if !d.is_finite() {
                *d = -1.0;
            }
        }
        Ok(dist)
    }

    /// All-pairs distances on the symmetrized graph: hop counts, or weighted shortest paths.
    pub fn distance_matrix(&self, weighted: bool) -> Result<AllPairsDistances> {
        self.ensure_square()?;
        let sym = self.symmetrize(!weighted)?;
        let n = sym.rows();
        let mut distances = vec![-1.0; n * n];
        if weighted {
            for root in 0..n {
                let row = sym.dijkstra(root)?;
                distances[root * n..(root + 1) * n].copy_from_slice(&row);
            }
        } else {
            let mut visited = vec![false; n];
            for root in 0..n {
                visited.iter_mut().for_each(|v| *v = false);
                let levels = sym.level_sets_from(root, &mut visited);
                for l in 0..levels.num_levels() {
                    for &v in levels.level(l) {
                        distances[root * n + v] = l as f64;
                    }
                }
            }
        }
        let connected = distances.iter().all(|&d| d >= 0.0);
        Ok(AllPairsDistances {
            n,
            distances,
            connected,
        })
    }

    /// Groups columns whose row patterns coincide, in order of first appearance.
    pub fn decompose_to_supervariables(&self) -> Supervariables {
        let t = self.transpose();
        let mut group_of: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for j in 0..t.rows() {
            let mut pattern = t.row(j).to_vec();
            pattern.sort_unstable();
            pattern.dedup();
            let next = groups.len();
            let g = *group_of.entry(pattern).or_insert(next);
            if g == next {
                groups.push(Vec::new());
            }
            groups[g].push(j);
        }
        let mut ptr = Vec::with_capacity(groups.len() + 1);
        ptr.push(0);
        let mut members = Vec::with_capacity(t.rows());
        for g in groups {
            members.extend(g);
            ptr.push(members.len());
        }
        Supervariables { ptr, members }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::CoordinateMatrix;
    use crate::values::ValueKind;

    fn graph(n: usize, edges: &[(usize, usize, f64)]) -> SparseMatrix {
        let mut c = CoordinateMatrix::new(n, n, ValueKind::Real);
        for &(i, j, w) in edges {
            c.add_entry(i, j, w).unwrap();
            c.add_entry(j, i, w).unwrap();
        }
        SparseMatrix::from_coordinate_format(&c)
    }

    #[test]
    fn level_sets_follow_hop_distance() {
        // 0 - 1 - 2 - 3 with a self loop on 1
        let a = graph(4, &[(0, 1, 1.0), (1, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)]);
        assert!(a.has_diagonal());
        let ls = a.level_sets(1).unwrap();
        assert_eq!(ls.num_levels(), 3);
        assert_eq!(ls.level(0), &[1]);
        let mut l1 = ls.level(1).to_vec();
        l1.sort_unstable();
        assert_eq!(l1, vec![0, 2]);
        assert_eq!(ls.level(2), &[3]);
    }

    #[test]
    fn components_cover_every_node_once() {
        let a = graph(5, &[(0, 1, 1.0), (3, 4, 1.0)]);
        let comps = a.weakly_connected_components().unwrap();
        assert_eq!(comps.len(), 3);
        let ids = comps.component_ids();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[3], ids[4]);
        assert_ne!(ids[0], ids[2]);
        assert_ne!(ids[2], ids[3]);
    }

    #[test]
    fn components_treat_directed_edges_as_undirected() {
        let mut c = CoordinateMatrix::new(3, 3, ValueKind::Pattern);
        c.add_entry(2, 0, 0.0).unwrap();
        let a = SparseMatrix::from_coordinate_format(&c);
        let comps = a.weakly_connected_components().unwrap();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps.component(0).len(), 2);
    }

    #[test]
    fn dijkstra_prefers_lighter_detour() {
        let a = graph(4, &[(0, 1, 1.0), (1, 2, 1.0), (0, 2, 5.0)]);
        let d = a.dijkstra(0).unwrap();
        assert_eq!(d, vec![0.0, 1.0, 2.0, -1.0]);
    }

    #[test]
    fn distance_matrix_reports_disconnection() {
        let a = graph(3, &[(0, 1, 2.0)]);
        let hops = a.distance_matrix(false).unwrap();
        assert!(!hops.connected);
        assert_eq!(hops.get(0, 1), 1.0);
        assert_eq!(hops.get(2, 0), -1.0);
        let weighted = a.distance_matrix(true).unwrap();
        assert_eq!(weighted.get(1, 0), 2.0);
        assert_eq!(weighted.get(2, 2), 0.0);
    }

    #[test]
    fn supervariables_group_identical_columns() {
        // Star: leaves 1, 2, 3 all see only the hub.
        let a = graph(4, &[(0, 1, 1.0), (0, 2, 1.0), (0, 3, 1.0)]);
        let sv = a.decompose_to_supervariables();
        assert_eq!(sv.len(), 2);
        assert_eq!(sv.group(0), &[0]);
        assert_eq!(sv.group(1), &[1, 2, 3]);
    }
}
