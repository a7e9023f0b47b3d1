//! Barnes-Hut spatial tree over points in `dim` dimensions.
//!
//! Cells live in an arena and are addressed by index. A cell is split into `2^dim` children the
//! second time a point lands in it, unless it already sits at `max_level`, in which case points
//! pile up in the cell's leaf list. The tree is never rebalanced.

/// Distances below this are cropped when computing repulsion between coincident points.
pub const MINDIST: f64 = 1.0e-15;

/// Euclidean distance.
pub fn point_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

pub(crate) fn distance_cropped(a: &[f64], b: &[f64]) -> f64 {
    point_distance(a, b).max(MINDIST)
}

/// `dist^(1 - p)`, the denominator of the repulsive force.
pub(crate) fn repulsion_denominator(dist: f64, p: f64) -> f64 {
    if p == -1.0 {
        dist * dist
    } else {
        dist.powf(1.0 - p)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: usize,
    weight: f64,
    coord: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Cell {
    center: Vec<f64>,
    /// Half of the side length.
    width: f64,
    level: usize,
    n: usize,
    total_weight: f64,
    average: Vec<f64>,
    children: Option<Vec<Option<usize>>>,
    entries: Vec<usize>,
}

impl Cell {
    fn new(center: Vec<f64>, width: f64, level: usize) -> Self {
        Self {
            average: vec![0.0; center.len()],
            center,
            width,
            level,
            n: 0,
            total_weight: 0.0,
            children: None,
            entries: Vec::new(),
        }
    }

    fn child_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.children.iter().flatten().flatten().copied()
    }
}

/// Result of [`QuadTree::get_nearest`].
#[derive(Debug, Clone, PartialEq)]
pub struct Nearest {
    pub id: usize,
    pub coord: Vec<f64>,
    pub distance: f64,
}

/// Far-field sources seen from one query point (see [`QuadTree::get_supernodes`]).
#[derive(Debug, Clone, Default)]
pub struct Supernodes {
    /// `len * dim` coordinates, row-major.
    pub centers: Vec<f64>,
    pub weights: Vec<f64>,
    pub distances: Vec<f64>,
    /// Cells visited while collecting; a work measure.
    pub visited: usize,
}

impl Supernodes {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn clear(&mut self) {
        self.centers.clear();
        self.weights.clear();
        self.distances.clear();
        self.visited = 0;
    }

    fn push(&mut self, center: &[f64], weight: f64, distance: f64) {
        self.centers.extend_from_slice(center);
        self.weights.push(weight);
        self.distances.push(distance);
    }
}

/// Output of [`QuadTree::get_repulsive_force`].
#[derive(Debug, Clone)]
pub struct RepulsiveForce {
    /// `n * dim` forces indexed by point id.
    pub forces: Vec<f64>,
    /// Cell-cell interactions, point-point interactions and cells visited, each divided by `n`.
    pub counts: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct QuadTree {
    dim: usize,
    max_level: usize,
    cells: Vec<Cell>,
    entries: Vec<Entry>,
}

fn quadrant(center: &[f64], coord: &[f64]) -> usize {
    let mut d = 0;
    for k in (0..center.len()).rev() {
        d = 2 * d + usize::from(coord[k] - center[k] >= 0.0);
    }
    d
}

impl QuadTree {
    /// An empty tree covering `center ± width`.
    pub fn new(dim: usize, center: &[f64], width: f64, max_level: usize) -> Self {
        debug_assert!(width > 0.0);
        debug_assert_eq!(center.len(), dim);
        Self {
            dim,
            max_level,
            cells: vec![Cell::new(center.to_vec(), width, 0)],
            entries: Vec::new(),
        }
    }

    /// Builds a tree from `coords` (`n * dim`, row-major) with unit weights; point `i` gets id `i`.
    pub fn from_points(dim: usize, coords: &[f64], max_level: usize) -> Self {
        Self::build(dim, coords, None, max_level)
    }

    pub fn from_weighted_points(
        dim: usize,
        coords: &[f64],
        weights: &[f64],
        max_level: usize,
    ) -> Self {
        Self::build(dim, coords, Some(weights), max_level)
    }

    fn build(dim: usize, coords: &[f64], weights: Option<&[f64]>, max_level: usize) -> Self {
        let n = coords.len() / dim;
        let mut xmin = vec![0.0; dim];
        let mut xmax = vec![0.0; dim];
        if n > 0 {
            xmin.copy_from_slice(&coords[..dim]);
            xmax.copy_from_slice(&coords[..dim]);
        }
        for p in coords.chunks_exact(dim).skip(1) {
            for k in 0..dim {
                xmin[k] = xmin[k].min(p[k]);
                xmax[k] = xmax[k].max(p[k]);
            }
        }
        let mut width: f64 = 0.0;
        let mut center = vec![0.0; dim];
        for k in 0..dim {
            center[k] = (xmin[k] + xmax[k]) * 0.5;
            width = width.max(xmax[k] - xmin[k]);
        }
        // A single point would otherwise give a zero-width root.
        let width = width.max(1.0e-5) * 0.52;

        let mut qt = Self::new(dim, &center, width, max_level);
        for (i, p) in coords.chunks_exact(dim).enumerate() {
            let w = weights.map_or(1.0, |w| w[i]);
            qt.add(p, w, i);
        }
        qt
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Number of points stored.
    pub fn len(&self) -> usize {
        self.cells[0].n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_weight(&self) -> f64 {
        self.cells[0].total_weight
    }

    /// Number of allocated cells, root included.
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn add(&mut self, coord: &[f64], weight: f64, id: usize) {
        self.entries.push(Entry {
            id,
            weight,
            coord: coord.to_vec(),
        });
        let entry = self.entries.len() - 1;
        self.insert(0, entry);
    }

    fn insert(&mut self, cell: usize, entry: usize) {
        let weight = self.entries[entry].weight;
        if self.cells[cell].n == 0 {
            let c = &mut self.cells[cell];
            c.n = 1;
            c.total_weight = weight;
            c.average.copy_from_slice(&self.entries[entry].coord);
            c.entries.push(entry);
            return;
        }

        let c = &mut self.cells[cell];
        let n = c.n as f64;
        c.total_weight += weight;
        for (a, x) in c.average.iter_mut().zip(&self.entries[entry].coord) {
            *a = (*a * n + x) / (n + 1.0);
        }

        if c.level < self.max_level {
            if c.children.is_none() {
                c.children = Some(vec![None; 1 << self.dim]);
            }
            let previous = std::mem::take(&mut c.entries);
            self.push_down(cell, entry);
            for e in previous {
                self.push_down(cell, e);
            }
        } else {
            c.entries.push(entry);
        }
        self.cells[cell].n += 1;
    }

    fn push_down(&mut self, cell: usize, entry: usize) {
        let q = quadrant(&self.cells[cell].center, &self.entries[entry].coord);
        let existing = self.cells[cell]
            .children
            .as_ref()
            .and_then(|slots| slots[q]);
        let child = match existing {
            Some(child) => child,
            None => {
                let parent = &self.cells[cell];
                let width = parent.width / 2.0;
                let mut center = parent.center.clone();
                let mut bits = q;
                for c in center.iter_mut() {
                    if bits % 2 == 0 {
                        *c -= width;
                    } else {
                        *c += width;
                    }
                    bits /= 2;
                }
                let level = parent.level + 1;
                self.cells.push(Cell::new(center, width, level));
                let child = self.cells.len() - 1;
                if let Some(slots) = self.cells[cell].children.as_mut() {
                    slots[q] = Some(child);
                }
                child
            }
        };
        self.insert(child, entry);
    }

    /// Exact nearest stored point to `x`, `None` for an empty tree.
    pub fn get_nearest(&self, x: &[f64]) -> Option<Nearest> {
        if self.is_empty() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        self.nearest_in(0, x, &mut best, true);
        self.nearest_in(0, x, &mut best, false);
        best.map(|(e, distance)| {
            let entry = &self.entries[e];
            Nearest {
                id: entry.id,
                coord: entry.coord.clone(),
                distance,
            }
        })
    }

    fn nearest_in(&self, cell: usize, x: &[f64], best: &mut Option<(usize, f64)>, tentative: bool) {
        let c = &self.cells[cell];
        for &e in &c.entries {
            let dist = point_distance(x, &self.entries[e].coord);
            if best.is_none_or(|(_, min)| dist < min) {
                *best = Some((e, dist));
            }
        }
        if c.children.is_none() {
            return;
        }
        let bound = point_distance(&c.center, x) - (self.dim as f64).sqrt() * c.width;
        if best.is_some_and(|(_, min)| bound > min) {
            return;
        }
        if tentative {
            // Quick first guess: follow the child whose average is closest.
            let closest = c
                .child_slots()
                .map(|child| (child, point_distance(&self.cells[child].average, x)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((child, _)) = closest {
                self.nearest_in(child, x, best, true);
            }
        } else {
            for child in c.child_slots() {
                self.nearest_in(child, x, best, false);
            }
        }
    }

    /// Barnes-Hut sources acting on `pt`: individual points (except `node_id`) and any
    /// subdivided cell with `width < bh * |center - pt|` collapsed to its weighted average.
    pub fn get_supernodes(&self, bh: f64, pt: &[f64], node_id: usize) -> Supernodes {
        let mut out = Supernodes::default();
        self.collect_supernodes(bh, pt, node_id, &mut out);
        out
    }

    /// As [`Self::get_supernodes`], reusing `out`'s buffers.
    pub fn collect_supernodes(&self, bh: f64, pt: &[f64], node_id: usize, out: &mut Supernodes) {
        out.clear();
        self.supernodes_in(0, bh, pt, node_id, out);
    }

    fn supernodes_in(&self, cell: usize, bh: f64, pt: &[f64], node_id: usize, out: &mut Supernodes) {
        out.visited += 1;
        let c = &self.cells[cell];
        for &e in &c.entries {
            let entry = &self.entries[e];
            if entry.id != node_id {
                out.push(&entry.coord, entry.weight, point_distance(pt, &entry.coord));
            }
        }
        if c.children.is_none() {
            return;
        }
        let dist = point_distance(&c.center, pt);
        if c.width < bh * dist {
            out.push(&c.average, c.total_weight, point_distance(&c.average, pt));
        } else {
            for child in c.child_slots() {
                self.supernodes_in(child, bh, pt, node_id, out);
            }
        }
    }

    /// Cell-cell Barnes-Hut repulsion `w1 * w2 * KP * (x1 - x2) / dist^(1 - p)` for every point.
    ///
    /// Point ids must lie in `0..len()`.
    pub fn get_repulsive_force(&self, bh: f64, p: f64, kp: f64) -> RepulsiveForce {
        let n = self.len();
        let dim = self.dim;
        let mut state = ForceState {
            bh,
            p,
            kp,
            forces: vec![0.0; n * dim],
            cell_forces: vec![0.0; self.cells.len() * dim],
            counts: [0.0; 3],
        };
        if n > 0 {
            self.interact(0, 0, &mut state);
            self.accumulate(0, &mut state);
            for c in &mut state.counts {
                *c /= n as f64;
            }
        }
        RepulsiveForce {
            forces: state.forces,
            counts: state.counts,
        }
    }

    fn interact(&self, c1: usize, c2: usize, st: &mut ForceState) {
        let dim = self.dim;
        let q1 = &self.cells[c1];
        let q2 = &self.cells[c2];

        let dist = point_distance(&q1.average, &q2.average);
        if q1.width + q2.width < st.bh * dist {
            st.counts[0] += 1.0;
            let scale = q1.total_weight * q2.total_weight * st.kp / st.denominator(dist);
            for k in 0..dim {
                let f = scale * (q1.average[k] - q2.average[k]);
                st.cell_forces[c1 * dim + k] += f;
                st.cell_forces[c2 * dim + k] -= f;
            }
            return;
        }

        let leaf1 = q1.children.is_none();
        let leaf2 = q2.children.is_none();
        if leaf1 && leaf2 {
            for &e1 in &q1.entries {
                let p1 = &self.entries[e1];
                for &e2 in &q2.entries {
                    let p2 = &self.entries[e2];
                    if p1.id == p2.id || (c1 == c2 && p2.id < p1.id) {
                        continue;
                    }
                    st.counts[1] += 1.0;
                    let dist = distance_cropped(&p1.coord, &p2.coord);
                    let scale = p1.weight * p2.weight * st.kp / st.denominator(dist);
                    for k in 0..dim {
                        let f = scale * (p1.coord[k] - p2.coord[k]);
                        st.forces[p1.id * dim + k] += f;
                        st.forces[p2.id * dim + k] -= f;
                    }
                }
            }
            return;
        }

        if c1 == c2 {
            let children: Vec<usize> = q1.child_slots().collect();
            for (a, &ca) in children.iter().enumerate() {
                for &cb in &children[a..] {
                    self.interact(ca, cb, st);
                }
            }
            return;
        }

        // Split the bigger cell, or whichever one still has children.
        let split_first = if q1.width > q2.width && !leaf1 {
            true
        } else if q2.width > q1.width && !leaf2 {
            false
        } else {
            !leaf1
        };
        let (open, other) = if split_first { (c1, c2) } else { (c2, c1) };
        let children: Vec<usize> = self.cells[open].child_slots().collect();
        for child in children {
            self.interact(child, other, st);
        }
    }

    fn accumulate(&self, cell: usize, st: &mut ForceState) {
        let dim = self.dim;
        let c = &self.cells[cell];
        st.counts[2] += 1.0;
        let wgt = c.total_weight;
        if c.children.is_none() {
            for &e in &c.entries {
                let entry = &self.entries[e];
                let share = entry.weight / wgt;
                for k in 0..dim {
                    st.forces[entry.id * dim + k] += share * st.cell_forces[cell * dim + k];
                }
            }
            return;
        }
        for child in c.child_slots() {
            let share = self.cells[child].total_weight / wgt;
            for k in 0..dim {
                st.cell_forces[child * dim + k] += share * st.cell_forces[cell * dim + k];
            }
            self.accumulate(child, st);
        }
    }
}

struct ForceState {
    bh: f64,
    p: f64,
    kp: f64,
    forces: Vec<f64>,
    cell_forces: Vec<f64>,
    counts: [f64; 3],
}

impl ForceState {
    fn denominator(&self, dist: f64) -> f64 {
        repulsion_denominator(dist, self.p)
    }
}
