//! Separation constraints for axis-aligned rectangles.
//!
//! Both generators sweep a scanline across the rectangles. Rectangles currently crossed by the
//! scanline are kept ordered by their centre along the axis being constrained, and constraints
//! are emitted between neighbours when a rectangle leaves the scanline.

use std::collections::BTreeSet;
use std::ops::Bound::{Excluded, Unbounded};

use crate::error::{Error, Result};
use crate::variable::{Constraint, Variable};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Rectangle {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn from_centre(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(
            cx - width / 2.0,
            cx + width / 2.0,
            cy - height / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn centre_x(&self) -> f64 {
        self.min_x + self.width() / 2.0
    }

    pub fn centre_y(&self) -> f64 {
        self.min_y + self.height() / 2.0
    }

    pub fn move_min_x(&mut self, x: f64) {
        self.max_x = x + self.width();
        self.min_x = x;
    }

    pub fn move_min_y(&mut self, y: f64) {
        self.max_y = y + self.height();
        self.min_y = y;
    }

    pub fn move_centre_x(&mut self, x: f64) {
        self.move_min_x(x - self.width() / 2.0);
    }

    pub fn move_centre_y(&mut self, y: f64) {
        self.move_min_y(y - self.height() / 2.0);
    }

    /// Grown by `dx` on the left and right and by `dy` above and below.
    pub fn padded(&self, dx: f64, dy: f64) -> Self {
        Self::new(
            self.min_x - dx,
            self.max_x + dx,
            self.min_y - dy,
            self.max_y + dy,
        )
    }

    /// Horizontal overlap with `r`: how far the left one of the two (by centre) reaches past
    /// the other's left edge, or zero.
    pub fn overlap_x(&self, r: &Rectangle) -> f64 {
        if self.centre_x() <= r.centre_x() && r.min_x < self.max_x {
            return self.max_x - r.min_x;
        }
        if r.centre_x() <= self.centre_x() && self.min_x < r.max_x {
            return r.max_x - self.min_x;
        }
        0.0
    }

    pub fn overlap_y(&self, r: &Rectangle) -> f64 {
        if self.centre_y() <= r.centre_y() && r.min_y < self.max_y {
            return self.max_y - r.min_y;
        }
        if r.centre_y() <= self.centre_y() && self.min_y < r.max_y {
            return r.max_y - self.min_y;
        }
        0.0
    }

    fn is_valid(&self) -> bool {
        [self.min_x, self.max_x, self.min_y, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }
}

pub(crate) fn check_rectangles(rects: &[Rectangle]) -> Result<()> {
    match rects.iter().position(|r| !r.is_valid()) {
        None => Ok(()),
        Some(index) => {
            let r = rects[index];
            Err(Error::InvalidRectangle {
                index,
                min_x: r.min_x,
                max_x: r.max_x,
                min_y: r.min_y,
                max_y: r.max_y,
            })
        }
    }
}

/// Scanline entry: the rectangle's centre along the constrained axis, then its index.
#[derive(Debug, Clone, Copy)]
struct ScanKey {
    pos: f64,
    id: usize,
}

impl PartialEq for ScanKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for ScanKey {}

impl PartialOrd for ScanKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScanKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.pos
            .total_cmp(&other.pos)
            .then(self.id.cmp(&other.id))
    }
}

/// At equal sweep positions a rectangle closes before another opens, so touching rectangles
/// are not neighbours. A rectangle with no extent opens before it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    Close,
    Open,
    CloseEmpty,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    pos: f64,
    kind: EventKind,
    id: usize,
}

fn sweep_events(rects: &[Rectangle], span: impl Fn(&Rectangle) -> (f64, f64)) -> Vec<Event> {
    let mut events = Vec::with_capacity(2 * rects.len());
    for (id, r) in rects.iter().enumerate() {
        let (open, close) = span(r);
        events.push(Event {
            pos: open,
            kind: EventKind::Open,
            id,
        });
        events.push(Event {
            pos: close,
            kind: if close > open {
                EventKind::Close
            } else {
                EventKind::CloseEmpty
            },
            id,
        });
    }
    events.sort_by(|a, b| {
        a.pos
            .total_cmp(&b.pos)
            .then(a.kind.cmp(&b.kind))
            .then(a.id.cmp(&b.id))
    });
    events
}

#[derive(Debug, Clone, Default)]
struct ScanNode {
    first_above: Option<usize>,
    first_below: Option<usize>,
    left: BTreeSet<ScanKey>,
    right: BTreeSet<ScanKey>,
}

/// Sweep keeping only the immediate scanline neighbours of each rectangle.
fn adjacent_constraints(
    rects: &[Rectangle],
    keys: &[ScanKey],
    events: &[Event],
    size: impl Fn(&Rectangle) -> f64,
) -> Vec<Constraint> {
    let mut nodes = vec![ScanNode::default(); rects.len()];
    let mut scanline = BTreeSet::new();
    let mut cs = Vec::new();
    for e in events {
        let v = e.id;
        let key = keys[v];
        if e.kind == EventKind::Open {
            scanline.insert(key);
            if let Some(u) = scanline.range(..key).next_back() {
                nodes[v].first_above = Some(u.id);
                nodes[u.id].first_below = Some(v);
            }
            if let Some(u) = scanline.range((Excluded(key), Unbounded)).next() {
                nodes[v].first_below = Some(u.id);
                nodes[u.id].first_above = Some(v);
            }
        } else {
            let (above, below) = (nodes[v].first_above, nodes[v].first_below);
            if let Some(l) = above {
                let sep = (size(&rects[v]) + size(&rects[l])) / 2.0;
                cs.push(Constraint::new(l, v, sep));
                nodes[l].first_below = below;
            }
            if let Some(r) = below {
                let sep = (size(&rects[v]) + size(&rects[r])) / 2.0;
                cs.push(Constraint::new(v, r, sep));
                nodes[r].first_above = above;
            }
            scanline.remove(&key);
        }
    }
    cs
}

/// Left neighbours of `v` on the scanline: scanning outwards, rectangles whose horizontal
/// overlap with `v` is no larger than their vertical one, up to and including the first one
/// clear of `v` horizontally.
fn left_neighbours(
    rects: &[Rectangle],
    scanline: &BTreeSet<ScanKey>,
    v: ScanKey,
) -> BTreeSet<ScanKey> {
    collect_neighbours(rects, scanline.range(..v).rev(), v)
}

fn right_neighbours(
    rects: &[Rectangle],
    scanline: &BTreeSet<ScanKey>,
    v: ScanKey,
) -> BTreeSet<ScanKey> {
    collect_neighbours(rects, scanline.range((Excluded(v), Unbounded)), v)
}

fn collect_neighbours<'a>(
    rects: &[Rectangle],
    candidates: impl Iterator<Item = &'a ScanKey>,
    v: ScanKey,
) -> BTreeSet<ScanKey> {
    let rv = &rects[v.id];
    let mut out = BTreeSet::new();
    for &u in candidates {
        let ru = &rects[u.id];
        let ox = ru.overlap_x(rv);
        if ox <= 0.0 {
            out.insert(u);
            break;
        }
        if ox <= ru.overlap_y(rv) {
            out.insert(u);
        }
    }
    out
}

fn neighbour_list_constraints(
    rects: &[Rectangle],
    keys: &[ScanKey],
    events: &[Event],
) -> Vec<Constraint> {
    let mut nodes = vec![ScanNode::default(); rects.len()];
    let mut scanline = BTreeSet::new();
    let mut cs = Vec::new();
    for e in events {
        let v = e.id;
        let key = keys[v];
        if e.kind == EventKind::Open {
            scanline.insert(key);
            let left = left_neighbours(rects, &scanline, key);
            let right = right_neighbours(rects, &scanline, key);
            for u in &left {
                nodes[u.id].right.insert(key);
            }
            for u in &right {
                nodes[u.id].left.insert(key);
            }
            nodes[v].left = left;
            nodes[v].right = right;
        } else {
            for u in std::mem::take(&mut nodes[v].left) {
                let sep = (rects[v].width() + rects[u.id].width()) / 2.0;
                cs.push(Constraint::new(u.id, v, sep));
                nodes[u.id].right.remove(&key);
            }
            for u in std::mem::take(&mut nodes[v].right) {
                let sep = (rects[v].width() + rects[u.id].width()) / 2.0;
                cs.push(Constraint::new(v, u.id, sep));
                nodes[u.id].left.remove(&key);
            }
            scanline.remove(&key);
        }
    }
    cs
}

/// Variables at the rectangles' horizontal centres and the constraints keeping them apart.
///
/// With `use_neighbour_lists`, a pair that overlaps less vertically than horizontally is left
/// unconstrained for the vertical pass to separate; otherwise every pair overlapping vertically
/// is separated horizontally.
pub fn generate_x_constraints(
    rects: &[Rectangle],
    use_neighbour_lists: bool,
) -> Result<(Vec<Variable>, Vec<Constraint>)> {
    check_rectangles(rects)?;
    let vars = rects
        .iter()
        .enumerate()
        .map(|(i, r)| Variable::new(i, r.centre_x(), 1.0))
        .collect();
    let keys: Vec<ScanKey> = rects
        .iter()
        .enumerate()
        .map(|(id, r)| ScanKey {
            pos: r.centre_x(),
            id,
        })
        .collect();
    let events = sweep_events(rects, |r| (r.min_y, r.max_y));
    let cs = if use_neighbour_lists {
        neighbour_list_constraints(rects, &keys, &events)
    } else {
        adjacent_constraints(rects, &keys, &events, Rectangle::width)
    };
    Ok((vars, cs))
}

/// Variables at the rectangles' vertical centres and constraints separating every pair that
/// overlaps horizontally.
pub fn generate_y_constraints(rects: &[Rectangle]) -> Result<(Vec<Variable>, Vec<Constraint>)> {
    check_rectangles(rects)?;
    let vars = rects
        .iter()
        .enumerate()
        .map(|(i, r)| Variable::new(i, r.centre_y(), 1.0))
        .collect();
    let keys: Vec<ScanKey> = rects
        .iter()
        .enumerate()
        .map(|(id, r)| ScanKey {
            pos: r.centre_y(),
            id,
        })
        .collect();
    let events = sweep_events(rects, |r| (r.min_x, r.max_x));
    Ok((
        vars,
        adjacent_constraints(rects, &keys, &events, Rectangle::height),
    ))
}
