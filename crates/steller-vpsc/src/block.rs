//! Operations on a single block.
//!
//! A block is a set of variables joined by a spanning tree of active constraints. Every
//! variable sits at `posn + offset`, so the block moves as one and its active constraints stay
//! tight. `posn` is the weighted mean of `desired_position - offset` over the block.

use rustc_hash::FxHashMap;

use crate::blocks::Blocks;
use crate::pairing_heap::PairingHeap;

#[derive(Debug, Clone, Default)]
pub(crate) struct Block {
    pub(crate) vars: Vec<usize>,
    pub(crate) posn: f64,
    pub(crate) weight: f64,
    pub(crate) wposn: f64,
    pub(crate) deleted: bool,
    /// Whether the block is in the live list of its [`Blocks`].
    pub(crate) listed: bool,
    pub(crate) time_stamp: u64,
    pub(crate) in_heap: Option<PairingHeap<usize>>,
    pub(crate) out_heap: Option<PairingHeap<usize>>,
}

/// One variable reached while walking a block's active constraint tree, with the constraint
/// and parent variable it was reached through.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeStep {
    pub(crate) var: usize,
    pub(crate) via: Option<(usize, usize)>,
}

impl Blocks {
    pub(crate) fn new_block(&mut self) -> usize {
        self.arena.push(Block::default());
        self.arena.len() - 1
    }

    pub(crate) fn add_variable(&mut self, b: usize, v: usize) {
        let var = &mut self.vars[v];
        var.block = b;
        let (w, target) = (var.weight, var.desired_position - var.offset);
        let block = &mut self.arena[b];
        block.vars.push(v);
        block.weight += w;
        block.wposn += w * target;
        block.posn = block.wposn / block.weight;
    }

    pub(crate) fn desired_weighted_position(&self, b: usize) -> f64 {
        self.arena[b]
            .vars
            .iter()
            .map(|&v| {
                let var = &self.vars[v];
                (var.desired_position - var.offset) * var.weight
            })
            .sum()
    }

    pub(crate) fn set_up_in_constraints(&mut self, b: usize) {
        let heap = self.constraint_heap(b, true);
        self.arena[b].in_heap = Some(heap);
    }

    pub(crate) fn set_up_out_constraints(&mut self, b: usize) {
        let heap = self.constraint_heap(b, false);
        self.arena[b].out_heap = Some(heap);
    }

    /// Heap of the constraints crossing into (`use_in`) or out of block `b`, all stamped with
    /// the current time.
    fn constraint_heap(&mut self, b: usize, use_in: bool) -> PairingHeap<usize> {
        let mut candidates = Vec::new();
        for &v in &self.arena[b].vars {
            let var = &self.vars[v];
            candidates.extend_from_slice(if use_in { &var.in_cs } else { &var.out_cs });
        }
        let mut heap = PairingHeap::new();
        for &c in &candidates {
            self.cs[c].time_stamp = self.time_ctr;
        }
        for c in candidates {
            let con = &self.cs[c];
            let other = if use_in { con.left } else { con.right };
            if self.vars[other].block != b {
                heap.insert(c, |x, y| self.constraint_less(*x, *y));
            }
        }
        heap
    }

    /// Heap order: stale constraints (the left block moved since the constraint was stamped)
    /// and internal ones first, then by slack, then by variable ids.
    pub(crate) fn constraint_less(&self, l: usize, r: usize) -> bool {
        let key = |c: usize| {
            let con = &self.cs[c];
            let lb = self.vars[con.left].block;
            if self.arena[lb].time_stamp > con.time_stamp || lb == self.vars[con.right].block {
                f64::MIN
            } else {
                self.slack(c)
            }
        };
        let (sl, sr) = (key(l), key(r));
        if sl == sr {
            let ids = |c: usize| (self.vars[self.cs[c].left].id, self.vars[self.cs[c].right].id);
            ids(l) < ids(r)
        } else {
            sl < sr
        }
    }

    /// Moves block `b` into `into` across `c`, shifting the moved offsets by `dist`.
    pub(crate) fn merge_blocks(&mut self, into: usize, b: usize, c: usize, dist: f64) {
        self.cs[c].active = true;
        let (bw, bwposn) = (self.arena[b].weight, self.arena[b].wposn);
        let target = &mut self.arena[into];
        target.wposn += bwposn - dist * bw;
        target.weight += bw;
        target.posn = target.wposn / target.weight;

        let moved = std::mem::take(&mut self.arena[b].vars);
        for &v in &moved {
            self.vars[v].block = into;
            self.vars[v].offset += dist;
        }
        self.arena[into].vars.extend(moved);
        self.arena[b].deleted = true;
    }

    /// Merges the blocks at either end of `c` so that `c` holds with equality. The smaller
    /// block moves. Returns the surviving block.
    pub(crate) fn merge_across(&mut self, c: usize) -> usize {
        let con = &self.cs[c];
        let (vl, vr) = (con.left, con.right);
        let dist = self.vars[vr].offset - self.vars[vl].offset - con.gap;
        let l = self.vars[vl].block;
        let r = self.vars[vr].block;
        if self.arena[l].vars.len() < self.arena[r].vars.len() {
            self.merge_blocks(r, l, c, dist);
            r
        } else {
            self.merge_blocks(l, r, c, -dist);
            l
        }
    }

    pub(crate) fn merge_in(&mut self, into: usize, b: usize) {
        // Prune internal constraints off both tops first.
        self.find_min_in_constraint(into);
        self.find_min_in_constraint(b);
        let mut other = self.arena[b].in_heap.take().unwrap_or_default();
        let mut heap = self.arena[into].in_heap.take().unwrap_or_default();
        heap.merge(&mut other, |x, y| self.constraint_less(*x, *y));
        self.arena[into].in_heap = Some(heap);
    }

    pub(crate) fn merge_out(&mut self, into: usize, b: usize) {
        self.find_min_out_constraint(into);
        self.find_min_out_constraint(b);
        let mut other = self.arena[b].out_heap.take().unwrap_or_default();
        let mut heap = self.arena[into].out_heap.take().unwrap_or_default();
        heap.merge(&mut other, |x, y| self.constraint_less(*x, *y));
        self.arena[into].out_heap = Some(heap);
    }

    /// Most violated incoming constraint of `b`.
    ///
    /// Constraints that became internal are dropped; stale ones are stamped afresh and
    /// reinserted.
    pub(crate) fn find_min_in_constraint(&mut self, b: usize) -> Option<usize> {
        let mut heap = self.arena[b].in_heap.take()?;
        let mut out_of_date = Vec::new();
        while let Some(&c) = heap.find_min() {
            let con = &self.cs[c];
            let lb = self.vars[con.left].block;
            let rb = self.vars[con.right].block;
            if lb == rb {
                heap.delete_min(|x, y| self.constraint_less(*x, *y));
            } else if con.time_stamp < self.arena[lb].time_stamp {
                heap.delete_min(|x, y| self.constraint_less(*x, *y));
                out_of_date.push(c);
            } else {
                break;
            }
        }
        for &c in &out_of_date {
            self.cs[c].time_stamp = self.time_ctr;
        }
        for c in out_of_date {
            heap.insert(c, |x, y| self.constraint_less(*x, *y));
        }
        let min = heap.find_min().copied();
        self.arena[b].in_heap = Some(heap);
        min
    }

    pub(crate) fn find_min_out_constraint(&mut self, b: usize) -> Option<usize> {
        let mut heap = self.arena[b].out_heap.take()?;
        while let Some(&c) = heap.find_min() {
            let con = &self.cs[c];
            if self.vars[con.left].block != self.vars[con.right].block {
                break;
            }
            heap.delete_min(|x, y| self.constraint_less(*x, *y));
        }
        let min = heap.find_min().copied();
        self.arena[b].out_heap = Some(heap);
        min
    }

    pub(crate) fn delete_min_in_constraint(&mut self, b: usize) {
        if let Some(mut heap) = self.arena[b].in_heap.take() {
            heap.delete_min(|x, y| self.constraint_less(*x, *y));
            self.arena[b].in_heap = Some(heap);
        }
    }

    pub(crate) fn delete_min_out_constraint(&mut self, b: usize) {
        if let Some(mut heap) = self.arena[b].out_heap.take() {
            heap.delete_min(|x, y| self.constraint_less(*x, *y));
            self.arena[b].out_heap = Some(heap);
        }
    }

    fn can_follow_left(&self, b: usize, c: usize, last: Option<usize>) -> bool {
        let con = &self.cs[c];
        self.vars[con.left].block == b && con.active && last != Some(con.left)
    }

    fn can_follow_right(&self, b: usize, c: usize, last: Option<usize>) -> bool {
        let con = &self.cs[c];
        self.vars[con.right].block == b && con.active && last != Some(con.right)
    }

    /// Pre-order walk of the active constraint tree of `b` from `root`, never stepping back
    /// onto `from`.
    pub(crate) fn active_tree(&self, b: usize, root: usize, from: Option<usize>) -> Vec<TreeStep> {
        let mut order = Vec::new();
        let mut stack = vec![TreeStep {
            var: root,
            via: None,
        }];
        while let Some(step) = stack.pop() {
            order.push(step);
            let v = step.var;
            let last = match step.via {
                Some((_, parent)) => Some(parent),
                None => from,
            };
            for &c in &self.vars[v].in_cs {
                if self.can_follow_left(b, c, last) {
                    stack.push(TreeStep {
                        var: self.cs[c].left,
                        via: Some((c, v)),
                    });
                }
            }
            for &c in &self.vars[v].out_cs {
                if self.can_follow_right(b, c, last) {
                    stack.push(TreeStep {
                        var: self.cs[c].right,
                        via: Some((c, v)),
                    });
                }
            }
        }
        order
    }

    pub(crate) fn reset_active_lm(&mut self, b: usize, root: usize) {
        for step in self.active_tree(b, root, None) {
            if let Some((c, _)) = step.via {
                self.cs[c].lm = 0.0;
            }
        }
    }

    /// Sets the Lagrange multiplier of every tree constraint from the derivative sums of the
    /// subtrees below it. Returns the inequality with the smallest multiplier.
    fn compute_lms(&mut self, tree: &[TreeStep]) -> Option<usize> {
        for step in tree {
            let var = &self.vars[step.var];
            let d = var.weight * (self.position(step.var) - var.desired_position);
            self.dfdv[step.var] = d;
        }
        let mut min: Option<usize> = None;
        for step in tree.iter().rev() {
            let Some((c, parent)) = step.via else {
                continue;
            };
            let d = self.dfdv[step.var];
            let lm = if self.cs[c].right == step.var { d } else { -d };
            self.cs[c].lm = lm;
            self.dfdv[parent] += d;
            if !self.cs[c].equality && min.is_none_or(|m| lm < self.cs[m].lm) {
                min = Some(c);
            }
        }
        min
    }

    /// Derivative of the block's cost at `root`; sets the multipliers on the way.
    pub(crate) fn compute_dfdv(&mut self, b: usize, root: usize) -> (f64, Option<usize>) {
        let tree = self.active_tree(b, root, None);
        let min = self.compute_lms(&tree);
        (self.dfdv[root], min)
    }

    /// The active constraint of `b` that most wants to split.
    pub(crate) fn find_min_lm(&mut self, b: usize) -> Option<usize> {
        let root = *self.arena[b].vars.first()?;
        self.reset_active_lm(b, root);
        self.compute_dfdv(b, root).1
    }

    /// Constraint with the smallest multiplier on the tree path from `lv` to `rv`.
    ///
    /// Constraints crossed from their left to their right variable are preferred, so that
    /// splitting there does not introduce new violations.
    pub(crate) fn find_min_lm_between(&mut self, b: usize, lv: usize, rv: usize) -> Option<usize> {
        self.reset_active_lm(b, lv);
        let tree = self.active_tree(b, lv, None);
        self.compute_lms(&tree);
        let parents: FxHashMap<usize, (usize, usize)> = tree
            .iter()
            .filter_map(|s| s.via.map(|via| (s.var, via)))
            .collect();

        let mut forward: Option<usize> = None;
        let mut any: Option<usize> = None;
        let mut cur = rv;
        while cur != lv {
            let &(c, parent) = parents.get(&cur)?;
            let lm = self.cs[c].lm;
            if self.cs[c].left == parent && forward.is_none_or(|m| lm < self.cs[m].lm) {
                forward = Some(c);
            }
            if any.is_none_or(|m| lm < self.cs[m].lm) {
                any = Some(c);
            }
            cur = parent;
        }
        forward.or(any)
    }

    /// Adds to the new block `nb` every variable of `b` reachable from `v` without crossing
    /// `u`.
    pub(crate) fn populate_split_block(&mut self, nb: usize, b: usize, v: usize, u: usize) {
        for step in self.active_tree(b, v, Some(u)) {
            self.add_variable(nb, step.var);
        }
    }

    /// Deactivates `c` and rebuilds the two halves of `b` as new blocks `(left, right)`.
    pub(crate) fn split_block(&mut self, b: usize, c: usize) -> (usize, usize) {
        self.cs[c].active = false;
        let (vl, vr) = (self.cs[c].left, self.cs[c].right);
        let l = self.new_block();
        self.populate_split_block(l, b, vl, vr);
        let r = self.new_block();
        self.populate_split_block(r, b, vr, vl);
        (l, r)
    }

    /// Splits `b` on the path between `vl` and `vr` and marks `b` deleted. Returns the split
    /// constraint and the new blocks.
    pub(crate) fn split_between(&mut self, b: usize, vl: usize, vr: usize) -> (usize, usize, usize) {
        let Some(c) = self.find_min_lm_between(b, vl, vr) else {
            unreachable!("variables sharing a block are joined by active constraints");
        };
        let (l, r) = self.split_block(b, c);
        self.arena[b].deleted = true;
        (c, l, r)
    }

    pub(crate) fn block_cost(&self, b: usize) -> f64 {
        self.arena[b]
            .vars
            .iter()
            .map(|&v| {
                let var = &self.vars[v];
                let diff = self.position(v) - var.desired_position;
                var.weight * diff * diff
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::blocks::Blocks;
    use crate::variable::{Constraint, Variable};

    fn chain(desired: &[f64], gap: f64) -> Blocks {
        let vars = desired
            .iter()
            .enumerate()
            .map(|(i, &d)| Variable::new(i, d, 1.0))
            .collect();
        let cs = (1..desired.len())
            .map(|i| Constraint::new(i - 1, i, gap))
            .collect();
        Blocks::new(vars, cs)
    }

    #[test]
    fn merge_across_makes_the_constraint_tight() {
        let mut bs = chain(&[0.0, 0.0], 1.0);
        let b = bs.merge_across(0);
        assert!(bs.cs[0].active);
        assert!(bs.slack(0).abs() < 1e-12);
        assert_eq!(bs.arena[b].vars.len(), 2);
        assert!((bs.arena[b].posn - bs.desired_weighted_position(b) / 2.0).abs() < 1e-12);
        assert!((bs.position(0) + 0.5).abs() < 1e-12);
        assert!((bs.position(1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn multipliers_are_subtree_derivative_sums() {
        let mut bs = chain(&[0.0, 0.0, 0.0], 1.0);
        bs.merge_across(0);
        let b = bs.merge_across(1);
        // Positions -1, 0, 1: both constraints push apart with multiplier 1.
        let min = bs.find_min_lm(b).unwrap();
        assert!((bs.cs[0].lm - 1.0).abs() < 1e-12);
        assert!((bs.cs[1].lm - 1.0).abs() < 1e-12);
        assert!(bs.cs[min].lm >= 0.0);
    }

    #[test]
    fn negative_multiplier_marks_the_split() {
        // The first pair wants to be farther apart than the gap; merging it is not optimal.
        let mut bs = chain(&[0.0, 5.0], 1.0);
        let b = bs.merge_across(0);
        let c = bs.find_min_lm(b).unwrap();
        assert_eq!(c, 0);
        assert!(bs.cs[0].lm < 0.0);

        let (l, r) = bs.split_block(b, c);
        assert!(!bs.cs[0].active);
        assert_eq!(bs.arena[l].vars, vec![0]);
        assert_eq!(bs.arena[r].vars, vec![1]);
        assert!((bs.position(0) - 0.0).abs() < 1e-12);
        assert!((bs.position(1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn split_between_cuts_the_path() {
        let mut bs = chain(&[0.0, 0.0, 0.0, 0.0], 1.0);
        bs.merge_across(0);
        bs.merge_across(1);
        let b = bs.merge_across(2);
        let (c, l, r) = bs.split_between(b, 0, 3);
        assert!(bs.arena[b].deleted);
        assert!(!bs.cs[c].active);
        assert!(bs.arena[l].vars.contains(&bs.cs[c].left));
        assert!(bs.arena[r].vars.contains(&bs.cs[c].right));
        assert_ne!(bs.vars[0].block, bs.vars[3].block);
    }
}
