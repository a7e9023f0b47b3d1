//! The set of live blocks and the merge/split moves between them.

use tracing::trace;

use crate::block::Block;
use crate::variable::{Constraint, Variable};

#[derive(Debug, Clone)]
pub(crate) struct Blocks {
    pub(crate) vars: Vec<Variable>,
    pub(crate) cs: Vec<Constraint>,
    /// Every block ever created; deleted ones stay until the solver is dropped.
    pub(crate) arena: Vec<Block>,
    pub(crate) live: Vec<usize>,
    pub(crate) time_ctr: u64,
    pub(crate) dfdv: Vec<f64>,
}

impl Blocks {
    /// One block per variable.
    ///
    /// # Panics
    ///
    /// If a constraint refers to a variable index out of range.
    pub(crate) fn new(mut vars: Vec<Variable>, cs: Vec<Constraint>) -> Self {
        let n = vars.len();
        for v in &mut vars {
            v.in_cs.clear();
            v.out_cs.clear();
            v.offset = 0.0;
        }
        for (k, c) in cs.iter().enumerate() {
            assert!(
                c.left < n && c.right < n,
                "constraint {k} refers to a variable outside 0..{n}"
            );
            vars[c.left].out_cs.push(k);
            vars[c.right].in_cs.push(k);
        }
        let mut bs = Self {
            vars,
            cs,
            arena: Vec::with_capacity(n),
            live: Vec::with_capacity(n),
            time_ctr: 0,
            dfdv: vec![0.0; n],
        };
        for v in 0..n {
            let b = bs.new_block();
            bs.add_variable(b, v);
            bs.list(b);
        }
        bs
    }

    pub(crate) fn position(&self, v: usize) -> f64 {
        let var = &self.vars[v];
        self.arena[var.block].posn + var.offset
    }

    pub(crate) fn slack(&self, c: usize) -> f64 {
        let con = &self.cs[c];
        self.position(con.right) - con.gap - self.position(con.left)
    }

    pub(crate) fn list(&mut self, b: usize) {
        let block = &mut self.arena[b];
        if !block.deleted && !block.listed {
            block.listed = true;
            self.live.push(b);
        }
    }

    pub(crate) fn remove_block(&mut self, b: usize) {
        self.arena[b].deleted = true;
    }

    /// Drops deleted blocks from the live list.
    pub(crate) fn cleanup(&mut self) {
        let arena = &mut self.arena;
        self.live.retain(|&b| {
            let block = &mut arena[b];
            if block.deleted {
                block.listed = false;
                block.in_heap = None;
                block.out_heap = None;
            }
            !block.deleted
        });
    }

    /// Variables in an order compatible with the constraint DAG, left ends first.
    pub(crate) fn total_order(&self) -> Vec<usize> {
        let n = self.vars.len();
        let mut visited = vec![false; n];
        let mut finished = Vec::with_capacity(n);
        for start in 0..n {
            if visited[start] || !self.vars[start].in_cs.is_empty() {
                continue;
            }
            visited[start] = true;
            let mut stack = vec![(start, 0usize)];
            while let Some(top) = stack.last_mut() {
                let (v, next) = *top;
                let out = &self.vars[v].out_cs;
                if next < out.len() {
                    top.1 += 1;
                    let r = self.cs[out[next]].right;
                    if !visited[r] {
                        visited[r] = true;
                        stack.push((r, 0));
                    }
                } else {
                    finished.push(v);
                    stack.pop();
                }
            }
        }
        // Variables only reachable through a cycle.
        for v in 0..n {
            if !visited[v] {
                finished.push(v);
            }
        }
        finished.reverse();
        finished
    }

    /// Pulls in blocks to the left of `r` while some incoming constraint is violated.
    pub(crate) fn merge_left(&mut self, r: usize) {
        let mut r = r;
        self.time_ctr += 1;
        self.arena[r].time_stamp = self.time_ctr;
        self.set_up_in_constraints(r);
        while let Some(c) = self.find_min_in_constraint(r) {
            if self.slack(c) >= 0.0 {
                break;
            }
            self.delete_min_in_constraint(r);
            let mut l = self.vars[self.cs[c].left].block;
            if self.arena[l].in_heap.is_none() {
                self.set_up_in_constraints(l);
            }
            let con = &self.cs[c];
            let mut dist =
                self.vars[con.right].offset - self.vars[con.left].offset - con.gap;
            if self.arena[r].vars.len() < self.arena[l].vars.len() {
                dist = -dist;
                std::mem::swap(&mut l, &mut r);
            }
            self.time_ctr += 1;
            trace!(constraint = c, into = r, from = l, "merge left");
            self.merge_blocks(r, l, c, dist);
            self.merge_in(r, l);
            self.arena[r].time_stamp = self.time_ctr;
            self.remove_block(l);
        }
    }

    /// Pulls in blocks to the right of `l` while some outgoing constraint is violated.
    pub(crate) fn merge_right(&mut self, l: usize) {
        let mut l = l;
        self.set_up_out_constraints(l);
        while let Some(c) = self.find_min_out_constraint(l) {
            if self.slack(c) >= 0.0 {
                break;
            }
            self.delete_min_out_constraint(l);
            let mut r = self.vars[self.cs[c].right].block;
            if self.arena[r].out_heap.is_none() {
                self.set_up_out_constraints(r);
            }
            let con = &self.cs[c];
            let mut dist =
                self.vars[con.left].offset + con.gap - self.vars[con.right].offset;
            if self.arena[l].vars.len() > self.arena[r].vars.len() {
                dist = -dist;
                std::mem::swap(&mut l, &mut r);
            }
            trace!(constraint = c, into = l, from = r, "merge right");
            self.merge_blocks(l, r, c, dist);
            self.merge_out(l, r);
            self.remove_block(r);
        }
    }

    /// Splits `b` across `c` and lets both halves settle against their neighbours.
    pub(crate) fn split(&mut self, b: usize, c: usize) {
        let (l, r) = self.split_block(b, c);
        let posn = self.arena[b].posn;
        let right = &mut self.arena[r];
        right.posn = posn;
        right.wposn = posn * right.weight;
        self.merge_left(l);

        let r = self.vars[self.cs[c].right].block;
        let wposn = self.desired_weighted_position(r);
        let right = &mut self.arena[r];
        right.wposn = wposn;
        right.posn = wposn / right.weight;
        self.merge_right(r);

        self.remove_block(b);
        self.list(l);
        self.list(r);
    }

    pub(crate) fn cost(&self) -> f64 {
        self.live.iter().map(|&b| self.block_cost(b)).sum()
    }

    pub(crate) fn constraint_graph_is_cyclic(&self) -> bool {
        let n = self.vars.len();
        let mut indegree: Vec<usize> = self.vars.iter().map(|v| v.in_cs.len()).collect();
        let mut queue: Vec<usize> = (0..n).filter(|&v| indegree[v] == 0).collect();
        let mut seen = 0;
        while let Some(v) = queue.pop() {
            seen += 1;
            for &c in &self.vars[v].out_cs {
                let r = self.cs[c].right;
                indegree[r] -= 1;
                if indegree[r] == 0 {
                    queue.push(r);
                }
            }
        }
        seen < n
    }

    /// Whether the live blocks, linked by their crossing constraints, form a cycle.
    pub(crate) fn block_graph_is_cyclic(&self) -> bool {
        let k = self.live.len();
        let mut index = vec![None; self.arena.len()];
        for (i, &b) in self.live.iter().enumerate() {
            index[b] = Some(i);
        }
        let mut succ: Vec<Vec<usize>> = vec![Vec::new(); k];
        let mut indegree = vec![0usize; k];
        for c in &self.cs {
            let lb = self.vars[c.left].block;
            let rb = self.vars[c.right].block;
            if lb == rb {
                continue;
            }
            if let (Some(i), Some(j)) = (index[lb], index[rb]) {
                if !succ[i].contains(&j) {
                    succ[i].push(j);
                    indegree[j] += 1;
                }
            }
        }
        let mut queue: Vec<usize> = (0..k).filter(|&i| indegree[i] == 0).collect();
        let mut seen = 0;
        while let Some(i) = queue.pop() {
            seen += 1;
            for &j in &succ[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    queue.push(j);
                }
            }
        }
        seen < k
    }
}
