//! Solvers for placing variables as close as possible to their desired positions subject to
//! separation constraints `x[left] + gap <= x[right]`.

use tracing::{debug, trace, warn};

use crate::blocks::Blocks;
use crate::error::{Error, Result};
use crate::variable::{Constraint, Variable};

/// Slack below which a constraint counts as violated.
const ZERO_UPPERBOUND: f64 = -1e-7;
/// Multiplier below which an active constraint is worth splitting.
const LAGRANGIAN_TOLERANCE: f64 = -1e-7;
const MAX_SPLITS: usize = 10_000;
const COST_TOLERANCE: f64 = 1e-4;

fn check_constraints(bs: &Blocks) -> Result<()> {
    for index in 0..bs.cs.len() {
        let slack = bs.slack(index);
        if slack < ZERO_UPPERBOUND {
            warn!(index, slack, "constraint left unsatisfied");
            return Err(Error::UnsatisfiedConstraint { index, slack });
        }
    }
    Ok(())
}

/// Static solver: one satisfy pass over the constraint DAG followed by block refinement.
#[derive(Debug, Clone)]
pub struct Vpsc {
    bs: Blocks,
}

impl Vpsc {
    /// # Panics
    ///
    /// If a constraint refers to a missing variable or the constraints form a directed cycle.
    pub fn new(vars: Vec<Variable>, cs: Vec<Constraint>) -> Self {
        let bs = Blocks::new(vars, cs);
        assert!(
            !bs.constraint_graph_is_cyclic(),
            "separation constraints must form a directed acyclic graph"
        );
        Self { bs }
    }

    /// Produces a feasible placement.
    ///
    /// Blocks are visited in the constraint order; each merges with its left neighbours across
    /// violated constraints, most violated first, so every constraint to its left holds.
    pub fn satisfy(&mut self) -> Result<()> {
        for v in self.bs.total_order() {
            let b = self.bs.vars[v].block;
            if !self.bs.arena[b].deleted {
                self.bs.merge_left(b);
            }
        }
        self.bs.cleanup();
        debug!(blocks = self.bs.live.len(), "vpsc satisfy");
        check_constraints(&self.bs)
    }

    /// Splits blocks at negative Lagrange multipliers until none is left.
    pub fn refine(&mut self) -> Result<()> {
        let mut splits = 0usize;
        'solve: loop {
            let live = self.bs.live.clone();
            for &b in &live {
                self.bs.set_up_in_constraints(b);
                self.bs.set_up_out_constraints(b);
            }
            for &b in &live {
                let Some(c) = self.bs.find_min_lm(b) else {
                    continue;
                };
                if self.bs.cs[c].lm < LAGRANGIAN_TOLERANCE {
                    trace!(constraint = c, lm = self.bs.cs[c].lm, "split");
                    self.bs.split(b, c);
                    self.bs.cleanup();
                    splits += 1;
                    continue 'solve;
                }
            }
            break;
        }
        debug!(splits, blocks = self.bs.live.len(), "vpsc refine");
        check_constraints(&self.bs)
    }

    pub fn solve(&mut self) -> Result<()> {
        self.satisfy()?;
        self.refine()
    }

    pub fn position(&self, v: usize) -> f64 {
        self.bs.position(v)
    }

    pub fn positions(&self) -> Vec<f64> {
        (0..self.bs.vars.len()).map(|v| self.bs.position(v)).collect()
    }

    pub fn variable(&self, v: usize) -> &Variable {
        &self.bs.vars[v]
    }

    pub fn variables(&self) -> &[Variable] {
        &self.bs.vars
    }

    pub fn constraint(&self, c: usize) -> &Constraint {
        &self.bs.cs[c]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.bs.cs
    }

    pub fn slack(&self, c: usize) -> f64 {
        self.bs.slack(c)
    }

    /// Weighted squared distance of the placement from the desired positions.
    pub fn cost(&self) -> f64 {
        self.bs.cost()
    }

    pub fn block_count(&self) -> usize {
        self.bs.live.len()
    }

    /// Whether the blocks, linked by the constraints between them, contain a directed cycle.
    pub fn block_graph_is_cyclic(&self) -> bool {
        self.bs.block_graph_is_cyclic()
    }
}

/// Incremental solver that keeps its blocks between solves, so it can be re-run cheaply after
/// desired positions change.
///
/// Constraints start inactive and are merged across one at a time, most violated first.
/// Cycles in the constraint graph are reported as [`Error::CycleDetected`] instead of panicking.
#[derive(Debug, Clone)]
pub struct IncVpsc {
    bs: Blocks,
    inactive: Vec<usize>,
    split_cnt: usize,
}

impl IncVpsc {
    /// # Panics
    ///
    /// If a constraint refers to a missing variable.
    pub fn new(vars: Vec<Variable>, cs: Vec<Constraint>) -> Self {
        let mut bs = Blocks::new(vars, cs);
        for c in &mut bs.cs {
            c.active = false;
        }
        let inactive = (0..bs.cs.len()).collect();
        Self {
            bs,
            inactive,
            split_cnt: 0,
        }
    }

    pub fn solve(&mut self) -> Result<()> {
        let mut cost = self.bs.cost();
        let mut rounds = 0usize;
        loop {
            let last = cost;
            self.satisfy()?;
            self.split_blocks();
            cost = self.bs.cost();
            rounds += 1;
            trace!(rounds, cost, "incremental round");
            if (last - cost).abs() <= COST_TOLERANCE {
                break;
            }
        }
        debug!(rounds, cost, blocks = self.bs.live.len(), "incremental vpsc solve");
        Ok(())
    }

    /// Restores feasibility after the desired positions moved.
    pub fn satisfy(&mut self) -> Result<()> {
        self.split_blocks();
        let mut splits = 0usize;
        loop {
            let Some((c, slack)) = self.most_violated() else {
                break;
            };
            if slack >= ZERO_UPPERBOUND {
                break;
            }
            let (vl, vr) = (self.bs.cs[c].left, self.bs.cs[c].right);
            if self.bs.vars[vl].block != self.bs.vars[vr].block {
                self.bs.merge_across(c);
            } else {
                splits += 1;
                if splits > MAX_SPLITS {
                    warn!(constraint = c, "giving up after repeated in-block splits");
                    return Err(Error::CycleDetected);
                }
                let b = self.bs.vars[vl].block;
                let (split_on, l, r) = self.bs.split_between(b, vl, vr);
                self.inactive.push(split_on);
                self.bs.merge_across(c);
                self.bs.list(l);
                self.bs.list(r);
            }
        }
        self.bs.cleanup();
        check_constraints(&self.bs)
    }

    /// Re-centres every block on the weighted mean of its desired positions.
    pub fn move_blocks(&mut self) {
        for &b in &self.bs.live {
            let wposn = self.bs.desired_weighted_position(b);
            let block = &mut self.bs.arena[b];
            block.wposn = wposn;
            block.posn = wposn / block.weight;
        }
    }

    /// Splits every block whose smallest Lagrange multiplier is negative, once.
    pub fn split_blocks(&mut self) {
        self.move_blocks();
        self.split_cnt = 0;
        let live = self.bs.live.clone();
        for b in live {
            let Some(c) = self.bs.find_min_lm(b) else {
                continue;
            };
            if self.bs.cs[c].lm >= LAGRANGIAN_TOLERANCE {
                continue;
            }
            self.split_cnt += 1;
            let posn = self.bs.arena[b].posn;
            let (l, r) = self.bs.split_block(b, c);
            for nb in [l, r] {
                let block = &mut self.bs.arena[nb];
                block.posn = posn;
                block.wposn = posn * block.weight;
                self.bs.list(nb);
            }
            self.bs.remove_block(b);
            self.inactive.push(c);
        }
        self.bs.cleanup();
    }

    /// Removes and returns the inactive constraint with the smallest slack, or the first
    /// equality constraint. The constraint is only removed from the inactive list when it is
    /// violated.
    pub fn most_violated(&mut self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (pos, &c) in self.inactive.iter().enumerate() {
            let slack = self.bs.slack(c);
            let equality = self.bs.cs[c].equality;
            if equality || best.is_none_or(|(_, _, s)| slack < s) {
                best = Some((pos, c, slack));
                if equality {
                    break;
                }
            }
        }
        let (pos, c, slack) = best?;
        if slack < ZERO_UPPERBOUND {
            self.inactive.swap_remove(pos);
        }
        Some((c, slack))
    }

    /// Blocks split by the last [`IncVpsc::split_blocks`].
    pub fn split_count(&self) -> usize {
        self.split_cnt
    }

    pub fn set_desired_position(&mut self, v: usize, desired: f64) {
        self.bs.vars[v].desired_position = desired;
    }

    pub fn position(&self, v: usize) -> f64 {
        self.bs.position(v)
    }

    pub fn positions(&self) -> Vec<f64> {
        (0..self.bs.vars.len()).map(|v| self.bs.position(v)).collect()
    }

    pub fn variable(&self, v: usize) -> &Variable {
        &self.bs.vars[v]
    }

    pub fn constraint(&self, c: usize) -> &Constraint {
        &self.bs.cs[c]
    }

    pub fn slack(&self, c: usize) -> f64 {
        self.bs.slack(c)
    }

    pub fn cost(&self) -> f64 {
        self.bs.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(desired: &[f64]) -> Vec<Variable> {
        desired
            .iter()
            .enumerate()
            .map(|(i, &d)| Variable::new(i, d, 1.0))
            .collect()
    }

    fn chain(n: usize, gap: f64) -> Vec<Constraint> {
        (1..n).map(|i| Constraint::new(i - 1, i, gap)).collect()
    }

    #[test]
    fn satisfy_alone_is_feasible() {
        let mut s = Vpsc::new(vars(&[3.0, 0.0, 1.0]), chain(3, 1.0));
        s.satisfy().unwrap();
        for c in 0..2 {
            assert!(s.slack(c) >= -1e-9);
        }
    }

    #[test]
    fn solve_leaves_slack_constraints_inactive() {
        let mut s = Vpsc::new(vars(&[0.0, 0.0, 10.0]), chain(3, 1.0));
        s.solve().unwrap();
        let x = s.positions();
        assert!((x[0] + 0.5).abs() < 1e-9);
        assert!((x[1] - 0.5).abs() < 1e-9);
        assert!((x[2] - 10.0).abs() < 1e-9);
        assert!(!s.constraint(1).is_active());
        assert_eq!(s.block_count(), 2);
    }

    #[test]
    #[should_panic(expected = "acyclic")]
    fn cyclic_constraints_panic() {
        let cs = vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 0, 1.0)];
        let _ = Vpsc::new(vars(&[0.0, 0.0]), cs);
    }

    #[test]
    fn incremental_cycle_is_an_error() {
        let cs = vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 0, 1.0)];
        let mut s = IncVpsc::new(vars(&[0.0, 0.0]), cs);
        assert!(s.solve().is_err());
    }

    #[test]
    fn most_violated_keeps_satisfied_constraints() {
        let mut s = IncVpsc::new(vars(&[0.0, 5.0, 5.5]), chain(3, 1.0));
        let (c, slack) = s.most_violated().unwrap();
        assert_eq!(c, 1);
        assert!((slack + 0.5).abs() < 1e-12);
        assert_eq!(s.inactive.len(), 1);
        assert_eq!(s.most_violated(), Some((0, 4.0)));
        assert_eq!(s.inactive.len(), 1);
    }

    #[test]
    fn incremental_solver_follows_moved_targets() {
        let mut s = IncVpsc::new(vars(&[0.0, 0.0, 0.0]), chain(3, 1.0));
        s.solve().unwrap();
        let x = s.positions();
        assert!((x[0] + 1.0).abs() < 1e-6);
        assert!((x[2] - 1.0).abs() < 1e-6);

        s.set_desired_position(2, 10.0);
        s.solve().unwrap();
        let x = s.positions();
        assert!((x[0] + 0.5).abs() < 1e-6);
        assert!((x[1] - 0.5).abs() < 1e-6);
        assert!((x[2] - 10.0).abs() < 1e-6);
    }
}
