//! Rectangle overlap removal: a horizontal pass followed by a vertical one.

use tracing::debug;

use crate::error::Result;
use crate::generate::{Rectangle, check_rectangles, generate_x_constraints, generate_y_constraints};
use crate::solver::Vpsc;

/// Extra separation in the horizontal pass, so that boxes placed side by side are not seen as
/// overlapping by the vertical sweep.
const EXTRA_GAP: f64 = 1e-4;

/// Moves the rectangles as little as possible (in the least-squares sense, one axis at a time)
/// so that no two overlap and neighbours are at least `gap` apart.
///
/// The horizontal pass only separates pairs that are cheaper to move sideways; the vertical pass
/// then separates every pair still overlapping horizontally.
pub fn remove_overlaps(rects: &mut [Rectangle], gap: f64) -> Result<()> {
    check_rectangles(rects)?;
    if rects.len() < 2 {
        return Ok(());
    }
    let pad = gap.max(0.0) / 2.0;

    let padded: Vec<Rectangle> = rects
        .iter()
        .map(|r| r.padded(pad + EXTRA_GAP / 2.0, pad))
        .collect();
    let (vars, cs) = generate_x_constraints(&padded, true)?;
    let x_constraints = cs.len();
    let mut solver = Vpsc::new(vars, cs);
    solver.solve()?;
    for (r, x) in rects.iter_mut().zip(solver.positions()) {
        r.move_centre_x(x);
    }

    let padded: Vec<Rectangle> = rects
        .iter()
        .map(|r| r.padded(pad, pad + EXTRA_GAP / 2.0))
        .collect();
    let (vars, cs) = generate_y_constraints(&padded)?;
    let y_constraints = cs.len();
    let mut solver = Vpsc::new(vars, cs);
    solver.solve()?;
    for (r, y) in rects.iter_mut().zip(solver.positions()) {
        r.move_centre_y(y);
    }

    debug!(
        n = rects.len(),
        x_constraints, y_constraints, "removed rectangle overlaps"
    );
    Ok(())
}
