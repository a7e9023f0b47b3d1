#![forbid(unsafe_code)]

//! Variable placement with separation constraints.
//!
//! Given variables with desired positions and weights, and constraints `x[l] + gap <= x[r]`,
//! [`Vpsc`] finds the placement minimising `sum w (x - desired)^2`. [`IncVpsc`] keeps its state
//! between solves for callers that move the desired positions repeatedly. [`remove_overlaps`]
//! builds on both to push apart overlapping rectangles.

mod block;
mod blocks;
pub mod error;
pub mod generate;
pub mod overlap;
pub mod pairing_heap;
pub mod solver;
pub mod variable;

pub use error::{Error, Result};
pub use generate::{Rectangle, generate_x_constraints, generate_y_constraints};
pub use overlap::remove_overlaps;
pub use pairing_heap::PairingHeap;
pub use solver::{IncVpsc, Vpsc};
pub use variable::{Constraint, Variable};
