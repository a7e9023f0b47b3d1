/// Highest quadtree depth the optimizer will try.
pub const MAX_I: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Init,
    Up,
    Down,
}

/// Hill climber over integer quadtree depths in `0..=MAX_I`.
///
/// Each iteration the caller reads [`Self::get`], does its work at that depth and reports the
/// cost with [`Self::train`]. The optimizer keeps moving in one direction while the cost drops
/// and turns around as soon as it does not.
#[derive(Debug, Clone)]
pub struct OnedOptimizer {
    i: usize,
    direction: Direction,
    work: [f64; MAX_I + 1],
}

impl OnedOptimizer {
    pub fn new(i: usize) -> Self {
        Self {
            i: i.min(MAX_I),
            direction: Direction::Init,
            work: [0.0; MAX_I + 1],
        }
    }

    pub fn train(&mut self, work: f64) {
        let i = self.i;
        self.work[i] = work;
        match self.direction {
            Direction::Init => {
                if i == MAX_I {
                    self.direction = Direction::Down;
                    self.i = i - 1;
                } else {
                    self.direction = Direction::Up;
                    self.i = i + 1;
                }
            }
            Direction::Up => {
                if self.work[i] < self.work[i - 1] && i < MAX_I {
                    self.i = i + 1;
                } else {
                    self.i = i - 1;
                    self.direction = Direction::Down;
                }
            }
            Direction::Down => {
                if self.work[i] < self.work[i + 1] && i > 0 {
                    self.i = i - 1;
                } else {
                    self.i = i + 1;
                    self.direction = Direction::Up;
                }
            }
        }
    }

    pub fn get(&self) -> usize {
        self.i
    }
}
