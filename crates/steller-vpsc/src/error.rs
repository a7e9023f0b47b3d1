#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("constraint {index} is violated after solving (slack {slack})")]
    UnsatisfiedConstraint { index: usize, slack: f64 },
    #[error("block splitting did not terminate; the constraints are probably cyclic")]
    CycleDetected,
    #[error("rectangle {index} is invalid: [{min_x}, {max_x}] x [{min_y}, {max_y}]")]
    InvalidRectangle {
        index: usize,
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
