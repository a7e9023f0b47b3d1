/// A value to place, pulled towards `desired_position` with strength `weight`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Caller-chosen label, used to break ties between equally violated constraints.
    pub id: usize,
    pub desired_position: f64,
    pub weight: f64,
    pub(crate) offset: f64,
    pub(crate) block: usize,
    pub(crate) in_cs: Vec<usize>,
    pub(crate) out_cs: Vec<usize>,
}

impl Variable {
    pub fn new(id: usize, desired_position: f64, weight: f64) -> Self {
        Self {
            id,
            desired_position,
            weight,
            offset: 0.0,
            block: 0,
            in_cs: Vec::new(),
            out_cs: Vec::new(),
        }
    }

    /// Offset from the reference position of the block holding this variable.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Indices of the constraints with this variable on the right.
    pub fn in_constraints(&self) -> &[usize] {
        &self.in_cs
    }

    /// Indices of the constraints with this variable on the left.
    pub fn out_constraints(&self) -> &[usize] {
        &self.out_cs
    }
}

/// `x[left] + gap <= x[right]`, or `==` when `equality` is set.
///
/// `left` and `right` index the solver's variable list.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub left: usize,
    pub right: usize,
    pub gap: f64,
    /// Lagrange multiplier from the last multiplier computation over this constraint's block.
    pub lm: f64,
    pub equality: bool,
    pub(crate) time_stamp: u64,
    pub(crate) active: bool,
}

impl Constraint {
    pub fn new(left: usize, right: usize, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            lm: 0.0,
            equality: false,
            time_stamp: 0,
            active: false,
        }
    }

    pub fn equality(left: usize, right: usize, gap: f64) -> Self {
        Self {
            equality: true,
            ..Self::new(left, right, gap)
        }
    }

    /// Whether the constraint currently holds with equality inside a block.
    pub fn is_active(&self) -> bool {
        self.active
    }
}
