//! Discrete per-bar trade intention.

/// -1 short bias, 0 hold, +1 long bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Signal {
    Short,
    #[default]
    Hold,
    Long,
}

impl Signal {
    pub fn value(self) -> i8 {
        match self {
            Signal::Short => -1,
            Signal::Hold => 0,
            Signal::Long => 1,
        }
    }

    /// Strict conversion; anything outside {-1, 0, 1} is rejected.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Signal::Short),
            0 => Some(Signal::Hold),
            1 => Some(Signal::Long),
            _ => None,
        }
    }

    /// Sign of a net vote. Zero (including balanced votes) is hold.
    pub fn from_vote(sum: i64) -> Self {
        match sum.signum() {
            1 => Signal::Long,
            -1 => Signal::Short,
            _ => Signal::Hold,
        }
    }

    pub fn is_hold(self) -> bool {
        self == Signal::Hold
    }
}
