//! the per node state machine values

use enum_as_inner::EnumAsInner;

use super::level::Level;

/// the state of a node (or of a row inside a bank)
#[derive(EnumAsInner, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// the first half of the two step activation has been issued
    PreOpened,
    Opened,
    Closed,
    PowerUp,
    NA,
}

impl NodeState {
    pub fn name(self) -> &'static str {
        match self {
            NodeState::PreOpened => "Pre-Opened",
            NodeState::Opened => "Opened",
            NodeState::Closed => "Closed",
            NodeState::PowerUp => "PowerUp",
            NodeState::NA => "N/A",
        }
    }
}

/// the state a node starts in after power up
pub fn initial_state(level: Level) -> NodeState {
    match level {
        Level::Channel => NodeState::NA,
        Level::Rank => NodeState::PowerUp,
        Level::BankGroup => NodeState::NA,
        Level::Bank => NodeState::Closed,
        Level::Row => NodeState::Closed,
        Level::Column => NodeState::NA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_states() {
        assert!(initial_state(Level::Rank).is_power_up());
        assert!(initial_state(Level::Bank).is_closed());
        assert!(initial_state(Level::Channel).is_na());
    }
}
