//! the level hierarchy of the device

use enum_as_inner::EnumAsInner;

/// the number of levels in the hierarchy
pub const NUM_LEVELS: usize = 6;

/// a fully decoded position in the hierarchy, channel first, column last
pub type AddrVec = [usize; NUM_LEVELS];

/// a level in the device hierarchy
#[derive(EnumAsInner, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Channel = 0,
    Rank,
    BankGroup,
    Bank,
    Row,
    Column,
}

impl Level {
    pub const ALL: [Level; NUM_LEVELS] = [
        Level::Channel,
        Level::Rank,
        Level::BankGroup,
        Level::Bank,
        Level::Row,
        Level::Column,
    ];

    pub fn to_usize(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Channel => "channel",
            Level::Rank => "rank",
            Level::BankGroup => "bankgroup",
            Level::Bank => "bank",
            Level::Row => "row",
            Level::Column => "column",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Level::ALL.into_iter().find(|level| level.name() == name)
    }

    /// return the next level down
    pub fn get_child_level(&self) -> Option<Self> {
        match self {
            Level::Channel => Some(Level::Rank),
            Level::Rank => Some(Level::BankGroup),
            Level::BankGroup => Some(Level::Bank),
            Level::Bank => Some(Level::Row),
            Level::Row => Some(Level::Column),
            Level::Column => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trip() {
        for level in Level::ALL {
            assert_eq!(Level::from_name(level.name()), Some(level));
        }
        assert_eq!(Level::from_name("subarray"), None);
    }

    #[test]
    fn child_chain() {
        let mut level = Level::Channel;
        let mut depth = 0;
        while let Some(child) = level.get_child_level() {
            level = child;
            depth += 1;
        }
        assert_eq!(depth, NUM_LEVELS - 1);
        assert!(level.is_column());
    }
}
