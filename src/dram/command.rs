//! the command and request dictionaries

use super::level::Level;

/// the number of device commands
pub const NUM_COMMANDS: usize = 14;

/// a device command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Act1 = 0,
    Act2,
    Pre,
    Prea,
    Casrd,
    Caswr,
    Rd32,
    Wr32,
    Rd32a,
    Wr32a,
    Refab,
    Refpb,
    Rfmab,
    Rfmpb,
}

/// what issuing a command does to the row buffer and the array
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandMeta {
    pub opens_row: bool,
    pub closes_row: bool,
    pub accesses_data: bool,
    pub is_refresh: bool,
}

impl Command {
    pub const ALL: [Command; NUM_COMMANDS] = [
        Command::Act1,
        Command::Act2,
        Command::Pre,
        Command::Prea,
        Command::Casrd,
        Command::Caswr,
        Command::Rd32,
        Command::Wr32,
        Command::Rd32a,
        Command::Wr32a,
        Command::Refab,
        Command::Refpb,
        Command::Rfmab,
        Command::Rfmpb,
    ];

    pub fn to_usize(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Act1 => "ACT-1",
            Command::Act2 => "ACT-2",
            Command::Pre => "PRE",
            Command::Prea => "PREA",
            Command::Casrd => "CASRD",
            Command::Caswr => "CASWR",
            Command::Rd32 => "RD32",
            Command::Wr32 => "WR32",
            Command::Rd32a => "RD32A",
            Command::Wr32a => "WR32A",
            Command::Refab => "REFab",
            Command::Refpb => "REFpb",
            Command::Rfmab => "RFMab",
            Command::Rfmpb => "RFMpb",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Command::ALL.into_iter().find(|cmd| cmd.name() == name)
    }

    /// the level at which issuing this command affects timing
    pub fn scope(self) -> Level {
        match self {
            Command::Act1 | Command::Act2 => Level::Row,
            Command::Pre => Level::Bank,
            Command::Prea
            | Command::Casrd
            | Command::Caswr
            | Command::Refab
            | Command::Refpb
            | Command::Rfmab
            | Command::Rfmpb => Level::Rank,
            Command::Rd32 | Command::Wr32 | Command::Rd32a | Command::Wr32a => Level::Column,
        }
    }

    pub fn meta(self) -> CommandMeta {
        let meta = |opens_row, closes_row, accesses_data, is_refresh| CommandMeta {
            opens_row,
            closes_row,
            accesses_data,
            is_refresh,
        };
        match self {
            Command::Act1 => meta(false, false, false, false),
            Command::Act2 => meta(true, false, false, false),
            Command::Pre | Command::Prea => meta(false, true, false, false),
            Command::Casrd | Command::Caswr => meta(false, false, false, false),
            Command::Rd32 | Command::Wr32 => meta(false, false, true, false),
            Command::Rd32a | Command::Wr32a => meta(false, true, true, false),
            Command::Refab | Command::Refpb | Command::Rfmab | Command::Rfmpb => {
                meta(false, false, false, true)
            }
        }
    }
}

/// an external request kind accepted by the memory system
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    Read16,
    Write16,
    AllBankRefresh,
    PerBankRefresh,
}

impl Request {
    pub fn name(self) -> &'static str {
        match self {
            Request::Read16 => "read16",
            Request::Write16 => "write16",
            Request::AllBankRefresh => "all-bank-refresh",
            Request::PerBankRefresh => "per-bank-refresh",
        }
    }

    /// the device command a request translates to
    pub fn command(self) -> Command {
        match self {
            Request::Read16 => Command::Rd32,
            Request::Write16 => Command::Wr32,
            Request::AllBankRefresh => Command::Refab,
            Request::PerBankRefresh => Command::Refpb,
        }
    }
}
