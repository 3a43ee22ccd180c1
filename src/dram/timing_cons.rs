//! the inter command timing constraint table

use super::command::Command;
use super::level::{Level, NUM_LEVELS};
use super::timing::{TimingParam::*, TimingVals};

/// one timing constraint record
///
/// when a `preceding` command is issued at clock `c` on a node at `level`:
/// - plain: every `following` command on that node is held off until `c + latency`
/// - `window > 1`: rolling constraint, the earliest next time is computed from
///   the issue clock `window - 1` issuances back
/// - `blocked_offset > 0`: the followings are excluded from
///   `[c + blocked_offset, c + latency)` but may still issue before the offset
/// - `is_sibling`: the effect lands on the node's siblings instead of the node
#[derive(Debug, Clone)]
pub struct TimingCons {
    pub level: Level,
    pub preceding: Vec<Command>,
    pub following: Vec<Command>,
    pub latency: i64,
    pub window: usize,
    pub blocked_offset: i64,
    pub is_sibling: bool,
}

impl Default for TimingCons {
    fn default() -> Self {
        Self {
            level: Level::Channel,
            preceding: Vec::new(),
            following: Vec::new(),
            latency: 0,
            window: 1,
            blocked_offset: 0,
            is_sibling: false,
        }
    }
}

/// the constraint table compiled for the node tree
///
/// windowed records get a slot index into the per node issue history buffers
/// of their level.
#[derive(Debug)]
pub struct ConstraintTable {
    by_level: [Vec<CompiledCons>; NUM_LEVELS],
    history_slots: [usize; NUM_LEVELS],
}

#[derive(Debug, Clone)]
pub struct CompiledCons {
    pub preceding: Vec<Command>,
    pub following: Vec<Command>,
    pub latency: i64,
    pub window: usize,
    pub blocked_offset: i64,
    pub is_sibling: bool,
    pub history_slot: Option<usize>,
}

impl ConstraintTable {
    pub fn new(timing: &TimingVals) -> Self {
        Self::compile(populate(timing))
    }

    fn compile(records: Vec<TimingCons>) -> Self {
        let mut by_level: [Vec<CompiledCons>; NUM_LEVELS] = Default::default();
        let mut history_slots = [0usize; NUM_LEVELS];
        for record in records {
            let level = record.level.to_usize();
            let history_slot = (record.window > 1).then(|| {
                let slot = history_slots[level];
                history_slots[level] += 1;
                slot
            });
            by_level[level].push(CompiledCons {
                preceding: record.preceding,
                following: record.following,
                latency: record.latency,
                window: record.window,
                blocked_offset: record.blocked_offset,
                is_sibling: record.is_sibling,
                history_slot,
            });
        }
        Self {
            by_level,
            history_slots,
        }
    }

    /// the records anchored at a level
    pub fn at_level(&self, level: Level) -> &[CompiledCons] {
        &self.by_level[level.to_usize()]
    }

    /// how many issue history ring buffers a node at this level needs
    pub fn history_slots(&self, level: Level) -> usize {
        self.history_slots[level.to_usize()]
    }
}

/// the complete LPDDR5X constraint enumeration
pub fn populate(timing: &TimingVals) -> Vec<TimingCons> {
    use Command::*;
    let v = |param| timing[param];
    let cons = |level, preceding: &[Command], following: &[Command], latency| TimingCons {
        level,
        preceding: preceding.to_vec(),
        following: following.to_vec(),
        latency,
        ..Default::default()
    };

    vec![
        // channel: data bus occupancy
        cons(Level::Channel, &[Rd32, Rd32a], &[Rd32, Rd32a], v(NBl32)),
        cons(Level::Channel, &[Wr32, Wr32a], &[Wr32, Wr32a], v(NBl32)),
        // channel: interleaving burst exclusion
        TimingCons {
            blocked_offset: v(NBl32) * 2,
            ..cons(Level::Channel, &[Rd32, Rd32a], &[Rd32, Rd32a], v(NBl32) * 3)
        },
        TimingCons {
            blocked_offset: v(NBl32) * 2,
            ..cons(Level::Channel, &[Wr32, Wr32a], &[Wr32, Wr32a], v(NBl32) * 3)
        },
        TimingCons {
            window: 2,
            ..cons(Level::Channel, &[Rd32, Rd32a], &[Rd32, Rd32a], v(NBl32) * 4)
        },
        TimingCons {
            window: 2,
            ..cons(Level::Channel, &[Wr32, Wr32a], &[Wr32, Wr32a], v(NBl32) * 4)
        },
        // rank: CAS to CAS
        cons(Level::Rank, &[Rd32, Rd32a], &[Rd32, Rd32a], v(NCcd)),
        cons(Level::Rank, &[Wr32, Wr32a], &[Wr32, Wr32a], v(NCcd)),
        // rank: minimum read to write, assuming one clock of write preamble
        cons(
            Level::Rank,
            &[Rd32, Rd32a],
            &[Wr32, Wr32a],
            v(NCl) + v(NBl32) + 2 - v(NCwl),
        ),
        // rank: minimum read after write
        cons(
            Level::Rank,
            &[Wr32, Wr32a],
            &[Rd32, Rd32a],
            v(NCwl) + v(NBl32) + v(NWtrs),
        ),
        // rank: CAS to CAS between sibling ranks, rank switching needs a new DQS
        TimingCons {
            is_sibling: true,
            ..cons(
                Level::Rank,
                &[Rd32, Rd32a],
                &[Rd32, Rd32a, Wr32, Wr32a],
                v(NBl32) + v(NCs),
            )
        },
        TimingCons {
            is_sibling: true,
            ..cons(
                Level::Rank,
                &[Wr32, Wr32a],
                &[Rd32, Rd32a],
                v(NCl) + v(NBl32) + v(NCs) - v(NCwl),
            )
        },
        // rank: CAS to all bank precharge
        cons(Level::Rank, &[Rd32], &[Prea], v(NRtp)),
        cons(
            Level::Rank,
            &[Wr32],
            &[Prea],
            v(NCwl) + v(NBl32) + v(NWr),
        ),
        // rank: RAS to RAS
        cons(Level::Rank, &[Act1], &[Act1, Refpb], v(NRrd)),
        TimingCons {
            window: 4,
            ..cons(Level::Rank, &[Act1], &[Act1], v(NFaw))
        },
        cons(Level::Rank, &[Act1], &[Prea], v(NRas)),
        cons(Level::Rank, &[Prea], &[Act1], v(NRpab)),
        // rank: RAS to refresh
        cons(Level::Rank, &[Act1], &[Refab], v(NRc)),
        cons(Level::Rank, &[Pre], &[Refab], v(NRppb)),
        cons(Level::Rank, &[Prea], &[Refab], v(NRpab)),
        cons(Level::Rank, &[Rd32a], &[Refab], v(NRppb) + v(NRtp)),
        cons(
            Level::Rank,
            &[Wr32a],
            &[Refab],
            v(NCwl) + v(NBl32) + v(NWr) + v(NRppb),
        ),
        cons(Level::Rank, &[Refab], &[Refab, Act1, Refpb], v(NRfcab)),
        cons(Level::Rank, &[Refpb], &[Act1], v(NPbr2act)),
        cons(Level::Rank, &[Refpb], &[Refpb], v(NPbr2pbr)),
        // same bankgroup: CAS to CAS
        cons(Level::BankGroup, &[Rd32, Rd32a], &[Rd32, Rd32a], 4 * v(NCcd)),
        cons(Level::BankGroup, &[Wr32, Wr32a], &[Wr32, Wr32a], 4 * v(NCcd)),
        cons(
            Level::BankGroup,
            &[Wr32, Wr32a],
            &[Rd32, Rd32a],
            v(NCwl) + v(NBl32) + v(NWtrl),
        ),
        // same bankgroup: RAS to RAS
        cons(Level::BankGroup, &[Act1], &[Act1], v(NRrd)),
        // bank
        cons(Level::Bank, &[Act1], &[Act1], v(NRc)),
        cons(Level::Bank, &[Act1], &[Rd32, Rd32a], v(NRcdr)),
        cons(Level::Bank, &[Act1], &[Wr32, Wr32a], v(NRcdw)),
        cons(Level::Bank, &[Act1], &[Pre], v(NRas)),
        cons(Level::Bank, &[Pre], &[Act1], v(NRppb)),
        cons(Level::Bank, &[Rd32], &[Pre], v(NRtp)),
        cons(Level::Bank, &[Wr32], &[Pre], v(NCwl) + v(NBl32) + v(NWr)),
        cons(Level::Bank, &[Rd32a], &[Act1], v(NRtp) + v(NRppb)),
        cons(
            Level::Bank,
            &[Wr32a],
            &[Act1],
            v(NCwl) + v(NBl32) + v(NWr) + v(NRppb),
        ),
    ]
}
