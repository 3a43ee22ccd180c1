//! the hierarchical node tree and its readiness bookkeeping
//!
//! nodes are materialized per level down to the bank, stored as one arena
//! vector per level with parent and children expressed by index arithmetic.

use std::collections::VecDeque;

use hashbrown::HashMap;
use tracing::error;

use super::command::{Command, NUM_COMMANDS};
use super::level::{AddrVec, Level, NUM_LEVELS};
use super::org::Organization;
use super::state::{initial_state, NodeState};
use super::timing::TimingParam::*;
use super::timing::TimingVals;
use super::timing_cons::ConstraintTable;
use super::Clk;

/// a single node of the tree
#[derive(Debug, Clone)]
pub struct Node {
    pub state: NodeState,
    /// rows currently pre-opened or opened, bank level only
    pub row_state: HashMap<usize, NodeState>,
    /// the clock up to which the WCK sync of a prior CAS is valid, rank level only
    pub final_synced_cycle: Clk,
    /// earliest clock each command may issue on this node
    next_allowed: [Clk; NUM_COMMANDS],
    /// exclusion interval `[start, end)` per command, empty when start == end
    blocked: [(Clk, Clk); NUM_COMMANDS],
    /// issue history ring buffers for the windowed constraints of this level
    history: Vec<VecDeque<Clk>>,
}

impl Node {
    fn new(level: Level, history_slots: usize) -> Self {
        Self {
            state: initial_state(level),
            row_state: HashMap::new(),
            final_synced_cycle: -1,
            next_allowed: [-1; NUM_COMMANDS],
            blocked: [(0, 0); NUM_COMMANDS],
            history: vec![VecDeque::new(); history_slots],
        }
    }

    fn allows(&self, cmd: Command, clk: Clk) -> bool {
        if clk < self.next_allowed[cmd.to_usize()] {
            return false;
        }
        let (start, end) = self.blocked[cmd.to_usize()];
        !(clk >= start && clk < end)
    }

    fn hold_off(&mut self, cmd: Command, until: Clk) {
        let slot = &mut self.next_allowed[cmd.to_usize()];
        *slot = (*slot).max(until);
    }
}

/// the per channel tree, rooted at the channel nodes themselves
#[derive(Debug)]
pub struct NodeTree {
    count: [usize; NUM_LEVELS],
    /// arena per materialized level, indexed by `Level::to_usize()`
    levels: Vec<Vec<Node>>,
}

/// the deepest materialized level
const LEAF: usize = Level::Bank as usize;

impl NodeTree {
    pub fn new(org: &Organization, table: &ConstraintTable) -> Self {
        let mut levels = Vec::with_capacity(LEAF + 1);
        let mut size = 1;
        for level in &Level::ALL[..=LEAF] {
            size *= org.count[level.to_usize()];
            let slots = table.history_slots(*level);
            levels.push(vec![Node::new(*level, slots); size]);
        }
        Self {
            count: org.count,
            levels,
        }
    }

    /// flat arena index of the node at `level` along the address path
    fn flat_index(&self, addr_vec: &AddrVec, level: usize) -> usize {
        let mut index = 0;
        for l in 0..=level {
            index = index * self.count[l] + addr_vec[l];
        }
        index
    }

    fn walk_depth(cmd: Command) -> usize {
        cmd.scope().to_usize().min(LEAF)
    }

    /// true when every node along the path allows the command now
    pub fn check_ready(&self, cmd: Command, addr_vec: &AddrVec, clk: Clk) -> bool {
        let mut index = 0;
        for level in 0..=Self::walk_depth(cmd) {
            index = index * self.count[level] + addr_vec[level];
            if !self.levels[level][index].allows(cmd, clk) {
                return false;
            }
        }
        true
    }

    /// apply every constraint the issued command triggers along the path
    pub fn update_timing(
        &mut self,
        table: &ConstraintTable,
        cmd: Command,
        addr_vec: &AddrVec,
        clk: Clk,
    ) {
        let mut index = 0;
        for level_idx in 0..=Self::walk_depth(cmd) {
            index = index * self.count[level_idx] + addr_vec[level_idx];
            let level = Level::ALL[level_idx];
            for cons in table.at_level(level) {
                if !cons.preceding.contains(&cmd) {
                    continue;
                }
                if cons.is_sibling {
                    let base = (index / self.count[level_idx]) * self.count[level_idx];
                    for sibling in base..base + self.count[level_idx] {
                        if sibling == index {
                            continue;
                        }
                        for follow in &cons.following {
                            self.levels[level_idx][sibling].hold_off(*follow, clk + cons.latency);
                        }
                    }
                    continue;
                }
                let node = &mut self.levels[level_idx][index];
                if let Some(slot) = cons.history_slot {
                    let ring = &mut node.history[slot];
                    ring.push_back(clk);
                    if ring.len() == cons.window {
                        let oldest = ring.pop_front().unwrap();
                        for follow in &cons.following {
                            node.hold_off(*follow, oldest + cons.latency);
                        }
                    }
                } else if cons.blocked_offset > 0 {
                    for follow in &cons.following {
                        node.blocked[follow.to_usize()] =
                            (clk + cons.blocked_offset, clk + cons.latency);
                    }
                } else {
                    for follow in &cons.following {
                        node.hold_off(*follow, clk + cons.latency);
                    }
                }
            }
        }
    }

    /// run the state transition action of every visited (level, command) pair
    pub fn update_states(
        &mut self,
        timing: &TimingVals,
        cmd: Command,
        addr_vec: &AddrVec,
        clk: Clk,
    ) {
        let mut index = 0;
        for level_idx in 0..=Self::walk_depth(cmd) {
            index = index * self.count[level_idx] + addr_vec[level_idx];
            match (Level::ALL[level_idx], cmd) {
                (Level::Rank, Command::Prea) => self.close_banks_under_rank(index),
                (Level::Rank, Command::Casrd) => {
                    self.levels[level_idx][index].final_synced_cycle =
                        clk + timing[NCl] + timing[NBl32] + 1;
                }
                (Level::Rank, Command::Caswr) => {
                    self.levels[level_idx][index].final_synced_cycle =
                        clk + timing[NCwl] + timing[NBl32] + 1;
                }
                (Level::Rank, Command::Rd32) => {
                    self.levels[level_idx][index].final_synced_cycle =
                        clk + timing[NCl] + timing[NBl32];
                }
                (Level::Rank, Command::Wr32) => {
                    self.levels[level_idx][index].final_synced_cycle =
                        clk + timing[NCwl] + timing[NBl32];
                }
                (Level::Bank, Command::Act1) => {
                    let bank = &mut self.levels[level_idx][index];
                    bank.state = NodeState::PreOpened;
                    bank.row_state
                        .insert(addr_vec[Level::Row.to_usize()], NodeState::PreOpened);
                }
                (Level::Bank, Command::Act2) => {
                    let bank = &mut self.levels[level_idx][index];
                    bank.state = NodeState::Opened;
                    bank.row_state
                        .insert(addr_vec[Level::Row.to_usize()], NodeState::Opened);
                }
                (Level::Bank, Command::Pre | Command::Rd32a | Command::Wr32a) => {
                    let bank = &mut self.levels[level_idx][index];
                    bank.state = NodeState::Closed;
                    bank.row_state.clear();
                }
                _ => {}
            }
        }
    }

    fn close_banks_under_rank(&mut self, rank_index: usize) {
        let banks_per_rank =
            self.count[Level::BankGroup.to_usize()] * self.count[Level::Bank.to_usize()];
        let base = rank_index * banks_per_rank;
        for bank in &mut self.levels[LEAF][base..base + banks_per_rank] {
            bank.state = NodeState::Closed;
            bank.row_state.clear();
        }
    }

    /// resolve the command that actually has to be issued now
    pub fn get_preq_command(&self, cmd: Command, addr_vec: &AddrVec, clk: Clk) -> Command {
        let mut index = 0;
        for level_idx in 0..=Self::walk_depth(cmd) {
            index = index * self.count[level_idx] + addr_vec[level_idx];
            let preq = match (Level::ALL[level_idx], cmd) {
                (Level::Rank, Command::Refab | Command::Rfmab) => {
                    self.preq_all_banks_closed(index, cmd)
                }
                (Level::Rank, Command::Refpb | Command::Rfmpb) => {
                    self.preq_bank_pair_closed(index, addr_vec, cmd)
                }
                (Level::Bank, Command::Rd32 | Command::Wr32) => {
                    self.preq_cas(index, addr_vec, cmd, clk)
                }
                _ => cmd,
            };
            if preq != cmd {
                return preq;
            }
        }
        cmd
    }

    fn preq_all_banks_closed(&self, rank_index: usize, cmd: Command) -> Command {
        let banks_per_rank =
            self.count[Level::BankGroup.to_usize()] * self.count[Level::Bank.to_usize()];
        let base = rank_index * banks_per_rank;
        let all_closed = self.levels[LEAF][base..base + banks_per_rank]
            .iter()
            .all(|bank| bank.state.is_closed());
        if all_closed {
            cmd
        } else {
            Command::Prea
        }
    }

    /// per bank refresh pairs bank `t` with bank `t + 8`
    fn preq_bank_pair_closed(&self, rank_index: usize, addr_vec: &AddrVec, cmd: Command) -> Command {
        match self.open_bank_of_pair(rank_index, addr_vec) {
            Some(_) => Command::Pre,
            None => cmd,
        }
    }

    /// the flat id of whichever bank of the refresh pair still holds a row
    fn open_bank_of_pair(&self, rank_index: usize, addr_vec: &AddrVec) -> Option<usize> {
        let banks_per_bg = self.count[Level::Bank.to_usize()];
        let banks_per_rank = self.count[Level::BankGroup.to_usize()] * banks_per_bg;
        let target = addr_vec[Level::BankGroup.to_usize()] * banks_per_bg
            + addr_vec[Level::Bank.to_usize()];
        let base = rank_index * banks_per_rank;
        [target, target + 8]
            .into_iter()
            .filter(|flat| *flat < banks_per_rank)
            .find(|flat| {
                let state = self.levels[LEAF][base + flat].state;
                state.is_pre_opened() || state.is_opened()
            })
    }

    fn preq_cas(&self, bank_index: usize, addr_vec: &AddrVec, cmd: Command, clk: Clk) -> Command {
        let bank = &self.levels[LEAF][bank_index];
        match bank.state {
            NodeState::Closed => Command::Act1,
            NodeState::PreOpened => Command::Act2,
            NodeState::Opened => {
                if bank
                    .row_state
                    .contains_key(&addr_vec[Level::Row.to_usize()])
                {
                    let rank = self.flat_index(addr_vec, Level::Rank.to_usize());
                    if self.levels[Level::Rank.to_usize()][rank].final_synced_cycle < clk {
                        match cmd {
                            Command::Rd32 => Command::Casrd,
                            _ => Command::Caswr,
                        }
                    } else {
                        cmd
                    }
                } else {
                    Command::Pre
                }
            }
            other => {
                error!(
                    "invalid bank state {} for a {} prerequisite",
                    other.name(),
                    cmd.name()
                );
                panic!("invalid bank state for an RD/WR command");
            }
        }
    }

    /// true when the bank is opened on exactly the target row
    pub fn check_rowbuffer_hit(&self, cmd: Command, addr_vec: &AddrVec, _clk: Clk) -> bool {
        if !matches!(cmd, Command::Rd32 | Command::Wr32) {
            return false;
        }
        let bank = &self.levels[LEAF][self.flat_index(addr_vec, LEAF)];
        match bank.state {
            NodeState::Closed | NodeState::PreOpened => false,
            NodeState::Opened => bank
                .row_state
                .contains_key(&addr_vec[Level::Row.to_usize()]),
            other => {
                error!("invalid bank state {} for a row hit query", other.name());
                panic!("invalid bank state for an RD/WR command");
            }
        }
    }

    /// true when the bank is opened, regardless of which row
    pub fn check_rowbuffer_open(&self, cmd: Command, addr_vec: &AddrVec, _clk: Clk) -> bool {
        if !matches!(cmd, Command::Rd32 | Command::Wr32) {
            return false;
        }
        let bank = &self.levels[LEAF][self.flat_index(addr_vec, LEAF)];
        match bank.state {
            NodeState::Closed | NodeState::PreOpened => false,
            NodeState::Opened => true,
            other => {
                error!("invalid bank state {} for a row open query", other.name());
                panic!("invalid bank state for an RD/WR command");
            }
        }
    }

    /// the address path of the bank a per bank refresh still has to precharge
    pub fn per_bank_refresh_pre_target(&self, addr_vec: &AddrVec) -> Option<AddrVec> {
        let rank = self.flat_index(addr_vec, Level::Rank.to_usize());
        let banks_per_bg = self.count[Level::Bank.to_usize()];
        self.open_bank_of_pair(rank, addr_vec).map(|flat| {
            let mut target = *addr_vec;
            target[Level::BankGroup.to_usize()] = flat / banks_per_bg;
            target[Level::Bank.to_usize()] = flat % banks_per_bg;
            target
        })
    }

    #[cfg(test)]
    pub(crate) fn bank(&self, addr_vec: &AddrVec) -> &Node {
        &self.levels[LEAF][self.flat_index(addr_vec, LEAF)]
    }

    #[cfg(test)]
    pub(crate) fn rank(&self, addr_vec: &AddrVec) -> &Node {
        &self.levels[Level::Rank.to_usize()][self.flat_index(addr_vec, Level::Rank.to_usize())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dram::config::{OrgConfig, TimingConfig};
    use crate::dram::org::load_org;
    use crate::dram::timing::load_timing;

    fn setup(channels: usize, ranks: usize) -> (Organization, TimingVals, ConstraintTable) {
        let org = load_org(&OrgConfig {
            preset: Some("LPDDR5X_8Gb_x16".to_string()),
            channel: Some(channels),
            rank: Some(ranks),
            ..Default::default()
        })
        .unwrap();
        let timing = load_timing(
            &TimingConfig {
                preset: Some("LPDDR5X_8533".to_string()),
                ..Default::default()
            },
            &org,
        )
        .unwrap();
        let table = ConstraintTable::new(&timing);
        (org, timing, table)
    }

    #[test]
    fn arena_sizes_follow_the_organization() {
        let (org, _, table) = setup(2, 2);
        let tree = NodeTree::new(&org, &table);
        assert_eq!(tree.levels[Level::Channel.to_usize()].len(), 2);
        assert_eq!(tree.levels[Level::Rank.to_usize()].len(), 4);
        assert_eq!(tree.levels[Level::BankGroup.to_usize()].len(), 16);
        assert_eq!(tree.levels[Level::Bank.to_usize()].len(), 64);
    }

    #[test]
    fn flat_index_walks_the_path() {
        let (org, _, table) = setup(2, 2);
        let tree = NodeTree::new(&org, &table);
        let addr = [1, 1, 3, 2, 0, 0];
        assert_eq!(tree.flat_index(&addr, Level::Channel.to_usize()), 1);
        assert_eq!(tree.flat_index(&addr, Level::Rank.to_usize()), 3);
        assert_eq!(tree.flat_index(&addr, Level::BankGroup.to_usize()), 15);
        assert_eq!(tree.flat_index(&addr, Level::Bank.to_usize()), 62);
    }

    #[test]
    fn sibling_rank_cas_switching_penalty() {
        let (org, timing, table) = setup(1, 2);
        let mut tree = NodeTree::new(&org, &table);
        let rank0 = [0, 0, 0, 0, 7, 0];
        let rank1 = [0, 1, 0, 0, 7, 0];
        tree.update_timing(&table, Command::Rd32, &rank0, 100);
        // the sibling rank pays nBL32 + nCS before any CAS
        let until = 100 + timing[NBl32] + timing[NCs];
        assert!(!tree.check_ready(Command::Rd32, &rank1, until - 1));
        assert!(!tree.check_ready(Command::Wr32, &rank1, until - 1));
        assert!(tree.check_ready(Command::Wr32, &rank1, until));
        // the issuing rank itself is governed by nCCD, not the sibling rule
        assert!(!tree.check_ready(Command::Rd32, &rank0, 100 + timing[NCcd] - 1));
    }

    #[test]
    fn refresh_pair_pre_target_picks_the_open_bank() {
        let (org, timing, table) = setup(1, 1);
        let mut tree = NodeTree::new(&org, &table);
        // flat bank 10 = bankgroup 2, bank 2; partner of target 2
        let partner = [0, 0, 2, 2, 42, 0];
        tree.update_states(&timing, Command::Act1, &partner, 0);
        tree.update_states(&timing, Command::Act2, &partner, 2);
        let refresh_addr = [0, 0, 0, 2, 0, 0];
        assert_eq!(
            tree.get_preq_command(Command::Refpb, &refresh_addr, 10),
            Command::Pre
        );
        let target = tree.per_bank_refresh_pre_target(&refresh_addr).unwrap();
        assert_eq!(target[Level::BankGroup.to_usize()], 2);
        assert_eq!(target[Level::Bank.to_usize()], 2);
        // precharging the partner clears the prerequisite
        tree.update_states(&timing, Command::Pre, &target, 20);
        assert_eq!(
            tree.get_preq_command(Command::Refpb, &refresh_addr, 21),
            Command::Refpb
        );
        assert!(tree.per_bank_refresh_pre_target(&refresh_addr).is_none());
    }
}
