//! the LPDDR5X device model
//!
//! a data driven command and timing engine: dictionaries describe the
//! hierarchy, the commands and their scopes, a constraint table describes the
//! inter command latencies, and a node tree tracks per bank row buffer state
//! together with the earliest clock every command may issue.

use eyre::{bail, Result};

use self::command::Command;
use self::level::AddrVec;
use self::node::NodeTree;
use self::org::Organization;
use self::timing::TimingVals;
use self::timing_cons::ConstraintTable;

pub mod command;
pub mod config;
pub mod level;
pub mod node;
pub mod org;
pub mod state;
pub mod timing;
pub mod timing_cons;

/// a device clock value
pub type Clk = i64;

/// one configured device instance
#[derive(Debug)]
pub struct Dram {
    org: Organization,
    timing: TimingVals,
    table: ConstraintTable,
    tree: NodeTree,
    channel_width: usize,
    clk: Clk,
}

impl Dram {
    pub fn new(config: &config::DramConfig) -> Result<Self> {
        if config.impl_name != "LPDDR5X" {
            bail!("unrecognized device model {:?}", config.impl_name);
        }
        let org = org::load_org(&config.org)?;
        let timing = timing::load_timing(&config.timing, &org)?;
        let table = ConstraintTable::new(&timing);
        let tree = NodeTree::new(&org, &table);
        let channel_width = config.org.channel_width.unwrap_or(16);
        Ok(Self {
            org,
            timing,
            table,
            tree,
            channel_width,
            clk: 0,
        })
    }

    pub fn tick(&mut self) {
        self.clk += 1;
    }

    pub fn clk(&self) -> Clk {
        self.clk
    }

    pub fn org(&self) -> &Organization {
        &self.org
    }

    pub fn timing(&self) -> &TimingVals {
        &self.timing
    }

    pub fn channel_width(&self) -> usize {
        self.channel_width
    }

    pub fn read_latency(&self) -> Clk {
        self.timing.read_latency()
    }

    /// apply the timing effects and the state transition of an issued command
    pub fn issue_command(&mut self, cmd: Command, addr_vec: &AddrVec) {
        self.tree.update_timing(&self.table, cmd, addr_vec, self.clk);
        self.tree.update_states(&self.timing, cmd, addr_vec, self.clk);
    }

    /// the command that actually has to be issued next to make progress
    pub fn get_preq_command(&self, cmd: Command, addr_vec: &AddrVec) -> Command {
        self.tree.get_preq_command(cmd, addr_vec, self.clk)
    }

    /// true when no timing constraint holds the command off right now
    pub fn check_ready(&self, cmd: Command, addr_vec: &AddrVec) -> bool {
        self.tree.check_ready(cmd, addr_vec, self.clk)
    }

    pub fn check_rowbuffer_hit(&self, cmd: Command, addr_vec: &AddrVec) -> bool {
        self.tree.check_rowbuffer_hit(cmd, addr_vec, self.clk)
    }

    pub fn check_rowbuffer_open(&self, cmd: Command, addr_vec: &AddrVec) -> bool {
        self.tree.check_rowbuffer_open(cmd, addr_vec, self.clk)
    }

    /// where a per bank refresh resolved to PRE has to be issued
    pub fn per_bank_refresh_pre_target(&self, addr_vec: &AddrVec) -> Option<AddrVec> {
        self.tree.per_bank_refresh_pre_target(addr_vec)
    }

    #[cfg(test)]
    pub(crate) fn tree(&self) -> &NodeTree {
        &self.tree
    }
}
