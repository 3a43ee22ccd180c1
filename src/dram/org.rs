//! the device organization catalog

use eyre::{bail, Result};
use itertools::Itertools;

use super::config::OrgConfig;
use super::level::{Level, NUM_LEVELS};

/// how many 32 bit words a single CAS bursts over the interface
pub const INTERNAL_PREFETCH_SIZE: usize = 32;

/// the physical shape of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// device density in megabits
    pub density_mb: usize,
    /// interface width in bits
    pub dq: usize,
    /// entity count per level, channel first
    pub count: [usize; NUM_LEVELS],
}

/// the named organization presets
pub fn preset(name: &str) -> Option<Organization> {
    let org = |density_mb, row| Organization {
        density_mb,
        dq: 16,
        count: [1, 1, 4, 4, row, 1 << 10],
    };
    match name {
        "LPDDR5X_2Gb_x16" => Some(org(2 << 10, 1 << 13)),
        "LPDDR5X_4Gb_x16" => Some(org(4 << 10, 1 << 14)),
        "LPDDR5X_8Gb_x16" => Some(org(8 << 10, 1 << 15)),
        "LPDDR5X_16Gb_x16" => Some(org(16 << 10, 1 << 16)),
        "LPDDR5X_32Gb_x16" => Some(org(32 << 10, 1 << 17)),
        _ => None,
    }
}

/// merge a preset with the configured overrides and validate the result
pub fn load_org(config: &OrgConfig) -> Result<Organization> {
    let mut density_mb = 0;
    let mut dq = 0;
    let mut count = [0usize; NUM_LEVELS];

    if let Some(name) = &config.preset {
        match preset(name) {
            Some(org) => {
                density_mb = org.density_mb;
                dq = org.dq;
                count = org.count;
            }
            None => bail!("unrecognized organization preset {:?}", name),
        }
    }

    if let Some(value) = config.dq {
        dq = value;
    }
    if let Some(value) = config.density {
        density_mb = value;
    }
    let overrides = [
        (Level::Channel, config.channel),
        (Level::Rank, config.rank),
        (Level::BankGroup, config.bankgroup),
        (Level::Bank, config.bank),
        (Level::Row, config.row),
        (Level::Column, config.column),
    ];
    for (level, value) in overrides {
        if let Some(value) = value {
            count[level.to_usize()] = value;
        }
    }

    let missing = Level::ALL
        .iter()
        .filter(|level| count[level.to_usize()] == 0)
        .map(|level| level.name())
        .join(", ");
    if !missing.is_empty() {
        bail!("organization level count not specified for: {}", missing);
    }
    if density_mb == 0 {
        bail!("organization density is not specified");
    }
    if dq == 0 {
        bail!("organization dq is not specified");
    }

    // density sanity check, one die spans bankgroup..column times the interface width
    let computed = (count[Level::BankGroup.to_usize()]
        * count[Level::Bank.to_usize()]
        * count[Level::Row.to_usize()]
        * count[Level::Column.to_usize()]
        * dq)
        >> 20;
    if computed != density_mb {
        bail!(
            "calculated chip density {} Mb does not equal the provided density {} Mb",
            computed,
            density_mb
        );
    }

    Ok(Organization {
        density_mb,
        dq,
        count,
    })
}

impl Organization {
    /// number of banks under one rank, flat across bankgroups
    pub fn banks_per_rank(&self) -> usize {
        self.count[Level::BankGroup.to_usize()] * self.count[Level::Bank.to_usize()]
    }
}
