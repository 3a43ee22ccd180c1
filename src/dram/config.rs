//! the configuration tree of the simulator

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

/// the top level configuration file
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    #[serde(rename = "MemorySystem")]
    pub memory_system: MemorySystemConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MemorySystemConfig {
    #[serde(rename = "DRAM")]
    pub dram: DramConfig,
}

/// the device section of the configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DramConfig {
    /// the device model name, only "LPDDR5X" is recognized
    #[serde(rename = "impl")]
    pub impl_name: String,
    #[serde(default)]
    pub org: OrgConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// the organization section, a preset merged with per field overrides
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct OrgConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bankgroup: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_width: Option<usize>,
}

/// the timing section, a preset merged with name keyed overrides
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TimingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<i64>,
    /// cycle overrides under the `n` name, nanosecond overrides under the `t` name
    #[serde(flatten)]
    pub overrides: HashMap<String, TimingOverride>,
}

/// a timing override, either whole cycles or nanoseconds
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
#[serde(untagged)]
pub enum TimingOverride {
    Cycles(i64),
    Nanos(f64),
}

/// the run loop section
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimConfig {
    /// the request trace to replay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<PathBuf>,
    /// stop the run after this many adapter cycles
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
    /// the adapter request queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// the per channel command queue capacity inside the memory system
    #[serde(default = "default_channel_queue_capacity")]
    pub channel_queue_capacity: usize,
    /// emit a bandwidth log line every this many cycles
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,
    /// where to dump the final statistics as json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_path: Option<PathBuf>,
}

fn default_max_cycles() -> u64 {
    10_000_000
}

fn default_queue_capacity() -> usize {
    64
}

fn default_channel_queue_capacity() -> usize {
    32
}

fn default_log_interval() -> u64 {
    10_000
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            trace: None,
            max_cycles: default_max_cycles(),
            queue_capacity: default_queue_capacity(),
            channel_queue_capacity: default_channel_queue_capacity(),
            log_interval: default_log_interval(),
            stats_path: None,
        }
    }
}

impl Config {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read config file {:?}", path))?;
        toml::from_str(&text).wrap_err_with(|| format!("cannot parse config file {:?}", path))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
