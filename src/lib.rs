//! a library for simulating an lpddr5x memory channel
pub mod cli;
pub mod controller;
pub mod dram;
pub mod memory_system;
pub mod trace;

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{CommandFactory, Parser};
use cli::{Cli, CompArgs, RunArgs};
use dram::config::Config;
use eyre::{bail, Result};
use tracing::metadata::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;

pub use controller::{MemFetch, MemoryAdapter};
pub use dram::Dram;
pub use memory_system::MemorySystem;

/// set by the ctrl-c handler, the run loop stops at the next cycle
pub static CTRL_C: AtomicBool = AtomicBool::new(false);

#[allow(dead_code)]
pub fn init_logger_info() {
    init_logger(LevelFilter::INFO, io::stderr);
}

#[allow(dead_code)]
pub fn init_logger_debug() {
    init_logger(LevelFilter::DEBUG, io::stderr);
}

#[allow(dead_code)]
pub fn init_logger(
    filter: LevelFilter,
    writter: impl for<'writer> MakeWriter<'writer> + 'static + Send + Sync,
) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .with_writer(writter)
        .with_ansi(false)
        .try_init()
        .unwrap_or_else(|e| {
            eprintln!("failed to init logger: {}", e);
        });
}

#[allow(dead_code)]
pub fn init_logger_stderr(filter: LevelFilter) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .try_init()
        .unwrap_or_else(|e| {
            eprintln!("failed to init logger: {}", e);
        });
}

/// the main function of the simulator
pub fn main_inner<A, T>(args: A) -> Result<()>
where
    A: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.subcmd {
        cli::Operation::Run(RunArgs { config }) => {
            let file_appender = tracing_appender::rolling::hourly("output/", "lpddr5x.log");
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
            init_logger(LevelFilter::INFO, non_blocking);
            ctrlc::set_handler(|| {
                writeln!(
                    io::stderr(),
                    "\n------\nCTRL-C received, exiting gracefully"
                )
                .unwrap();
                CTRL_C.store(true, Ordering::SeqCst);
            })?;

            info!("loading config {:?}", config);
            let config = Config::new(config)?;
            run_trace(&config)?;
        }
        cli::Operation::Completion(CompArgs { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "lpddr5x_sim", &mut io::stdout());
        }
    }
    Ok(())
}

/// replay the configured trace through one channel adapter
pub fn run_trace(config: &Config) -> Result<()> {
    let Some(trace_path) = &config.sim.trace else {
        bail!("no trace configured under [sim]");
    };
    let trace = trace::load_trace(trace_path)?;
    let total = trace.requests.len();
    info!("replaying {} requests from {:?}", total, trace_path);

    let mut adapter = MemoryAdapter::new(0, config)?;
    let fetch_bits = dram::org::INTERNAL_PREFETCH_SIZE * adapter_dq(config);
    let mut next = 0;
    let mut completed = 0;
    while completed < total {
        if CTRL_C.load(Ordering::SeqCst) {
            warn!("stopping after ctrl-c, {} of {} requests done", completed, total);
            break;
        }
        if adapter.cycles() >= config.sim.max_cycles {
            warn!(
                "cycle budget {} exhausted, {} of {} requests done",
                config.sim.max_cycles, completed, total
            );
            break;
        }
        while next < total && !adapter.full() {
            let request = trace.requests[next];
            adapter.push(MemFetch::new(request.addr, request.write, fetch_bits / 8));
            next += 1;
        }
        adapter.cycle();
        while let Some(fetch) = adapter.return_queue_pop() {
            debug_assert!(!fetch.request);
            completed += 1;
        }
    }
    adapter.finish();
    info!("done after {} cycles", adapter.cycles());

    if let Some(path) = &config.sim.stats_path {
        serde_json::to_writer(BufWriter::new(File::create(path)?), &adapter.stats())?;
        info!("statistics written to {:?}", path);
    }
    Ok(())
}

fn adapter_dq(config: &Config) -> usize {
    config.memory_system.dram.org.channel_width.unwrap_or(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_trace_completes_a_small_trace() {
        let dir = std::env::temp_dir().join("lpddr5x_sim_test");
        std::fs::create_dir_all(&dir).unwrap();
        let trace_path = dir.join("small.trace");
        std::fs::write(&trace_path, "R 0x0\nW 0x40\nR 0x2000\n").unwrap();
        let config: Config = toml::from_str(&format!(
            r#"
[MemorySystem.DRAM]
impl = "LPDDR5X"
[MemorySystem.DRAM.org]
preset = "LPDDR5X_8Gb_x16"
[MemorySystem.DRAM.timing]
preset = "LPDDR5X_8533"
[sim]
trace = {:?}
max_cycles = 100000
queue_capacity = 64
channel_queue_capacity = 32
log_interval = 1000000
"#,
            trace_path
        ))
        .unwrap();
        run_trace(&config).unwrap();
    }

    #[test]
    fn run_trace_without_a_trace_is_an_error() {
        let config: Config = toml::from_str(
            r#"
[MemorySystem.DRAM]
impl = "LPDDR5X"
[MemorySystem.DRAM.org]
preset = "LPDDR5X_8Gb_x16"
[MemorySystem.DRAM.timing]
preset = "LPDDR5X_8533"
"#,
        )
        .unwrap();
        assert!(run_trace(&config).is_err());
    }
}
