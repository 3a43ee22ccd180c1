//! the channel controller adapter
//!
//! holds a bounded queue of external fetches, offers the head to the memory
//! system once per cycle, and collects completed fetches on a return queue
//! together with bandwidth counters.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use eyre::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::dram::command::Request;
use crate::dram::config::Config;
use crate::dram::timing::TimingParam;
use crate::memory_system::{Callback, MemorySystem};

/// an external memory transaction handed to the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemFetch {
    pub addr: u64,
    pub write: bool,
    /// true until the fetch has been replied
    pub request: bool,
    pub size: usize,
    pub origin_data: Option<usize>,
}

impl MemFetch {
    pub fn new(addr: u64, write: bool, size: usize) -> Self {
        Self {
            addr,
            write,
            request: true,
            size,
            origin_data: None,
        }
    }

    pub fn set_reply(&mut self) {
        self.request = false;
    }

    pub fn is_write(&self) -> bool {
        self.write
    }
}

/// the single mutation target of completion callbacks
#[derive(Debug, Default)]
struct ReturnPath {
    return_queue: VecDeque<MemFetch>,
    num_reads: u64,
    num_writes: u64,
    tot_reads: u64,
    tot_writes: u64,
}

/// cumulative counters of one adapter instance
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AdapterStats {
    pub cycles: u64,
    pub tot_reads: u64,
    pub tot_writes: u64,
}

pub struct MemoryAdapter {
    memory_id: usize,
    std_name: String,
    request_queue: VecDeque<MemFetch>,
    queue_capacity: usize,
    path: Rc<RefCell<ReturnPath>>,
    memory: MemorySystem,
    cycle_count: u64,
    log_interval: u64,
    /// burst beats per CAS, the unit of the bandwidth percentage
    nbl: i64,
    finished: bool,
}

impl MemoryAdapter {
    pub fn new(memory_id: usize, config: &Config) -> Result<Self> {
        let dram_config = &config.memory_system.dram;
        let memory = MemorySystem::new(dram_config, config.sim.channel_queue_capacity)?;
        let nbl = memory.dram().timing()[TimingParam::NBl32];
        Ok(Self {
            memory_id,
            std_name: format!("{}-CH_{}", dram_config.impl_name, memory_id),
            request_queue: VecDeque::new(),
            queue_capacity: config.sim.queue_capacity,
            path: Rc::new(RefCell::new(ReturnPath::default())),
            memory,
            cycle_count: 0,
            log_interval: config.sim.log_interval.max(1),
            nbl,
            finished: false,
        })
    }

    pub fn full(&self) -> bool {
        self.request_queue.len() >= self.queue_capacity
    }

    /// append a fetch, callers must check `full` first
    pub fn push(&mut self, fetch: MemFetch) {
        self.request_queue.push_back(fetch);
    }

    pub fn cycles(&self) -> u64 {
        self.cycle_count
    }

    pub fn return_queue_top(&self) -> Option<MemFetch> {
        self.path.borrow().return_queue.front().cloned()
    }

    pub fn return_queue_pop(&mut self) -> Option<MemFetch> {
        self.path.borrow_mut().return_queue.pop_front()
    }

    pub fn stats(&self) -> AdapterStats {
        let path = self.path.borrow();
        AdapterStats {
            cycles: self.cycle_count,
            tot_reads: path.tot_reads,
            tot_writes: path.tot_writes,
        }
    }

    /// one adapter cycle: offer the queue head, advance the memory system,
    /// log at interval boundaries
    pub fn cycle(&mut self) {
        debug_assert!(!self.finished, "cycle after finish");
        if let Some(head) = self.request_queue.front() {
            let (is_write, addr) = (head.is_write(), head.addr);
            let mut fetch = head.clone();
            let path = Rc::clone(&self.path);
            let callback: Callback = Box::new(move |req| {
                let mut path = path.borrow_mut();
                match req.kind {
                    Request::Read16 => {
                        path.num_reads += 1;
                        path.tot_reads += 1;
                    }
                    Request::Write16 => {
                        path.num_writes += 1;
                        path.tot_writes += 1;
                    }
                    _ => {}
                }
                fetch.set_reply();
                path.return_queue.push_back(fetch);
            });
            let accepted = self
                .memory
                .receive_external_requests(is_write, addr, 0, callback);
            if accepted {
                self.request_queue.pop_front();
            }
        }
        self.memory.tick();
        self.cycle_count += 1;
        if self.cycle_count % self.log_interval == 0 {
            let mut path = self.path.borrow_mut();
            let served = path.num_reads + path.num_writes;
            let utilization = served * 100 * self.nbl as u64 / self.log_interval;
            if self.memory_id == 0 {
                info!(
                    "{}: BW utilization {}% ({} reads, {} writes)",
                    self.std_name, utilization, path.num_reads, path.num_writes
                );
            } else {
                debug!(
                    "{}: BW utilization {}% ({} reads, {} writes)",
                    self.std_name, utilization, path.num_reads, path.num_writes
                );
            }
            path.num_reads = 0;
            path.num_writes = 0;
        }
    }

    /// finalize the memory system and emit the cumulative statistics
    pub fn finish(&mut self) {
        self.memory.finalize();
        let mut path = self.path.borrow_mut();
        let served = path.tot_reads + path.tot_writes;
        let cycles = self.cycle_count.max(1);
        let utilization = served * 100 * self.nbl as u64 / cycles;
        if self.memory_id == 0 {
            info!(
                "{}: avg BW utilization {}% ({} reads, {} writes)",
                self.std_name, utilization, path.tot_reads, path.tot_writes
            );
        } else {
            debug!(
                "{}: avg BW utilization {}% ({} reads, {} writes)",
                self.std_name, utilization, path.tot_reads, path.tot_writes
            );
        }
        path.num_reads = 0;
        path.num_writes = 0;
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        toml::from_str(
            r#"
[MemorySystem.DRAM]
impl = "LPDDR5X"
[MemorySystem.DRAM.org]
preset = "LPDDR5X_8Gb_x16"
[MemorySystem.DRAM.timing]
preset = "LPDDR5X_8533"
[sim]
max_cycles = 100000
queue_capacity = 64
channel_queue_capacity = 32
log_interval = 1000000
"#,
        )
        .unwrap()
    }

    #[test]
    fn round_trip_replies_every_fetch() {
        let mut adapter = MemoryAdapter::new(0, &config()).unwrap();
        let fetches = 8;
        for i in 0..fetches as u64 {
            assert!(!adapter.full());
            adapter.push(MemFetch::new(i * 0x1000, i % 2 == 1, 64));
        }
        let mut returned = Vec::new();
        for _ in 0..20_000 {
            adapter.cycle();
            while let Some(fetch) = adapter.return_queue_pop() {
                returned.push(fetch);
            }
            if returned.len() == fetches {
                break;
            }
        }
        assert_eq!(returned.len(), fetches);
        // every fetch went out as a request and came back as a reply
        assert!(returned.iter().all(|fetch| !fetch.request));
        let stats = adapter.stats();
        assert_eq!(stats.tot_reads, 4);
        assert_eq!(stats.tot_writes, 4);
        adapter.finish();
    }

    #[test]
    fn adapter_queue_backpressure() {
        let mut adapter = MemoryAdapter::new(0, &config()).unwrap();
        for i in 0..64u64 {
            assert!(!adapter.full());
            adapter.push(MemFetch::new(i * 0x40, false, 64));
        }
        assert!(adapter.full());
        // one successful forward frees a slot again
        adapter.cycle();
        assert!(!adapter.full());
    }

    #[test]
    fn return_queue_top_peeks_without_popping() {
        let mut adapter = MemoryAdapter::new(0, &config()).unwrap();
        adapter.push(MemFetch::new(0x40, true, 64));
        for _ in 0..1000 {
            adapter.cycle();
            if adapter.return_queue_top().is_some() {
                break;
            }
        }
        let top = adapter.return_queue_top().unwrap();
        let popped = adapter.return_queue_pop().unwrap();
        assert_eq!(top, popped);
        assert!(adapter.return_queue_pop().is_none());
        assert!(!popped.request);
    }
}
