use anyhow::{bail, ensure, Context};
use log::{info, warn};
use serde::Serialize;
use toml::Table;

use crate::base::port::{PortId, RequestPeer, ResponsePeer};
use crate::mem::simple_cache::{CacheLinks, CacheStats, SimpleCache};
use crate::mem::simple_memory::{MemoryStats, SimpleMemory};
use crate::sim::config::{CacheConfig, Config, MemConfig, SimConfig};
use crate::sim::event::{CacheEvent, Event, MemoryEvent, RequesterEvent};
use crate::timeq::{EventQueue, Scheduler, Tick};
use crate::traffic::config::{TrafficConfig, TrafficPatternSpec};
use crate::traffic::patterns::{compile_pattern, AddressStream};
use crate::traffic::requester::{Requester, RequesterStats};

/// Cache neighbours borrowed out of the top for one call.
struct Links<'a> {
    requesters: &'a mut [Requester],
    memory: &'a mut SimpleMemory,
}

fn links<'a>(requesters: &'a mut [Requester], memory: &'a mut SimpleMemory) -> Links<'a> {
    Links { requesters, memory }
}

impl CacheLinks for Links<'_> {
    fn upstream(&mut self, port: PortId) -> &mut dyn RequestPeer {
        &mut self.requesters[port]
    }

    fn downstream(&mut self) -> &mut dyn ResponsePeer {
        &mut *self.memory
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ticks: Tick,
    pub finished: bool,
    pub hit_ratio: f64,
    pub cache: CacheStats,
    pub memory: MemoryStats,
    pub requesters: Vec<RequesterStats>,
}

/// Requesters -> cache -> memory, plus the event queue that drives them.  The top binds the
/// ports: it routes every event to its owner and lends the cache its neighbours.
pub struct Sim {
    config: SimConfig,
    queue: EventQueue,
    cache: SimpleCache,
    requesters: Vec<Requester>,
    memory: SimpleMemory,
    initialized: bool,
}

impl Sim {
    pub fn new(
        config: SimConfig,
        cache_config: CacheConfig,
        mem_config: Option<MemConfig>,
        traffic: TrafficConfig,
    ) -> anyhow::Result<Self> {
        let cache = SimpleCache::new("cache", &cache_config)?;
        let Some(mem_config) = mem_config else {
            bail!("{}: mem-side port is not connected (no [mem] section)", cache.name());
        };
        let memory = SimpleMemory::new("mem", &mem_config)?;
        let block_size = cache_config.block_size as u64;
        ensure!(
            mem_config.base % block_size == 0 && mem_config.size % block_size == 0,
            "{}: range [{:#x}, {:#x}) is not made of whole {}-byte blocks",
            memory.name(),
            mem_config.base,
            mem_config.base + mem_config.size,
            block_size
        );

        let num_requesters = traffic.num_requesters.unwrap_or(cache.num_cpu_ports());
        ensure!(
            num_requesters == cache.num_cpu_ports(),
            "{}: {} cpu-side port(s) but {} requester(s); every port must be connected",
            cache.name(),
            cache.num_cpu_ports(),
            num_requesters
        );

        let default_patterns = vec![TrafficPatternSpec {
            base: mem_config.base,
            span_bytes: TrafficPatternSpec::default().span_bytes.min(mem_config.size),
            ..TrafficPatternSpec::default()
        }];
        let specs = if traffic.patterns.is_empty() {
            &default_patterns
        } else {
            &traffic.patterns
        };

        let mut requesters = Vec::with_capacity(num_requesters);
        for id in 0..num_requesters {
            let spec_idx = id % specs.len();
            let pattern = compile_pattern(&specs[spec_idx], spec_idx, &traffic)?;
            ensure!(
                pattern.req_bytes as usize <= cache_config.block_size,
                "traffic pattern '{}' requests {} bytes, more than one {}-byte block",
                pattern.name,
                pattern.req_bytes,
                cache_config.block_size
            );
            let footprint = pattern.footprint();
            ensure!(
                memory.range().covers(footprint.start(), footprint.size()),
                "traffic pattern '{}' footprint [{:#x}, {:#x}) is outside memory",
                pattern.name,
                footprint.start(),
                footprint.end()
            );
            let stream = AddressStream::new(pattern, traffic.write_ratio, traffic.seed ^ id as u64);
            requesters.push(Requester::new(id, stream, &traffic));
        }

        Ok(Self {
            config,
            queue: EventQueue::new(),
            cache,
            requesters,
            memory,
            initialized: false,
        })
    }

    pub fn from_table(table: &Table) -> anyhow::Result<Self> {
        let sim_config = SimConfig::from_section(table.get("sim"))?;
        let cache_config = CacheConfig::from_section(table.get("cache"))?;
        let mem_config = match table.get("mem") {
            Some(section) => Some(MemConfig::from_section(Some(section))?),
            None => None,
        };
        let traffic = TrafficConfig::from_section(table.get("traffic"))?;
        Self::new(sim_config, cache_config, mem_config, traffic)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let table: Table = toml::from_str(text).context("cannot parse config toml")?;
        Self::from_table(&table)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn cache(&self) -> &SimpleCache {
        &self.cache
    }

    pub fn memory(&self) -> &SimpleMemory {
        &self.memory
    }

    pub fn requesters(&self) -> &[Requester] {
        &self.requesters
    }

    pub fn now(&self) -> Tick {
        self.queue.now()
    }

    /// Publish address ranges and start every requester at tick 0.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        let Sim {
            queue,
            cache,
            requesters,
            memory,
            ..
        } = self;
        cache.init(&mut links(requesters, memory));
        for id in 0..requesters.len() {
            queue.schedule_at(0, Event::Requester(id, RequesterEvent::Issue));
        }
    }

    /// Run one event.  Returns false once the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some((_, event)) = self.queue.pop() else {
            return false;
        };
        self.dispatch(event);
        true
    }

    fn dispatch(&mut self, event: Event) {
        let Sim {
            queue,
            cache,
            requesters,
            memory,
            ..
        } = self;
        match event {
            Event::Cache(CacheEvent::AccessTiming) => {
                cache.access_timing(&mut links(requesters, memory), queue);
            }
            Event::Memory(MemoryEvent::Respond) => {
                memory.service(queue.now());
                while let Some(pkt) = memory.take_response() {
                    let accepted = cache.recv_timing_resp(pkt, &mut links(requesters, memory), queue);
                    if let Err(pkt) = accepted {
                        memory.response_refused(pkt);
                        break;
                    }
                }
                if memory.take_retry() {
                    cache.recv_req_retry(&mut links(requesters, memory), queue);
                }
            }
            Event::Requester(id, RequesterEvent::Issue) => {
                let now = queue.now();
                if let Some(pkt) = requesters[id].next_request(now) {
                    match cache.recv_timing_req(id, pkt, queue) {
                        Ok(()) => requesters[id].request_accepted(),
                        Err(pkt) => requesters[id].request_refused(pkt),
                    }
                }
            }
            Event::Requester(id, RequesterEvent::RespRetry) => {
                cache.recv_resp_retry(id, &mut links(requesters, memory), queue);
            }
        }
    }

    pub fn finished(&self) -> bool {
        self.requesters.iter().all(Requester::is_done)
    }

    pub fn simulate(&mut self) -> RunSummary {
        self.init();
        while let Some(tick) = self.queue.peek_tick() {
            if tick > self.config.max_ticks {
                warn!("stopping at tick limit {} with {} event(s) pending", self.config.max_ticks, self.queue.len());
                break;
            }
            self.step();
        }
        let summary = self.summary();
        info!(
            "{} ticks, {} hits, {} misses, hit ratio {:.3}",
            summary.ticks,
            summary.cache.hits(),
            summary.cache.misses(),
            summary.hit_ratio
        );
        summary
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.queue.now(),
            finished: self.finished(),
            hit_ratio: self.cache.stats().hit_ratio(),
            cache: self.cache.stats().clone(),
            memory: *self.memory.stats(),
            requesters: self.requesters.iter().map(|r| *r.stats()).collect(),
        }
    }
}
