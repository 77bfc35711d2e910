//! Single-block-outstanding cache with a flat block table.
//!
//! Every accepted request is looked up `latency` ticks after it arrives.  Hits are answered on
//! the port they came in on; misses fetch the whole block from below, install it, and then answer.
//! From acceptance until the response goes out, the cache turns every other request away and
//! owes the rejected ports a retry.
mod cpu_port;
mod mem_port;
pub mod stats;
pub mod store;

use std::mem;

use log::debug;

use crate::base::addr_range::AddrRangeList;
use crate::base::packet::Packet;
use crate::base::port::{PortId, RequestPeer, ResponsePeer};
use crate::sim::config::CacheConfig;
use crate::sim::event::{CacheEvent, Event};
use crate::timeq::{Scheduler, Tick};

use cpu_port::CpuSidePort;
use mem_port::MemSidePort;
pub use stats::{CacheStats, LatencyHistogram};
pub use store::BlockStore;

/// The neighbours a cache talks to, lent by whoever owns them for the duration of one call.
pub trait CacheLinks {
    fn upstream(&mut self, port: PortId) -> &mut dyn RequestPeer;
    fn downstream(&mut self) -> &mut dyn ResponsePeer;
}

#[derive(Debug, Default)]
enum CoreState {
    #[default]
    Idle,
    /// Request accepted; its lookup is scheduled.
    Accessing { port: PortId, pkt: Packet },
    /// Block fetch is downstream.  `original` is the request when a wider block read was sent in
    /// its place.
    Blocked {
        port: PortId,
        original: Option<Packet>,
        miss_time: Tick,
    },
}

#[derive(Debug)]
pub struct SimpleCache {
    name: String,
    latency: Tick,
    block_size: usize,
    cpu_ports: Vec<CpuSidePort>,
    mem_port: MemSidePort,
    state: CoreState,
    store: BlockStore,
    stats: CacheStats,
    ranges: AddrRangeList,
}

impl SimpleCache {
    pub fn new(name: impl Into<String>, config: &CacheConfig) -> anyhow::Result<Self> {
        let name = name.into();
        config.validate()?;
        Ok(Self {
            name,
            latency: config.latency,
            block_size: config.block_size,
            cpu_ports: (0..config.num_cpu_ports).map(CpuSidePort::new).collect(),
            mem_port: MemSidePort::default(),
            state: CoreState::Idle,
            store: BlockStore::new(config.block_size, config.num_blocks(), config.seed),
            stats: CacheStats::default(),
            ranges: AddrRangeList::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn num_cpu_ports(&self) -> usize {
        self.cpu_ports.len()
    }

    /// A transaction is in flight.
    pub fn is_blocked(&self) -> bool {
        !matches!(self.state, CoreState::Idle)
    }

    /// Waiting on the downstream fill, as opposed to the lookup latency.
    pub fn is_waiting_fill(&self) -> bool {
        matches!(self.state, CoreState::Blocked { .. })
    }

    pub fn mem_port_blocked(&self) -> bool {
        self.mem_port.is_blocked()
    }

    pub fn cpu_port_blocked(&self, port: PortId) -> bool {
        self.cpu_ports[port].is_blocked()
    }

    pub fn cpu_port_needs_retry(&self, port: PortId) -> bool {
        self.cpu_ports[port].needs_retry()
    }

    /// Ranges served on every cpu-side port; a copy of what the downstream reports.
    pub fn addr_ranges(&self) -> &AddrRangeList {
        &self.ranges
    }

    fn can_accept(&self) -> bool {
        matches!(self.state, CoreState::Idle) && !self.mem_port.is_blocked()
    }

    /// Learn the downstream ranges and publish them upward.
    pub fn init(&mut self, links: &mut dyn CacheLinks) {
        self.recv_range_change(links);
    }

    // ---- cpu side ----

    pub fn recv_timing_req(
        &mut self,
        port: PortId,
        pkt: Packet,
        sched: &mut dyn Scheduler,
    ) -> Result<(), Packet> {
        if !self.cpu_ports[port].admit() {
            self.stats.record_reject();
            return Err(pkt);
        }
        if !self.can_accept() {
            debug!("{}: busy, refusing {:?} @ {:#x} on port {}", self.name, pkt.cmd(), pkt.addr(), port);
            self.cpu_ports[port].reject();
            self.stats.record_reject();
            return Err(pkt);
        }
        self.handle_request(port, pkt, sched);
        Ok(())
    }

    fn handle_request(&mut self, port: PortId, pkt: Packet, sched: &mut dyn Scheduler) {
        assert!(
            pkt.needs_response(),
            "{}: cpu port {} got {:?}, only reads and writes are accepted",
            self.name,
            port,
            pkt.cmd()
        );
        let last_byte = pkt.addr() + pkt.size() as u64 - 1;
        assert!(
            pkt.block_addr(self.block_size) == last_byte & !(self.block_size as u64 - 1),
            "{}: request @ {:#x} size {} straddles a block",
            self.name,
            pkt.addr(),
            pkt.size()
        );
        debug!("{}: accepted {:?} @ {:#x} on port {}", self.name, pkt.cmd(), pkt.addr(), port);
        self.state = CoreState::Accessing { port, pkt };
        sched.schedule_in(self.latency, Event::Cache(CacheEvent::AccessTiming));
    }

    /// A requestor is ready to take the response it refused.
    pub fn recv_resp_retry(&mut self, port: PortId, links: &mut dyn CacheLinks, sched: &mut dyn Scheduler) {
        self.cpu_ports[port].recv_resp_retry(links.upstream(port), sched);
        if self.can_accept() {
            self.cpu_ports[port].try_send_retry(links.upstream(port), sched);
        }
    }

    pub fn recv_functional(&mut self, port: PortId, pkt: &mut Packet, links: &mut dyn CacheLinks) {
        debug!("{}: functional {:?} @ {:#x} on port {}", self.name, pkt.cmd(), pkt.addr(), port);
        if self.access_functional(pkt) {
            if pkt.needs_response() {
                pkt.make_response();
            }
            return;
        }

        let cacheable = links.downstream().recv_functional(pkt);
        if cacheable && pkt.is_read() && pkt.is_whole_block(self.block_size) {
            let block_addr = pkt.block_addr(self.block_size);
            if let Some(evicted) = self.store.insert(block_addr, pkt.data(), false) {
                if evicted.block.dirty {
                    let mut wb = Packet::writeback(evicted.addr, evicted.block.data.into_vec());
                    links.downstream().recv_functional(&mut wb);
                }
            }
        }
    }

    pub fn recv_atomic(&mut self, port: PortId, _pkt: Packet) -> Tick {
        panic!("{}: atomic access on cpu port {} is not supported", self.name, port);
    }

    // ---- mem side ----

    pub fn recv_timing_resp(
        &mut self,
        pkt: Packet,
        links: &mut dyn CacheLinks,
        sched: &mut dyn Scheduler,
    ) -> Result<(), Packet> {
        let CoreState::Blocked {
            port,
            original,
            miss_time,
        } = mem::take(&mut self.state)
        else {
            panic!(
                "{}: response {:?} @ {:#x} with no miss outstanding",
                self.name,
                pkt.cmd(),
                pkt.addr()
            );
        };
        assert!(pkt.is_response(), "{}: {:?} arrived as a response", self.name, pkt.cmd());

        let latency = sched.now() - miss_time;
        self.stats.record_miss_latency(latency);
        debug!("{}: fill @ {:#x} after {} ticks", self.name, pkt.addr(), latency);

        self.insert(&pkt, links, sched);

        let response = match original {
            Some(mut original) => {
                let hit = self.access_functional(&mut original);
                assert!(hit, "{}: block @ {:#x} missing right after fill", self.name, pkt.addr());
                original.make_response();
                original
            }
            None => pkt,
        };
        self.send_response(port, response, links, sched);
        Ok(())
    }

    /// The downstream can take the request it refused.
    pub fn recv_req_retry(&mut self, links: &mut dyn CacheLinks, sched: &mut dyn Scheduler) {
        self.mem_port.recv_req_retry(links.downstream(), sched);
        if !self.mem_port.is_blocked() {
            self.try_send_retries(links, sched);
        }
    }

    pub fn recv_range_change(&mut self, links: &mut dyn CacheLinks) {
        self.ranges = links.downstream().addr_ranges();
        debug!("{}: publishing {} range(s) upward", self.name, self.ranges.len());
        for port in 0..self.cpu_ports.len() {
            links.upstream(port).recv_range_change(&self.ranges);
        }
    }

    // ---- core ----

    /// Lookup for the accepted request, `latency` ticks after acceptance.
    pub fn access_timing(&mut self, links: &mut dyn CacheLinks, sched: &mut dyn Scheduler) {
        let CoreState::Accessing { port, mut pkt } = mem::take(&mut self.state) else {
            panic!("{}: lookup fired with no request accepted", self.name);
        };

        if self.access_functional(&mut pkt) {
            self.stats.record_hit();
            debug!("{}: hit {:?} @ {:#x}", self.name, pkt.cmd(), pkt.addr());
            pkt.make_response();
            self.send_response(port, pkt, links, sched);
            return;
        }

        self.stats.record_miss();
        debug!("{}: miss {:?} @ {:#x}", self.name, pkt.cmd(), pkt.addr());
        let (request, original) = if pkt.is_whole_block(self.block_size) {
            (pkt, None)
        } else {
            let block_addr = pkt.block_addr(self.block_size);
            (Packet::read(block_addr, self.block_size), Some(pkt))
        };
        self.state = CoreState::Blocked {
            port,
            original,
            miss_time: sched.now(),
        };
        self.mem_port.send_packet(request, links.downstream(), sched);
    }

    /// Service `pkt` out of the store if its block is resident.
    fn access_functional(&mut self, pkt: &mut Packet) -> bool {
        let block_size = self.block_size;
        let Some(block) = self.store.get_mut(pkt.block_addr(block_size)) else {
            return false;
        };
        if pkt.is_write() {
            pkt.write_data_to_block(&mut block.data, block_size);
            block.dirty = true;
        } else {
            pkt.set_data_from_block(&block.data, block_size);
        }
        true
    }

    fn insert(&mut self, pkt: &Packet, links: &mut dyn CacheLinks, sched: &mut dyn Scheduler) {
        let block_addr = pkt.block_addr(self.block_size);
        let Some(evicted) = self.store.insert(block_addr, pkt.data(), false) else {
            return;
        };
        debug!(
            "{}: evicted {:#x}{}",
            self.name,
            evicted.addr,
            if evicted.block.dirty { " (dirty)" } else { "" }
        );
        if evicted.block.dirty {
            self.stats.record_writeback();
            let wb = Packet::writeback(evicted.addr, evicted.block.data.into_vec());
            self.mem_port.send_packet(wb, links.downstream(), sched);
        }
    }

    fn send_response(
        &mut self,
        port: PortId,
        pkt: Packet,
        links: &mut dyn CacheLinks,
        sched: &mut dyn Scheduler,
    ) {
        debug_assert!(!self.is_blocked());
        debug!("{}: responding {:?} @ {:#x} on port {}", self.name, pkt.cmd(), pkt.addr(), port);
        self.cpu_ports[port].send_packet(pkt, links.upstream(port), sched);
        self.try_send_retries(links, sched);
    }

    fn try_send_retries(&mut self, links: &mut dyn CacheLinks, sched: &mut dyn Scheduler) {
        if !self.can_accept() {
            return;
        }
        for (id, port) in self.cpu_ports.iter_mut().enumerate() {
            port.try_send_retry(links.upstream(id), sched);
        }
    }
}
