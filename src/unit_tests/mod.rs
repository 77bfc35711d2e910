mod sim_tests;

use std::collections::VecDeque;

use crate::base::addr_range::{AddrRange, AddrRangeList};
use crate::base::packet::Packet;
use crate::base::port::{PortId, RequestPeer, ResponsePeer};
use crate::mem::simple_cache::{CacheLinks, SimpleCache};
use crate::sim::config::CacheConfig;
use crate::sim::event::{CacheEvent, Event, MemoryEvent};
use crate::timeq::{EventQueue, Scheduler};

/// Requestor stub: records responses and ranges, refuses responses on demand.
#[derive(Debug, Default)]
pub(crate) struct MockRequester {
    pub responses: Vec<Packet>,
    pub retries: usize,
    pub ranges: Option<AddrRangeList>,
    pub refuse_responses: bool,
    pub refused: usize,
}

impl RequestPeer for MockRequester {
    fn recv_timing_resp(&mut self, pkt: Packet, _sched: &mut dyn Scheduler) -> Result<(), Packet> {
        if self.refuse_responses {
            self.refused += 1;
            return Err(pkt);
        }
        self.responses.push(pkt);
        Ok(())
    }

    fn recv_req_retry(&mut self, _sched: &mut dyn Scheduler) {
        self.retries += 1;
    }

    fn recv_range_change(&mut self, ranges: &AddrRangeList) {
        self.ranges = Some(ranges.clone());
    }
}

/// Downstream stub: records timing requests, refuses them on demand, serves functional
/// accesses out of a zero-filled range.
#[derive(Debug)]
pub(crate) struct MockMemory {
    pub range: AddrRange,
    pub requests: VecDeque<Packet>,
    pub refuse_requests: bool,
    pub refused: usize,
    pub functional: Vec<Packet>,
    pub cacheable: bool,
}

impl Default for MockMemory {
    fn default() -> Self {
        Self {
            range: AddrRange::new(0, 1 << 16),
            requests: VecDeque::new(),
            refuse_requests: false,
            refused: 0,
            functional: Vec::new(),
            cacheable: true,
        }
    }
}

impl MockMemory {
    /// Answer the oldest outstanding read-type request with `fill` bytes.
    pub fn respond_with(&mut self, fill: u8) -> Packet {
        let mut pkt = self.requests.pop_front().expect("no request outstanding");
        if pkt.is_read() {
            pkt.data_mut().fill(fill);
        }
        pkt.make_response();
        pkt
    }
}

impl ResponsePeer for MockMemory {
    fn recv_timing_req(&mut self, pkt: Packet, _sched: &mut dyn Scheduler) -> Result<(), Packet> {
        if self.refuse_requests {
            self.refused += 1;
            return Err(pkt);
        }
        self.requests.push_back(pkt);
        Ok(())
    }

    fn recv_resp_retry(&mut self, _sched: &mut dyn Scheduler) {}

    fn recv_functional(&mut self, pkt: &mut Packet) -> bool {
        if pkt.needs_response() {
            pkt.make_response();
        }
        self.functional.push(pkt.clone());
        self.cacheable
    }

    fn addr_ranges(&self) -> AddrRangeList {
        self.range.into()
    }
}

/// A cache wired to mock neighbours and a private event queue.
pub(crate) struct Bench {
    pub cache: SimpleCache,
    pub requesters: Vec<MockRequester>,
    pub memory: MockMemory,
    pub queue: EventQueue,
}

struct MockLinks<'a> {
    requesters: &'a mut [MockRequester],
    memory: &'a mut MockMemory,
}

impl CacheLinks for MockLinks<'_> {
    fn upstream(&mut self, port: PortId) -> &mut dyn RequestPeer {
        &mut self.requesters[port]
    }

    fn downstream(&mut self) -> &mut dyn ResponsePeer {
        &mut *self.memory
    }
}

impl Bench {
    pub fn new(config: CacheConfig) -> Self {
        let cache = SimpleCache::new("cache", &config).unwrap();
        let requesters = (0..config.num_cpu_ports).map(|_| MockRequester::default()).collect();
        Self {
            cache,
            requesters,
            memory: MockMemory::default(),
            queue: EventQueue::new(),
        }
    }

    /// Split borrow: the cache plus a links view over everything else.
    fn parts(&mut self) -> (&mut SimpleCache, MockLinks<'_>, &mut EventQueue) {
        (
            &mut self.cache,
            MockLinks {
                requesters: &mut self.requesters,
                memory: &mut self.memory,
            },
            &mut self.queue,
        )
    }

    pub fn init(&mut self) {
        let (cache, mut links, _) = self.parts();
        cache.init(&mut links);
    }

    pub fn range_change(&mut self) {
        let (cache, mut links, _) = self.parts();
        cache.recv_range_change(&mut links);
    }

    pub fn send(&mut self, port: PortId, pkt: Packet) -> Result<(), Packet> {
        let (cache, _, queue) = self.parts();
        cache.recv_timing_req(port, pkt, queue)
    }

    /// Fire the pending lookup; returns the tick it fired at.
    pub fn run_lookup(&mut self) -> u64 {
        let (tick, event) = self.queue.pop().expect("lookup scheduled");
        assert_eq!(Event::Cache(CacheEvent::AccessTiming), event);
        let (cache, mut links, queue) = self.parts();
        cache.access_timing(&mut links, queue);
        tick
    }

    /// Let time pass, as if a memory response were due at `tick`.
    pub fn advance_to(&mut self, tick: u64) {
        self.queue.schedule_at(tick, Event::Memory(MemoryEvent::Respond));
        assert_eq!(Some((tick, Event::Memory(MemoryEvent::Respond))), self.queue.pop());
    }

    pub fn fill(&mut self, fill: u8) {
        let pkt = self.memory.respond_with(fill);
        let (cache, mut links, queue) = self.parts();
        cache
            .recv_timing_resp(pkt, &mut links, queue)
            .expect("cache takes every response");
    }

    pub fn req_retry(&mut self) {
        let (cache, mut links, queue) = self.parts();
        cache.recv_req_retry(&mut links, queue);
    }

    pub fn resp_retry(&mut self, port: PortId) {
        let (cache, mut links, queue) = self.parts();
        cache.recv_resp_retry(port, &mut links, queue);
    }

    pub fn functional(&mut self, port: PortId, pkt: &mut Packet) {
        let (cache, mut links, _) = self.parts();
        cache.recv_functional(port, pkt, &mut links);
    }

    /// Send a read through lookup and, if needed, a fill of `fill` bytes.
    pub fn read(&mut self, port: PortId, addr: u64, size: usize, fill: u8) -> Packet {
        self.send(port, Packet::read(addr, size)).expect("cache idle");
        self.run_lookup();
        if self.cache.is_waiting_fill() {
            self.fill(fill);
        }
        self.requesters[port].responses.pop().expect("response delivered")
    }
}

pub(crate) fn cache_config(latency: u64, size: usize, num_cpu_ports: usize) -> CacheConfig {
    CacheConfig {
        latency,
        block_size: 64,
        size,
        num_cpu_ports,
        seed: 1,
    }
}
