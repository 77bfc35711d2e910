use std::collections::VecDeque;

use log::debug;
use serde::Serialize;

use crate::base::addr_range::{AddrRange, AddrRangeList};
use crate::base::mem::HasMemory;
use crate::base::packet::Packet;
use crate::base::port::ResponsePeer;
use crate::sim::config::MemConfig;
use crate::sim::event::{Event, MemoryEvent};
use crate::sim::flat_mem::FlatMemory;
use crate::timeq::{Scheduler, ServiceRequest, Tick, TimedServer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub reads: u64,
    pub writes: u64,
    pub writebacks: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub rejected_requests: u64,
}

/// Terminal memory behind the cache: one address range, a bounded service queue, and a flat
/// backing store.  Accesses take effect when their service completes.
#[derive(Debug)]
pub struct SimpleMemory {
    name: String,
    range: AddrRange,
    backing: FlatMemory,
    server: TimedServer<Packet>,
    responses: VecDeque<Packet>,
    /// A request was refused; upstream is owed a retry once the queue drains.
    need_retry: bool,
    /// Upstream refused a response; nothing more goes up until it retries.
    resp_blocked: bool,
    stats: MemoryStats,
}

impl SimpleMemory {
    pub fn new(name: impl Into<String>, config: &MemConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            range: config.range(),
            backing: FlatMemory::new_with_size(config.size as usize),
            server: TimedServer::new(config.server()),
            responses: VecDeque::new(),
            need_retry: false,
            resp_blocked: false,
            stats: MemoryStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> AddrRange {
        self.range
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    pub fn outstanding(&self) -> usize {
        self.server.outstanding() + self.responses.len()
    }

    /// Peek at backing contents without going through the timing path.
    pub fn peek(&self, addr: u64, n: usize) -> anyhow::Result<&[u8]> {
        self.check_range(addr, n);
        self.backing.read((addr - self.range.start()) as usize, n)
    }

    fn check_range(&self, addr: u64, n: usize) {
        assert!(
            self.range.covers(addr, n as u64),
            "{}: access of {} bytes @ {:#x} outside [{:#x}, {:#x})",
            self.name,
            n,
            addr,
            self.range.start(),
            self.range.end()
        );
    }

    fn access(&mut self, pkt: &mut Packet) -> anyhow::Result<()> {
        self.check_range(pkt.addr(), pkt.size());
        let offset = (pkt.addr() - self.range.start()) as usize;
        if pkt.is_write() {
            self.backing.write(offset, pkt.data())?;
            self.stats.bytes_written = self.stats.bytes_written.saturating_add(pkt.size() as u64);
        } else {
            let data = self.backing.read(offset, pkt.size())?;
            pkt.data_mut().copy_from_slice(data);
            self.stats.bytes_read = self.stats.bytes_read.saturating_add(pkt.size() as u64);
        }
        Ok(())
    }

    /// Retire every request whose service has completed by `now`.  Called when a `Respond`
    /// event fires.
    pub fn service(&mut self, now: Tick) {
        let mut done = Vec::new();
        self.server.service_ready(now, |result| done.push(result.payload));
        for mut pkt in done {
            if let Err(err) = self.access(&mut pkt) {
                panic!("{}: {:#}", self.name, err);
            }
            match pkt.cmd() {
                cmd if cmd.is_read() => self.stats.reads += 1,
                cmd if cmd.needs_response() => self.stats.writes += 1,
                _ => self.stats.writebacks += 1,
            }
            if pkt.needs_response() {
                pkt.make_response();
                self.responses.push_back(pkt);
            }
        }
    }

    /// Next response to offer upstream, unless upstream is still refusing.
    pub fn take_response(&mut self) -> Option<Packet> {
        if self.resp_blocked {
            return None;
        }
        self.responses.pop_front()
    }

    /// Upstream handed a response back; keep it at the head until `recv_resp_retry`.
    pub fn response_refused(&mut self, pkt: Packet) {
        self.responses.push_front(pkt);
        self.resp_blocked = true;
    }

    /// Returns true exactly once per refused request, as soon as the queue has room again.
    pub fn take_retry(&mut self) -> bool {
        if self.need_retry && !self.server.is_full() {
            self.need_retry = false;
            return true;
        }
        false
    }
}

impl ResponsePeer for SimpleMemory {
    fn recv_timing_req(&mut self, pkt: Packet, sched: &mut dyn Scheduler) -> Result<(), Packet> {
        self.check_range(pkt.addr(), pkt.size());
        let size = pkt.size() as u32;
        match self.server.try_enqueue(sched.now(), ServiceRequest::new(pkt, size)) {
            Ok(ticket) => {
                sched.schedule_at(ticket.ready_at(), Event::Memory(MemoryEvent::Respond));
                Ok(())
            }
            Err(backpressure) => {
                let pkt = backpressure.into_request().payload;
                debug!("{}: queue full, refusing {:?} @ {:#x}", self.name, pkt.cmd(), pkt.addr());
                self.need_retry = true;
                self.stats.rejected_requests += 1;
                Err(pkt)
            }
        }
    }

    fn recv_resp_retry(&mut self, sched: &mut dyn Scheduler) {
        assert!(self.resp_blocked, "{}: response retry while not blocked", self.name);
        self.resp_blocked = false;
        let now = sched.now();
        sched.schedule_at(now, Event::Memory(MemoryEvent::Respond));
    }

    fn recv_functional(&mut self, pkt: &mut Packet) -> bool {
        if let Err(err) = self.access(pkt) {
            panic!("{}: {:#}", self.name, err);
        }
        if pkt.needs_response() {
            pkt.make_response();
        }
        true
    }

    fn addr_ranges(&self) -> AddrRangeList {
        self.range.into()
    }
}
