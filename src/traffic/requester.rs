use log::debug;
use serde::Serialize;

use crate::base::addr_range::AddrRangeList;
use crate::base::packet::{Addr, Packet};
use crate::base::port::{PortId, RequestPeer};
use crate::sim::event::{Event, RequesterEvent};
use crate::timeq::{Scheduler, Tick};
use crate::traffic::config::TrafficConfig;
use crate::traffic::patterns::AddressStream;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequesterStats {
    pub issued: u64,
    pub completed: u64,
    pub refused: u64,
    pub retries_received: u64,
    pub responses_refused: u64,
    pub total_latency: u64,
    pub max_latency: Tick,
}

/// Traffic source on one cache cpu-side port.  Keeps a single request in flight; a refused
/// request is held and offered again only after the cache sends a retry.
#[derive(Debug)]
pub struct Requester {
    id: PortId,
    stream: AddressStream,
    num_requests: u64,
    issue_interval: Tick,
    resp_stall_every: u64,
    resp_retry_delay: Tick,
    /// Refused request, offered again on the next `Issue` after a retry.
    pending: Option<Packet>,
    waiting_retry: bool,
    /// Tick the in-flight request was first offered.
    issued_at: Option<Tick>,
    outstanding: bool,
    refused_current: bool,
    ranges: AddrRangeList,
    stats: RequesterStats,
}

impl Requester {
    pub fn new(id: PortId, stream: AddressStream, config: &TrafficConfig) -> Self {
        Self {
            id,
            stream,
            num_requests: config.num_requests,
            issue_interval: config.issue_interval,
            resp_stall_every: config.resp_stall_every,
            resp_retry_delay: config.resp_retry_delay,
            pending: None,
            waiting_retry: false,
            issued_at: None,
            outstanding: false,
            refused_current: false,
            ranges: AddrRangeList::new(),
            stats: RequesterStats::default(),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn stats(&self) -> &RequesterStats {
        &self.stats
    }

    /// Ranges the cache last published on this port.
    pub fn ranges(&self) -> &AddrRangeList {
        &self.ranges
    }

    pub fn stream(&self) -> &AddressStream {
        &self.stream
    }

    pub fn is_done(&self) -> bool {
        self.stats.completed >= self.num_requests && !self.outstanding && self.pending.is_none()
    }

    fn make_packet(&mut self) -> Packet {
        let (addr, is_write) = self.stream.next_access();
        let size = self.stream.pattern().req_bytes as usize;
        if is_write {
            Packet::write(addr, write_pattern(addr, self.id, size))
        } else {
            Packet::read(addr, size)
        }
    }

    /// The request to offer now, if this requester has one and is allowed to send.
    pub fn next_request(&mut self, now: Tick) -> Option<Packet> {
        if self.waiting_retry || self.outstanding {
            return None;
        }
        if let Some(pkt) = self.pending.take() {
            return Some(pkt);
        }
        if self.stats.issued >= self.num_requests {
            return None;
        }
        self.stats.issued += 1;
        self.issued_at = Some(now);
        Some(self.make_packet())
    }

    pub fn request_accepted(&mut self) {
        self.outstanding = true;
    }

    pub fn request_refused(&mut self, pkt: Packet) {
        debug!("requester {}: {:?} @ {:#x} refused", self.id, pkt.cmd(), pkt.addr());
        self.pending = Some(pkt);
        self.waiting_retry = true;
        self.stats.refused += 1;
    }

    fn should_refuse_response(&self) -> bool {
        self.resp_stall_every > 0
            && !self.refused_current
            && (self.stats.completed + 1) % self.resp_stall_every == 0
    }
}

/// Bytes a requester writes to `addr`; distinct per requester so stray data is recognisable.
pub fn write_pattern(addr: Addr, id: PortId, size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (addr as u8).wrapping_add(i as u8) ^ ((id as u8) << 4))
        .collect()
}

impl RequestPeer for Requester {
    fn recv_timing_resp(&mut self, pkt: Packet, sched: &mut dyn Scheduler) -> Result<(), Packet> {
        assert!(
            self.outstanding,
            "requester {} got a response @ {:#x} with nothing outstanding",
            self.id,
            pkt.addr()
        );
        if self.should_refuse_response() {
            self.refused_current = true;
            self.stats.responses_refused += 1;
            sched.schedule_in(
                self.resp_retry_delay,
                Event::Requester(self.id, RequesterEvent::RespRetry),
            );
            return Err(pkt);
        }

        let now = sched.now();
        let latency = now - self.issued_at.take().unwrap_or(now);
        self.refused_current = false;
        self.outstanding = false;
        self.stats.completed += 1;
        self.stats.total_latency = self.stats.total_latency.saturating_add(latency);
        self.stats.max_latency = self.stats.max_latency.max(latency);
        debug!("requester {}: {:?} @ {:#x} done after {} ticks", self.id, pkt.cmd(), pkt.addr(), latency);

        if self.stats.issued < self.num_requests {
            sched.schedule_in(self.issue_interval, Event::Requester(self.id, RequesterEvent::Issue));
        }
        Ok(())
    }

    fn recv_req_retry(&mut self, sched: &mut dyn Scheduler) {
        if !self.waiting_retry {
            return;
        }
        self.waiting_retry = false;
        self.stats.retries_received += 1;
        let now = sched.now();
        sched.schedule_at(now, Event::Requester(self.id, RequesterEvent::Issue));
    }

    fn recv_range_change(&mut self, ranges: &AddrRangeList) {
        self.ranges = ranges.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::addr_range::AddrRange;
    use crate::base::packet::MemCmd;
    use crate::timeq::EventQueue;
    use crate::traffic::config::TrafficPatternSpec;
    use crate::traffic::patterns::compile_pattern;

    fn requester(config: &TrafficConfig) -> Requester {
        let spec = TrafficPatternSpec {
            req_bytes: 4,
            stride: 4,
            ..TrafficPatternSpec::default()
        };
        let pattern = compile_pattern(&spec, 0, config).unwrap();
        Requester::new(0, AddressStream::new(pattern, config.write_ratio, 0), config)
    }

    fn respond(req: &mut Requester, pkt: Packet, queue: &mut EventQueue) -> Result<(), Packet> {
        let mut pkt = pkt;
        pkt.make_response();
        req.recv_timing_resp(pkt, queue)
    }

    #[test]
    fn stops_after_num_requests() {
        let config = TrafficConfig {
            num_requests: 2,
            ..TrafficConfig::default()
        };
        let mut req = requester(&config);
        let mut queue = EventQueue::new();

        let first = req.next_request(0).unwrap();
        req.request_accepted();
        assert!(req.next_request(0).is_none(), "one request in flight at a time");
        respond(&mut req, first, &mut queue).unwrap();

        let second = req.next_request(0).unwrap();
        assert_eq!(4, second.addr());
        req.request_accepted();
        respond(&mut req, second, &mut queue).unwrap();
        assert!(req.next_request(2).is_none());
        assert!(req.is_done());
        assert_eq!(2, req.stats().completed);
    }

    #[test]
    fn refused_request_waits_for_retry_then_resends_same_packet() {
        let mut req = requester(&TrafficConfig::default());
        let mut queue = EventQueue::new();
        let pkt = req.next_request(0).unwrap();
        req.request_refused(pkt.clone());
        assert!(req.next_request(0).is_none());

        req.recv_req_retry(&mut queue);
        assert_eq!(
            Event::Requester(0, RequesterEvent::Issue),
            queue.pop().unwrap().1
        );
        assert_eq!(Some(pkt), req.next_request(0));
        assert_eq!(1, req.stats().issued);
    }

    #[test]
    fn refuses_every_nth_response_once() {
        let config = TrafficConfig {
            resp_stall_every: 1,
            resp_retry_delay: 3,
            ..TrafficConfig::default()
        };
        let mut req = requester(&config);
        let mut queue = EventQueue::new();
        let pkt = req.next_request(0).unwrap();
        req.request_accepted();
        let mut resp = pkt;
        resp.make_response();
        let resp = req.recv_timing_resp(resp, &mut queue).expect_err("stalled");
        assert_eq!(MemCmd::ReadResp, resp.cmd());
        assert_eq!(Some(3), queue.peek_tick());
        assert!(req.recv_timing_resp(resp, &mut queue).is_ok());
        assert_eq!(1, req.stats().responses_refused);
    }

    #[test]
    fn remembers_published_ranges() {
        let mut req = requester(&TrafficConfig::default());
        req.recv_range_change(&AddrRange::new(0, 0x1000).into());
        assert!(req.ranges().contains(0xfff));
        assert!(!req.ranges().contains(0x1000));
    }
}
