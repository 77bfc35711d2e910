use log::debug;

use crate::base::packet::Packet;
use crate::base::port::{PortId, RequestPeer};
use crate::timeq::Scheduler;

/// Response port facing one requestor.
#[derive(Debug)]
pub(crate) struct CpuSidePort {
    id: PortId,
    /// A request was turned away and the requestor is owed a retry.
    need_retry: bool,
    /// Response the requestor handed back, waiting for its retry.
    blocked_packet: Option<Packet>,
}

impl CpuSidePort {
    pub(crate) fn new(id: PortId) -> Self {
        Self {
            id,
            need_retry: false,
            blocked_packet: None,
        }
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.blocked_packet.is_some()
    }

    pub(crate) fn needs_retry(&self) -> bool {
        self.need_retry
    }

    /// First gate for an incoming request.  A port that is still holding a response, or that
    /// already owes a retry, turns the request away and keeps owing the retry.
    pub(crate) fn admit(&mut self) -> bool {
        if self.blocked_packet.is_some() || self.need_retry {
            self.need_retry = true;
            return false;
        }
        true
    }

    /// The core turned the request away; remember to retry the requestor.
    pub(crate) fn reject(&mut self) {
        self.need_retry = true;
    }

    pub(crate) fn send_packet(
        &mut self,
        pkt: Packet,
        peer: &mut dyn RequestPeer,
        sched: &mut dyn Scheduler,
    ) {
        assert!(
            self.blocked_packet.is_none(),
            "cpu port {} sent a response while another awaits retry",
            self.id
        );
        if let Err(pkt) = peer.recv_timing_resp(pkt, sched) {
            debug!(
                "cpu port {}: response @ {:#x} refused, holding for retry",
                self.id,
                pkt.addr()
            );
            self.blocked_packet = Some(pkt);
        }
    }

    pub(crate) fn recv_resp_retry(&mut self, peer: &mut dyn RequestPeer, sched: &mut dyn Scheduler) {
        let pkt = match self.blocked_packet.take() {
            Some(pkt) => pkt,
            None => panic!("cpu port {} got a response retry with nothing to resend", self.id),
        };
        self.send_packet(pkt, peer, sched);
    }

    pub(crate) fn try_send_retry(&mut self, peer: &mut dyn RequestPeer, sched: &mut dyn Scheduler) {
        if self.need_retry && self.blocked_packet.is_none() {
            self.need_retry = false;
            debug!("cpu port {}: sending request retry", self.id);
            peer.recv_req_retry(sched);
        }
    }
}
