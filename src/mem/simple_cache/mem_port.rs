use log::debug;

use crate::base::packet::Packet;
use crate::base::port::ResponsePeer;
use crate::timeq::Scheduler;

/// Request port facing the next level down.
#[derive(Debug, Default)]
pub(crate) struct MemSidePort {
    /// Request the downstream handed back, waiting for its retry.
    blocked_packet: Option<Packet>,
}

impl MemSidePort {
    pub(crate) fn is_blocked(&self) -> bool {
        self.blocked_packet.is_some()
    }

    pub(crate) fn send_packet(
        &mut self,
        pkt: Packet,
        peer: &mut dyn ResponsePeer,
        sched: &mut dyn Scheduler,
    ) {
        assert!(
            self.blocked_packet.is_none(),
            "mem port sent {:?} @ {:#x} while another request awaits retry",
            pkt.cmd(),
            pkt.addr()
        );
        if let Err(pkt) = peer.recv_timing_req(pkt, sched) {
            debug!("mem port: {:?} @ {:#x} refused, holding for retry", pkt.cmd(), pkt.addr());
            self.blocked_packet = Some(pkt);
        }
    }

    pub(crate) fn recv_req_retry(&mut self, peer: &mut dyn ResponsePeer, sched: &mut dyn Scheduler) {
        let pkt = match self.blocked_packet.take() {
            Some(pkt) => pkt,
            None => panic!("mem port got a request retry with nothing to resend"),
        };
        self.send_packet(pkt, peer, sched);
    }
}
