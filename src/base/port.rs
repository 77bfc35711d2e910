//! Port protocol between adjacent memory components.
//!
//! Timing sends are non-blocking: the receiver either takes the packet (`Ok`) or hands it back
//! (`Err`).  A sender holding a handed-back packet must not send anything else on that port until
//! the receiver signals a retry, then it resends exactly that packet.
//!
//! Receivers only mutate their own state and schedule events; they never call back into the
//! sender from inside a receive method.  Anything the receiver wants to send in reaction is
//! scheduled and routed by the system top.
use crate::base::addr_range::AddrRangeList;
use crate::base::packet::Packet;
use crate::timeq::Scheduler;

/// Index of a cpu-side port on a component with a vector of them.
pub type PortId = usize;

/// The requestor side of a link, as seen by a component's response (cpu-side) port.
pub trait RequestPeer {
    /// Offer a response.  `Err` returns the packet; the offerer waits for `RespRetry`.
    fn recv_timing_resp(&mut self, pkt: Packet, sched: &mut dyn Scheduler) -> Result<(), Packet>;

    /// A request this peer had rejected handed back may now be resent.
    fn recv_req_retry(&mut self, sched: &mut dyn Scheduler);

    /// The ranges served through this link changed.
    fn recv_range_change(&mut self, ranges: &AddrRangeList);
}

/// The responder side of a link, as seen by a component's request (mem-side) port.
pub trait ResponsePeer {
    /// Offer a request.  `Err` returns the packet; the offerer waits for a request retry.
    fn recv_timing_req(&mut self, pkt: Packet, sched: &mut dyn Scheduler) -> Result<(), Packet>;

    /// A response this peer had handed back may now be resent.
    fn recv_resp_retry(&mut self, sched: &mut dyn Scheduler);

    /// Untimed access, serviced immediately.  Returns whether the data may be cached upstream.
    fn recv_functional(&mut self, pkt: &mut Packet) -> bool;

    fn addr_ranges(&self) -> AddrRangeList;
}
