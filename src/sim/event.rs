use crate::base::port::PortId;

/// Every deferred action in the system.  The top routes each variant to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Cache(CacheEvent),
    Memory(MemoryEvent),
    Requester(PortId, RequesterEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// Tag lookup for the accepted request, `latency` ticks after acceptance.
    AccessTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEvent {
    /// Deliver any completed responses and owed retries upstream.
    Respond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterEvent {
    /// Send the next request, or resend the one that was rejected.
    Issue,
    /// Tell the cache a previously rejected response may now be resent.
    RespRetry,
}
