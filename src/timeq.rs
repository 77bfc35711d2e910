/*
Time-queue for the event-driven memory models.

Two pieces live here.  The `EventQueue` is the one scheduler every component talks to: a component
asks for an `Event` to be delivered at an absolute tick, and the system top pops events in tick
order and routes them.  Events scheduled for the same tick fire in the order they were scheduled.

The `TimedServer` models a shared resource with a service law:
    - a base latency plus a throughput component expressed in bytes-per-tick
    - a bounded number of requests in service at once

When the server cannot accept more work it returns a `Backpressure` carrying the request back, so
the caller can hold it and retry later.  Accepted requests yield a `Ticket` describing when the
service will complete.
*/

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use crate::sim::event::Event;

pub type Tick = u64;

/// The scheduling interface handed to components.  Components never drive time themselves; they
/// only ask for a callback at some tick in the future.
pub trait Scheduler {
    fn now(&self) -> Tick;

    fn schedule_at(&mut self, when: Tick, event: Event);

    fn schedule_in(&mut self, delay: Tick, event: Event) {
        let when = self.now().saturating_add(delay);
        self.schedule_at(when, event);
    }
}

#[derive(Debug)]
struct Pending {
    when: Tick,
    seq: u64,
    event: Event,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.when, self.seq).cmp(&(other.when, other.seq))
    }
}

/// Min-heap of pending events ordered by (tick, submission order).
#[derive(Debug, Default)]
pub struct EventQueue {
    now: Tick,
    seq: u64,
    heap: BinaryHeap<Reverse<Pending>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the earliest event, advancing the current tick to it.
    pub fn pop(&mut self) -> Option<(Tick, Event)> {
        let Reverse(pending) = self.heap.pop()?;
        self.now = pending.when;
        Some((pending.when, pending.event))
    }

    pub fn peek_tick(&self) -> Option<Tick> {
        self.heap.peek().map(|Reverse(pending)| pending.when)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Scheduler for EventQueue {
    fn now(&self) -> Tick {
        self.now
    }

    fn schedule_at(&mut self, when: Tick, event: Event) {
        assert!(
            when >= self.now,
            "cannot schedule {:?} at tick {} before current tick {}",
            event,
            when,
            self.now
        );
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(Pending { when, seq, event }));
    }
}

// Result of queueing a request with a timed server
#[derive(Debug, Clone, Copy)]
pub struct Ticket {
    issued_at: Tick,
    ready_at: Tick,
    size_bytes: u32,
}

impl Ticket {
    fn new(issued_at: Tick, ready_at: Tick, size_bytes: u32) -> Self {
        Self {
            issued_at,
            ready_at,
            size_bytes,
        }
    }

    // Tick at which the request entered the server.
    pub fn issued_at(&self) -> Tick {
        self.issued_at
    }

    // Tick at which the server will make the payload available to downstream consumers.
    pub fn ready_at(&self) -> Tick {
        self.ready_at
    }

    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    pub fn is_ready(&self, now: Tick) -> bool {
        now >= self.ready_at
    }
}

#[derive(Debug)]
pub struct ServiceRequest<T> {
    pub payload: T,
    pub size_bytes: u32,
}

impl<T> ServiceRequest<T> {
    pub fn new(payload: T, size_bytes: u32) -> Self {
        Self { payload, size_bytes }
    }
}

#[derive(Debug)]
pub struct ServiceResult<T> {
    pub payload: T,
    pub ticket: Ticket,
}

// Reasons why the server rejected a request
#[derive(Debug)]
pub enum Backpressure<T> {
    // The bounded FIFO is full
    QueueFull { request: ServiceRequest<T>, capacity: usize },
}

impl<T> Backpressure<T> {
    // Recover the underlying request so it can be retried later.
    pub fn into_request(self) -> ServiceRequest<T> {
        match self {
            Backpressure::QueueFull { request, .. } => request,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    // Fixed latency added to every request
    pub base_latency: Tick,
    // Throughput
    pub bytes_per_tick: u32,
    // Maximum number of outstanding requests the server will accept
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_latency: 0,
            bytes_per_tick: 1,
            queue_capacity: 1,
        }
    }
}

#[derive(Debug)]
struct Inflight<T> {
    payload: T,
    ticket: Ticket,
}

// Single-lane server that enforces the configured latency/bandwidth budget and keeps track of
// outstanding work using a FIFO.  Latency is pipelined; only the transfer time occupies the lane.
#[derive(Debug)]
pub struct TimedServer<T> {
    config: ServerConfig,
    inflight: VecDeque<Inflight<T>>,
    busy_until: Tick,
}

impl<T> TimedServer<T> {
    pub fn new(config: ServerConfig) -> Self {
        assert!(config.bytes_per_tick > 0, "bytes_per_tick must be > 0");
        assert!(config.queue_capacity > 0, "queue_capacity must be > 0");
        Self {
            config,
            inflight: VecDeque::with_capacity(config.queue_capacity),
            busy_until: 0,
        }
    }

    // Attempt to enqueue a request at the provided tick.
    // Returns a Ticket on success or a Backpressure describing why the request could not be accepted.
    pub fn try_enqueue(
        &mut self,
        now: Tick,
        request: ServiceRequest<T>,
    ) -> Result<Ticket, Backpressure<T>> {
        if self.inflight.len() >= self.config.queue_capacity {
            return Err(Backpressure::QueueFull {
                request,
                capacity: self.config.queue_capacity,
            });
        }

        let start = self.busy_until.max(now);
        let transfer = ceil_div_u64(request.size_bytes as u64, self.config.bytes_per_tick as u64);
        self.busy_until = start.saturating_add(transfer);
        let ready_at = self.busy_until.saturating_add(self.config.base_latency);
        let ticket = Ticket::new(now, ready_at, request.size_bytes);

        self.inflight.push_back(Inflight {
            payload: request.payload,
            ticket,
        });

        Ok(ticket)
    }

    // Drain any requests that have completed by "now" and invoke the supplied callback with the
    // results.
    pub fn service_ready<F>(&mut self, now: Tick, mut callback: F)
    where
        F: FnMut(ServiceResult<T>),
    {
        while self.inflight.front().is_some_and(|front| front.ticket.is_ready(now)) {
            let Some(inflight) = self.inflight.pop_front() else {
                break;
            };
            callback(ServiceResult {
                payload: inflight.payload,
                ticket: inflight.ticket,
            });
        }
    }

    // Returns the earliest tick at which a new request could begin service.
    pub fn available_at(&self) -> Tick {
        self.busy_until
    }

    pub fn oldest_ticket(&self) -> Option<&Ticket> {
        self.inflight.front().map(|inflight| &inflight.ticket)
    }

    pub fn outstanding(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_full(&self) -> bool {
        self.inflight.len() >= self.config.queue_capacity
    }
}

fn ceil_div_u64(nom: u64, denom: u64) -> Tick {
    debug_assert!(denom > 0);
    (nom + denom - 1) / denom
}
