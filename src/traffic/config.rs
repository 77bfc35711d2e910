use serde::Deserialize;

use crate::sim::config::Config;
use crate::timeq::Tick;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    /// Requests each requester sends before going quiet.
    pub num_requests: u64,
    /// Requesters to attach; `None` attaches one per cache cpu-side port.
    pub num_requesters: Option<usize>,
    /// Ticks between a response and the next request.
    pub issue_interval: Tick,
    /// Refuse every Nth response (0 never refuses).
    pub resp_stall_every: u64,
    /// Ticks between refusing a response and asking for it again.
    pub resp_retry_delay: Tick,
    /// Probability that a request from a `mixed` pattern is a write.
    pub write_ratio: f64,
    pub seed: u64,
    /// One pattern per requester, reused cyclically.
    pub patterns: Vec<TrafficPatternSpec>,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            num_requests: 1024,
            num_requesters: None,
            issue_interval: 1,
            resp_stall_every: 0,
            resp_retry_delay: 4,
            write_ratio: 0.25,
            seed: 0,
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficPatternSpec {
    pub name: String,
    pub kind: String,
    pub op: String,
    pub base: u64,
    pub req_bytes: u32,
    pub stride: u64,
    /// Footprint in bytes; addresses wrap inside `[base, base + span_bytes)`.
    pub span_bytes: u64,
    pub seed: u64,
}

impl Default for TrafficPatternSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "strided".to_string(),
            op: "read".to_string(),
            base: 0,
            req_bytes: 8,
            stride: 8,
            span_bytes: 8 << 10,
            seed: 0,
        }
    }
}
