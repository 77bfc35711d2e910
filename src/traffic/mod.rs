pub mod config;
pub mod patterns;
pub mod requester;

pub use config::{TrafficConfig, TrafficPatternSpec};
pub use requester::{Requester, RequesterStats};
