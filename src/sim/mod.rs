pub mod config;
pub mod event;
pub mod flat_mem;
pub mod top;
