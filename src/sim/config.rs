use std::path::PathBuf;

use anyhow::{ensure, Context};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::*;

use crate::base::addr_range::AddrRange;
use crate::timeq::{ServerConfig, Tick};

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        match section {
            Some(value) => value
                .clone()
                .try_into()
                .with_context(|| format!("cannot deserialize {}", std::any::type_name::<Self>())),
            None => {
                warn!("config section not found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub max_ticks: Tick,
    pub log_level: u64,
    pub results_json: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_ticks: 10_000_000,
            log_level: 0,
            results_json: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Ticks between accepting a request and looking it up, for hits and misses alike.
    pub latency: Tick,
    pub block_size: usize,
    /// Total capacity in bytes.
    pub size: usize,
    pub num_cpu_ports: usize,
    /// Seed for victim selection.
    pub seed: u64,
}

impl Config for CacheConfig {}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            latency: 1,
            block_size: 64,
            size: 16 << 10,
            num_cpu_ports: 1,
            seed: 0,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.block_size.is_power_of_two(),
            "cache block_size {} is not a power of two",
            self.block_size
        );
        ensure!(
            self.size >= self.block_size && self.size % self.block_size == 0,
            "cache size {} is not a non-zero multiple of block_size {}",
            self.size,
            self.block_size
        );
        ensure!(self.num_cpu_ports > 0, "cache needs at least one cpu-side port");
        Ok(())
    }

    pub fn num_blocks(&self) -> usize {
        self.size / self.block_size
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct MemConfig {
    pub base: u64,
    pub size: u64,
    pub latency: Tick,
    pub bytes_per_tick: u32,
    pub queue_capacity: usize,
}

impl Config for MemConfig {}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            base: 0,
            size: 1 << 20,
            latency: 30,
            bytes_per_tick: 16,
            queue_capacity: 4,
        }
    }
}

impl MemConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.size > 0, "memory size must be non-zero");
        ensure!(self.bytes_per_tick > 0, "memory bytes_per_tick must be non-zero");
        ensure!(self.queue_capacity > 0, "memory queue_capacity must be non-zero");
        ensure!(
            usize::try_from(self.size).is_ok(),
            "memory size {} does not fit the host address space",
            self.size
        );
        Ok(())
    }

    pub fn range(&self) -> AddrRange {
        AddrRange::with_size(self.base, self.size)
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            base_latency: self.latency,
            bytes_per_tick: self.bytes_per_tick,
            queue_capacity: self.queue_capacity,
        }
    }
}
