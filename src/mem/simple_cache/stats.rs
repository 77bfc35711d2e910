use serde::Serialize;

use crate::timeq::Tick;

const DEFAULT_BUCKETS: usize = 16;

/// Latency distribution with a fixed number of equal-width buckets.  When a sample falls past the
/// last bucket, adjacent buckets are folded pairwise and the width doubles until it fits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyHistogram {
    bucket_size: u64,
    buckets: Vec<u64>,
    samples: u64,
    sum: u64,
    min: Option<Tick>,
    max: Option<Tick>,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKETS)
    }
}

impl LatencyHistogram {
    pub fn new(num_buckets: usize) -> Self {
        assert!(
            num_buckets >= 2 && num_buckets % 2 == 0,
            "histogram needs an even number of buckets, got {}",
            num_buckets
        );
        Self {
            bucket_size: 1,
            buckets: vec![0; num_buckets],
            samples: 0,
            sum: 0,
            min: None,
            max: None,
        }
    }

    pub fn sample(&mut self, latency: Tick) {
        while latency / self.bucket_size >= self.buckets.len() as u64 {
            self.grow();
        }
        let idx = (latency / self.bucket_size) as usize;
        self.buckets[idx] = self.buckets[idx].saturating_add(1);
        self.samples = self.samples.saturating_add(1);
        self.sum = self.sum.saturating_add(latency);
        self.min = Some(self.min.map_or(latency, |m| m.min(latency)));
        self.max = Some(self.max.map_or(latency, |m| m.max(latency)));
    }

    fn grow(&mut self) {
        let half = self.buckets.len() / 2;
        for i in 0..half {
            self.buckets[i] = self.buckets[2 * i].saturating_add(self.buckets[2 * i + 1]);
        }
        self.buckets[half..].fill(0);
        self.bucket_size = self.bucket_size.saturating_mul(2);
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn min(&self) -> Option<Tick> {
        self.min
    }

    pub fn max(&self) -> Option<Tick> {
        self.max
    }

    pub fn mean(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.sum as f64 / self.samples as f64)
    }

    pub fn bucket_size(&self) -> u64 {
        self.bucket_size
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    hits: u64,
    misses: u64,
    writebacks: u64,
    rejected_requests: u64,
    miss_latency: LatencyHistogram,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn writebacks(&self) -> u64 {
        self.writebacks
    }

    pub fn rejected_requests(&self) -> u64 {
        self.rejected_requests
    }

    pub fn miss_latency(&self) -> &LatencyHistogram {
        &self.miss_latency
    }

    /// hits / (hits + misses); zero before the first access.
    pub fn hit_ratio(&self) -> f64 {
        let accesses = self.hits + self.misses;
        if accesses == 0 {
            return 0.0;
        }
        self.hits as f64 / accesses as f64
    }

    pub fn record_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    pub fn record_miss(&mut self) {
        self.misses = self.misses.saturating_add(1);
    }

    pub fn record_writeback(&mut self) {
        self.writebacks = self.writebacks.saturating_add(1);
    }

    pub fn record_reject(&mut self) {
        self.rejected_requests = self.rejected_requests.saturating_add(1);
    }

    pub fn record_miss_latency(&mut self, latency: Tick) {
        self.miss_latency.sample(latency);
    }
}
