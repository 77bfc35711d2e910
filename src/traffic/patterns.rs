use anyhow::{bail, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::base::addr_range::AddrRange;
use crate::base::packet::Addr;
use crate::traffic::config::{TrafficConfig, TrafficPatternSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOp {
    Read,
    Write,
    Mixed,
}

impl PatternOp {
    fn short(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::Mixed => "rw",
        }
    }
}

#[derive(Debug, Clone)]
enum PatternKind {
    Strided { stride: u64 },
    Random,
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    pub op: PatternOp,
    pub req_bytes: u32,
    base: Addr,
    span_bytes: u64,
    seed: u64,
    kind: PatternKind,
}

impl CompiledPattern {
    /// Every address this pattern can touch.
    pub fn footprint(&self) -> AddrRange {
        AddrRange::with_size(self.base, self.span_bytes)
    }

    fn offset_bytes(&self, req_idx: u64, rng: &mut StdRng) -> u64 {
        let req_bytes = self.req_bytes as u64;
        let slots = self.span_bytes / req_bytes;
        match self.kind {
            PatternKind::Strided { stride } => {
                let wrap = (slots * req_bytes) as u128;
                ((req_idx as u128 * stride as u128) % wrap) as u64
            }
            PatternKind::Random => rng.gen_range(0..slots) * req_bytes,
        }
    }
}

/// Per-requester generator of (address, is_write) pairs.
#[derive(Debug, Clone)]
pub struct AddressStream {
    pattern: CompiledPattern,
    write_ratio: f64,
    next_idx: u64,
    rng: StdRng,
}

impl AddressStream {
    pub fn new(pattern: CompiledPattern, write_ratio: f64, stream_seed: u64) -> Self {
        let rng = StdRng::seed_from_u64(pattern.seed ^ stream_seed);
        Self {
            pattern,
            write_ratio,
            next_idx: 0,
            rng,
        }
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn next_access(&mut self) -> (Addr, bool) {
        let offset = self.pattern.offset_bytes(self.next_idx, &mut self.rng);
        self.next_idx += 1;
        let is_write = match self.pattern.op {
            PatternOp::Read => false,
            PatternOp::Write => true,
            PatternOp::Mixed => self.rng.gen_bool(self.write_ratio),
        };
        (self.pattern.base + offset, is_write)
    }
}

pub fn compile_pattern(
    spec: &TrafficPatternSpec,
    index: usize,
    config: &TrafficConfig,
) -> anyhow::Result<CompiledPattern> {
    let req_bytes = spec.req_bytes;
    ensure!(
        req_bytes.is_power_of_two(),
        "traffic pattern {} req_bytes {} is not a power of two",
        index,
        req_bytes
    );
    ensure!(
        spec.base % req_bytes as u64 == 0,
        "traffic pattern {} base {:#x} is not aligned to {} bytes",
        index,
        spec.base,
        req_bytes
    );
    ensure!(
        spec.span_bytes >= req_bytes as u64,
        "traffic pattern {} span_bytes {} is smaller than one request",
        index,
        spec.span_bytes
    );
    ensure!(
        (0.0..=1.0).contains(&config.write_ratio),
        "traffic write_ratio {} is not a probability",
        config.write_ratio
    );

    let kind = match spec.kind.trim().to_ascii_lowercase().as_str() {
        "strided" => {
            ensure!(
                spec.stride % req_bytes as u64 == 0,
                "traffic pattern {} stride {} is not a multiple of req_bytes {}",
                index,
                spec.stride,
                req_bytes
            );
            PatternKind::Strided { stride: spec.stride }
        }
        "random" => PatternKind::Random,
        other => bail!(
            "unsupported traffic pattern kind '{}' at index {} (expected strided|random)",
            other,
            index
        ),
    };
    let op = parse_op(&spec.op)?;

    let name = if spec.name.is_empty() {
        match kind {
            PatternKind::Strided { stride } => {
                format!("strided({})@{}_{}", stride, req_bytes, op.short())
            }
            PatternKind::Random => format!("random({})@{}_{}", spec.seed, req_bytes, op.short()),
        }
    } else {
        spec.name.clone()
    };

    Ok(CompiledPattern {
        name,
        op,
        req_bytes,
        base: spec.base,
        span_bytes: spec.span_bytes - spec.span_bytes % req_bytes as u64,
        seed: spec.seed,
        kind,
    })
}

fn parse_op(op: &str) -> anyhow::Result<PatternOp> {
    match op.trim().to_ascii_lowercase().as_str() {
        "read" | "r" | "load" => Ok(PatternOp::Read),
        "write" | "w" | "store" => Ok(PatternOp::Write),
        "mixed" | "rw" => Ok(PatternOp::Mixed),
        other => bail!("unsupported traffic op '{}'; expected read/write/mixed", other),
    }
}
