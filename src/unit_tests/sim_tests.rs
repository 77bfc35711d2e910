use crate::sim::config::{CacheConfig, MemConfig, SimConfig};
use crate::sim::top::Sim;
use crate::traffic::{TrafficConfig, TrafficPatternSpec};

fn strided(base: u64, req_bytes: u32, stride: u64, span_bytes: u64, op: &str) -> TrafficPatternSpec {
    TrafficPatternSpec {
        kind: "strided".to_string(),
        op: op.to_string(),
        base,
        req_bytes,
        stride,
        span_bytes,
        ..TrafficPatternSpec::default()
    }
}

fn traffic(num_requests: u64, patterns: Vec<TrafficPatternSpec>) -> TrafficConfig {
    TrafficConfig {
        num_requests,
        patterns,
        ..TrafficConfig::default()
    }
}

#[test]
fn sequential_reads_miss_once_per_block() {
    let mut sim = Sim::new(
        SimConfig::default(),
        CacheConfig::default(),
        Some(MemConfig::default()),
        traffic(64, vec![strided(0, 8, 8, 4096, "read")]),
    )
    .unwrap();
    let summary = sim.simulate();

    assert!(summary.finished);
    // 64 reads of 8 bytes cover 8 blocks
    assert_eq!(8, summary.cache.misses());
    assert_eq!(56, summary.cache.hits());
    assert_eq!(8, summary.memory.reads);
    assert_eq!(64, summary.requesters[0].completed);
    assert!((summary.hit_ratio - 56.0 / 64.0).abs() < 1e-9);
    assert_eq!(8, summary.cache.miss_latency().samples());
}

#[test]
fn small_cache_thrashes_and_writes_back_dirty_blocks() {
    let cache = CacheConfig {
        size: 64,
        ..CacheConfig::default()
    };
    let mut sim = Sim::new(
        SimConfig::default(),
        cache,
        Some(MemConfig::default()),
        traffic(32, vec![strided(0, 8, 64, 512, "write")]),
    )
    .unwrap();
    let summary = sim.simulate();

    assert!(summary.finished);
    assert_eq!(32, summary.cache.misses());
    assert_eq!(0, summary.cache.hits());
    // every fill after the first pushes out the previous, dirty, block
    assert_eq!(31, summary.cache.writebacks());
    assert_eq!(31, summary.memory.writebacks);
    assert_eq!(1, sim.cache().store().len());
}

#[test]
fn written_data_reaches_memory_on_eviction() {
    let cache = CacheConfig {
        size: 64,
        ..CacheConfig::default()
    };
    let mut sim = Sim::new(
        SimConfig::default(),
        cache,
        Some(MemConfig::default()),
        traffic(2, vec![strided(0x100, 8, 64, 128, "write")]),
    )
    .unwrap();
    sim.simulate();
    // the second write evicted the first block
    let expected = crate::traffic::requester::write_pattern(0x100, 0, 8);
    assert_eq!(&expected[..], sim.memory().peek(0x100, 8).unwrap());
    assert_eq!(1, sim.cache().stats().writebacks());
}

#[test]
fn memory_backpressure_and_response_stalls_still_finish() {
    let mem = MemConfig {
        latency: 10,
        bytes_per_tick: 4,
        queue_capacity: 1,
        ..MemConfig::default()
    };
    let cache = CacheConfig {
        size: 256,
        num_cpu_ports: 3,
        ..CacheConfig::default()
    };
    let traffic = TrafficConfig {
        num_requests: 200,
        resp_stall_every: 3,
        write_ratio: 0.5,
        patterns: vec![
            strided(0, 8, 40, 8192, "mixed"),
            TrafficPatternSpec {
                kind: "random".to_string(),
                op: "mixed".to_string(),
                base: 0x4000,
                span_bytes: 4096,
                seed: 9,
                ..TrafficPatternSpec::default()
            },
        ],
        ..TrafficConfig::default()
    };
    let mut sim = Sim::new(SimConfig::default(), cache, Some(mem), traffic).unwrap();
    let summary = sim.simulate();

    assert!(summary.finished, "{:?}", summary);
    assert_eq!(3, summary.requesters.len());
    for stats in &summary.requesters {
        assert_eq!(200, stats.completed);
        assert!(stats.responses_refused > 0);
    }
    assert!(summary.cache.rejected_requests() > 0);
    assert_eq!(600, summary.cache.hits() + summary.cache.misses());
    assert!(!sim.cache().is_blocked());
    assert!(!sim.cache().mem_port_blocked());
    assert_eq!(0, sim.memory().outstanding());
}

#[test]
fn runs_are_reproducible() {
    let config = r#"
        [cache]
        size = 512
        num_cpu_ports = 2
        seed = 5

        [mem]
        latency = 7

        [traffic]
        num_requests = 300
        write_ratio = 0.3

        [[traffic.patterns]]
        kind = "random"
        op = "mixed"
        span_bytes = 16384
        seed = 1
    "#;
    let first = Sim::from_toml(config).unwrap().simulate();
    let second = Sim::from_toml(config).unwrap().simulate();
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
    assert!(first.finished);
}

#[test]
fn tick_limit_stops_the_run() {
    let sim_config = SimConfig {
        max_ticks: 100,
        ..SimConfig::default()
    };
    let mut sim = Sim::new(
        sim_config,
        CacheConfig::default(),
        Some(MemConfig::default()),
        traffic(10_000, vec![]),
    )
    .unwrap();
    let summary = sim.simulate();
    assert!(!summary.finished);
    assert!(summary.ticks <= 100);
}

#[test]
fn requesters_learn_memory_range_at_init() {
    let mem = MemConfig {
        base: 0x10000,
        size: 0x8000,
        ..MemConfig::default()
    };
    let mut sim = Sim::new(
        SimConfig::default(),
        CacheConfig::default(),
        Some(mem),
        traffic(1, vec![]),
    )
    .unwrap();
    sim.init();
    for requester in sim.requesters() {
        assert!(requester.ranges().contains(0x10000));
        assert!(!requester.ranges().contains(0x18000));
    }
    let summary = sim.simulate();
    assert_eq!(1, summary.requesters[0].completed);
}

#[test]
fn missing_mem_section_is_an_unbound_port() {
    let err = Sim::from_toml("[cache]\nlatency = 2\n").err().expect("no memory bound");
    assert!(format!("{:#}", err).contains("not connected"));
}

#[test]
fn requester_count_must_match_cpu_ports() {
    let err = Sim::from_toml("[cache]\nnum_cpu_ports = 2\n[mem]\n[traffic]\nnum_requesters = 1\n")
        .err()
        .expect("one port left dangling");
    assert!(format!("{:#}", err).contains("every port must be connected"));
}

#[test]
fn bad_configs_are_rejected() {
    assert!(Sim::from_toml("[cache]\nblock_size = 48\n[mem]\n").is_err());
    assert!(Sim::from_toml("[cache]\nlatency = -1\n[mem]\n").is_err());
    assert!(Sim::from_toml("[mem]\nqueue_capacity = 0\n").is_err());
    // footprint runs past the end of memory
    assert!(Sim::from_toml(
        "[mem]\nsize = 4096\n[[traffic.patterns]]\nspan_bytes = 8192\n"
    )
    .is_err());
    // memory that ends or starts in the middle of a block
    let err = Sim::from_toml("[mem]\nsize = 100\n[[traffic.patterns]]\nreq_bytes = 4\nstride = 4\nspan_bytes = 100\n")
        .err()
        .expect("partial last block");
    assert!(format!("{:#}", err).contains("whole 64-byte blocks"));
    assert!(Sim::from_toml("[mem]\nbase = 0x20\nsize = 4096\n[[traffic.patterns]]\nbase = 0x20\n").is_err());
    // requests wider than a block
    assert!(Sim::from_toml(
        "[cache]\nblock_size = 16\nsize = 64\n[mem]\n[[traffic.patterns]]\nreq_bytes = 32\nstride = 32\n"
    )
    .is_err());
}
