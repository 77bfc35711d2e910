use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use toml::Table;

use simcache::sim::config::{CacheConfig, Config, MemConfig, SimConfig};
use simcache::sim::top::Sim;
use simcache::traffic::TrafficConfig;

#[derive(Parser)]
#[command(version, about)]
struct SimcacheArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override cache lookup latency in ticks")]
    latency: Option<u64>,
    #[arg(long, help = "Override number of requests per requester")]
    num_requests: Option<u64>,
    #[arg(long, help = "Enable log at level (0:none, 1:info, 2:debug)")]
    log: Option<u64>,
    #[arg(long, help = "Also write the run summary to this file")]
    results_json: Option<PathBuf>,
}

fn level_filter(level: u64) -> LevelFilter {
    match level {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

pub fn main() -> anyhow::Result<()> {
    let argv = SimcacheArgs::parse();
    let config = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read config file {}", argv.config_path.display()))?;

    let config_table: Table = toml::from_str(&config).context("cannot parse config toml")?;
    let mut sim_config = SimConfig::from_section(config_table.get("sim"))?;
    sim_config.log_level = argv.log.unwrap_or(sim_config.log_level);
    env_logger::Builder::from_default_env()
        .filter_level(level_filter(sim_config.log_level))
        .init();

    let mut cache_config = CacheConfig::from_section(config_table.get("cache"))?;
    let mem_config = match config_table.get("mem") {
        Some(section) => Some(MemConfig::from_section(Some(section))?),
        None => None,
    };
    let mut traffic_config = TrafficConfig::from_section(config_table.get("traffic"))?;

    // override toml configs with argv
    sim_config.results_json = argv.results_json.or(sim_config.results_json);
    cache_config.latency = argv.latency.unwrap_or(cache_config.latency);
    traffic_config.num_requests = argv.num_requests.unwrap_or(traffic_config.num_requests);

    let results_json = sim_config.results_json.clone();
    let mut sim = Sim::new(sim_config, cache_config, mem_config, traffic_config)?;
    let summary = sim.simulate();

    let json = serde_json::to_string_pretty(&summary)?;
    println!("{}", json);
    if let Some(path) = results_json {
        fs::write(&path, &json).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
