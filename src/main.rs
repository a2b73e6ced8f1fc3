use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use hybridsim::sim::config::SimulatorConfig;
use hybridsim::sim::report;
use hybridsim::sim::top::SimTop;
use hybridsim::sim::trace::{load_trace, replay, ReplayClient, TraceStream};

#[derive(Parser)]
#[command(version, about)]
struct SimArgs {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many cycles (overrides the config)
    #[arg(long)]
    run_limit: Option<u64>,

    /// Write the stats snapshot as JSON to this path
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// One trace file per process
    trace_files: Vec<PathBuf>,
}

fn run(argv: SimArgs) -> Result<()> {
    let mut config = match &argv.config {
        Some(path) => SimulatorConfig::from_file(path)?,
        None => {
            let config = SimulatorConfig::default();
            config.validate()?;
            config
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.sim.log_level),
    )
    .init();
    if let Some(limit) = argv.run_limit {
        config.sim.run_limit = limit;
    }
    if config.sim.num_processes < argv.trace_files.len() {
        config.sim.num_processes = argv.trace_files.len();
    }
    let stats_json = argv
        .stats_json
        .clone()
        .or_else(|| config.sim.stats_json.as_ref().map(PathBuf::from));

    let mut top = SimTop::new(Arc::new(config))?;
    let mut streams = Vec::new();
    for (pid, path) in argv.trace_files.iter().enumerate() {
        let commands = load_trace(path)?;
        info!("{}: {} trace commands", path.display(), commands.len());
        let handle = Arc::new(RwLock::new(ReplayClient::default()));
        let client = top.register_client(handle.clone());
        streams.push(TraceStream::new(commands, pid, client, handle));
    }

    replay(&mut top, &mut streams);

    let snapshot = top.snapshot();
    report::print_report(&snapshot);
    for stream in &streams {
        let completed = stream.completed();
        let avg = if completed > 0 {
            stream.total_latency() as f64 / completed as f64
        } else {
            0.0
        };
        println!(
            "pid{}.completed={} pid{}.avg_latency={:.2}",
            stream.pid(),
            completed,
            stream.pid(),
            avg
        );
    }
    if let Some(path) = stats_json {
        report::write_json(&path, &snapshot)
            .with_context(|| format!("cannot write stats to {}", path.display()))?;
    }
    Ok(())
}

pub fn main() {
    let argv = SimArgs::parse();
    if let Err(err) = run(argv) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
