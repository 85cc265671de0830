//! filament-node — drives the simulated peer-to-peer value-transfer network.
//!
//! Startup sequence:
//!   1. Parse CLI flags and the optional JSON config
//!   2. Load (or default) the chain definition document
//!   3. Build the simulation: nodes, users, provisioned chains
//!   4. Run the tick loop, paced by the configured tick interval
//!   5. Print the final report as JSON

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use once_cell::sync::Lazy;
use tracing::info;

use filament_core::definition::{ChainDefinition, SerialRange};
use filament_sim::{SimParams, Simulation};

/// Built-in chain issue used when no definition document is supplied:
/// twenty 100-value chains and ten 500-value chains.
static DEFAULT_DEFINITION: Lazy<ChainDefinition> = Lazy::new(|| ChainDefinition {
    description: Some("filament default issue".into()),
    ranges: vec![
        SerialRange {
            start: 1,
            end: 20,
            value: 100,
        },
        SerialRange {
            start: 100,
            end: 109,
            value: 500,
        },
    ],
});

#[derive(Parser, Debug)]
#[command(
    name = "filament-node",
    version,
    about = "Filament — a simulated peer-to-peer value-transfer network"
)]
struct Args {
    /// Path to a JSON simulation config; missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a JSON chain definition document.
    #[arg(long)]
    definition: Option<PathBuf>,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 500)]
    ticks: u64,

    /// RNG seed override (fixed seed ⇒ reproducible run).
    #[arg(long)]
    seed: Option<u64>,

    /// Node count override.
    #[arg(long)]
    nodes: Option<u32>,

    /// User count override.
    #[arg(long)]
    users: Option<u32>,

    /// Payment rate override.
    #[arg(long)]
    payment_rate: Option<f64>,

    /// Log a snapshot every N ticks (0 disables).
    #[arg(long, default_value_t = 100)]
    snapshot_every: u64,

    /// Ignore the tick interval and run flat out.
    #[arg(long)]
    fast: bool,
}

fn load_params(args: &Args) -> anyhow::Result<SimParams> {
    let mut params = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SimParams::default(),
    };
    if let Some(seed) = args.seed {
        params.seed = seed;
    }
    if let Some(nodes) = args.nodes {
        params.node_count = nodes;
    }
    if let Some(users) = args.users {
        params.user_count = users;
    }
    if let Some(rate) = args.payment_rate {
        params.payment_rate = rate;
    }
    Ok(params)
}

fn load_definition(path: Option<&Path>) -> anyhow::Result<ChainDefinition> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading definition {}", path.display()))?;
            ChainDefinition::parse(&text)
                .map_err(|e| anyhow::anyhow!("parsing definition {}: {e}", path.display()))
        }
        None => Ok(DEFAULT_DEFINITION.clone()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,filament=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let params = load_params(&args)?;
    let definition = load_definition(args.definition.as_deref())?;

    info!(
        nodes = params.node_count,
        users = params.user_count,
        ticks = args.ticks,
        seed = params.seed,
        "filament node starting"
    );

    let mut sim = Simulation::new(params.clone(), &definition)
        .map_err(|e| anyhow::anyhow!("building simulation: {e}"))?;

    let mut interval =
        tokio::time::interval(Duration::from_millis(params.tick_interval_ms.max(1)));
    for _ in 0..args.ticks {
        if !args.fast {
            interval.tick().await;
        }
        let now = sim.run_tick();
        if args.snapshot_every > 0 && now % args.snapshot_every == 0 {
            let snapshot = sim.snapshot();
            info!(
                tick = now,
                accepted = snapshot.stats.records_accepted,
                confirmed = snapshot.stats.transfers_confirmed,
                rejected = snapshot.stats.records_rejected,
                blacklisted = snapshot.security.blacklist_len,
                "snapshot"
            );
        }
    }

    let report = sim.final_report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
