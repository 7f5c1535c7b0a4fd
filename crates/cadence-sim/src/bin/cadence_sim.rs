//! # Cadence Render Loop Simulator
//!
//! Runs a playback scenario through the frame release control and prints
//! what happened to every frame.
//!
//! ## Usage
//!
//! ```bash
//! # Default scenario: 10s of 30fps content on a 60Hz display
//! cadence-sim
//!
//! # Scenario file, JSON report on stdout
//! cadence-sim --scenario stall.toml --json
//!
//! # Same scenario, different decoder jitter seed
//! cadence-sim --scenario stall.toml --seed 42
//! ```

use std::path::PathBuf;

use anyhow::Context;
use cadence_sim::scenario::ScenarioConfig;
use cadence_sim::simulation::Simulation;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Frame release control simulator.
#[derive(Parser, Debug)]
#[command(name = "cadence-sim", about = "Simulate a video render loop against the frame release control")]
struct Cli {
    /// Scenario TOML file. Defaults are used when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Override the scenario seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Print the report as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = match &cli.scenario {
        Some(path) => {
            let input = std::fs::read_to_string(path)
                .with_context(|| format!("reading scenario {}", path.display()))?;
            ScenarioConfig::from_toml_str(&input)?
        }
        None => ScenarioConfig::default(),
    };
    if let Some(seed) = cli.seed {
        cfg.seed = seed;
    }

    let report = Simulation::new(cfg)?.run();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        tracing::info!(
            frames = report.frames_total,
            released_immediately = report.released_immediately,
            released_scheduled = report.released_scheduled,
            dropped = report.dropped,
            dropped_to_keyframe = report.dropped_to_keyframe,
            skipped = report.skipped,
            skipped_to_keyframe = report.skipped_to_keyframe,
            decode_only = report.decode_only,
            undecoded = report.undecoded,
            first_frame_at_ms = ?report.first_frame_at_ms,
            not_ready_ticks = report.not_ready_ticks,
            max_release_lateness_us = report.max_release_lateness_us,
            "report"
        );
    }
    Ok(())
}
