//! Multi-zone audio policy (mzap-policy) - Main entry point
//!
//! Builds the policy engine on the simulated HAL from a hardware inventory,
//! replays a scenario file against it and prints each step's outcome
//! followed by the final policy state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mzap_common::config::{load_policy_config, CONFIG_ENV_VAR};
use mzap_policy::{AudioPolicyManager, Scenario, SimulatedHal};

/// Command-line arguments for mzap-policy
#[derive(Parser, Debug)]
#[command(name = "mzap-policy")]
#[command(about = "Multi-zone audio policy engine driven by scenario files")]
#[command(version)]
struct Args {
    /// Hardware inventory (TOML); falls back to MZAP_POLICY_CONFIG, then the
    /// user and system configuration directories
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario to replay (TOML)
    #[arg(short, long, env = "MZAP_POLICY_SCENARIO")]
    scenario: Option<PathBuf>,

    /// Print the final state as JSON instead of the text dump
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mzap_policy=debug,mzap_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = load_policy_config(args.config.as_deref(), CONFIG_ENV_VAR)
        .context("Failed to load audio policy configuration")?;
    info!(
        "Inventory: {} modules, attached outputs {:?}",
        config.modules.len(),
        config.attached_output_devices
    );

    let mut manager = AudioPolicyManager::new(SimulatedHal::new(), config)
        .context("Failed to initialize audio policy")?;

    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?,
        None => Scenario::default(),
    };

    let reports = scenario.run(&mut manager);
    let failed = reports.iter().filter(|report| !report.ok).count();
    info!("Scenario done: {} steps, {} failed", reports.len(), failed);

    if args.json {
        let output = serde_json::json!({
            "steps": reports,
            "state": manager.snapshot(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize policy state")?
        );
    } else {
        for report in &reports {
            println!(
                "[{:>3}] {:<20} {} {}",
                report.index,
                report.op,
                if report.ok { "ok  " } else { "FAIL" },
                report.detail
            );
        }
        if !reports.is_empty() {
            println!();
        }
        print!("{}", manager.dump());
    }

    Ok(())
}
