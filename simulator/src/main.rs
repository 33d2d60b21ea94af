//! ChannelPay Simulator
//!
//! Drives the escrow engine against an in-memory token, either through a
//! named scenario or with continuous random traffic.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use channelpay_common::{format_units, TOKEN_DECIMALS};
use channelpay_escrow::EscrowConfig;

mod payer;
mod scenario;
mod controller;
mod metrics;

use controller::SimulationController;
use metrics::OperationKind;
use scenario::Scenario;

/// ChannelPay Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "ChannelPay escrow scenario runner and load simulator")]
struct Args {
    /// Number of simulated payers to create
    #[arg(short, long, default_value = "3")]
    payers: usize,

    /// Scenario to run
    #[arg(short, long)]
    scenario: Option<String>,

    /// Simulation speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = infinite)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = EscrowConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );
    let (json, text) = if args.json_logs {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();

    info!("Starting ChannelPay Simulator");
    info!("Payers: {}", args.payers);
    info!("Speed: {}x", args.speed);
    info!("Owner: {}", config.owner);
    info!("Escrow: {}", config.escrow_address);

    let mut controller = SimulationController::new(args.payers, args.speed, args.seed, config)?;
    controller.initialize().await?;

    info!("Simulator initialized with {} payers", args.payers);

    if let Some(scenario_name) = &args.scenario {
        info!("Running scenario: {}", scenario_name);

        let scenario = Scenario::load(scenario_name)?;
        controller.run_scenario(scenario).await?;
    } else {
        info!("Running in continuous mode");
        info!("Press Ctrl+C to stop");

        let duration = if args.duration > 0 {
            Some(std::time::Duration::from_secs(args.duration))
        } else {
            None
        };

        controller.run(duration).await?;
    }

    let report = controller.report().await;
    info!("Simulation complete");
    info!("Total operations: {}", report.simulation.total_operations());
    info!("Successful: {}", report.simulation.successful_operations());
    info!("Failed: {}", report.simulation.failed_operations());
    info!("Success rate: {:.1}%", report.simulation.success_rate() * 100.0);
    for kind in OperationKind::ALL {
        let stats = report.simulation.kind(kind);
        info!(
            "{}: {} calls, p50 {}µs, p99 {}µs",
            kind.label(),
            stats.count,
            stats.percentile_us(50),
            stats.percentile_us(99)
        );
    }
    for (code, count) in report.simulation.failures_by_code() {
        info!("Rejected {}: {}", code, count);
    }
    info!("Active channels: {}", report.active_channels);
    for (payer, payments) in &report.payments_by_payer {
        info!("Payer {}: {} payments", payer, payments);
    }
    info!(
        "Escrow: {} locked, {} in custody (solvent: {})",
        format_units(report.solvency.total_locked, TOKEN_DECIMALS),
        format_units(report.solvency.custody_balance, TOKEN_DECIMALS),
        report.solvency.is_solvent()
    );
    info!(
        "Engine: {} locked, {} sent, {} registered, {} released",
        report.engine.payments_locked,
        report.engine.payments_sent,
        report.engine.channels_registered,
        report.engine.releases
    );

    if args.json_logs {
        println!("{}", serde_json::to_string_pretty(&report.solvency)?);
    } else {
        println!("{}", controller.prometheus());
    }

    Ok(())
}
