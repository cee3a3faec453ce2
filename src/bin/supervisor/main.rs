use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenvy::dotenv;
use icalc_bridge::config::SupervisorArgs;
use icalc_bridge::logging;
use icalc_bridge::shutdown::shutdown_signal;
use icalc_bridge::supervisor::{self, BridgeCommand, StopReason, Supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logging::init();

    let args = SupervisorArgs::parse();
    let shutdown = shutdown_signal();
    tracing::info!(
        server = %args.server_ip,
        workers = args.workers,
        rate = args.rate,
        headless = args.headless,
        "Starting client bridges"
    );

    let specs = supervisor::allocate(
        args.workers,
        args.port_plan(),
        args.rate,
        args.headless,
        args.vision,
    )?;
    let launcher = BridgeCommand {
        program: args.bridge_bin().context("locating the icalc-bridge binary")?,
        server_ip: args.server_ip.clone(),
        mode: args.control_mode,
        app_dir: args.app_dir.clone(),
    };

    tracing::info!("Running bridges... Press Ctrl+C to stop.");
    let report = Supervisor::new(launcher, args.settings())
        .run(&specs, shutdown)
        .await;

    tracing::info!(
        launched = report.launched,
        failed = report.failed_launches,
        reason = ?report.reason,
        "Supervisor stopped"
    );

    if report.reason == StopReason::AllExited && report.launched == 0 && !specs.is_empty() {
        bail!("no bridge worker could be launched");
    }
    Ok(())
}
