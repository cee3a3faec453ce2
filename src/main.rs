use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use icalc_bridge::assets::AssetServer;
use icalc_bridge::config::BridgeArgs;
use icalc_bridge::hands::BrowserSession;
use icalc_bridge::shutdown::shutdown_signal;
use icalc_bridge::{Bridge, logging};
use std::net::SocketAddr;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logging::init();

    let args = BridgeArgs::parse();
    let span = match args.worker_index {
        Some(index) => tracing::info_span!("worker", index),
        None => tracing::Span::none(),
    };

    run(args).instrument(span).await
}

async fn run(args: BridgeArgs) -> Result<()> {
    // Handlers go in before anything that owns a child process.
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let settings = args.settings()?;

    // 1. Serve the app first so the browser has something to load
    let assets = AssetServer::start(&args.app_dir, SocketAddr::from(([0, 0, 0, 0], args.port)))
        .await?;

    let app_url = args.app_url();
    tracing::info!("Starting icalc Bridge Client...");
    tracing::info!("Target App: {}", app_url);
    tracing::info!("Agent Server: {}", settings.agent_url);

    // 2. Launch the browser in a blocking task (it can take a while)
    let launch = args.launch_config();
    let mut launching =
        tokio::task::spawn_blocking(move || BrowserSession::launch(&launch, &app_url));
    let session = tokio::select! {
        session = &mut launching => session.context("browser launch panicked")?,
        () = &mut shutdown => {
            tracing::info!("Stopping before the browser is up...");
            // The launch cannot be cancelled; let it finish and close what it opened.
            drop(launching.await);
            assets.shutdown().await;
            return Ok(());
        }
    };
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to start Chrome: {:#}", e);
            assets.shutdown().await;
            return Err(e);
        }
    };

    // 3. Drive the loop; the browser is closed when the bridge returns
    let outcome = match Bridge::new(session, settings) {
        Ok(bridge) => bridge.run(&mut shutdown).await,
        Err(e) => Err(e),
    };

    assets.shutdown().await;
    let report = outcome?;
    tracing::info!(exit = ?report.exit, iterations = report.stats.iterations, "Bridge stopped");
    Ok(())
}
