use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use icalc_bridge::config::AgentArgs;
use icalc_bridge::face::{self, AgentState, StepPolicy};
use icalc_bridge::logging;
use icalc_bridge::shutdown::shutdown_signal;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logging::init();

    let args = AgentArgs::parse();

    let policy = match &args.script {
        Some(path) => {
            let policy = StepPolicy::from_script_file(path, args.terminate_after_script)?;
            tracing::info!("Replaying script {}", path.display());
            policy
        }
        None => StepPolicy::Idle,
    };
    let state = AgentState::new(policy);

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind agent server to {addr}"))?;

    tracing::info!("Waiting for state data from icalc bridge...");
    face::serve(listener, state, shutdown_signal()).await?;
    tracing::info!("Shutting down server...");
    Ok(())
}
