//! The per-worker observe → decide → act loop.
//!
//! Each iteration reads a snapshot, POSTs it to the agent, executes the returned
//! action and then sleeps `1 / rate`. Agent outages back off and retry forever;
//! only `terminate`, the shutdown future, or a dead UI session end the loop.

use anyhow::anyhow;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::brain::AgentClient;
use crate::error::BridgeError;
use crate::executor::{ActionExecutor, ControlMode, Outcome};
use crate::hands::UiSession;
use crate::interpolate::Interpolation;
use crate::locator::LocatorResolver;
use crate::state;

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub agent_url: String,
    /// Target iterations per second.
    pub rate: f64,
    pub vision: bool,
    pub mode: ControlMode,
    pub request_timeout: Duration,
    pub backoff: Duration,
    /// Consecutive failed state reads after which the session is considered dead.
    pub max_session_faults: u32,
    pub interpolation: Interpolation,
    pub locator: LocatorResolver,
}

impl BridgeSettings {
    pub fn new(agent_url: impl Into<String>, rate: f64) -> Self {
        Self {
            agent_url: agent_url.into(),
            rate,
            vision: false,
            mode: ControlMode::default(),
            request_timeout: Duration::from_secs(30),
            backoff: Duration::from_secs(2),
            max_session_faults: 5,
            interpolation: Interpolation::default(),
            locator: LocatorResolver::default(),
        }
    }

    /// Minimum delay between the end of one iteration and the start of the next.
    pub fn pacing(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate)
    }

    /// Pause after a failed exchange. Never shorter than the pacing delay.
    pub fn retry_delay(&self) -> Duration {
        self.backoff.max(self.pacing())
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(BridgeError::Config(format!(
                "rate must be a positive number of Hz, got {}",
                self.rate
            )));
        }
        if self.max_session_faults == 0 {
            return Err(BridgeError::Config(
                "max_session_faults must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The agent sent `terminate`.
    Terminated,
    /// The shutdown future resolved.
    Interrupted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub iterations: u64,
    pub exchanges: u64,
    pub network_faults: u64,
    pub unresolved: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReport {
    pub exit: BridgeExit,
    pub stats: BridgeStats,
}

pub struct Bridge<S> {
    settings: BridgeSettings,
    client: AgentClient,
    executor: Arc<Mutex<ActionExecutor<S>>>,
}

impl<S: UiSession + 'static> Bridge<S> {
    pub fn new(session: S, settings: BridgeSettings) -> Result<Self, BridgeError> {
        settings.validate()?;
        let client = AgentClient::new(&settings.agent_url, settings.request_timeout)?;
        let executor = ActionExecutor::new(
            session,
            settings.mode,
            settings.interpolation,
            settings.locator,
        );
        Ok(Self {
            settings,
            client,
            executor: Arc::new(Mutex::new(executor)),
        })
    }

    /// Drive the loop until `terminate`, `shutdown`, or a fatal session error.
    /// The UI session is released when this returns, on every path.
    pub async fn run<F>(self, shutdown: F) -> Result<BridgeReport, BridgeError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(agent = %self.client.url(), rate = self.settings.rate, "Bridge loop starting");

        let mut stats = BridgeStats::default();
        let exit = tokio::select! {
            result = self.drive(&mut stats) => result,
            () = shutdown => {
                tracing::info!("Stopping...");
                Ok(BridgeExit::Interrupted)
            }
        };

        match &exit {
            Ok(exit) => tracing::info!(?exit, ?stats, "Bridge loop finished"),
            Err(e) => tracing::error!(?stats, "Bridge loop failed: {}", e),
        }
        drop(self);
        exit.map(|exit| BridgeReport { exit, stats })
    }

    async fn drive(&self, stats: &mut BridgeStats) -> Result<BridgeExit, BridgeError> {
        let vision = self.settings.vision;
        let mut session_faults = 0;

        loop {
            stats.iterations += 1;

            let snapshot = match self
                .blocking(move |exec| state::capture(exec.session_mut(), vision))
                .await?
            {
                Ok(snapshot) => {
                    session_faults = 0;
                    snapshot
                }
                Err(e) => {
                    session_faults += 1;
                    if session_faults >= self.settings.max_session_faults {
                        return Err(BridgeError::Session(e));
                    }
                    tracing::warn!("Could not read app state, sending null: {:#}", e);
                    None
                }
            };

            let action = match self.client.exchange(&snapshot).await {
                Ok(action) => action,
                Err(e) if e.is_transient() => {
                    stats.network_faults += 1;
                    let delay = self.settings.retry_delay();
                    tracing::warn!(
                        kind = e.kind(),
                        "Connection Error to Agent Server: {}; retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            };
            stats.exchanges += 1;

            let outcome = self.blocking(move |exec| exec.execute(&action)).await?;
            match outcome {
                Outcome::Terminate => return Ok(BridgeExit::Terminated),
                Outcome::Unresolved(_) => stats.unresolved += 1,
                _ => {}
            }

            tokio::time::sleep(self.settings.pacing()).await;
        }
    }

    /// Run a driver call off the async runtime; the driver blocks. The caller's
    /// span follows the call onto the blocking pool.
    async fn blocking<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut ActionExecutor<S>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let executor = Arc::clone(&self.executor);
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            span.in_scope(|| -> anyhow::Result<R> {
                let mut guard = executor
                    .lock()
                    .map_err(|_| anyhow!("executor lock poisoned"))?;
                Ok(f(&mut guard))
            })
        })
        .await
        .map_err(|e| BridgeError::Session(anyhow!("UI task failed: {}", e)))?
        .map_err(BridgeError::Session)
    }
}
