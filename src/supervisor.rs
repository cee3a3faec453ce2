//! Launches and watches a fleet of independent bridge processes.
//!
//! Lifecycle: `Starting → Running → Draining → Stopped`. A worker exiting never
//! affects its siblings; the supervisor stops once every worker is gone or on
//! interrupt, in which case it asks every live worker to terminate at once and
//! waits out a single drain window.

use clap::ValueEnum;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::error::BridgeError;
use crate::executor::ControlMode;

/// Port bases and the offset shared by one supervisor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPlan {
    pub base_app_port: u16,
    pub base_agent_port: u16,
    pub offset: u16,
}

impl Default for PortPlan {
    fn default() -> Self {
        Self {
            base_app_port: 8000,
            base_agent_port: 9000,
            offset: 0,
        }
    }
}

/// Everything one worker process is launched with. Fixed once launched.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    pub index: u16,
    pub app_port: u16,
    pub agent_port: u16,
    pub rate: f64,
    pub headless: bool,
    pub vision: bool,
}

impl WorkerSpec {
    pub fn agent_url(&self, server_ip: &str) -> String {
        format!("http://{}:{}/step", server_ip, self.agent_port)
    }
}

/// Worker `i` gets `(base_app + offset + i, base_agent + offset + i)`.
pub fn allocate(
    workers: u16,
    plan: PortPlan,
    rate: f64,
    headless: bool,
    vision: bool,
) -> Result<Vec<WorkerSpec>, BridgeError> {
    let port = |base: u16, index: u16| {
        base.checked_add(plan.offset)
            .and_then(|p| p.checked_add(index))
            .ok_or_else(|| {
                BridgeError::Config(format!(
                    "port {} + offset {} + worker {} overflows",
                    base, plan.offset, index
                ))
            })
    };

    (0..workers)
        .map(|index| {
            Ok(WorkerSpec {
                index,
                app_port: port(plan.base_app_port, index)?,
                agent_port: port(plan.base_agent_port, index)?,
                rate,
                headless,
                vision,
            })
        })
        .collect()
}

/// Starts one worker process.
pub trait Launch {
    fn launch(&mut self, spec: &WorkerSpec) -> io::Result<Child>;
}

impl<F> Launch for F
where
    F: FnMut(&WorkerSpec) -> io::Result<Child>,
{
    fn launch(&mut self, spec: &WorkerSpec) -> io::Result<Child> {
        self(spec)
    }
}

/// Launches the `icalc-bridge` binary for each worker.
#[derive(Debug, Clone)]
pub struct BridgeCommand {
    pub program: PathBuf,
    pub server_ip: String,
    pub mode: ControlMode,
    pub app_dir: Option<PathBuf>,
}

impl BridgeCommand {
    pub fn args(&self, spec: &WorkerSpec) -> Vec<String> {
        let mut args = vec![
            "--agent-url".to_string(),
            spec.agent_url(&self.server_ip),
            "--port".to_string(),
            spec.app_port.to_string(),
            "--rate".to_string(),
            spec.rate.to_string(),
            "--worker-index".to_string(),
            spec.index.to_string(),
        ];
        if let Some(mode) = self.mode.to_possible_value() {
            args.push("--control-mode".to_string());
            args.push(mode.get_name().to_string());
        }
        if let Some(dir) = &self.app_dir {
            args.push("--app-dir".to_string());
            args.push(dir.display().to_string());
        }
        if spec.headless {
            args.push("--headless".to_string());
        }
        if spec.vision {
            args.push("--vision".to_string());
        }
        args
    }
}

impl Launch for BridgeCommand {
    fn launch(&mut self, spec: &WorkerSpec) -> io::Result<Child> {
        Command::new(&self.program)
            .args(self.args(spec))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every launched worker exited on its own (or none could be launched).
    AllExited,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Delay between consecutive launches.
    pub stagger: Duration,
    pub poll_interval: Duration,
    /// How long to wait for a terminated worker before killing it. `None` waits
    /// indefinitely.
    pub drain_timeout: Option<Duration>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            stagger: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            drain_timeout: Some(Duration::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub launched: usize,
    pub failed_launches: usize,
    pub reason: StopReason,
    /// Phases in the order they were entered.
    pub phases: Vec<SupervisorPhase>,
}

/// Handle to one running worker; liveness is polled.
struct WorkerHandle {
    spec: WorkerSpec,
    child: Child,
    exit: Option<ExitStatus>,
}

impl WorkerHandle {
    fn is_alive(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::warn!(worker = self.spec.index, %status, "Bridge worker exited");
                self.exit = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(worker = self.spec.index, "Cannot poll worker: {}", e);
                true
            }
        }
    }

    fn request_stop(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            match self.child.id() {
                Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from),
                None => Ok(()),
            }
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    fn signal_stop(&mut self) {
        if let Err(e) = self.request_stop() {
            tracing::warn!(worker = self.spec.index, "Failed to signal worker: {}", e);
        }
    }

    /// Wait for a signalled worker to exit, killing it once `deadline` passes.
    async fn finish(&mut self, deadline: Option<Instant>) {
        let index = self.spec.index;
        let waited = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.child.wait())
                .await
                .ok(),
            None => Some(self.child.wait().await),
        };

        match waited {
            Some(Ok(status)) => {
                tracing::info!(worker = index, %status, "Worker stopped");
                self.exit = Some(status);
            }
            Some(Err(e)) => tracing::warn!(worker = index, "Error waiting for worker: {}", e),
            None => {
                tracing::warn!(worker = index, "Worker ignored terminate; killing");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(worker = index, "Failed to kill worker: {}", e);
                }
            }
        }
    }
}

pub struct Supervisor<L> {
    launcher: L,
    settings: SupervisorSettings,
    phases: Vec<SupervisorPhase>,
}

impl<L: Launch> Supervisor<L> {
    pub fn new(launcher: L, settings: SupervisorSettings) -> Self {
        Self {
            launcher,
            settings,
            phases: Vec::new(),
        }
    }

    fn enter(&mut self, phase: SupervisorPhase) {
        tracing::info!(?phase, "Supervisor phase");
        self.phases.push(phase);
    }

    pub async fn run<F>(mut self, specs: &[WorkerSpec], shutdown: F) -> SupervisorReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut workers: Vec<WorkerHandle> = Vec::with_capacity(specs.len());
        let mut failed_launches = 0;
        let mut interrupted = false;

        self.enter(SupervisorPhase::Starting);
        for (i, spec) in specs.iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.stagger) => {}
                    () = &mut shutdown => {
                        interrupted = true;
                        break;
                    }
                }
            }

            tracing::info!(
                worker = spec.index,
                app_port = spec.app_port,
                agent_port = spec.agent_port,
                "Starting bridge worker"
            );
            match self.launcher.launch(spec) {
                Ok(child) => workers.push(WorkerHandle {
                    spec: spec.clone(),
                    child,
                    exit: None,
                }),
                Err(e) => {
                    failed_launches += 1;
                    tracing::error!(worker = spec.index, "Failed to launch worker: {}", e);
                }
            }
        }

        if !interrupted {
            self.enter(SupervisorPhase::Running);
            interrupted = self.watch(&mut workers, &mut shutdown).await;
        }

        if interrupted {
            self.enter(SupervisorPhase::Draining);
            let mut draining = Vec::new();
            for worker in workers.iter_mut() {
                if worker.is_alive() {
                    worker.signal_stop();
                    draining.push(worker);
                }
            }
            // One shared deadline: every worker gets the full drain window at once.
            let deadline = self.settings.drain_timeout.map(|t| Instant::now() + t);
            for worker in draining {
                worker.finish(deadline).await;
            }
        } else {
            tracing::info!("All bridges stopped.");
        }

        self.enter(SupervisorPhase::Stopped);
        SupervisorReport {
            launched: workers.len(),
            failed_launches,
            reason: if interrupted {
                StopReason::Interrupted
            } else {
                StopReason::AllExited
            },
            phases: self.phases,
        }
    }

    /// Poll until every worker is gone (`false`) or shutdown fires (`true`).
    async fn watch<F>(&self, workers: &mut [WorkerHandle], shutdown: &mut std::pin::Pin<&mut F>) -> bool
    where
        F: Future<Output = ()>,
    {
        loop {
            let mut live = 0;
            for worker in workers.iter_mut() {
                if worker.is_alive() {
                    live += 1;
                }
            }
            if live == 0 {
                return false;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                () = shutdown.as_mut() => return true,
            }
        }
    }
}
