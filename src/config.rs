use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::BridgeSettings;
use crate::error::BridgeError;
use crate::executor::ControlMode;
use crate::hands::LaunchConfig;
use crate::interpolate::Interpolation;
use crate::locator::LocatorResolver;
use crate::supervisor::{PortPlan, SupervisorSettings};

/// Bridge for icalc: drives one calculator instance on behalf of a remote agent.
#[derive(Parser, Debug, Clone)]
#[command(name = "icalc-bridge", version)]
pub struct BridgeArgs {
    /// Full URL of the agent step endpoint
    #[arg(long, env = "ICALC_AGENT_URL", default_value = "http://localhost:9000/step")]
    pub agent_url: String,

    /// Port to serve the app on
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Transfer rate in Hz
    #[arg(long, default_value_t = 60.0)]
    pub rate: f64,

    /// Run browser in headless mode
    #[arg(long)]
    pub headless: bool,

    /// Enable sending screenshots
    #[arg(long)]
    pub vision: bool,

    /// Directory holding the calculator's static files
    #[arg(long, default_value = ".")]
    pub app_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = ControlMode::Pointer)]
    pub control_mode: ControlMode,

    /// Index assigned by the supervisor; only used to tag log lines
    #[arg(long)]
    pub worker_index: Option<u16>,

    #[arg(long, default_value_t = 30_000)]
    pub request_timeout_ms: u64,

    /// Pause after a failed agent exchange
    #[arg(long, default_value_t = 2_000)]
    pub backoff_ms: u64,

    /// Consecutive failed state reads before the browser is given up on
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_session_faults: u32,

    /// How long to wait for a button to become clickable
    #[arg(long, default_value_t = 500)]
    pub locator_wait_ms: u64,

    #[arg(long, default_value_t = 50)]
    pub locator_poll_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub move_duration_ms: u64,

    #[arg(long, default_value_t = 10)]
    pub move_steps: u32,

    /// Delay after page load before the first capture
    #[arg(long, default_value_t = 1_000)]
    pub settle_ms: u64,

    #[arg(long, default_value_t = 1024)]
    pub window_width: u32,

    #[arg(long, default_value_t = 768)]
    pub window_height: u32,
}

impl BridgeArgs {
    pub fn app_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn settings(&self) -> Result<BridgeSettings, BridgeError> {
        let settings = BridgeSettings {
            agent_url: self.agent_url.clone(),
            rate: self.rate,
            vision: self.vision,
            mode: self.control_mode,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            backoff: Duration::from_millis(self.backoff_ms),
            max_session_faults: self.max_session_faults,
            interpolation: Interpolation {
                duration: Duration::from_millis(self.move_duration_ms),
                steps: self.move_steps,
            },
            locator: LocatorResolver {
                wait: Duration::from_millis(self.locator_wait_ms),
                poll: Duration::from_millis(self.locator_poll_ms),
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            headless: self.headless,
            window_size: (self.window_width, self.window_height),
            settle: Duration::from_millis(self.settle_ms),
            ..LaunchConfig::default()
        }
    }
}

/// Starts and watches several bridge workers.
#[derive(Parser, Debug, Clone)]
#[command(name = "supervisor", version)]
pub struct SupervisorArgs {
    /// IP address of the agent server
    #[arg(long, env = "ICALC_SERVER_IP")]
    pub server_ip: String,

    /// Number of parallel workers
    #[arg(long, default_value_t = 1)]
    pub workers: u16,

    /// Added to every port, so several supervisors can share a host
    #[arg(long, default_value_t = 0)]
    pub offset: u16,

    /// Transfer rate in Hz
    #[arg(long, default_value_t = 60.0)]
    pub rate: f64,

    /// Run browsers in headless mode
    #[arg(long)]
    pub headless: bool,

    /// Enable sending screenshots
    #[arg(long)]
    pub vision: bool,

    #[arg(long, value_enum, default_value_t = ControlMode::Pointer)]
    pub control_mode: ControlMode,

    #[arg(long, default_value_t = 8000)]
    pub base_app_port: u16,

    #[arg(long, default_value_t = 9000)]
    pub base_agent_port: u16,

    /// Directory holding the calculator's static files, passed to every worker
    #[arg(long)]
    pub app_dir: Option<PathBuf>,

    /// Bridge executable; defaults to `icalc-bridge` next to this binary
    #[arg(long)]
    pub bridge_bin: Option<PathBuf>,

    #[arg(long, default_value_t = 1_000)]
    pub stagger_ms: u64,

    #[arg(long, default_value_t = 1_000)]
    pub poll_ms: u64,

    /// Wait this long for a worker to exit after terminate before killing it;
    /// 0 waits forever
    #[arg(long, default_value_t = 10_000)]
    pub drain_timeout_ms: u64,
}

impl SupervisorArgs {
    pub fn port_plan(&self) -> PortPlan {
        PortPlan {
            base_app_port: self.base_app_port,
            base_agent_port: self.base_agent_port,
            offset: self.offset,
        }
    }

    pub fn settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            stagger: Duration::from_millis(self.stagger_ms),
            poll_interval: Duration::from_millis(self.poll_ms),
            drain_timeout: (self.drain_timeout_ms > 0)
                .then(|| Duration::from_millis(self.drain_timeout_ms)),
        }
    }

    pub fn bridge_bin(&self) -> std::io::Result<PathBuf> {
        if let Some(path) = &self.bridge_bin {
            return Ok(path.clone());
        }
        let exe = std::env::current_exe()?;
        let dir = exe.parent().unwrap_or_else(|| std::path::Path::new("."));
        Ok(dir.join(format!("icalc-bridge{}", std::env::consts::EXE_SUFFIX)))
    }
}

/// Reference agent with a live dashboard.
#[derive(Parser, Debug, Clone)]
#[command(name = "agent", version)]
pub struct AgentArgs {
    #[arg(long, env = "ICALC_AGENT_PORT", default_value_t = 9000)]
    pub port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// JSON array of actions to answer with, one per step
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Answer `terminate` once the script is exhausted
    #[arg(long, requires = "script")]
    pub terminate_after_script: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_defaults_match_reference_timings() {
        let args = BridgeArgs::try_parse_from(["icalc-bridge"]).unwrap();
        let settings = args.settings().unwrap();
        assert_eq!(args.port, 8000);
        assert_eq!(settings.agent_url, "http://localhost:9000/step");
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.backoff, Duration::from_secs(2));
        assert_eq!(settings.max_session_faults, 5);
        assert_eq!(settings.locator.wait, Duration::from_millis(500));
        assert_eq!(settings.interpolation, Interpolation::default());
        assert_eq!(settings.mode, ControlMode::Pointer);
        assert_eq!(args.launch_config().window_size, (1024, 768));
    }

    #[test]
    fn bridge_flags_parse() {
        let args = BridgeArgs::try_parse_from([
            "icalc-bridge",
            "--agent-url",
            "http://10.0.0.2:9003/step",
            "--port",
            "8003",
            "--rate",
            "10",
            "--headless",
            "--vision",
            "--control-mode",
            "keypress",
        ])
        .unwrap();
        assert_eq!(args.app_url(), "http://localhost:8003");
        let settings = args.settings().unwrap();
        assert!(settings.vision);
        assert_eq!(settings.mode, ControlMode::Keypress);
        assert_eq!(settings.pacing(), Duration::from_millis(100));
    }

    #[test]
    fn session_fault_bound_must_be_positive() {
        let zero = BridgeArgs::try_parse_from(["icalc-bridge", "--max-session-faults", "0"]);
        assert!(zero.is_err());
        let args =
            BridgeArgs::try_parse_from(["icalc-bridge", "--max-session-faults", "2"]).unwrap();
        assert_eq!(args.settings().unwrap().max_session_faults, 2);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let args = BridgeArgs::try_parse_from(["icalc-bridge", "--rate", "0"]).unwrap();
        assert!(args.settings().is_err());
    }

    #[test]
    fn supervisor_requires_server_ip() {
        if std::env::var_os("ICALC_SERVER_IP").is_none() {
            assert!(SupervisorArgs::try_parse_from(["supervisor"]).is_err());
        }
        let args = SupervisorArgs::try_parse_from([
            "supervisor",
            "--server-ip",
            "192.168.1.4",
            "--workers",
            "3",
            "--offset",
            "2",
            "--drain-timeout-ms",
            "0",
        ])
        .unwrap();
        assert_eq!(args.port_plan().offset, 2);
        assert_eq!(args.settings().drain_timeout, None);
    }

    #[test]
    fn terminate_flag_needs_a_script() {
        assert!(AgentArgs::try_parse_from(["agent", "--terminate-after-script"]).is_err());
        let args = AgentArgs::try_parse_from(["agent", "--script", "steps.json"]).unwrap();
        assert_eq!(args.port, 9000);
    }
}
