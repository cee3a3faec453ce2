#![allow(dead_code)]

use anyhow::{Result, bail};
use icalc_bridge::face::{self, AgentState, StepPolicy};
use icalc_bridge::types::Position;
use icalc_bridge::UiSession;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Everything the fake page saw, shared with the test after the bridge has
/// taken ownership of the session.
#[derive(Default)]
pub struct PageLog {
    pub calls: Vec<String>,
    pub reads: Vec<Instant>,
    pub released: bool,
}

/// A calculator page without a browser: a fixed state object and a set of
/// buttons addressable by `data-value` / `data-action`.
pub struct FakePage {
    pub state: Option<Value>,
    pub buttons: Vec<String>,
    /// Every state read fails, as with a crashed tab.
    pub broken: bool,
    pub log: Arc<Mutex<PageLog>>,
}

impl FakePage {
    pub fn new(state: Option<Value>, buttons: &[&str]) -> (Self, Arc<Mutex<PageLog>>) {
        let log = Arc::new(Mutex::new(PageLog::default()));
        let page = Self {
            state,
            buttons: buttons.iter().map(|b| b.to_string()).collect(),
            broken: false,
            log: Arc::clone(&log),
        };
        (page, log)
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().calls.push(call);
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        self.log.lock().unwrap().released = true;
    }
}

impl UiSession for FakePage {
    fn read_state(&mut self) -> Result<Option<Value>> {
        self.log.lock().unwrap().reads.push(Instant::now());
        if self.broken {
            bail!("target closed");
        }
        Ok(self.state.clone())
    }

    fn screenshot_base64(&mut self) -> Result<String> {
        Ok("iVBORw0KGgoAAAANSUhEUg==".to_string())
    }

    fn move_pointer(&mut self, to: Position) -> Result<()> {
        self.record(format!("move {} {}", to.x, to.y));
        Ok(())
    }

    fn click(&mut self, at: Position) -> Result<()> {
        self.record(format!("click {} {}", at.x, at.y));
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<()> {
        self.record(format!("press {key}"));
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        self.record(format!("type {text}"));
        Ok(())
    }

    fn try_click(&mut self, selector: &str) -> Result<bool> {
        if selector.is_empty() {
            bail!("empty selector");
        }
        let hit = self.buttons.iter().find(|b| {
            selector.contains(&format!("data-value=\"{b}\""))
                || selector.contains(&format!("data-action=\"{b}\""))
        });
        match hit {
            Some(button) => {
                self.record(format!("button {button}"));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct RunningAgent {
    pub addr: SocketAddr,
    pub state: Arc<AgentState>,
}

impl RunningAgent {
    pub fn step_url(&self) -> String {
        format!("http://{}/step", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve the reference agent on an ephemeral localhost port.
pub async fn spawn_agent(policy: StepPolicy) -> RunningAgent {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    spawn_agent_on(listener, policy)
}

pub fn spawn_agent_on(listener: tokio::net::TcpListener, policy: StepPolicy) -> RunningAgent {
    let addr = listener.local_addr().unwrap();
    let state = AgentState::new(policy);
    let served = Arc::clone(&state);
    tokio::spawn(async move {
        face::serve(listener, served, std::future::pending()).await.unwrap();
    });
    RunningAgent { addr, state }
}

/// A localhost port nothing is listening on (for now).
pub fn free_port() -> u16 {
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

pub fn fast_settings(agent_url: String, rate: f64) -> icalc_bridge::BridgeSettings {
    let mut settings = icalc_bridge::BridgeSettings::new(agent_url, rate);
    settings.request_timeout = Duration::from_secs(5);
    settings.backoff = Duration::from_millis(50);
    settings.interpolation.duration = Duration::ZERO;
    settings.interpolation.steps = 5;
    settings.locator.wait = Duration::from_millis(40);
    settings.locator.poll = Duration::from_millis(10);
    settings
}
