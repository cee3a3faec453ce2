//! Reference agent service: accepts snapshots on `POST /step`, answers with an
//! action (or `{}`), exposes the latest snapshot on `GET /state`, and streams a
//! per-step event feed to the dashboard on `GET /events`.

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Html;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::SnapshotSlot;
use crate::types::Action;

/// Events streamed to the dashboard via SSE.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentEvent {
    Step { number: u64, reply: String },
    MalformedStep { message: String },
}

impl AgentEvent {
    fn to_sse_event(&self) -> Event {
        match self {
            AgentEvent::Step { number, reply } => Event::default()
                .event("step")
                .data(json!({ "number": number, "reply": reply }).to_string()),
            AgentEvent::MalformedStep { message } => Event::default()
                .event("step_error")
                .data(json!({ "message": message }).to_string()),
        }
    }
}

/// What `/step` answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum StepPolicy {
    /// Always `{}`.
    Idle,
    /// Replay `actions` one per step, then `{}` (or `terminate`).
    Script {
        actions: VecDeque<Value>,
        then_terminate: bool,
    },
}

impl StepPolicy {
    /// Load a JSON array of actions.
    pub fn from_script_file(path: &Path, then_terminate: bool) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        let actions: Vec<Value> = serde_json::from_str(&raw)
            .with_context(|| format!("script {} is not a JSON array", path.display()))?;
        Ok(StepPolicy::Script {
            actions: actions.into(),
            then_terminate,
        })
    }

    pub fn script(actions: impl IntoIterator<Item = Value>, then_terminate: bool) -> Self {
        StepPolicy::Script {
            actions: actions.into_iter().collect(),
            then_terminate,
        }
    }

    fn next_reply(&mut self) -> Value {
        match self {
            StepPolicy::Idle => json!({}),
            StepPolicy::Script {
                actions,
                then_terminate,
            } => match actions.pop_front() {
                Some(action) => action,
                None if *then_terminate => json!({ "type": "terminate" }),
                None => json!({}),
            },
        }
    }
}

pub struct AgentState {
    pub slot: SnapshotSlot,
    policy: Mutex<StepPolicy>,
    steps: AtomicU64,
    event_tx: broadcast::Sender<AgentEvent>,
}

impl AgentState {
    pub fn new(policy: StepPolicy) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel::<AgentEvent>(64);
        Arc::new(Self {
            slot: SnapshotSlot::new(json!({})),
            policy: Mutex::new(policy),
            steps: AtomicU64::new(0),
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }
}

pub fn router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/state", get(state_handler))
        .route("/step", post(step_handler))
        .route("/events", get(sse_handler))
        .route(
            "/favicon.ico",
            get(|| async { axum::http::StatusCode::NO_CONTENT }),
        )
        .with_state(state)
}

pub async fn serve<F>(listener: TcpListener, state: Arc<AgentState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("Dummy agent server running on port {}", addr.port());
    tracing::info!("Dashboard available at http://localhost:{}", addr.port());
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn state_handler(State(state): State<Arc<AgentState>>) -> Json<Value> {
    Json(state.slot.latest().await)
}

/// The body is parsed by hand so a malformed snapshot still gets a `{}` reply
/// instead of axum's rejection.
async fn step_handler(State(state): State<Arc<AgentState>>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(snapshot) => state.slot.store(snapshot).await,
        Err(e) => {
            tracing::warn!("Failed to decode JSON state: {}", e);
            let _ = state.event_tx.send(AgentEvent::MalformedStep {
                message: e.to_string(),
            });
            return Json(json!({}));
        }
    }

    let reply = state.policy.lock().await.next_reply();
    let number = state.steps.fetch_add(1, Ordering::Relaxed) + 1;
    let kind = Action::from_response(reply.clone()).kind();
    tracing::debug!(step = number, reply = kind, "Answered step");
    let _ = state.event_tx.send(AgentEvent::Step {
        number,
        reply: kind.to_string(),
    });

    Json(reply)
}

async fn sse_handler(
    State(state): State<Arc<AgentState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<AgentEvent, _>| match result {
            Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
            Err(_) => None,
        });
    Sse::new(stream)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>icalc Agent Dashboard</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: flex;
    flex-direction: column;
  }
  header {
    padding: 24px 32px;
    border-bottom: 1px solid #1a1a2e;
    display: flex;
    align-items: center;
    gap: 12px;
  }
  header h1 { font-size: 20px; font-weight: 600; color: #fff; }
  header .dot {
    width: 8px; height: 8px;
    border-radius: 50%;
    background: #555;
  }
  header .dot.live { background: #22c55e; }
  .main {
    flex: 1;
    display: grid;
    grid-template-columns: 1fr 1fr;
    gap: 16px;
    padding: 24px 32px;
    overflow: hidden;
  }
  .panel {
    background: #111118;
    border-radius: 8px;
    padding: 16px;
    overflow: auto;
  }
  .panel h2 { font-size: 14px; color: #6366f1; margin-bottom: 12px; }
  pre {
    font-family: 'Cascadia Code', 'Fira Code', monospace;
    font-size: 13px;
    white-space: pre-wrap;
    word-break: break-all;
  }
  #screen { max-width: 100%; border-radius: 6px; margin-bottom: 12px; display: none; }
  .entry {
    padding: 6px 10px;
    border-left: 3px solid #3b82f6;
    margin-bottom: 6px;
    font-family: 'Cascadia Code', 'Fira Code', monospace;
    font-size: 13px;
  }
  .entry.error { border-left-color: #ef4444; color: #fca5a5; }
</style>
</head>
<body>
  <header>
    <div class="dot" id="status-dot"></div>
    <h1>icalc Agent Dashboard</h1>
  </header>
  <div class="main">
    <div class="panel">
      <h2>Latest state</h2>
      <img id="screen" alt="viewport" />
      <pre id="state">{}</pre>
    </div>
    <div class="panel">
      <h2>Steps</h2>
      <div id="log"></div>
    </div>
  </div>
<script>
  const stateEl = document.getElementById('state');
  const screen = document.getElementById('screen');
  const log = document.getElementById('log');
  const dot = document.getElementById('status-dot');

  function addEntry(cls, text) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.textContent = text;
    log.prepend(div);
    while (log.children.length > 200) log.removeChild(log.lastChild);
  }

  async function refresh() {
    try {
      const res = await fetch('/state');
      const state = await res.json();
      if (state && state.screenshot) {
        screen.src = 'data:image/png;base64,' + state.screenshot;
        screen.style.display = 'block';
        state.screenshot = '<' + state.screenshot.length + ' base64 chars>';
      } else {
        screen.style.display = 'none';
      }
      stateEl.textContent = JSON.stringify(state, null, 2);
    } catch (e) {
      stateEl.textContent = 'Waiting for state data from icalc bridge...';
    }
  }

  const es = new EventSource('/events');
  es.onopen = () => { dot.className = 'dot live'; };
  es.onerror = () => { dot.className = 'dot'; };
  es.addEventListener('step', e => {
    const d = JSON.parse(e.data);
    addEntry('', 'Step ' + d.number + ' -> ' + d.reply);
  });
  es.addEventListener('step_error', e => {
    const d = JSON.parse(e.data);
    addEntry('error', 'Bad state: ' + d.message);
  });

  refresh();
  setInterval(refresh, 500);
</script>
</body>
</html>
"##;
