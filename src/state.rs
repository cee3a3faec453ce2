use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::hands::UiSession;
use crate::types::{SCREENSHOT_FIELD, StateSnapshot};

/// Reads one snapshot from the session, attaching a viewport capture in
/// vision mode. A failed capture is logged and the snapshot sent without it.
pub fn capture<S: UiSession + ?Sized>(session: &mut S, vision: bool) -> Result<StateSnapshot> {
    let mut snapshot = session.read_state()?;

    if vision {
        if let Some(Value::Object(fields)) = snapshot.as_mut() {
            match session.screenshot_base64() {
                Ok(image) => {
                    fields.insert(SCREENSHOT_FIELD.to_string(), Value::String(image));
                }
                Err(e) => tracing::warn!("Screenshot failed, sending state without it: {:#}", e),
            }
        }
    }

    Ok(snapshot)
}

/// Latest snapshot received by the agent service. Cloned handles share one slot;
/// the accept and serve paths both go through the lock.
#[derive(Clone, Default)]
pub struct SnapshotSlot {
    inner: Arc<Mutex<Value>>,
}

impl SnapshotSlot {
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub async fn store(&self, snapshot: Value) {
        *self.inner.lock().await = snapshot;
    }

    pub async fn latest(&self) -> Value {
        self.inner.lock().await.clone()
    }
}
