use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::BridgeError;
use crate::types::Action;

/// HTTP client for the remote decision service.
pub struct AgentClient {
    client: Client,
    url: String,
}

impl AgentClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one snapshot (literal `null` when absent) and decode the reply.
    ///
    /// Transport faults, non-2xx statuses and non-JSON bodies are errors; anything
    /// that parses as JSON becomes an [`Action`], possibly `Noop`.
    pub async fn exchange(&self, snapshot: &Option<Value>) -> Result<Action, BridgeError> {
        let response = self.client.post(&self.url).json(snapshot).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status(status));
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Action::Noop);
        }

        let value: Value = serde_json::from_slice(&body).map_err(BridgeError::MalformedBody)?;
        Ok(Action::from_response(value))
    }
}
