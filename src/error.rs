use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Connect failure, timeout, or a broken transfer.
    #[error("agent unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("agent answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("agent response is not JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("UI session error: {0:#}")]
    Session(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Faults the loop recovers from by backing off and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::Network(_) | BridgeError::Status(_) | BridgeError::MalformedBody(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Network(e) if e.is_timeout() => "timeout",
            BridgeError::Network(e) if e.is_connect() => "connection refused",
            BridgeError::Network(_) => "network",
            BridgeError::Status(_) => "bad status",
            BridgeError::MalformedBody(_) => "malformed body",
            BridgeError::Session(_) => "session",
            BridgeError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BridgeError::Status(reqwest::StatusCode::BAD_GATEWAY).is_transient());
        let bad_json = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        assert!(BridgeError::MalformedBody(bad_json).is_transient());
        assert!(!BridgeError::Session(anyhow::anyhow!("chrome gone")).is_transient());
        assert!(!BridgeError::Config("rate".into()).is_transient());
    }
}
