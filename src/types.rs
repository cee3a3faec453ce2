use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One observed frame of application state. `None` when the app has not
/// published `window.icalcState` yet.
pub type StateSnapshot = Option<Value>;

/// Key under which the base64 viewport capture is attached in vision mode.
pub const SCREENSHOT_FIELD: &str = "screenshot";

/// A single action the agent asks the bridge to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Move { x: f64, y: f64 },
    Click,
    Keypress { key: String },
    Terminate,
    /// Empty response, `{}`, or a tag the bridge does not know.
    #[serde(other)]
    Noop,
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Click => "click",
            Action::Keypress { .. } => "keypress",
            Action::Terminate => "terminate",
            Action::Noop => "noop",
        }
    }

    /// Interpret an already-parsed agent response.
    ///
    /// Never fails: `null`, `{}` and unknown tags are no-ops, and an object with a
    /// known tag but bad fields is downgraded to a no-op with a warning.
    pub fn from_response(value: Value) -> Action {
        match &value {
            Value::Null => return Action::Noop,
            Value::Object(map) if map.is_empty() => return Action::Noop,
            Value::Object(map) if !map.contains_key("type") => {
                tracing::debug!("Agent response has no action tag; treating as no-op");
                return Action::Noop;
            }
            Value::Object(_) => {}
            other => {
                tracing::warn!("Agent response is not an action object: {}", other);
                return Action::Noop;
            }
        }

        match serde_json::from_value::<Action>(value) {
            Ok(Action::Noop) => {
                tracing::debug!("Unknown action tag; treating as no-op");
                Action::Noop
            }
            Ok(action) => action,
            Err(e) => {
                tracing::warn!("Malformed action from agent ({}); treating as no-op", e);
                Action::Noop
            }
        }
    }
}

/// Pointer position in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_every_known_variant() {
        assert_eq!(
            Action::from_response(json!({"type": "move", "x": 10, "y": 20.5})),
            Action::Move { x: 10.0, y: 20.5 }
        );
        assert_eq!(Action::from_response(json!({"type": "click"})), Action::Click);
        assert_eq!(
            Action::from_response(json!({"type": "keypress", "key": "sin"})),
            Action::Keypress { key: "sin".into() }
        );
        assert_eq!(
            Action::from_response(json!({"type": "terminate"})),
            Action::Terminate
        );
    }

    #[test]
    fn empty_and_null_responses_are_noops() {
        assert_eq!(Action::from_response(Value::Null), Action::Noop);
        assert_eq!(Action::from_response(json!({})), Action::Noop);
    }

    #[test]
    fn unknown_tag_is_a_noop() {
        assert_eq!(
            Action::from_response(json!({"type": "scroll", "dy": 3})),
            Action::Noop
        );
    }

    #[test]
    fn known_tag_with_bad_fields_is_a_noop() {
        assert_eq!(Action::from_response(json!({"type": "keypress"})), Action::Noop);
        assert_eq!(
            Action::from_response(json!({"type": "move", "x": "left"})),
            Action::Noop
        );
        assert_eq!(Action::from_response(json!([1, 2, 3])), Action::Noop);
    }

    #[test]
    fn extra_fields_do_not_block_decoding() {
        assert_eq!(
            Action::from_response(json!({"type": "click", "button": "left"})),
            Action::Click
        );
    }
}
