use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Element, Tab};
use serde_json::Value;
use std::sync::Arc;

/// Serialised in-page so objects come back by value regardless of shape.
const STATE_JS: &str = "JSON.stringify(window.icalcState ?? null)";

/// Called with the element as `this`. Mirrors what a user could click: rendered,
/// laid out with a non-empty box, not disabled, not hidden by CSS.
const INTERACTABLE_JS: &str = r#"
function() {
  if (this.disabled) return false;
  if (this.offsetParent === null && getComputedStyle(this).position !== 'fixed') return false;
  const s = getComputedStyle(this);
  if (s.visibility === 'hidden' || s.pointerEvents === 'none') return false;
  const r = this.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
}
"#;

/// Read the application's exposed state object.
pub fn read_state(tab: &Arc<Tab>) -> Result<Option<Value>> {
    let result = tab.evaluate(STATE_JS, false)?;
    let raw = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "null".to_string());

    let state: Value = serde_json::from_str(&raw).context("window.icalcState is not JSON")?;
    Ok(match state {
        Value::Null => None,
        other => Some(other),
    })
}

/// PNG capture of the current viewport, base64-encoded.
pub fn screenshot_base64(tab: &Arc<Tab>) -> Result<String> {
    let png = tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?;
    Ok(STANDARD.encode(png))
}

pub fn is_interactable(element: &Element<'_>) -> Result<bool> {
    let result = element.call_js_fn(INTERACTABLE_JS, vec![], false)?;
    Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
}
