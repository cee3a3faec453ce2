//! Static key table for `keypress` actions.
//!
//! Every token resolves through one of three tiers:
//!   1. canonical control keys inject a native key code,
//!   2. single printable characters are typed as text,
//!   3. everything else is clicked through an element locator built from the
//!      token and its reverse-mapped `data-action` name.

/// One row of the key table.
struct KeyBinding {
    name: &'static str,
    /// Native key passed to the driver, if the key can be injected directly.
    inject: Option<&'static str>,
    /// Value of the button's `data-action` attribute.
    action: &'static str,
}

const KEY_TABLE: &[KeyBinding] = &[
    KeyBinding { name: "Enter", inject: Some("Enter"), action: "calculate" },
    KeyBinding { name: "Backspace", inject: Some("Backspace"), action: "delete" },
    KeyBinding { name: "Escape", inject: Some("Escape"), action: "all-clear" },
    KeyBinding { name: "m", inject: Some("m"), action: "mode-toggle" },
    KeyBinding { name: "m+", inject: None, action: "memory-add" },
    KeyBinding { name: "m-", inject: None, action: "memory-sub" },
    KeyBinding { name: "mr", inject: None, action: "memory-recall" },
    KeyBinding { name: "mc", inject: None, action: "memory-clear" },
];

/// Single characters the calculator has no keyboard handler for; they only
/// exist as buttons.
const BUTTON_ONLY_CHARS: &[char] = &['^', '!'];

/// How a keypress token reaches the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResolution {
    Inject(&'static str),
    Type(char),
    Locate(Locator),
    /// Empty token: nothing to press or look up.
    Blank,
}

/// Attribute match for a calculator button: `data-value` equal to the raw
/// token, or `data-action` equal to its semantic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub value: String,
    pub action: String,
}

impl Locator {
    pub fn for_token(token: &str) -> Self {
        Self {
            value: token.to_string(),
            action: action_name(token).to_string(),
        }
    }

    /// Both alternatives in one selector list, so a single wait covers them.
    pub fn selector(&self) -> String {
        format!(
            r#".btn[data-value="{}"], .btn[data-action="{}"]"#,
            css_escape(&self.value),
            css_escape(&self.action)
        )
    }
}

/// Reverse map from a canonical key to the button's `data-action`; unknown
/// tokens map to themselves.
pub fn action_name(token: &str) -> &str {
    KEY_TABLE
        .iter()
        .find(|binding| binding.name == token)
        .map(|binding| binding.action)
        .unwrap_or(token)
}

pub fn resolve(token: &str) -> KeyResolution {
    if token.is_empty() {
        return KeyResolution::Blank;
    }
    if let Some(code) = KEY_TABLE
        .iter()
        .find(|binding| binding.name == token)
        .and_then(|binding| binding.inject)
    {
        return KeyResolution::Inject(code);
    }

    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if !BUTTON_ONLY_CHARS.contains(&c) {
            return KeyResolution::Type(c);
        }
    }

    KeyResolution::Locate(Locator::for_token(token))
}

fn css_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
