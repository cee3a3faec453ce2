use anyhow::Result;
use std::time::{Duration, Instant};

use crate::hands::UiSession;
use crate::keymap::{self, KeyResolution, Locator};

/// Outcome of resolving a keypress token that could not be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub token: String,
    pub reason: String,
}

/// Turns a keypress token into a UI interaction, waiting a short, bounded time
/// for a matching button when the token needs an element lookup.
#[derive(Debug, Clone, Copy)]
pub struct LocatorResolver {
    pub wait: Duration,
    pub poll: Duration,
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(500),
            poll: Duration::from_millis(50),
        }
    }
}

impl LocatorResolver {
    pub fn perform<S: UiSession + ?Sized>(
        &self,
        session: &mut S,
        token: &str,
    ) -> Result<(), Unresolved> {
        let unresolved = |reason: String| Unresolved {
            token: token.to_string(),
            reason,
        };

        match keymap::resolve(token) {
            KeyResolution::Inject(code) => session
                .press_key(code)
                .map_err(|e| unresolved(format!("{e:#}"))),
            KeyResolution::Type(c) => session
                .type_text(&c.to_string())
                .map_err(|e| unresolved(format!("{e:#}"))),
            KeyResolution::Locate(locator) => self
                .click_when_ready(session, &locator)
                .map_err(unresolved),
            KeyResolution::Blank => Err(unresolved("empty key token".to_string())),
        }
    }

    /// Poll the combined selector until a match is interactable and clicked, or
    /// the wait bound elapses. Always tries at least once.
    fn click_when_ready<S: UiSession + ?Sized>(
        &self,
        session: &mut S,
        locator: &Locator,
    ) -> Result<(), String> {
        let selector = locator.selector();
        let deadline = Instant::now() + self.wait;
        let mut last_error = None;

        loop {
            match session.try_click(&selector) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => last_error = Some(format!("{e:#}")),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.poll.min(deadline - now));
        }

        Err(match last_error {
            Some(e) => format!("no clickable match for `{selector}` ({e})"),
            None => format!(
                "no clickable match for `{selector}` within {}ms",
                self.wait.as_millis()
            ),
        })
    }
}
