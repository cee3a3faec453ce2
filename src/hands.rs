use anyhow::{Context, Result};
use headless_chrome::browser::tab::point::Point;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use crate::dom;
use crate::types::Position;

/// The UI primitives the bridge needs from a browser driver.
///
/// All calls block. `try_click` is a single attempt; waiting is the caller's job.
pub trait UiSession: Send {
    fn read_state(&mut self) -> Result<Option<Value>>;
    fn screenshot_base64(&mut self) -> Result<String>;
    fn move_pointer(&mut self, to: Position) -> Result<()>;
    fn click(&mut self, at: Position) -> Result<()>;
    fn press_key(&mut self, key: &str) -> Result<()>;
    fn type_text(&mut self, text: &str) -> Result<()>;
    /// Click the first element matching `selector` if it is interactable right
    /// now. `Ok(false)` means "not (yet) there".
    fn try_click(&mut self, selector: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    /// Pause after the app page loads so its scripts can publish state.
    pub settle: Duration,
    pub idle_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_size: (1024, 768),
            settle: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// A Chrome instance with one tab pointed at the calculator.
/// Dropping it closes the browser.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(config: &LaunchConfig, app_url: &str) -> Result<Self> {
        let options = LaunchOptions {
            headless: config.headless,
            window_size: Some(config.window_size),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: config.idle_timeout,
            ..Default::default()
        };

        tracing::info!(headless = config.headless, "Starting Chrome...");
        let browser = Browser::new(options).map_err(|e| {
            tracing::error!("Browser launch failed: {}", e);
            anyhow::anyhow!("Browser launch failed: {}", e)
        })?;

        let tab = browser.new_tab()?;
        tab.navigate_to(app_url)
            .with_context(|| format!("navigating to {app_url}"))?
            .wait_until_navigated()?;
        std::thread::sleep(config.settle);

        tracing::info!("Chrome ready at {}", app_url);
        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        tracing::info!("Closing browser session");
    }
}

impl UiSession for BrowserSession {
    fn read_state(&mut self) -> Result<Option<Value>> {
        dom::read_state(&self.tab)
    }

    fn screenshot_base64(&mut self) -> Result<String> {
        dom::screenshot_base64(&self.tab)
    }

    fn move_pointer(&mut self, to: Position) -> Result<()> {
        self.tab.move_mouse_to_point(Point { x: to.x, y: to.y })?;
        Ok(())
    }

    fn click(&mut self, at: Position) -> Result<()> {
        self.tab.click_point(Point { x: at.x, y: at.y })?;
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<()> {
        self.tab.press_key(key)?;
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        self.tab.type_str(text)?;
        Ok(())
    }

    fn try_click(&mut self, selector: &str) -> Result<bool> {
        let element = match self.tab.find_element(selector) {
            Ok(el) => el,
            Err(_) => return Ok(false),
        };
        if !dom::is_interactable(&element)? {
            return Ok(false);
        }
        element.click()?;
        Ok(true)
    }
}
