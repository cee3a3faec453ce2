//! Observe → decide → act bridge between the icalc web calculator and a remote
//! agent, plus the supervisor that runs many bridges side by side.

pub mod assets;
pub mod brain;
pub mod bridge;
pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod face;
pub mod hands;
pub mod interpolate;
pub mod keymap;
pub mod locator;
pub mod logging;
pub mod shutdown;
pub mod state;
pub mod supervisor;
pub mod types;

pub use bridge::{Bridge, BridgeExit, BridgeReport, BridgeSettings};
pub use error::BridgeError;
pub use hands::{BrowserSession, UiSession};
pub use types::{Action, Position, StateSnapshot};
