use clap::ValueEnum;
use std::time::Duration;

use crate::hands::UiSession;
use crate::interpolate::Interpolation;
use crate::locator::{LocatorResolver, Unresolved};
use crate::types::{Action, Position};

/// How agent actions reach the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ControlMode {
    /// `move` glides the pointer, `click` presses at the tracked position.
    #[default]
    Pointer,
    /// Legacy keyboard-only control: `move` is ignored.
    Keypress,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Performed,
    Noop,
    /// Action is not available in the current control mode.
    Skipped,
    Unresolved(Unresolved),
    /// The driver rejected a click.
    Failed(String),
    Terminate,
}

/// Applies agent actions to a UI session. Owns the session, so dropping the
/// executor releases the browser.
pub struct ActionExecutor<S> {
    session: S,
    pointer: Position,
    mode: ControlMode,
    interpolation: Interpolation,
    resolver: LocatorResolver,
}

impl<S: UiSession> ActionExecutor<S> {
    pub fn new(
        session: S,
        mode: ControlMode,
        interpolation: Interpolation,
        resolver: LocatorResolver,
    ) -> Self {
        Self {
            session,
            pointer: Position::default(),
            mode,
            interpolation,
            resolver,
        }
    }

    pub fn pointer(&self) -> Position {
        self.pointer
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Perform one action. Failures are logged and reported, never raised.
    pub fn execute(&mut self, action: &Action) -> Outcome {
        if *action != Action::Noop {
            tracing::info!("Executing action: {}", action.kind());
        }

        match action {
            Action::Noop => Outcome::Noop,
            Action::Terminate => Outcome::Terminate,
            Action::Move { x, y } => {
                if self.mode == ControlMode::Keypress {
                    tracing::warn!("Ignoring move in keypress control mode");
                    return Outcome::Skipped;
                }
                self.glide_to(Position::new(*x, *y));
                Outcome::Performed
            }
            Action::Click => match self.session.click(self.pointer) {
                Ok(()) => Outcome::Performed,
                Err(e) => {
                    tracing::warn!(
                        "Click at ({}, {}) failed: {:#}",
                        self.pointer.x,
                        self.pointer.y,
                        e
                    );
                    Outcome::Failed(format!("{e:#}"))
                }
            },
            Action::Keypress { key } => match self.resolver.perform(&mut self.session, key) {
                Ok(()) => Outcome::Performed,
                Err(unresolved) => {
                    tracing::warn!(
                        key = %unresolved.token,
                        "Could not find/click button for key '{}': {}",
                        unresolved.token,
                        unresolved.reason
                    );
                    Outcome::Unresolved(unresolved)
                }
            },
        }
    }

    fn glide_to(&mut self, target: Position) {
        let delay = self.interpolation.step_delay();
        for point in self.interpolation.path(self.pointer, target) {
            if let Err(e) = self.session.move_pointer(point) {
                tracing::debug!("Pointer step to ({}, {}) failed: {:#}", point.x, point.y, e);
            }
            if delay > Duration::ZERO {
                std::thread::sleep(delay);
            }
        }
        self.pointer = target;
    }
}
