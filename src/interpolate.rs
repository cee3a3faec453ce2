use std::time::Duration;

use crate::types::Position;

/// Gradual pointer motion: `steps` absolute moves spread evenly over `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub duration: Duration,
    pub steps: u32,
}

impl Default for Interpolation {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(500),
            steps: 10,
        }
    }
}

impl Interpolation {
    /// Sleep between two consecutive moves.
    pub fn step_delay(&self) -> Duration {
        self.duration / self.steps.max(1)
    }

    /// Intermediate positions from `from` (exclusive) to `to` (inclusive).
    /// The last point is always exactly `to`.
    pub fn path(&self, from: Position, to: Position) -> Vec<Position> {
        let steps = self.steps.max(1);
        (1..=steps)
            .map(|i| {
                if i == steps {
                    return to;
                }
                let t = f64::from(i) / f64::from(steps);
                Position::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
            })
            .collect()
    }
}
