//! Animation generators.
//!
//! Every mode renders into the shared [`RasterSurface`] from `tick`, which the
//! scheduler calls once per [`Mode::period`]. Modes never schedule or cancel
//! themselves; the scheduler owns their tasks.

use std::time::Duration;

use crate::surface::RasterSurface;

mod ball;
mod countdown;
mod plasma;
mod scroll;
mod sprite;

pub use ball::Ball;
pub use countdown::{Countdown, Stage};
pub use plasma::Plasma;
pub use scroll::ScrollText;
pub use sprite::{load_strip, SpriteAnimation};

/// Tick period for the canvas-style modes.
pub const CANVAS_PERIOD: Duration = Duration::from_millis(33);

pub trait Mode {
    fn name(&self) -> &str;

    fn period(&self) -> Duration;

    fn tick(&mut self, surface: &mut RasterSurface);

    /// A finished mode is never ticked again.
    fn finished(&self) -> bool {
        false
    }
}

/// Interval for a frames-per-second rate, rounded to whole milliseconds and
/// never shorter than one.
pub fn period_for_fps(fps: u32) -> Duration {
    Duration::from_millis(((1000.0 / fps.max(1) as f64).round() as u64).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_periods_round_to_milliseconds() {
        assert_eq!(period_for_fps(3), Duration::from_millis(333));
        assert_eq!(period_for_fps(6), Duration::from_millis(167));
        assert_eq!(period_for_fps(24), Duration::from_millis(42));
        assert_eq!(period_for_fps(0), Duration::from_millis(1000));
        assert_eq!(period_for_fps(1000), Duration::from_millis(1));
        assert_eq!(period_for_fps(5000), Duration::from_millis(1));
    }
}
