use std::rc::Rc;
use std::time::Duration;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;

use super::Mode;
use crate::color::Ramp;
use crate::power::PowerControl;
use crate::request::PowerAction;
use crate::surface::{self, RasterSurface};

const START: i32 = 9;
const FONT: &str = "Arial";
const SIZE: u32 = 10;

/// What the countdown shows for a given counter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Warning glyph, blinking every other tick.
    Warning { visible: bool },
    Number(i32),
    Blank,
    Fire,
    Done,
}

impl Stage {
    pub fn for_counter(counter: i32) -> Self {
        match counter {
            c if c > 5 => Stage::Warning {
                visible: c % 2 == 1,
            },
            0..=5 => Stage::Number(counter),
            -1 => Stage::Blank,
            -2 => Stage::Fire,
            _ => Stage::Done,
        }
    }
}

/// One-second countdown that ends by firing a power action exactly once.
pub struct Countdown {
    action: PowerAction,
    power: Rc<dyn PowerControl>,
    counter: i32,
    fired: bool,
    ramp: Option<Ramp>,
}

impl Countdown {
    pub fn new(action: PowerAction, power: Rc<dyn PowerControl>) -> Self {
        let ramp = Ramp::from_html(&["#ff0000", "#ffa500", "#00ff00"])
            .map_err(|e| tracing::warn!(error = %e, "Countdown ramp unavailable"))
            .ok();
        Self {
            action,
            power,
            counter: START,
            fired: false,
            ramp,
        }
    }

    pub fn counter(&self) -> i32 {
        self.counter
    }

    fn number_color(&self, n: i32) -> Rgb888 {
        match &self.ramp {
            Some(ramp) => ramp.at(n as f32 / 5.0),
            None => Rgb888::WHITE,
        }
    }

    fn draw_warning(surface: &mut RasterSurface) {
        let (width, height) = (surface.width() as i32, surface.height() as i32);
        let bar = (height * 3 / 5).max(1) as u32;
        let x = width / 2 - 1;
        surface.fill_rect(x, 1, 3, bar, Rgb888::RED);
        surface.fill_rect(x, height - 4, 3, 2, Rgb888::RED);
    }

    fn draw_number(&self, surface: &mut RasterSurface, n: i32) {
        let text = n.to_string();
        let text_width = surface::measure_text(&text, FONT, SIZE) as i32;
        let x = (surface.width() as i32 - text_width) / 2;
        let y = (surface.height() as i32 + 7) / 2;
        surface.draw_text(&text, x, y, FONT, SIZE, self.number_color(n));
    }
}

impl Mode for Countdown {
    fn name(&self) -> &str {
        match self.action {
            PowerAction::Shutdown => "countdown:shutdown",
            PowerAction::Reboot => "countdown:reboot",
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn tick(&mut self, surface: &mut RasterSurface) {
        if self.fired {
            return;
        }

        match Stage::for_counter(self.counter) {
            Stage::Warning { visible } => {
                surface.clear();
                if visible {
                    Self::draw_warning(surface);
                }
            }
            Stage::Number(n) => {
                surface.clear();
                self.draw_number(surface, n);
            }
            Stage::Blank => surface.clear(),
            Stage::Fire | Stage::Done => {
                self.fired = true;
                self.power.invoke(self.action);
                return;
            }
        }
        self.counter -= 1;
    }

    fn finished(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::testing::RecordingPower;
    use pretty_assertions::assert_eq;

    fn lit(surface: &RasterSurface) -> usize {
        surface
            .read_pixels()
            .chunks(4)
            .filter(|px| px[3] != 0)
            .count()
    }

    #[test]
    fn stage_thresholds() {
        let stages: Vec<Stage> = (-3..=9).rev().map(Stage::for_counter).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Warning { visible: true },
                Stage::Warning { visible: false },
                Stage::Warning { visible: true },
                Stage::Warning { visible: false },
                Stage::Number(5),
                Stage::Number(4),
                Stage::Number(3),
                Stage::Number(2),
                Stage::Number(1),
                Stage::Number(0),
                Stage::Blank,
                Stage::Fire,
                Stage::Done,
            ]
        );
    }

    #[test]
    fn fires_once_after_twelve_ticks() {
        let power = RecordingPower::default();
        let mut countdown = Countdown::new(PowerAction::Shutdown, Rc::new(power.clone()));
        let mut surface = RasterSurface::new(15, 15);

        let mut lit_per_tick = Vec::new();
        for _ in 0..11 {
            countdown.tick(&mut surface);
            lit_per_tick.push(lit(&surface) > 0);
            assert!(power.invoked.borrow().is_empty());
            assert!(!countdown.finished());
        }
        assert_eq!(
            lit_per_tick,
            vec![true, false, true, false, true, true, true, true, true, true, false]
        );
        assert_eq!(countdown.counter(), -2);

        countdown.tick(&mut surface);
        assert!(countdown.finished());
        assert_eq!(*power.invoked.borrow(), vec![PowerAction::Shutdown]);

        for _ in 0..5 {
            countdown.tick(&mut surface);
        }
        assert_eq!(power.invoked.borrow().len(), 1);
    }

    #[test]
    fn numbers_shift_from_green_to_red() {
        let countdown = Countdown::new(
            PowerAction::Reboot,
            Rc::new(RecordingPower::default()),
        );
        assert_eq!(countdown.number_color(5), Rgb888::GREEN);
        assert_eq!(countdown.number_color(0), Rgb888::RED);
        assert_eq!(countdown.name(), "countdown:reboot");
    }
}
