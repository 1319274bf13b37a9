use std::time::Duration;

use embedded_graphics::pixelcolor::Rgb888;

use super::Mode;
use crate::surface::RasterSurface;

const START: (f32, f32) = (5.0, 5.0);
const SPEED: f32 = 0.1;
const HEADING_DEGREES: f32 = 50.0;
const RADIUS: f32 = 1.0;

/// A ball bouncing off the matrix edges without losing energy.
pub struct Ball {
    color: Rgb888,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
}

impl Ball {
    pub fn new(color: Rgb888) -> Self {
        let heading = HEADING_DEGREES.to_radians();
        Self {
            color,
            x: START.0,
            y: START.1,
            dx: heading.cos() * SPEED,
            dy: heading.sin() * SPEED,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.dx, self.dy)
    }
}

impl Mode for Ball {
    fn name(&self) -> &str {
        "ball"
    }

    fn period(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn tick(&mut self, surface: &mut RasterSurface) {
        surface.clear();

        let (width, height) = (surface.width() as f32, surface.height() as f32);
        if self.x > width - RADIUS || self.x < RADIUS {
            self.dx = -self.dx;
        }
        if self.y > height - RADIUS || self.y < RADIUS {
            self.dy = -self.dy;
        }
        self.x += self.dx;
        self.y += self.dy;

        surface.fill_circle(self.x, self.y, RADIUS, self.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::RgbColor;

    #[test]
    fn stays_on_the_surface_and_keeps_its_speed() {
        let mut surface = RasterSurface::new(15, 15);
        let mut ball = Ball::new(Rgb888::RED);
        let mut bounced = (false, false);
        let start = ball.velocity();

        for _ in 0..5000 {
            ball.tick(&mut surface);
            let (x, y) = ball.position();
            assert!((RADIUS - SPEED..=15.0 - RADIUS + SPEED).contains(&x), "x = {x}");
            assert!((RADIUS - SPEED..=15.0 - RADIUS + SPEED).contains(&y), "y = {y}");

            let (dx, dy) = ball.velocity();
            assert!((dx.abs() - start.0.abs()).abs() < f32::EPSILON);
            assert!((dy.abs() - start.1.abs()).abs() < f32::EPSILON);
            bounced.0 |= dx.signum() != start.0.signum();
            bounced.1 |= dy.signum() != start.1.signum();
        }
        assert_eq!(bounced, (true, true));
    }

    #[test]
    fn draws_only_the_ball() {
        let mut surface = RasterSurface::new(15, 15);
        surface.fill_rect(0, 0, 15, 15, Rgb888::WHITE);
        let mut ball = Ball::new(Rgb888::GREEN);
        ball.tick(&mut surface);

        let green: Vec<(u32, u32)> = (0..15)
            .flat_map(|y| (0..15).map(move |x| (x, y)))
            .filter(|(x, y)| surface.pixel(*x, *y) == Some(Rgb888::GREEN))
            .collect();
        assert!(!green.is_empty());
        assert!(green
            .iter()
            .all(|(x, y)| x.abs_diff(5) <= 2 && y.abs_diff(5) <= 2));
        assert_eq!(surface.pixel(14, 14), Some(Rgb888::BLACK));
    }
}
