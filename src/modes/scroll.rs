use std::time::Duration;

use super::{Mode, CANVAS_PERIOD};
use crate::request::ScrollSpec;
use crate::surface::{self, RasterSurface, HAIR_SPACE};

/// Blank run after the text before it re-enters from the right.
const TRAILING_GAP: f32 = 10.0;
const BASELINE: i32 = 10;

/// Text scrolling right to left, wrapping once it has fully left the matrix.
pub struct ScrollText {
    spec: ScrollSpec,
    text: String,
    text_width: f32,
    x: f32,
    restart_x: f32,
}

impl ScrollText {
    pub fn new(spec: ScrollSpec, surface_width: u32) -> Self {
        let text = spaced(&spec.text);
        let text_width = surface::measure_text(&text, &spec.font, spec.size) as f32;
        let restart_x = surface_width as f32;
        Self {
            spec,
            text,
            text_width,
            x: restart_x,
            restart_x,
        }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn text_width(&self) -> f32 {
        self.text_width
    }
}

/// Put a hair space between every pair of characters.
fn spaced(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4);
    for (i, ch) in text.chars().enumerate() {
        if i > 0 {
            out.push(HAIR_SPACE);
        }
        out.push(ch);
    }
    out
}

impl Mode for ScrollText {
    fn name(&self) -> &str {
        "scroll"
    }

    fn period(&self) -> Duration {
        CANVAS_PERIOD
    }

    fn tick(&mut self, surface: &mut RasterSurface) {
        self.x -= self.spec.speed / 5.0;

        surface.clear();
        surface.draw_text(
            &self.text,
            self.x.floor() as i32,
            BASELINE,
            &self.spec.font,
            self.spec.size,
            self.spec.color,
        );

        if self.x < -(self.text_width + TRAILING_GAP) {
            self.x = self.restart_x;
        }
    }
}
