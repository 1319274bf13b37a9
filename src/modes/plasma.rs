use std::f32::consts::TAU;
use std::time::Duration;

use embedded_graphics::prelude::RgbColor;
use rand::Rng;

use super::{Mode, CANVAS_PERIOD};
use crate::color;
use crate::surface::RasterSurface;

const HUE_STEP: f32 = 0.01;

/// Colour-cycling plasma over a field fixed when the mode starts.
pub struct Plasma {
    field: Vec<f32>,
    hue: f32,
    frame: Vec<u8>,
}

impl Plasma {
    pub fn new<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> Self {
        let modifiers: [f32; 3] = [
            rng.gen_range(0.5..2.0),
            rng.gen_range(0.5..2.0),
            rng.gen_range(0.5..2.0),
        ];
        let field = plasma_field(width, height, modifiers);
        Self {
            frame: vec![0; field.len() * 4],
            field,
            hue: 0.0,
        }
    }

    pub fn field(&self) -> &[f32] {
        &self.field
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }
}

/// Four phase-shifted sines summed and normalized into `[0, 1)`.
fn plasma_field(width: u32, height: u32, [m1, m2, m3]: [f32; 3]) -> Vec<f32> {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let mut field = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let (x, y) = (x as f32, y as f32);
            let horizontal = (x * m1 / 4.0).sin();
            let vertical = (y * m2 / 4.0 + TAU / 4.0).sin();
            let diagonal = ((x + y) * m3 / 8.0 + TAU / 2.0).sin();
            let radial = (((x - cx).powi(2) + (y - cy).powi(2)).sqrt() / 2.0).sin();
            let value = (horizontal + vertical + diagonal + radial + 4.0) / 8.0;
            field.push(value.clamp(0.0, 1.0 - f32::EPSILON));
        }
    }
    field
}

impl Mode for Plasma {
    fn name(&self) -> &str {
        "plasma"
    }

    fn period(&self) -> Duration {
        CANVAS_PERIOD
    }

    fn tick(&mut self, surface: &mut RasterSurface) {
        for (value, px) in self.field.iter().zip(self.frame.chunks_exact_mut(4)) {
            let rgb = color::hue_to_rgb(value + self.hue);
            px.copy_from_slice(&[rgb.r(), rgb.g(), rgb.b(), u8::MAX]);
        }
        surface.write_pixels(&self.frame);
        self.hue = (self.hue + HUE_STEP) % 1.0;
    }
}
