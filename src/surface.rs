//! In-memory RGBA pixel surface the animation modes draw into.
//!
//! The surface implements [`DrawTarget`] so the `embedded-graphics` primitives
//! and mono fonts can render straight into it. Every write is clipped to the
//! surface bounds here, so callers never have to range-check coordinates.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_graphics::{
    mono_font::{
        ascii::{
            FONT_4X6, FONT_5X7, FONT_5X8, FONT_6X10, FONT_6X12, FONT_6X13_BOLD, FONT_6X9,
            FONT_7X13, FONT_7X13_BOLD, FONT_9X15, FONT_9X15_BOLD,
        },
        MonoFont, MonoTextStyle,
    },
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, PrimitiveStyle, Rectangle},
    text::{renderer::TextRenderer, Baseline, Text, TextStyleBuilder},
};

/// Character used between glyphs to open up one pixel of spacing.
pub const HAIR_SPACE: char = '\u{200A}';

const BYTES_PER_PIXEL: usize = 4;

/// Shared handle to the surface. Only touched from the single scheduler thread.
pub type SharedSurface = Rc<RefCell<RasterSurface>>;

pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            pixels: vec![0; len],
        }
    }

    pub fn shared(width: u32, height: u32) -> SharedSurface {
        Rc::new(RefCell::new(Self::new(width, height)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reset every pixel to transparent black.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb888) {
        let rect = Rectangle::new(Point::new(x, y), Size::new(w, h))
            .into_styled(PrimitiveStyle::with_fill(color));
        self.paint(&rect);
    }

    /// Fill a disc centred on `(cx, cy)`. Fractional positions snap to the
    /// nearest pixel.
    pub fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, color: Rgb888) {
        let diameter = (r * 2.0).round().max(1.0) as u32;
        let center = Point::new(cx.round() as i32, cy.round() as i32);
        let circle =
            Circle::with_center(center, diameter).into_styled(PrimitiveStyle::with_fill(color));
        self.paint(&circle);
    }

    /// Draw `text` with its alphabetic baseline at `y` and return the rendered
    /// width in pixels.
    ///
    /// [`HAIR_SPACE`] advances the pen by a single pixel, which is how callers
    /// space glyphs apart on a matrix too small for the font's own spacing.
    pub fn draw_text(
        &mut self,
        text: &str,
        x: i32,
        y: i32,
        font: &str,
        size: u32,
        color: Rgb888,
    ) -> u32 {
        let mono = select_font(font, size);
        let character_style = MonoTextStyle::new(&mono, color);
        let text_style = TextStyleBuilder::new().baseline(Baseline::Alphabetic).build();

        let mut pen = x;
        for (i, segment) in text.split(HAIR_SPACE).enumerate() {
            if i > 0 {
                pen += 1;
            }
            if !segment.is_empty() {
                let run =
                    Text::with_text_style(segment, Point::new(pen, y), character_style, text_style);
                pen = self.paint(&run).x;
            }
        }

        (pen - x).max(0) as u32
    }

    /// Copy of the RGBA buffer, row-major, four bytes per pixel.
    pub fn read_pixels(&self) -> Vec<u8> {
        self.pixels.clone()
    }

    /// Overwrite the RGBA buffer. A buffer of the wrong length only replaces
    /// the overlapping prefix.
    pub fn write_pixels(&mut self, buffer: &[u8]) {
        let len = buffer.len().min(self.pixels.len());
        self.pixels[..len].copy_from_slice(&buffer[..len]);
    }

    /// RGB of a single pixel, `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        Some(Rgb888::new(
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ))
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    fn paint<D>(&mut self, drawable: &D) -> D::Output
    where
        D: Drawable<Color = Rgb888>,
    {
        match drawable.draw(self) {
            Ok(output) => output,
            Err(never) => match never {},
        }
    }
}

impl OriginDimensions for RasterSurface {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for RasterSurface {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if coord.x < 0 || coord.y < 0 {
                continue;
            }
            let (x, y) = (coord.x as u32, coord.y as u32);
            if x >= self.width || y >= self.height {
                continue;
            }
            let offset = self.offset(x, y);
            self.pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&[
                color.r(),
                color.g(),
                color.b(),
                u8::MAX,
            ]);
        }
        Ok(())
    }
}

/// Width `draw_text` would report for the same arguments, without drawing.
pub fn measure_text(text: &str, font: &str, size: u32) -> u32 {
    let mono = select_font(font, size);
    let style = MonoTextStyle::new(&mono, Rgb888::WHITE);
    text.split(HAIR_SPACE)
        .enumerate()
        .map(|(i, segment)| {
            let gap = if i > 0 { 1 } else { 0 };
            let advance = if segment.is_empty() {
                0
            } else {
                style
                    .measure_string(segment, Point::zero(), Baseline::Alphabetic)
                    .next_position
                    .x
            };
            gap + advance.max(0) as u32
        })
        .sum()
}

/// Closest bitmap font for a CSS-style pixel size. Families are advisory, only
/// a "bold" request changes the face.
fn select_font(family: &str, size: u32) -> MonoFont<'static> {
    let bold = family.to_ascii_lowercase().contains("bold");
    match size {
        0..=6 => FONT_4X6,
        7 => FONT_5X7,
        8 => FONT_5X8,
        9 => FONT_6X9,
        10 => FONT_6X10,
        11..=12 if bold => FONT_6X13_BOLD,
        11..=12 => FONT_6X12,
        13..=14 if bold => FONT_7X13_BOLD,
        13..=14 => FONT_7X13,
        _ if bold => FONT_9X15_BOLD,
        _ => FONT_9X15,
    }
}
