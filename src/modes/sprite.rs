use std::path::Path;
use std::time::Duration;

use image::RgbaImage;

use super::{period_for_fps, Mode};
use crate::surface::RasterSurface;

/// Cuts a horizontal sprite strip into surface-sized RGBA frames.
///
/// Frames are composited over black so the surface never carries alpha from
/// the source image. A strip narrower than the surface still yields one frame.
pub fn load_strip(path: &Path, width: u32, height: u32) -> Result<Vec<Vec<u8>>, image::ImageError> {
    let strip = image::open(path)?.to_rgba8();
    Ok(slice_strip(&strip, width, height))
}

fn slice_strip(strip: &RgbaImage, width: u32, height: u32) -> Vec<Vec<u8>> {
    let count = (strip.width() / width.max(1)).max(1);
    (0..count)
        .map(|frame| {
            let mut pixels = vec![0u8; width as usize * height as usize * 4];
            for y in 0..height.min(strip.height()) {
                for x in 0..width {
                    let Some(src) = strip.get_pixel_checked(frame * width + x, y) else {
                        continue;
                    };
                    let [r, g, b, a] = src.0;
                    let offset = (y as usize * width as usize + x as usize) * 4;
                    pixels[offset..offset + 4].copy_from_slice(&[
                        over_black(r, a),
                        over_black(g, a),
                        over_black(b, a),
                        u8::MAX,
                    ]);
                }
            }
            pixels
        })
        .collect()
}

fn over_black(channel: u8, alpha: u8) -> u8 {
    ((channel as u16 * alpha as u16 + 127) / 255) as u8
}

/// Plays a sprite strip frame by frame at its catalog rate.
pub struct SpriteAnimation {
    name: String,
    fps: u32,
    frames: Vec<Vec<u8>>,
    index: usize,
}

impl SpriteAnimation {
    pub fn new(name: impl Into<String>, fps: u32, frames: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            fps,
            frames,
            index: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Mode for SpriteAnimation {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        period_for_fps(self.fps)
    }

    fn tick(&mut self, surface: &mut RasterSurface) {
        if self.frames.is_empty() {
            surface.clear();
            return;
        }
        surface.write_pixels(&self.frames[self.index % self.frames.len()]);
        self.index = (self.index + 1) % self.frames.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::Rgb888;
    use embedded_graphics::prelude::RgbColor;
    use image::Rgba;
    use pretty_assertions::assert_eq;

    /// Strip of solid frames, one colour per frame.
    fn strip(colors: &[[u8; 4]], width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width * colors.len() as u32, height, |x, _| {
            Rgba(colors[(x / width) as usize])
        })
    }

    #[test]
    fn plays_frames_in_order_and_loops() {
        let colors = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]];
        let frames = slice_strip(&strip(&colors, 15, 15), 15, 15);
        let mut sprite = SpriteAnimation::new("test", 6, frames);
        assert_eq!(sprite.frame_count(), 3);
        assert_eq!(sprite.period(), Duration::from_millis(167));

        let mut surface = RasterSurface::new(15, 15);
        let mut seen = Vec::new();
        for _ in 0..7 {
            sprite.tick(&mut surface);
            seen.push(surface.pixel(7, 7).unwrap());
        }
        let (r, g, b) = (Rgb888::RED, Rgb888::GREEN, Rgb888::BLUE);
        assert_eq!(seen, vec![r, g, b, r, g, b, r]);
    }

    #[test]
    fn alpha_is_composited_over_black() {
        let frames = slice_strip(&strip(&[[255, 255, 255, 0]], 2, 2), 2, 2);
        assert_eq!(frames, vec![vec![0, 0, 0, 255].repeat(4)]);
    }

    #[test]
    fn narrow_strip_yields_one_partial_frame() {
        let frames = slice_strip(&strip(&[[255, 0, 0, 255]], 2, 2), 4, 4);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..4], &[255, 0, 0, 255]);
        assert_eq!(&frames[0][8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn load_strip_from_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.png");
        strip(&[[255, 0, 0, 255], [0, 0, 255, 255]], 15, 15)
            .save(&path)
            .unwrap();
        let frames = load_strip(&path, 15, 15).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[1][..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_strip(&dir.path().join("nope.gif"), 15, 15).is_err());
    }
}
