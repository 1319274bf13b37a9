use colorgrad::{Color, Gradient, GradientBuilder, LinearGradient};
use embedded_graphics::pixelcolor::Rgb888;
use palette::{FromColor, Hsv, Srgb};

/// Parse a CSS color (`"red"`, `"#0af"`, `"rgb(1,2,3)"`), ignoring alpha.
pub fn parse_css(value: &str) -> Option<Rgb888> {
    let color = Color::from_html(value.trim()).ok()?;
    let [r, g, b, _] = color.to_rgba8();
    Some(Rgb888::new(r, g, b))
}

/// Fully saturated, full value color for a hue in `[0, 1)`.
pub fn hue_to_rgb(hue: f32) -> Rgb888 {
    let hsv: Hsv = Hsv::new(hue.rem_euclid(1.0) * 360.0, 1.0, 1.0);
    let rgb: Srgb = Srgb::from_color(hsv);
    let rgb: Srgb<u8> = rgb.into_format();
    Rgb888::new(rgb.red, rgb.green, rgb.blue)
}

/// Color ramp sampled with `t` in `[0, 1]`.
pub struct Ramp {
    gradient: LinearGradient,
}

impl Ramp {
    pub fn from_html(colors: &[&str]) -> Result<Self, colorgrad::GradientBuilderError> {
        let gradient = GradientBuilder::new()
            .html_colors(colors)
            .build::<LinearGradient>()?;
        Ok(Self { gradient })
    }

    pub fn at(&self, t: f32) -> Rgb888 {
        let [r, g, b, _] = self.gradient.at(t.clamp(0.0, 1.0)).to_rgba8();
        Rgb888::new(r, g, b)
    }
}
