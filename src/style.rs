use std::{fmt, ops::RangeInclusive, str::FromStr};

use anyhow::anyhow;
use serde::{de::Visitor, Deserialize};

pub const WIDTH_RANGE: RangeInclusive<f32> = 1.0..=100.0;
pub const BLUR_RANGE: RangeInclusive<f32> = 0.0..=50.0;
pub const SPACING_RANGE: RangeInclusive<f32> = 0.0..=5.0;

/// Straight-alpha RGBA color with channels in range 0-1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Returns the color with its RGB channels multiplied by alpha, as the GPU blends it.
    pub fn premultiplied(self) -> [f32; 4] {
        [self.r * self.a, self.g * self.a, self.b * self.a, self.a]
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    /// Accepts anything CSS does: named colors, `#rgb`/`#rrggbbaa` hex, `rgb()`, `hsl()`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let c = csscolorparser::parse(s).map_err(|e| anyhow!("invalid color '{s}': {e}"))?;
        let [r, g, b, a] = c.to_rgba8().map(|channel| f32::from(channel) / 255.0);
        Ok(Self::rgba(r, g, b, a))
    }
}

impl<'a> Deserialize<'a> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        struct FromStrVisitor;

        impl<'de> Visitor<'de> for FromStrVisitor {
            type Value = Color;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("CSS color name or hex code")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(|e| E::custom(format_args!("{e}")))
            }
        }

        deserializer.deserialize_str(FromStrVisitor)
    }
}

/// Appearance of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StrokeStyle {
    pub color: Color,
    /// Line width in pixels.
    pub width: f32,
    /// Gap between dashes, relative to `width`. `0.0` draws a solid line.
    pub spacing: f32,
    /// Blur radius in pixels. `0.0` draws hard edges.
    pub blur: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 3.0,
            spacing: 0.0,
            blur: 0.0,
        }
    }
}

impl StrokeStyle {
    /// Checks that every attribute lies within the range the style controls allow.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value, range) in [
            ("width", self.width, WIDTH_RANGE),
            ("spacing", self.spacing, SPACING_RANGE),
            ("blur", self.blur, BLUR_RANGE),
        ] {
            if !range.contains(&value) {
                anyhow::bail!(
                    "style {name} must be in range {}-{} (found {value})",
                    range.start(),
                    range.end()
                );
            }
        }
        Ok(())
    }
}

/// Clamps `value` into `range`, or returns `None` if it is NaN or infinite.
pub fn clamp_finite(value: f32, range: RangeInclusive<f32>) -> Option<f32> {
    value
        .is_finite()
        .then(|| value.clamp(*range.start(), *range.end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_hex_colors() {
        assert_eq!("black".parse::<Color>().unwrap(), Color::BLACK);
        assert_eq!("#ffffff".parse::<Color>().unwrap(), Color::WHITE);

        let red: Color = "#ff000080".parse().unwrap();
        assert_eq!(red.r, 1.0);
        assert_eq!(red.g, 0.0);
        assert!((red.a - 128.0 / 255.0).abs() < 1e-6);

        assert!("not-a-color".parse::<Color>().is_err());
    }

    #[test]
    fn premultiplies_alpha() {
        let c = Color::rgba(1.0, 0.5, 0.0, 0.5);
        assert_eq!(c.premultiplied(), [0.5, 0.25, 0.0, 0.5]);
    }

    #[test]
    fn clamps_to_range() {
        assert_eq!(clamp_finite(150.0, WIDTH_RANGE), Some(100.0));
        assert_eq!(clamp_finite(0.0, WIDTH_RANGE), Some(1.0));
        assert_eq!(clamp_finite(2.5, SPACING_RANGE), Some(2.5));
        assert_eq!(clamp_finite(f32::NAN, BLUR_RANGE), None);
        assert_eq!(clamp_finite(f32::INFINITY, BLUR_RANGE), None);
    }

    #[test]
    fn validates_default_style() {
        StrokeStyle::default().validate().unwrap();

        let style = StrokeStyle {
            blur: 60.0,
            ..Default::default()
        };
        assert!(style.validate().is_err());
    }
}
