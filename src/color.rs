//! Conversion from RGB and emotions to the bridge's native light colour space.
//!
//! Bridges address colour as a 16-bit hue, a saturation in `0..=254` and a
//! brightness in `0..=255`. The conversion is the usual RGB to HSV mapping
//! with the hue stretched to the 16-bit range.

use crate::error::{FacelightError, Result};
use crate::pipeline::Emotion;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_HUE: u16 = 65535;
pub const MAX_SATURATION: u8 = 254;

/// A validated RGB triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Colour in the bridge's hue/saturation/brightness encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceColor {
    pub hue: u16,
    pub saturation: u8,
    pub brightness: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from unchecked integer components
    pub fn checked(r: i32, g: i32, b: i32) -> Result<Self> {
        Ok(Self {
            r: component("r", r)?,
            g: component("g", g)?,
            b: component("b", b)?,
        })
    }
}

fn component(name: &'static str, value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| FacelightError::InvalidColorComponent {
        component: name,
        value,
    })
}

// Brand palette used for the default light pattern
const BRAND_BLUE: Rgb = Rgb::new(0, 60, 166);
const BRAND_GREEN: Rgb = Rgb::new(119, 188, 31);
const BRAND_WHITE: Rgb = Rgb::new(254, 254, 254);

/// Convert raw integer components, rejecting anything outside `0..=255`
pub fn to_device_color(r: i32, g: i32, b: i32) -> Result<DeviceColor> {
    Ok(rgb_to_device_color(Rgb::checked(r, g, b)?))
}

pub fn rgb_to_device_color(rgb: Rgb) -> DeviceColor {
    let r = rgb.r as f64;
    let g = rgb.g as f64;
    let b = rgb.b as f64;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let mut hue = 0.0;
    if delta != 0.0 {
        hue = if r == max {
            (g - b) / delta
        } else if g == max {
            2.0 + (b - r) / delta
        } else {
            4.0 + (r - g) / delta
        };
        hue *= 60.0;
        if hue < 0.0 {
            hue += 360.0;
        }
    }

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    DeviceColor {
        hue: (hue / 360.0 * MAX_HUE as f64).round() as u16,
        saturation: (saturation * MAX_SATURATION as f64).round() as u8,
        brightness: max as u8,
    }
}

/// Literal colour for each named emotion; `Unknown` has none
pub fn emotion_rgb(emotion: Emotion) -> Option<Rgb> {
    let rgb = match emotion {
        Emotion::Anger => Rgb::new(254, 0, 0),
        Emotion::Contempt => Rgb::new(50, 140, 40),
        Emotion::Disgust => Rgb::new(128, 238, 111),
        Emotion::Fear => Rgb::new(255, 0, 0),
        Emotion::Happiness => Rgb::new(244, 226, 66),
        Emotion::Neutral => Rgb::new(252, 252, 252),
        Emotion::Sadness => Rgb::new(43, 3, 180),
        Emotion::Surprise => Rgb::new(250, 170, 3),
        Emotion::Unknown => return None,
    };
    Some(rgb)
}

pub fn color_for_emotion(emotion: Emotion) -> Option<DeviceColor> {
    emotion_rgb(emotion).map(rgb_to_device_color)
}

/// Colour of the fixture at `index` in the default pattern.
///
/// The first three fixtures get blue, green and white; any further fixture
/// gets a random hue and brightness.
pub fn default_pattern_color(index: usize) -> DeviceColor {
    match index {
        0 => rgb_to_device_color(BRAND_BLUE),
        1 => rgb_to_device_color(BRAND_GREEN),
        2 => rgb_to_device_color(BRAND_WHITE),
        _ => {
            let random = Uuid::new_v4().as_u128();
            DeviceColor {
                hue: (random & 0xFFFF) as u16,
                saturation: MAX_SATURATION,
                brightness: ((random >> 16) % MAX_SATURATION as u128) as u8,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grey_has_no_saturation() {
        for level in [0, 1, 64, 128, 200, 255] {
            let color = to_device_color(level, level, level).unwrap();
            assert_eq!(color.saturation, 0);
            assert_eq!(color.hue, 0);
            assert_eq!(color.brightness, level as u8);
        }
    }

    #[test]
    fn test_primary_hues() {
        let red = to_device_color(255, 0, 0).unwrap();
        let green = to_device_color(0, 255, 0).unwrap();
        let blue = to_device_color(0, 0, 255).unwrap();

        assert_eq!(red.hue, 0);
        assert!((green.hue as i32 - 65535 / 3).abs() <= 1);
        assert!((blue.hue as i32 - 2 * 65535 / 3).abs() <= 1);

        for color in [red, green, blue] {
            assert_eq!(color.saturation, 254);
            assert_eq!(color.brightness, 255);
        }
    }

    #[test]
    fn test_negative_hue_wraps() {
        // Magenta-ish red: max is red with b > g, raw hue is negative
        let color = to_device_color(255, 0, 128).unwrap();
        assert!(color.hue > 60000);
    }

    #[test]
    fn test_out_of_range_component_rejected() {
        let err = to_device_color(256, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            FacelightError::InvalidColorComponent {
                component: "r",
                value: 256
            }
        ));

        let err = to_device_color(0, 0, -1).unwrap_err();
        assert!(matches!(
            err,
            FacelightError::InvalidColorComponent { component: "b", .. }
        ));
    }

    #[test]
    fn test_emotion_table() {
        assert_eq!(
            color_for_emotion(Emotion::Happiness),
            Some(rgb_to_device_color(Rgb::new(244, 226, 66)))
        );
        assert_eq!(
            color_for_emotion(Emotion::Sadness),
            Some(rgb_to_device_color(Rgb::new(43, 3, 180)))
        );
        assert_eq!(color_for_emotion(Emotion::Unknown), None);

        let anger = color_for_emotion(Emotion::Anger).unwrap();
        assert_eq!(anger.hue, 0);
        assert_eq!(anger.brightness, 254);
    }

    #[test]
    fn test_default_pattern_starts_with_brand_colors() {
        assert_eq!(default_pattern_color(0), rgb_to_device_color(BRAND_BLUE));
        assert_eq!(default_pattern_color(1), rgb_to_device_color(BRAND_GREEN));
        assert_eq!(default_pattern_color(2), rgb_to_device_color(BRAND_WHITE));

        let extra = default_pattern_color(7);
        assert!(extra.brightness < MAX_SATURATION);
    }
}
