//! Hex Color Values
//!
//! This module provides the `#rrggbb` color value used by the brush and the
//! color rotator.
//!
//! Color workflow:
//! - Colors are 8-bit sRGB triples, formatted as lowercase `#rrggbb`
//! - Parsing accepts upper or lower case hex digits
//! - The canvas stores the same sRGB bytes, no linear conversion happens on the CPU

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// An opaque sRGB color, always rendered as a 6-digit hex string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor([u8; 3]);

/// Error returned when a string is not a `#rrggbb` color
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex color {0:?}, expected #rrggbb")]
pub struct ParseHexColorError(String);

impl HexColor {
    pub const BLACK: HexColor = HexColor([0, 0, 0]);
    pub const WHITE: HexColor = HexColor([0xff, 0xff, 0xff]);

    /// Create a color from 8-bit channels
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Draw a new color, each channel sampled uniformly from 0-255
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    pub fn r(&self) -> u8 {
        self.0[0]
    }

    pub fn g(&self) -> u8 {
        self.0[1]
    }

    pub fn b(&self) -> u8 {
        self.0[2]
    }

    /// Channels as an opaque RGBA pixel
    #[inline]
    pub fn to_rgba(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], 0xff]
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for HexColor {
    type Err = ParseHexColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('#')
            .filter(|d| d.len() == 6 && d.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| ParseHexColorError(s.to_string()))?;

        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| ParseHexColorError(s.to_string()))
        };
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl TryFrom<String> for HexColor {
    type Error = ParseHexColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

impl Default for HexColor {
    fn default() -> Self {
        Self::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_well_formed(s: &str) -> bool {
        s.len() == 7
            && s.starts_with('#')
            && s[1..].bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    #[test]
    fn test_format_pads_to_six_digits() {
        assert_eq!(HexColor::new(0, 0, 0).to_string(), "#000000");
        assert_eq!(HexColor::new(255, 0, 0).to_string(), "#ff0000");
        assert_eq!(HexColor::new(1, 2, 3).to_string(), "#010203");
    }

    #[test]
    fn test_parse_accepts_either_case() {
        let red: HexColor = "#FF0000".parse().unwrap();
        assert_eq!(red, HexColor::new(255, 0, 0));

        let purple: HexColor = "#a302de".parse().unwrap();
        assert_eq!(purple.to_rgba(), [163, 2, 222, 255]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "#", "ff0000", "#ff000", "#ff00000", "#gg0000", "#+f0000"] {
            assert!(bad.parse::<HexColor>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_random_colors_are_always_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let color = HexColor::random(&mut rng);
            let text = color.to_string();
            assert!(is_well_formed(&text), "{text}");
            assert_eq!(text.parse::<HexColor>().unwrap(), color);
        }
    }

    #[test]
    fn test_serde_uses_hex_string() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            color: HexColor,
        }

        let holder: Holder = toml::from_str(r##"color = "#00FF7f""##).unwrap();
        assert_eq!(holder.color, HexColor::new(0, 255, 127));
        assert_eq!(toml::to_string(&holder).unwrap().trim(), r##"color = "#00ff7f""##);
        assert!(toml::from_str::<Holder>(r#"color = "green""#).is_err());
    }
}
