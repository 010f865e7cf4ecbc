//! Brush Style
//!
//! This module defines the parameters every stroke segment is rendered with.
//! The style is read at the instant a segment is drawn, so replacing the color
//! only affects segments drawn afterwards.

use serde::{Deserialize, Serialize};

use crate::color::HexColor;

/// Shape drawn at the open ends of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCap {
    /// Flat end exactly at the endpoint
    Butt,
    /// Half-disc centred on the endpoint
    #[default]
    Round,
    /// Flat end extended by half the width
    Square,
}

/// Shape filled where a segment continues the previous one in the same stroke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineJoin {
    #[default]
    Round,
    Bevel,
    /// Sharp corner, falls back to bevel past [`MITER_LIMIT`]
    Miter,
}

/// Ratio of miter length to line width beyond which a miter becomes a bevel
pub const MITER_LIMIT: f32 = 10.0;

/// Drop shadow painted beneath each segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub color: HexColor,
    /// Falloff distance in pixels (0 = hard edge)
    #[serde(default)]
    pub blur: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
}

/// Parameters that define how stroke segments look
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushStyle {
    pub color: HexColor,
    /// Line width in canvas pixels
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub shadow: Option<Shadow>,
}

impl BrushStyle {
    /// Create a round brush with the given color and width and no shadow
    pub fn new(color: HexColor, width: f32) -> Self {
        Self {
            color,
            width,
            ..Self::default()
        }
    }

    /// Replace the color in one assignment
    pub fn set_color(&mut self, color: HexColor) {
        self.color = color;
    }

    /// Validate that parameters are in acceptable ranges
    pub fn validate(&self) -> Result<(), String> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err("Brush width must be positive".to_string());
        }
        if let Some(shadow) = &self.shadow {
            if !shadow.blur.is_finite() || shadow.blur < 0.0 {
                return Err("Shadow blur must be non-negative".to_string());
            }
            if !shadow.offset_x.is_finite() || !shadow.offset_y.is_finite() {
                return Err("Shadow offset must be finite".to_string());
            }
        }
        Ok(())
    }
}

impl Default for BrushStyle {
    fn default() -> Self {
        Self {
            color: HexColor::BLACK,
            width: 5.0,
            cap: LineCap::Round,
            join: LineJoin::Round,
            shadow: None,
        }
    }
}
