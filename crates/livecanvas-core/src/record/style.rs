//! Stroke, fill and opacity of a shape record.

use peniko::Color;
use serde::{Deserialize, Serialize};

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse a CSS-style hex color: `#rgb`, `#rrggbb` or `#rrggbbaa`.
    /// The leading `#` is optional.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                // Each nibble is doubled: "abc" is "aabbcc".
                let r = channel(&hex[0..1])?;
                let g = channel(&hex[1..2])?;
                let b = channel(&hex[2..3])?;
                Some(Self::new(r * 17, g * 17, b * 17, 255))
            }
            6 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Default color for new shapes.
pub const DEFAULT_SHAPE_COLOR: SerializableColor = SerializableColor {
    r: 0xaa,
    g: 0xbb,
    b: 0xcc,
    a: 255,
};

/// Style properties for shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    pub stroke_color: SerializableColor,
    pub stroke_width: f64,
    /// `None` leaves the shape unfilled.
    pub fill_color: Option<SerializableColor>,
    /// 0.0 (invisible) to 1.0 (opaque).
    pub opacity: f64,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_color: DEFAULT_SHAPE_COLOR,
            stroke_width: 2.0,
            fill_color: Some(DEFAULT_SHAPE_COLOR),
            opacity: 1.0,
        }
    }
}

impl ShapeStyle {
    /// Style for open strokes (lines and freehand paths), which carry no fill.
    pub fn stroke_only() -> Self {
        Self {
            fill_color: None,
            ..Self::default()
        }
    }

    /// Get stroke color as peniko Color.
    pub fn stroke(&self) -> Color {
        self.stroke_color.into()
    }

    /// Get fill color as peniko Color (if set).
    pub fn fill(&self) -> Option<Color> {
        self.fill_color.map(|c| c.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_long_form() {
        let color = SerializableColor::from_hex("#aabbcc").unwrap();
        assert_eq!(color, SerializableColor::new(0xaa, 0xbb, 0xcc, 255));
    }

    #[test]
    fn test_hex_short_form() {
        let color = SerializableColor::from_hex("#abc").unwrap();
        assert_eq!(color, SerializableColor::new(0xaa, 0xbb, 0xcc, 255));
    }

    #[test]
    fn test_hex_with_alpha() {
        let color = SerializableColor::from_hex("11223380").unwrap();
        assert_eq!(color.a, 0x80);
        assert_eq!(color.to_hex(), "#11223380");
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(SerializableColor::from_hex("#12345").is_none());
        assert!(SerializableColor::from_hex("#zzzzzz").is_none());
        assert!(SerializableColor::from_hex("").is_none());
    }

    #[test]
    fn test_peniko_conversion() {
        let original = SerializableColor::new(10, 20, 30, 255);
        let color: Color = original.into();
        assert_eq!(SerializableColor::from(color), original);
    }

    #[test]
    fn test_stroke_only_has_no_fill() {
        assert!(ShapeStyle::stroke_only().fill().is_none());
        assert!(ShapeStyle::default().fill().is_some());
    }
}
