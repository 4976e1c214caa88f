//! Kind-specific shape payloads.

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

use super::{ShapeId, ShapeKind};

/// Approximate glyph advance as a fraction of the font size.
const TEXT_ADVANCE: f64 = 0.6;
/// Line height as a fraction of the font size.
const TEXT_LINE_HEIGHT: f64 = 1.2;

/// Font weight options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontWeight {
    /// Light weight.
    Light,
    /// Regular weight (default).
    #[default]
    Regular,
    /// Heavy/Bold weight.
    Heavy,
}

impl FontWeight {
    /// CSS-style numeric weight.
    pub fn numeric(&self) -> i64 {
        match self {
            FontWeight::Light => 300,
            FontWeight::Regular => 400,
            FontWeight::Heavy => 700,
        }
    }

    /// Closest weight for a CSS numeric value.
    pub fn from_numeric(value: i64) -> Self {
        match value {
            ..=349 => FontWeight::Light,
            350..=549 => FontWeight::Regular,
            _ => FontWeight::Heavy,
        }
    }
}

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    /// Get MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
        }
    }

    /// Parse a MIME type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// Detect format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        None
    }
}

/// The kind-specific part of a shape's geometry.
///
/// All coordinates are local: relative to the owning geometry's position and
/// before its scale is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeBody {
    Rectangle {
        width: f64,
        height: f64,
    },
    /// Ellipse inscribed in the box `(0, 0)..(2 * radius_x, 2 * radius_y)`.
    Ellipse {
        radius_x: f64,
        radius_y: f64,
    },
    /// Straight segment from the position to `position + end`.
    Line {
        end: Vec2,
    },
    Freehand {
        points: Vec<Point>,
    },
    Text {
        content: String,
        font_size: f64,
        font_family: String,
        font_weight: FontWeight,
    },
    Image {
        width: f64,
        height: f64,
        format: ImageFormat,
        data_base64: String,
    },
    /// Ordered member ids (z-order, back to front). Membership, not ownership:
    /// members remain independent records.
    Group {
        members: Vec<ShapeId>,
    },
}

impl ShapeBody {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeBody::Rectangle { .. } => ShapeKind::Rectangle,
            ShapeBody::Ellipse { .. } => ShapeKind::Ellipse,
            ShapeBody::Line { .. } => ShapeKind::Line,
            ShapeBody::Freehand { .. } => ShapeKind::Freehand,
            ShapeBody::Text { .. } => ShapeKind::Text,
            ShapeBody::Image { .. } => ShapeKind::Image,
            ShapeBody::Group { .. } => ShapeKind::Group,
        }
    }

    /// Local bounding box. Groups have no extent of their own.
    pub fn local_bounds(&self) -> Option<Rect> {
        match self {
            ShapeBody::Rectangle { width, height } | ShapeBody::Image { width, height, .. } => {
                Some(Rect::new(0.0, 0.0, *width, *height))
            }
            ShapeBody::Ellipse { radius_x, radius_y } => {
                Some(Rect::new(0.0, 0.0, radius_x * 2.0, radius_y * 2.0))
            }
            ShapeBody::Line { end } => Some(Rect::from_points(Point::ZERO, end.to_point())),
            ShapeBody::Freehand { points } => {
                let first = points.first()?;
                Some(
                    points
                        .iter()
                        .fold(Rect::from_points(*first, *first), |rect, p| rect.union_pt(*p)),
                )
            }
            ShapeBody::Text {
                content, font_size, ..
            } => {
                let columns = content
                    .lines()
                    .map(|line| line.chars().count())
                    .max()
                    .unwrap_or(0) as f64;
                let rows = content.lines().count().max(1) as f64;
                Some(Rect::new(
                    0.0,
                    0.0,
                    columns * font_size * TEXT_ADVANCE,
                    rows * font_size * TEXT_LINE_HEIGHT,
                ))
            }
            ShapeBody::Group { .. } => None,
        }
    }

    /// Group member ids, empty for every other kind.
    pub fn members(&self) -> &[ShapeId] {
        match self {
            ShapeBody::Group { members } => members,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_weight_numeric() {
        assert_eq!(FontWeight::from_numeric(300), FontWeight::Light);
        assert_eq!(FontWeight::from_numeric(400), FontWeight::Regular);
        assert_eq!(FontWeight::from_numeric(900), FontWeight::Heavy);
        assert_eq!(FontWeight::from_numeric(FontWeight::Heavy.numeric()), FontWeight::Heavy);
    }

    #[test]
    fn test_image_format_detection() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D]),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF8"), None);
        assert_eq!(ImageFormat::from_mime_type("image/webp"), Some(ImageFormat::WebP));
    }

    #[test]
    fn test_line_bounds_with_negative_end() {
        let body = ShapeBody::Line {
            end: Vec2::new(-20.0, 10.0),
        };
        let bounds = body.local_bounds().unwrap();
        assert!((bounds.x0 + 20.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_freehand_bounds() {
        let body = ShapeBody::Freehand {
            points: vec![Point::new(0.0, 0.0), Point::new(5.0, -5.0), Point::new(10.0, 3.0)],
        };
        let bounds = body.local_bounds().unwrap();
        assert!((bounds.width() - 10.0).abs() < f64::EPSILON);
        assert!((bounds.height() - 8.0).abs() < f64::EPSILON);

        let empty = ShapeBody::Freehand { points: vec![] };
        assert!(empty.local_bounds().is_none());
    }

    #[test]
    fn test_group_has_no_bounds() {
        let body = ShapeBody::Group { members: vec![] };
        assert!(body.local_bounds().is_none());
        assert_eq!(body.kind(), ShapeKind::Group);
    }
}
