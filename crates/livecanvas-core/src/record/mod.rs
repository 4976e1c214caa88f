//! Shape records: the unit of shared canvas state.
//!
//! A record is a self-describing snapshot of one shape. Only groups refer to
//! other records, and only by id.

mod body;
mod style;

pub use body::{FontWeight, ImageFormat, ShapeBody};
pub use style::{DEFAULT_SHAPE_COLOR, SerializableColor, ShapeStyle};

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique shape identifier. Assigned on first commit and never reused.
pub type ShapeId = Uuid;

/// Discriminates the shape body variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Line,
    Freehand,
    Text,
    Image,
    Group,
}

impl ShapeKind {
    /// Wire/storage name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Ellipse => "ellipse",
            ShapeKind::Line => "line",
            ShapeKind::Freehand => "freehand",
            ShapeKind::Text => "text",
            ShapeKind::Image => "image",
            ShapeKind::Group => "group",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "rectangle" => Some(ShapeKind::Rectangle),
            "ellipse" => Some(ShapeKind::Ellipse),
            "line" => Some(ShapeKind::Line),
            "freehand" => Some(ShapeKind::Freehand),
            "text" => Some(ShapeKind::Text),
            "image" => Some(ShapeKind::Image),
            "group" => Some(ShapeKind::Group),
            _ => None,
        }
    }
}

/// Full transform, style and payload of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Top-left anchor (start point for lines) in world coordinates.
    pub position: Point,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Rotation in degrees around the position.
    pub rotation: f64,
    pub body: ShapeBody,
    pub style: ShapeStyle,
}

impl Geometry {
    /// Create an unscaled, unrotated geometry with the default style.
    pub fn new(position: Point, body: ShapeBody) -> Self {
        let style = match body {
            ShapeBody::Line { .. } | ShapeBody::Freehand { .. } => ShapeStyle::stroke_only(),
            _ => ShapeStyle::default(),
        };
        Self {
            position,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            body,
            style,
        }
    }

    pub fn with_style(mut self, style: ShapeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn kind(&self) -> ShapeKind {
        self.body.kind()
    }

    /// Axis-aligned world bounds with scale applied. Rotation is ignored.
    pub fn bounds(&self) -> Option<Rect> {
        let local = self.body.local_bounds()?;
        let Point { x, y } = self.position;
        Some(
            Rect::new(
                x + local.x0 * self.scale_x,
                y + local.y0 * self.scale_y,
                x + local.x1 * self.scale_x,
                y + local.y1 * self.scale_y,
            )
            .abs(),
        )
    }

    /// Width and height after scaling.
    pub fn size(&self) -> Option<(f64, f64)> {
        self.bounds().map(|b| (b.width(), b.height()))
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.position += delta;
    }

    /// Whether a freshly drawn shape is too small to keep.
    ///
    /// Text is never degenerate while it has content; a group needs at least
    /// two members.
    pub fn is_degenerate(&self, min_size: f64) -> bool {
        match &self.body {
            ShapeBody::Rectangle { .. } | ShapeBody::Ellipse { .. } | ShapeBody::Image { .. } => {
                match self.size() {
                    Some((w, h)) => w < min_size || h < min_size,
                    None => true,
                }
            }
            ShapeBody::Line { end } => {
                Vec2::new(end.x * self.scale_x, end.y * self.scale_y).hypot() < min_size
            }
            ShapeBody::Freehand { points } => {
                points.len() < 2
                    || self
                        .size()
                        .is_none_or(|(w, h)| w.max(h) < min_size)
            }
            ShapeBody::Text { content, .. } => content.trim().is_empty(),
            ShapeBody::Group { members } => members.len() < 2,
        }
    }
}

/// A persisted shape: identity plus full geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub id: ShapeId,
    pub geometry: Geometry,
}

impl ShapeRecord {
    pub fn new(id: ShapeId, geometry: Geometry) -> Self {
        Self { id, geometry }
    }

    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.geometry.bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Geometry {
        Geometry::new(
            Point::new(x, y),
            ShapeBody::Rectangle {
                width: w,
                height: h,
            },
        )
    }

    #[test]
    fn test_bounds_apply_scale() {
        let mut geometry = rect(10.0, 10.0, 100.0, 50.0);
        geometry.scale_x = 2.0;
        let bounds = geometry.bounds().unwrap();
        assert!((bounds.x1 - 210.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bounds_negative_scale() {
        let mut geometry = rect(100.0, 0.0, 50.0, 50.0);
        geometry.scale_x = -1.0;
        let bounds = geometry.bounds().unwrap();
        assert!((bounds.x0 - 50.0).abs() < f64::EPSILON);
        assert!((bounds.x1 - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_translate() {
        let mut geometry = rect(10.0, 10.0, 5.0, 5.0);
        geometry.translate(Vec2::new(5.0, -5.0));
        assert_eq!(geometry.position, Point::new(15.0, 5.0));
    }

    #[test]
    fn test_degenerate_rectangle() {
        assert!(rect(0.0, 0.0, 0.0, 40.0).is_degenerate(1.0));
        assert!(rect(0.0, 0.0, 0.5, 0.5).is_degenerate(1.0));
        assert!(!rect(0.0, 0.0, 100.0, 50.0).is_degenerate(1.0));
    }

    #[test]
    fn test_degenerate_line_and_freehand() {
        let line = Geometry::new(
            Point::ZERO,
            ShapeBody::Line {
                end: Vec2::new(0.5, 0.5),
            },
        );
        assert!(line.is_degenerate(1.0));

        let dot = Geometry::new(
            Point::ZERO,
            ShapeBody::Freehand {
                points: vec![Point::ZERO],
            },
        );
        assert!(dot.is_degenerate(1.0));

        let stroke = Geometry::new(
            Point::ZERO,
            ShapeBody::Freehand {
                points: vec![Point::ZERO, Point::new(30.0, 0.0)],
            },
        );
        assert!(!stroke.is_degenerate(1.0));
    }

    #[test]
    fn test_text_degenerate_only_when_blank() {
        let text = |content: &str| {
            Geometry::new(
                Point::ZERO,
                ShapeBody::Text {
                    content: content.to_string(),
                    font_size: 36.0,
                    font_family: "Helvetica".to_string(),
                    font_weight: FontWeight::Regular,
                },
            )
        };
        assert!(!text("a").is_degenerate(1000.0));
        assert!(text("   ").is_degenerate(1.0));
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [
            ShapeKind::Rectangle,
            ShapeKind::Ellipse,
            ShapeKind::Line,
            ShapeKind::Freehand,
            ShapeKind::Text,
            ShapeKind::Image,
            ShapeKind::Group,
        ] {
            assert_eq!(ShapeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ShapeKind::parse("arrow"), None);
    }

    #[test]
    fn test_line_style_has_no_fill() {
        let line = Geometry::new(
            Point::ZERO,
            ShapeBody::Line {
                end: Vec2::new(10.0, 0.0),
            },
        );
        assert!(line.style.fill_color.is_none());
        assert!(rect(0.0, 0.0, 1.0, 1.0).style.fill_color.is_some());
    }
}
