//! Tool system for the canvas.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

use crate::record::{FontWeight, Geometry, ShapeBody, ShapeId, ShapeRecord, ShapeStyle};
use crate::surface::ObjectHandle;

/// Placeholder content of a freshly placed text box.
pub const TEXT_PLACEHOLDER: &str = "Tap to Type";
pub const DEFAULT_FONT_SIZE: f64 = 36.0;
pub const DEFAULT_FONT_FAMILY: &str = "Helvetica";

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Select,
    Rectangle,
    Ellipse,
    Line,
    Freehand,
    Text,
    Image,
    Hand,
    Eraser,
}

impl ToolKind {
    /// Whether pointer-down with this tool starts a new shape.
    pub fn draws(&self) -> bool {
        matches!(
            self,
            ToolKind::Rectangle
                | ToolKind::Ellipse
                | ToolKind::Line
                | ToolKind::Freehand
                | ToolKind::Text
        )
    }
}

/// The in-progress result of a drawing gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    /// Exists only on the local surface.
    Uncommitted(ObjectHandle),
    /// Written to the store under its assigned id.
    Committed(ShapeId, ShapeRecord),
}

/// State of a tool interaction.
#[derive(Debug, Clone, Default)]
pub enum ToolState {
    /// Tool is idle, waiting for interaction.
    #[default]
    Idle,
    /// Tool is actively being used (e.g., drawing a shape).
    Active {
        /// Starting point of the interaction.
        start: Point,
        /// Current point of the interaction.
        current: Point,
    },
}

/// Manages the current tool and its state.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    /// Currently selected tool.
    pub current_tool: ToolKind,
    /// Current state of the tool.
    pub state: ToolState,
    /// Accumulated points for freehand drawing, in world coordinates.
    freehand_points: Vec<Point>,
    /// Current style to apply to new closed shapes.
    pub current_style: ShapeStyle,
    draft: Option<Draft>,
}

impl ToolManager {
    /// Create a new tool manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current tool. Any in-progress interaction is dropped.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
        self.cancel();
    }

    /// Begin a tool interaction and return the initial draft geometry.
    pub fn begin(&mut self, point: Point) -> Option<Geometry> {
        self.freehand_points.clear();
        if self.current_tool == ToolKind::Freehand {
            self.freehand_points.push(point);
        }
        self.state = ToolState::Active {
            start: point,
            current: point,
        };
        self.preview_geometry()
    }

    /// Update the current interaction and return the reshaped draft geometry.
    pub fn update(&mut self, point: Point) -> Option<Geometry> {
        let ToolState::Active { current, .. } = &mut self.state else {
            return None;
        };
        *current = point;
        if self.current_tool == ToolKind::Freehand
            && self.freehand_points.last() != Some(&point)
        {
            self.freehand_points.push(point);
        }
        self.preview_geometry()
    }

    /// End the current interaction and return the final geometry.
    pub fn end(&mut self, point: Point) -> Option<Geometry> {
        if !self.is_active() {
            return None;
        }
        let geometry = self.update(point);
        self.state = ToolState::Idle;
        self.freehand_points.clear();
        geometry
    }

    /// Cancel the current interaction.
    pub fn cancel(&mut self) {
        self.state = ToolState::Idle;
        self.freehand_points.clear();
        self.draft = None;
    }

    /// Check if a tool interaction is active.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ToolState::Active { .. })
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn set_draft(&mut self, draft: Draft) {
        self.draft = Some(draft);
    }

    pub fn take_draft(&mut self) -> Option<Draft> {
        self.draft.take()
    }

    /// Get the accumulated freehand points.
    pub fn freehand_points(&self) -> &[Point] {
        &self.freehand_points
    }

    /// Geometry for the current interaction, if the tool draws.
    pub fn preview_geometry(&self) -> Option<Geometry> {
        let ToolState::Active { start, current } = self.state else {
            return None;
        };
        let geometry = match self.current_tool {
            ToolKind::Rectangle => {
                let rect = Rect::from_points(start, current);
                Geometry::new(
                    rect.origin(),
                    ShapeBody::Rectangle {
                        width: rect.width(),
                        height: rect.height(),
                    },
                )
            }
            ToolKind::Ellipse => {
                let rect = Rect::from_points(start, current);
                Geometry::new(
                    rect.origin(),
                    ShapeBody::Ellipse {
                        radius_x: rect.width() / 2.0,
                        radius_y: rect.height() / 2.0,
                    },
                )
            }
            ToolKind::Line => Geometry::new(
                start,
                ShapeBody::Line {
                    end: current - start,
                },
            ),
            ToolKind::Freehand => {
                let origin = *self.freehand_points.first()?;
                Geometry::new(
                    origin,
                    ShapeBody::Freehand {
                        points: self
                            .freehand_points
                            .iter()
                            .map(|p| (*p - origin).to_point())
                            .collect(),
                    },
                )
            }
            ToolKind::Text => Geometry::new(
                start,
                ShapeBody::Text {
                    content: TEXT_PLACEHOLDER.to_string(),
                    font_size: DEFAULT_FONT_SIZE,
                    font_family: DEFAULT_FONT_FAMILY.to_string(),
                    font_weight: FontWeight::Regular,
                },
            ),
            ToolKind::Select | ToolKind::Image | ToolKind::Hand | ToolKind::Eraser => {
                return None;
            }
        };
        Some(self.styled(geometry))
    }

    fn styled(&self, geometry: Geometry) -> Geometry {
        let style = match geometry.body {
            ShapeBody::Line { .. } | ShapeBody::Freehand { .. } => ShapeStyle {
                fill_color: None,
                ..self.current_style
            },
            _ => self.current_style,
        };
        geometry.with_style(style)
    }
}
