//! Inspector-panel view of the selected element.

use crate::record::{FontWeight, Geometry, SerializableColor, ShapeBody};

/// Editable attributes of the current selection, as shown in a side panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementAttributes {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fill: Option<SerializableColor>,
    pub stroke: Option<SerializableColor>,
    pub font_size: Option<f64>,
    pub font_family: Option<String>,
    pub font_weight: Option<FontWeight>,
}

impl ElementAttributes {
    pub fn from_geometry(geometry: &Geometry) -> Self {
        let (width, height) = geometry.size().unzip();
        let mut attributes = Self {
            width,
            height,
            fill: geometry.style.fill_color,
            stroke: Some(geometry.style.stroke_color),
            ..Self::default()
        };
        if let ShapeBody::Text {
            font_size,
            font_family,
            font_weight,
            ..
        } = &geometry.body
        {
            attributes.font_size = Some(*font_size);
            attributes.font_family = Some(font_family.clone());
            attributes.font_weight = Some(*font_weight);
        }
        attributes
    }
}

/// A single attribute change requested from the inspector.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeEdit {
    /// Target width in world units; applied through `scale_x`.
    Width(f64),
    /// Target height in world units; applied through `scale_y`.
    Height(f64),
    Fill(Option<SerializableColor>),
    Stroke(SerializableColor),
    StrokeWidth(f64),
    Opacity(f64),
    FontSize(f64),
    FontFamily(String),
    FontWeight(FontWeight),
}

impl AttributeEdit {
    /// Apply the edit. Returns false when it does not fit the shape kind.
    pub fn apply(&self, geometry: &mut Geometry) -> bool {
        match self {
            AttributeEdit::Width(width) => {
                let Some(local) = geometry.body.local_bounds() else {
                    return false;
                };
                if local.width() <= 0.0 || *width <= 0.0 {
                    return false;
                }
                geometry.scale_x = width / local.width();
            }
            AttributeEdit::Height(height) => {
                let Some(local) = geometry.body.local_bounds() else {
                    return false;
                };
                if local.height() <= 0.0 || *height <= 0.0 {
                    return false;
                }
                geometry.scale_y = height / local.height();
            }
            AttributeEdit::Fill(fill) => geometry.style.fill_color = *fill,
            AttributeEdit::Stroke(stroke) => geometry.style.stroke_color = *stroke,
            AttributeEdit::StrokeWidth(width) => geometry.style.stroke_width = width.max(0.0),
            AttributeEdit::Opacity(opacity) => geometry.style.opacity = opacity.clamp(0.0, 1.0),
            AttributeEdit::FontSize(size) => {
                let ShapeBody::Text { font_size, .. } = &mut geometry.body else {
                    return false;
                };
                *font_size = *size;
            }
            AttributeEdit::FontFamily(family) => {
                let ShapeBody::Text { font_family, .. } = &mut geometry.body else {
                    return false;
                };
                *font_family = family.clone();
            }
            AttributeEdit::FontWeight(weight) => {
                let ShapeBody::Text { font_weight, .. } = &mut geometry.body else {
                    return false;
                };
                *font_weight = *weight;
            }
        }
        true
    }
}
