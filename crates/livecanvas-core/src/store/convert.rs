//! Conversion between shape records and Loro values.

use kurbo::{Point, Vec2};
use loro::{LoroList, LoroMap, LoroMapValue, LoroResult, LoroValue};
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::record::{
    FontWeight, Geometry, ImageFormat, SerializableColor, ShapeBody, ShapeKind, ShapeRecord,
    ShapeStyle,
};

// Common keys
const KEY_TYPE: &str = "type";
const KEY_ID: &str = "id";

// Transform keys
const KEY_X: &str = "x";
const KEY_Y: &str = "y";
const KEY_SCALE_X: &str = "scale_x";
const KEY_SCALE_Y: &str = "scale_y";
const KEY_ROTATION: &str = "rotation";

// Style keys
const KEY_STROKE_R: &str = "stroke_r";
const KEY_STROKE_G: &str = "stroke_g";
const KEY_STROKE_B: &str = "stroke_b";
const KEY_STROKE_A: &str = "stroke_a";
const KEY_STROKE_WIDTH: &str = "stroke_width";
const KEY_FILL_R: &str = "fill_r";
const KEY_FILL_G: &str = "fill_g";
const KEY_FILL_B: &str = "fill_b";
const KEY_FILL_A: &str = "fill_a";
const KEY_HAS_FILL: &str = "has_fill";
const KEY_OPACITY: &str = "opacity";

// Rectangle/Image keys
const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";

// Ellipse keys
const KEY_RADIUS_X: &str = "radius_x";
const KEY_RADIUS_Y: &str = "radius_y";

// Line keys
const KEY_END_X: &str = "end_x";
const KEY_END_Y: &str = "end_y";

// Freehand keys (flat x, y, x, y, ... list)
const KEY_POINTS: &str = "points";

// Text keys
const KEY_CONTENT: &str = "content";
const KEY_FONT_SIZE: &str = "font_size";
const KEY_FONT_FAMILY: &str = "font_family";
const KEY_FONT_WEIGHT: &str = "font_weight";

// Image keys
const KEY_FORMAT: &str = "format";
const KEY_DATA_BASE64: &str = "data_base64";

// Group keys
const KEY_MEMBERS: &str = "members";

// Helper functions to extract values from LoroMapValue (derefs to HashMap<String, LoroValue>)
fn get_double(map: &LoroMapValue, key: &str) -> Option<f64> {
    match map.get(key)? {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

fn get_i64(map: &LoroMapValue, key: &str) -> Option<i64> {
    match map.get(key)? {
        LoroValue::I64(i) => Some(*i),
        LoroValue::Double(d) => Some(*d as i64),
        _ => None,
    }
}

fn get_string(map: &LoroMapValue, key: &str) -> Option<String> {
    match map.get(key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn get_bool(map: &LoroMapValue, key: &str) -> Option<bool> {
    match map.get(key)? {
        LoroValue::Bool(b) => Some(*b),
        _ => None,
    }
}

fn get_u8(map: &LoroMapValue, key: &str) -> Option<u8> {
    get_i64(map, key).and_then(|v| u8::try_from(v).ok())
}

fn missing(id: &str, key: &str) -> StoreError {
    StoreError::Corrupt(format!("record {id}: missing or invalid field '{key}'"))
}

/// Write every field of a record into an empty map container.
pub fn record_to_loro(record: &ShapeRecord, map: &LoroMap) -> LoroResult<()> {
    let geometry = &record.geometry;
    map.insert(KEY_TYPE, record.kind().as_str())?;
    map.insert(KEY_ID, record.id.to_string())?;
    map.insert(KEY_X, geometry.position.x)?;
    map.insert(KEY_Y, geometry.position.y)?;
    map.insert(KEY_SCALE_X, geometry.scale_x)?;
    map.insert(KEY_SCALE_Y, geometry.scale_y)?;
    map.insert(KEY_ROTATION, geometry.rotation)?;

    match &geometry.body {
        ShapeBody::Rectangle { width, height } => {
            map.insert(KEY_WIDTH, *width)?;
            map.insert(KEY_HEIGHT, *height)?;
        }
        ShapeBody::Ellipse { radius_x, radius_y } => {
            map.insert(KEY_RADIUS_X, *radius_x)?;
            map.insert(KEY_RADIUS_Y, *radius_y)?;
        }
        ShapeBody::Line { end } => {
            map.insert(KEY_END_X, end.x)?;
            map.insert(KEY_END_Y, end.y)?;
        }
        ShapeBody::Freehand { points } => {
            let list = map.insert_container(KEY_POINTS, LoroList::new())?;
            for point in points {
                list.push(point.x)?;
                list.push(point.y)?;
            }
        }
        ShapeBody::Text {
            content,
            font_size,
            font_family,
            font_weight,
        } => {
            map.insert(KEY_CONTENT, content.clone())?;
            map.insert(KEY_FONT_SIZE, *font_size)?;
            map.insert(KEY_FONT_FAMILY, font_family.clone())?;
            map.insert(KEY_FONT_WEIGHT, font_weight.numeric())?;
        }
        ShapeBody::Image {
            width,
            height,
            format,
            data_base64,
        } => {
            map.insert(KEY_WIDTH, *width)?;
            map.insert(KEY_HEIGHT, *height)?;
            map.insert(KEY_FORMAT, format.mime_type())?;
            map.insert(KEY_DATA_BASE64, data_base64.clone())?;
        }
        ShapeBody::Group { members } => {
            let list = map.insert_container(KEY_MEMBERS, LoroList::new())?;
            for member in members {
                list.push(member.to_string())?;
            }
        }
    }

    style_to_loro(&geometry.style, map)
}

/// Convert style properties to Loro map entries.
fn style_to_loro(style: &ShapeStyle, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_STROKE_R, style.stroke_color.r as i64)?;
    map.insert(KEY_STROKE_G, style.stroke_color.g as i64)?;
    map.insert(KEY_STROKE_B, style.stroke_color.b as i64)?;
    map.insert(KEY_STROKE_A, style.stroke_color.a as i64)?;
    map.insert(KEY_STROKE_WIDTH, style.stroke_width)?;
    map.insert(KEY_OPACITY, style.opacity)?;

    if let Some(fill) = style.fill_color {
        map.insert(KEY_HAS_FILL, true)?;
        map.insert(KEY_FILL_R, fill.r as i64)?;
        map.insert(KEY_FILL_G, fill.g as i64)?;
        map.insert(KEY_FILL_B, fill.b as i64)?;
        map.insert(KEY_FILL_A, fill.a as i64)?;
    } else {
        map.insert(KEY_HAS_FILL, false)?;
    }

    Ok(())
}

/// Decode a record from the deep value of its container.
pub fn record_from_loro(map: &LoroMapValue) -> StoreResult<ShapeRecord> {
    let id_str = get_string(map, KEY_ID).ok_or_else(|| missing("?", KEY_ID))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::Corrupt(format!("record id '{id_str}': {e}")))?;
    let kind = get_string(map, KEY_TYPE)
        .and_then(|name| ShapeKind::parse(&name))
        .ok_or_else(|| missing(&id_str, KEY_TYPE))?;

    let field = |key: &str| get_double(map, key).ok_or_else(|| missing(&id_str, key));

    let body = match kind {
        ShapeKind::Rectangle => ShapeBody::Rectangle {
            width: field(KEY_WIDTH)?,
            height: field(KEY_HEIGHT)?,
        },
        ShapeKind::Ellipse => ShapeBody::Ellipse {
            radius_x: field(KEY_RADIUS_X)?,
            radius_y: field(KEY_RADIUS_Y)?,
        },
        ShapeKind::Line => ShapeBody::Line {
            end: Vec2::new(field(KEY_END_X)?, field(KEY_END_Y)?),
        },
        ShapeKind::Freehand => ShapeBody::Freehand {
            points: points_from_loro(map).ok_or_else(|| missing(&id_str, KEY_POINTS))?,
        },
        ShapeKind::Text => ShapeBody::Text {
            content: get_string(map, KEY_CONTENT).ok_or_else(|| missing(&id_str, KEY_CONTENT))?,
            font_size: field(KEY_FONT_SIZE)?,
            font_family: get_string(map, KEY_FONT_FAMILY).unwrap_or_default(),
            font_weight: get_i64(map, KEY_FONT_WEIGHT)
                .map(FontWeight::from_numeric)
                .unwrap_or_default(),
        },
        ShapeKind::Image => ShapeBody::Image {
            width: field(KEY_WIDTH)?,
            height: field(KEY_HEIGHT)?,
            format: get_string(map, KEY_FORMAT)
                .and_then(|mime| ImageFormat::from_mime_type(&mime))
                .ok_or_else(|| missing(&id_str, KEY_FORMAT))?,
            data_base64: get_string(map, KEY_DATA_BASE64)
                .ok_or_else(|| missing(&id_str, KEY_DATA_BASE64))?,
        },
        ShapeKind::Group => ShapeBody::Group {
            members: members_from_loro(map).ok_or_else(|| missing(&id_str, KEY_MEMBERS))?,
        },
    };

    let geometry = Geometry {
        position: Point::new(field(KEY_X)?, field(KEY_Y)?),
        scale_x: get_double(map, KEY_SCALE_X).unwrap_or(1.0),
        scale_y: get_double(map, KEY_SCALE_Y).unwrap_or(1.0),
        rotation: get_double(map, KEY_ROTATION).unwrap_or(0.0),
        body,
        style: style_from_loro(map).ok_or_else(|| missing(&id_str, KEY_STROKE_R))?,
    };

    Ok(ShapeRecord::new(id, geometry))
}

fn points_from_loro(map: &LoroMapValue) -> Option<Vec<Point>> {
    let LoroValue::List(list) = map.get(KEY_POINTS)? else {
        return None;
    };
    let coords: Vec<f64> = list
        .iter()
        .map(|value| match value {
            LoroValue::Double(d) => Some(*d),
            LoroValue::I64(i) => Some(*i as f64),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if coords.len() % 2 != 0 {
        return None;
    }
    Some(
        coords
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect(),
    )
}

fn members_from_loro(map: &LoroMapValue) -> Option<Vec<Uuid>> {
    let LoroValue::List(list) = map.get(KEY_MEMBERS)? else {
        return None;
    };
    list.iter()
        .map(|value| match value {
            LoroValue::String(s) => Uuid::parse_str(&s.to_string()).ok(),
            _ => None,
        })
        .collect()
}

/// Parse style from Loro map.
fn style_from_loro(map: &LoroMapValue) -> Option<ShapeStyle> {
    let stroke_color = SerializableColor::new(
        get_u8(map, KEY_STROKE_R)?,
        get_u8(map, KEY_STROKE_G)?,
        get_u8(map, KEY_STROKE_B)?,
        get_u8(map, KEY_STROKE_A)?,
    );
    let stroke_width = get_double(map, KEY_STROKE_WIDTH).unwrap_or(2.0);
    let opacity = get_double(map, KEY_OPACITY).unwrap_or(1.0);

    let fill_color = if get_bool(map, KEY_HAS_FILL).unwrap_or(false) {
        Some(SerializableColor::new(
            get_u8(map, KEY_FILL_R)?,
            get_u8(map, KEY_FILL_G)?,
            get_u8(map, KEY_FILL_B)?,
            get_u8(map, KEY_FILL_A)?,
        ))
    } else {
        None
    };

    Some(ShapeStyle {
        stroke_color,
        stroke_width,
        fill_color,
        opacity,
    })
}
