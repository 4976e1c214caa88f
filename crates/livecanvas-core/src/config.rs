//! Session configuration.

use std::time::Duration;

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, CanvasResult};
use crate::tools::ToolKind;

/// Tunables for a canvas session. Every field has a default, so partial JSON
/// documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Wheel zoom multiplies the zoom level by `zoom_sensitivity ^ delta_y`.
    pub zoom_sensitivity: f64,
    pub reaction_ttl_ms: u64,
    pub reaction_prune_interval_ms: u64,
    pub reaction_emit_interval_ms: u64,
    pub presence_throttle_ms: u64,
    /// Drawn shapes smaller than this (world units) are discarded.
    pub min_shape_size: f64,
    /// Tools that stay active after a shape is committed.
    pub sticky_tools: Vec<ToolKind>,
    pub image_anchor: Point,
    /// Longest side of an inserted image after scaling.
    pub image_max_size: f64,
    pub paste_offset: f64,
    pub max_undo_steps: usize,
    pub undo_merge_interval_ms: i64,
    pub relay_url: Option<String>,
    pub room: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.5,
            max_zoom: 2.0,
            zoom_sensitivity: 0.999,
            reaction_ttl_ms: 4000,
            reaction_prune_interval_ms: 1000,
            reaction_emit_interval_ms: 100,
            presence_throttle_ms: 50,
            min_shape_size: 1.0,
            sticky_tools: vec![ToolKind::Freehand],
            image_anchor: Point::new(100.0, 100.0),
            image_max_size: 400.0,
            paste_offset: 10.0,
            max_undo_steps: 100,
            undo_merge_interval_ms: 0,
            relay_url: None,
            room: None,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CanvasError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CanvasResult<()> {
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(CanvasError::Config(format!(
                "invalid zoom range {}..{}",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.zoom_sensitivity > 0.0) {
            return Err(CanvasError::Config(
                "zoom_sensitivity must be positive".to_string(),
            ));
        }
        if self.min_shape_size < 0.0 || self.image_max_size <= 0.0 {
            return Err(CanvasError::Config(
                "shape size limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reaction_ttl(&self) -> Duration {
        Duration::from_millis(self.reaction_ttl_ms)
    }

    pub fn reaction_prune_interval(&self) -> Duration {
        Duration::from_millis(self.reaction_prune_interval_ms)
    }

    pub fn reaction_emit_interval(&self) -> Duration {
        Duration::from_millis(self.reaction_emit_interval_ms)
    }

    pub fn presence_throttle(&self) -> Duration {
        Duration::from_millis(self.presence_throttle_ms)
    }

    pub fn is_sticky(&self, tool: ToolKind) -> bool {
        self.sticky_tools.contains(&tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!((config.min_zoom - 0.5).abs() < f64::EPSILON);
        assert!((config.max_zoom - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.reaction_ttl(), Duration::from_secs(4));
        assert!(config.is_sticky(ToolKind::Freehand));
        assert!(!config.is_sticky(ToolKind::Rectangle));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json(r#"{ "max_zoom": 4.0, "room": "lobby" }"#).unwrap();
        assert!((config.max_zoom - 4.0).abs() < f64::EPSILON);
        assert_eq!(config.room.as_deref(), Some("lobby"));
        assert_eq!(config.presence_throttle_ms, 50);
    }

    #[test]
    fn test_invalid_zoom_range() {
        let result = SessionConfig::from_json(r#"{ "min_zoom": 3.0, "max_zoom": 2.0 }"#);
        assert!(matches!(result, Err(CanvasError::Config(_))));
    }

    #[test]
    fn test_sticky_tools_from_json() {
        let config =
            SessionConfig::from_json(r#"{ "sticky_tools": ["freehand", "rectangle"] }"#).unwrap();
        assert!(config.is_sticky(ToolKind::Rectangle));
    }
}
