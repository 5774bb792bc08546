//! Tuning knobs for the placement engine.
//!
//! All options are plain numbers, enums and lists. The configuration is stored as
//! JSON; missing fields take the defaults from [`crate::constants`].

use crate::constants::*;
use crate::error::{Result, SnapError};
use crate::types::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// How the free-position search explores the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Sample fixed angles on growing radii and keep the nearest free point
    #[default]
    Spiral,
    /// Scan growing square rings and keep the best-scored point of the first ring with any
    Priority,
}

/// How items of one class are split into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    /// One group per class per run
    #[default]
    ByType,
    /// One group per proximity cluster within a class
    ByDistance,
}

/// Easing curve sampled while an item moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    /// Cubic ease in and out, the default motion
    #[default]
    EaseInOut,
    EaseIn,
    EaseOut,
    SmoothStep,
}

impl Easing {
    /// Maps normalized time `t` (clamped to `[0, 1]`) to interpolation progress.
    pub fn evaluate(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t * t,
            Easing::EaseOut => 1.0 - (1.0 - t).powi(3),
            Easing::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::SmoothStep => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Complete configuration of the placement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Lattice cell size
    pub grid_size: f32,
    /// Radius steps tried before the search gives up
    pub max_search_steps: u32,
    pub search_strategy: SearchStrategy,
    /// Angular step of the spiral search in degrees
    pub spiral_angle_step_deg: u32,
    /// Priority search: weight rewarding lower X
    pub priority_x_weight: f32,
    /// Priority search: weight rewarding higher Y
    pub priority_y_weight: f32,
    /// Moves an item may make during one stabilization run
    pub max_passes_per_item: u32,
    /// Maximum items per sub-group
    pub sub_group_size: usize,
    pub vertical_spacing: f32,
    /// Extra gap before the columns of each further proximity cluster in a run
    pub horizontal_spacing: f32,
    pub group_spacing: f32,
    pub sub_group_spacing: f32,
    pub move_duration_ms: u64,
    pub easing: Easing,
    /// Sampling tick of position interpolation
    pub frame_interval_ms: u64,
    pub grouping: GroupingStrategy,
    /// Proximity threshold for [`GroupingStrategy::ByDistance`]
    pub distance_threshold: f32,
    pub inter_item_delay_ms: u64,
    pub inter_class_delay_ms: u64,
    /// Known classes in processing order
    pub class_sequence: Vec<String>,
    /// Marker positions that anchor each class's groups
    pub class_anchors: BTreeMap<String, Point>,
    /// Run the stabilization loop after the grouped arrangement
    pub stabilize_after_arrange: bool,
    /// Line items of each type up vertically after stabilization
    pub vertical_sort: bool,
    /// Vertical sort goes downwards from the top-most item when true
    pub vertical_sort_descending: bool,
    pub monitor_interval_ms: u64,
    /// Wait for the display driver's expand/collapse signals around each class
    pub use_rendezvous: bool,
    /// Log rejected re-entrant triggers as warnings instead of debug messages
    pub log_rejected_triggers: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            max_search_steps: MAX_SEARCH_STEPS,
            search_strategy: SearchStrategy::default(),
            spiral_angle_step_deg: SPIRAL_ANGLE_STEP_DEG,
            priority_x_weight: 10.0,
            priority_y_weight: 5.0,
            max_passes_per_item: MAX_PASSES_PER_ITEM,
            sub_group_size: SUB_GROUP_SIZE,
            vertical_spacing: VERTICAL_SPACING,
            horizontal_spacing: HORIZONTAL_SPACING,
            group_spacing: GROUP_SPACING,
            sub_group_spacing: SUB_GROUP_SPACING,
            move_duration_ms: MOVE_DURATION_MS,
            easing: Easing::default(),
            frame_interval_ms: FRAME_INTERVAL_MS,
            grouping: GroupingStrategy::default(),
            distance_threshold: DISTANCE_THRESHOLD,
            inter_item_delay_ms: INTER_ITEM_DELAY_MS,
            inter_class_delay_ms: INTER_CLASS_DELAY_MS,
            class_sequence: DEFAULT_CLASS_SEQUENCE
                .iter()
                .map(|c| c.to_string())
                .collect(),
            class_anchors: BTreeMap::new(),
            stabilize_after_arrange: false,
            vertical_sort: false,
            vertical_sort_descending: true,
            monitor_interval_ms: MONITOR_INTERVAL_MS,
            use_rendezvous: true,
            log_rejected_triggers: true,
        }
    }
}

impl SnapConfig {
    /// Parses and validates a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SnapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            return Err(SnapError::InvalidConfig(format!(
                "grid_size must be positive, got {}",
                self.grid_size
            )));
        }
        if self.sub_group_size == 0 {
            return Err(SnapError::InvalidConfig(
                "sub_group_size must be at least 1".into(),
            ));
        }
        if self.max_passes_per_item == 0 {
            return Err(SnapError::InvalidConfig(
                "max_passes_per_item must be at least 1".into(),
            ));
        }
        if self.spiral_angle_step_deg == 0 || self.spiral_angle_step_deg > 360 {
            return Err(SnapError::InvalidConfig(format!(
                "spiral_angle_step_deg must be in 1..=360, got {}",
                self.spiral_angle_step_deg
            )));
        }
        let spacings = [
            ("vertical_spacing", self.vertical_spacing),
            ("horizontal_spacing", self.horizontal_spacing),
            ("group_spacing", self.group_spacing),
            ("sub_group_spacing", self.sub_group_spacing),
            ("distance_threshold", self.distance_threshold),
            ("priority_x_weight", self.priority_x_weight),
            ("priority_y_weight", self.priority_y_weight),
        ];
        for (name, value) in spacings {
            if !value.is_finite() {
                return Err(SnapError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn move_duration(&self) -> Duration {
        Duration::from_millis(self.move_duration_ms)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn inter_class_delay(&self) -> Duration {
        Duration::from_millis(self.inter_class_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    /// True when `class` is part of the configured class sequence.
    pub fn is_known_class(&self, class: &str) -> bool {
        self.class_sequence.iter().any(|c| c == class)
    }

    /// Configuration with all timings zeroed, for instant arrangement.
    pub fn instant(mut self) -> Self {
        self.move_duration_ms = 0;
        self.inter_item_delay_ms = 0;
        self.inter_class_delay_ms = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SnapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sub_group_size, 5);
        assert_eq!(config.class_sequence.first().map(String::as_str), Some("R"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            SnapConfig::from_json(r#"{"grid_size": 0.5, "search_strategy": "priority"}"#).unwrap();
        assert_eq!(config.grid_size, 0.5);
        assert_eq!(config.search_strategy, SearchStrategy::Priority);
        assert_eq!(config.max_search_steps, MAX_SEARCH_STEPS);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SnapConfig::from_json(r#"{"grid_size": 0.0}"#),
            Err(SnapError::InvalidConfig(_))
        ));
        assert!(matches!(
            SnapConfig::from_json(r#"{"sub_group_size": 0}"#),
            Err(SnapError::InvalidConfig(_))
        ));
        assert!(matches!(
            SnapConfig::from_json(r#"{"max_passes_per_item": 0}"#),
            Err(SnapError::InvalidConfig(_))
        ));
        assert!(matches!(
            SnapConfig::from_json("not json"),
            Err(SnapError::Json(_))
        ));
    }

    #[test]
    fn test_config_json_roundtrip_keeps_anchors() {
        let mut config = SnapConfig::default();
        config
            .class_anchors
            .insert("R".into(), Point::new(-10.0, 5.0));
        config.grouping = GroupingStrategy::ByDistance;

        let restored = SnapConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_easing_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::EaseInOut,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::SmoothStep,
        ] {
            assert_eq!(easing.evaluate(0.0), 0.0);
            assert!((easing.evaluate(1.0) - 1.0).abs() < 1e-6);
            assert_eq!(easing.evaluate(2.0), easing.evaluate(1.0));
        }
        assert!((Easing::EaseInOut.evaluate(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_known_class_lookup() {
        let config = SnapConfig::default();
        assert!(config.is_known_class("R"));
        assert!(!config.is_known_class("W"));
    }
}
