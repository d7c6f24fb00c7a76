//! Immutable per-session configuration captured by `startBubble`.
//!
//! Both option structs deserialize from camelCase JSON with every field
//! defaulted, so `{}` is a valid argument.

use serde::{Deserialize, Serialize};

use crate::types::Point;

/// What the close target does while the bubble is dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseBehavior {
    /// Close target follows the bubble horizontally.
    #[default]
    Following,
    /// Close target stays at the bottom centre.
    Fixed,
}

/// Position, size and behaviour flags of the floating bubble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BubbleOptions {
    pub bubble_icon: Option<String>,
    pub close_icon: Option<String>,
    pub start_location_x: f64,
    pub start_location_y: f64,
    pub bubble_size: f64,
    pub opacity: f64,
    pub enable_close: bool,
    pub close_behavior: CloseBehavior,
    pub distance_to_close: f64,
    pub enable_animate_to_edge: bool,
    pub enable_bottom_shadow: bool,
}

impl Default for BubbleOptions {
    fn default() -> Self {
        Self {
            bubble_icon: None,
            close_icon: None,
            start_location_x: 0.0,
            start_location_y: 200.0,
            bubble_size: 60.0,
            opacity: 1.0,
            enable_close: true,
            close_behavior: CloseBehavior::default(),
            distance_to_close: 100.0,
            enable_animate_to_edge: true,
            enable_bottom_shadow: true,
        }
    }
}

impl BubbleOptions {
    pub fn start_location(&self) -> Point {
        Point::new(self.start_location_x, self.start_location_y)
    }

    /// Check value ranges. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if !self.start_location_x.is_finite() || !self.start_location_y.is_finite() {
            return Err("start location must be finite".to_string());
        }
        if !(self.bubble_size.is_finite() && self.bubble_size > 0.0) {
            return Err(format!("bubbleSize must be positive, got {}", self.bubble_size));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(format!("opacity must be within 0..=1, got {}", self.opacity));
        }
        if !(self.distance_to_close.is_finite() && self.distance_to_close >= 0.0) {
            return Err(format!(
                "distanceToClose must be non-negative, got {}",
                self.distance_to_close
            ));
        }
        Ok(())
    }
}

/// Foreground-presentation parameters of the notification that keeps the
/// overlay alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationOptions {
    pub id: i32,
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub channel_id: String,
    pub channel_name: String,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            id: 1,
            title: None,
            body: None,
            icon: None,
            channel_id: "floatbub".to_string(),
            channel_name: "Floating bubble".to_string(),
        }
    }
}

impl NotificationOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_id.trim().is_empty() {
            return Err("channelId must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let bubble: BubbleOptions = serde_json::from_str("{}").expect("parse");
        assert_eq!(bubble, BubbleOptions::default());
        let notification: NotificationOptions = serde_json::from_str("{}").expect("parse");
        assert_eq!(notification, NotificationOptions::default());
    }

    #[test]
    fn camel_case_fields_are_read() {
        let bubble: BubbleOptions = serde_json::from_value(serde_json::json!({
            "bubbleSize": 80.0,
            "startLocationX": 10.0,
            "closeBehavior": "fixed",
            "enableClose": false,
        }))
        .expect("parse");
        assert_eq!(bubble.bubble_size, 80.0);
        assert_eq!(bubble.start_location(), Point::new(10.0, 200.0));
        assert_eq!(bubble.close_behavior, CloseBehavior::Fixed);
        assert!(!bubble.enable_close);
        assert!(bubble.enable_animate_to_edge);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let zero_size = BubbleOptions {
            bubble_size: 0.0,
            ..BubbleOptions::default()
        };
        assert!(zero_size.validate().is_err());

        let too_opaque = BubbleOptions {
            opacity: 1.5,
            ..BubbleOptions::default()
        };
        assert!(too_opaque.validate().unwrap_err().contains("opacity"));

        let nan_position = BubbleOptions {
            start_location_y: f64::NAN,
            ..BubbleOptions::default()
        };
        assert!(nan_position.validate().is_err());

        assert!(BubbleOptions::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_channel() {
        let notification = NotificationOptions {
            channel_id: "  ".to_string(),
            ..NotificationOptions::default()
        };
        assert!(notification.validate().is_err());
        assert!(NotificationOptions::default().validate().is_ok());
    }
}
