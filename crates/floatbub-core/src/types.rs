//! Shared domain types: request codes, permission kinds, bubble state and
//! interaction events.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Request codes ───────────────────────────────────────────────────

/// Numeric correlation id matching an async OS callback to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestCode(pub i32);

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request code of the overlay (draw-over-other-apps) grant flow.
pub const OVERLAY_PERMISSION_REQUEST_CODE: RequestCode = RequestCode(1237);

/// Request code of the post-notifications grant flow.
pub const POST_NOTIFICATIONS_REQUEST_CODE: RequestCode = RequestCode(1238);

/// Request code of the secondary notification-permission prompt.
/// Results under this code only update bookkeeping.
pub const NOTIFICATION_PERMISSION_REQUEST_CODE: RequestCode = RequestCode(1239);

// ─── Permissions ─────────────────────────────────────────────────────

/// The two independent OS permissions a bubble depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Overlay,
    PostNotifications,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 2] = [PermissionKind::Overlay, PermissionKind::PostNotifications];

    /// Fixed request code the grant flow of this permission reports back under.
    pub fn request_code(self) -> RequestCode {
        match self {
            Self::Overlay => OVERLAY_PERMISSION_REQUEST_CODE,
            Self::PostNotifications => POST_NOTIFICATIONS_REQUEST_CODE,
        }
    }

    /// Reverse of [`Self::request_code`]. The secondary notification code is
    /// not a continuation code and maps to `None`.
    pub fn from_request_code(code: RequestCode) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.request_code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::PostNotifications => "post_notifications",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Bubble state ────────────────────────────────────────────────────

/// Overlay session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleState {
    #[default]
    Stopped,
    Running,
}

// ─── Interaction events ──────────────────────────────────────────────

/// Screen coordinates reported by the overlay surface.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The four gesture kinds the overlay surface publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Tap,
    TapDown,
    TapUp,
    Move,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 4] = [
        InteractionKind::Tap,
        InteractionKind::TapDown,
        InteractionKind::TapUp,
        InteractionKind::Move,
    ];

    /// Broadcast action string the overlay surface publishes this kind under.
    pub fn action(self) -> &'static str {
        match self {
            Self::Tap => "floatbub.action.TAP",
            Self::TapDown => "floatbub.action.TAP_DOWN",
            Self::TapUp => "floatbub.action.TAP_UP",
            Self::Move => "floatbub.action.MOVE",
        }
    }

    pub fn from_action(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.action() == action)
    }
}

/// A single gesture, forwarded to the requester as `{type, x, y}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    #[serde(flatten)]
    pub position: Point,
}

// ─── Tests ────────────────────────────────────────────────────────
