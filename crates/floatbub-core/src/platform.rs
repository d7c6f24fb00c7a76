//! OverlayPlatform trait: the capability boundary to the OS.
//! Window manager, notification presenter, permission dialogs and the
//! overlay surface's broadcast transport all live behind it, so the core
//! can be exercised without a real device.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::options::{BubbleOptions, NotificationOptions};
use crate::types::{InteractionKind, PermissionKind, RequestCode};

/// Opaque handle to a live overlay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayHandle(pub u64);

/// Opaque id of a broadcast subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// A broadcast as published by the overlay surface, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBroadcast {
    pub action: String,
    #[serde(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl RawBroadcast {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            extras: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extras.insert(key.to_string(), value.into());
        self
    }
}

/// Callback invoked by the transport for every matching broadcast.
pub type BroadcastHandler = Arc<dyn Fn(&RawBroadcast) + Send + Sync>;

/// Capability interface consumed by the core. Enables mock injection for testing.
pub trait OverlayPlatform: Send + Sync {
    /// Platform API level; post-notification checks only apply from
    /// [`crate::arbiter::POST_NOTIFICATIONS_MIN_LEVEL`] upwards.
    fn capability_level(&self) -> u32;

    fn is_overlay_granted(&self) -> bool;

    fn is_post_notifications_granted(&self) -> bool;

    /// Open the OS grant dialog for `kind`. Its outcome is reported later
    /// through the host's result callback under `code`.
    fn launch_grant_flow(&self, kind: PermissionKind, code: RequestCode) -> Result<(), PlatformError>;

    /// Create the overlay window and its foreground notification.
    fn request_overlay(
        &self,
        bubble: &BubbleOptions,
        notification: &NotificationOptions,
    ) -> Result<OverlayHandle, PlatformError>;

    fn release_overlay(&self, handle: OverlayHandle) -> Result<(), PlatformError>;

    /// Register `handler` for broadcasts whose action matches one of `kinds`.
    fn subscribe(
        &self,
        kinds: &[InteractionKind],
        handler: BroadcastHandler,
    ) -> Result<SubscriptionId, PlatformError>;

    fn unsubscribe(&self, id: SubscriptionId);
}

impl<T: OverlayPlatform + ?Sized> OverlayPlatform for Arc<T> {
    fn capability_level(&self) -> u32 {
        (**self).capability_level()
    }

    fn is_overlay_granted(&self) -> bool {
        (**self).is_overlay_granted()
    }

    fn is_post_notifications_granted(&self) -> bool {
        (**self).is_post_notifications_granted()
    }

    fn launch_grant_flow(&self, kind: PermissionKind, code: RequestCode) -> Result<(), PlatformError> {
        (**self).launch_grant_flow(kind, code)
    }

    fn request_overlay(
        &self,
        bubble: &BubbleOptions,
        notification: &NotificationOptions,
    ) -> Result<OverlayHandle, PlatformError> {
        (**self).request_overlay(bubble, notification)
    }

    fn release_overlay(&self, handle: OverlayHandle) -> Result<(), PlatformError> {
        (**self).release_overlay(handle)
    }

    fn subscribe(
        &self,
        kinds: &[InteractionKind],
        handler: BroadcastHandler,
    ) -> Result<SubscriptionId, PlatformError> {
        (**self).subscribe(kinds, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_broadcast_builder_collects_extras() {
        let raw = RawBroadcast::new("floatbub.action.TAP")
            .with_extra("x", 1.5)
            .with_extra("y", 2);
        assert_eq!(raw.extras.len(), 2);
        assert_eq!(raw.extras["x"], serde_json::json!(1.5));
    }

    #[test]
    fn raw_broadcast_extras_default_to_empty() {
        let raw: RawBroadcast =
            serde_json::from_str(r#"{"action": "floatbub.action.MOVE"}"#).expect("parse");
        assert!(raw.extras.is_empty());
    }

    #[test]
    fn blanket_arc_impl() {
        struct Fixed;
        impl OverlayPlatform for Fixed {
            fn capability_level(&self) -> u32 {
                30
            }
            fn is_overlay_granted(&self) -> bool {
                true
            }
            fn is_post_notifications_granted(&self) -> bool {
                false
            }
            fn launch_grant_flow(&self, _: PermissionKind, _: RequestCode) -> Result<(), PlatformError> {
                Ok(())
            }
            fn request_overlay(
                &self,
                _: &BubbleOptions,
                _: &NotificationOptions,
            ) -> Result<OverlayHandle, PlatformError> {
                Ok(OverlayHandle(7))
            }
            fn release_overlay(&self, _: OverlayHandle) -> Result<(), PlatformError> {
                Ok(())
            }
            fn subscribe(
                &self,
                _: &[InteractionKind],
                _: BroadcastHandler,
            ) -> Result<SubscriptionId, PlatformError> {
                Ok(SubscriptionId(1))
            }
            fn unsubscribe(&self, _: SubscriptionId) {}
        }

        let shared: Arc<dyn OverlayPlatform> = Arc::new(Fixed);
        let wrapped = Arc::new(shared);
        assert_eq!(wrapped.capability_level(), 30);
        assert_eq!(
            wrapped
                .request_overlay(&BubbleOptions::default(), &NotificationOptions::default())
                .expect("ok"),
            OverlayHandle(7)
        );
    }
}
