//! Bubble lifecycle controller: owns the overlay session.
//!
//! `Running` iff an overlay handle is held. The session mutex is held across
//! the platform call so two racing `start`s cannot both create a window.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::options::{BubbleOptions, NotificationOptions};
use crate::platform::{OverlayHandle, OverlayPlatform};
use crate::types::BubbleState;

struct OverlaySession {
    handle: OverlayHandle,
    bubble: BubbleOptions,
    notification: NotificationOptions,
    started_at: DateTime<Utc>,
}

/// Snapshot returned by `bubbleStatus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleStatus {
    pub state: BubbleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bubble_options: Option<BubbleOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_options: Option<NotificationOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

pub struct BubbleController {
    platform: Arc<dyn OverlayPlatform>,
    session: Mutex<Option<OverlaySession>>,
}

impl BubbleController {
    pub fn new(platform: Arc<dyn OverlayPlatform>) -> Self {
        Self {
            platform,
            session: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<OverlaySession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the bubble with the given options.
    ///
    /// Returns `true` if a session is (now) running. Never requests the
    /// overlay permission itself: without it the call returns `false`.
    pub fn start(&self, bubble: BubbleOptions, notification: NotificationOptions) -> bool {
        let mut session = self.lock();
        if session.is_some() {
            tracing::debug!("start ignored: bubble already running");
            return true;
        }
        if !self.platform.is_overlay_granted() {
            tracing::warn!("start refused: overlay permission not granted");
            return false;
        }
        match self.platform.request_overlay(&bubble, &notification) {
            Ok(handle) => {
                tracing::info!(
                    handle = handle.0,
                    size = bubble.bubble_size,
                    x = bubble.start_location_x,
                    y = bubble.start_location_y,
                    "bubble started"
                );
                *session = Some(OverlaySession {
                    handle,
                    bubble,
                    notification,
                    started_at: Utc::now(),
                });
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "bubble start failed");
                false
            }
        }
    }

    /// Stop the bubble. `true` when no session remains afterwards; a failed
    /// release keeps the session so the call can be retried.
    pub fn stop(&self) -> bool {
        let mut session = self.lock();
        let Some(current) = session.take() else {
            tracing::debug!("stop ignored: bubble not running");
            return true;
        };
        match self.platform.release_overlay(current.handle) {
            Ok(()) => {
                let ran_ms = (Utc::now() - current.started_at).num_milliseconds();
                tracing::info!(handle = current.handle.0, ran_ms, "bubble stopped");
                true
            }
            Err(e) => {
                tracing::warn!(handle = current.handle.0, error = %e, "bubble stop failed");
                *session = Some(current);
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    pub fn state(&self) -> BubbleState {
        if self.is_running() {
            BubbleState::Running
        } else {
            BubbleState::Stopped
        }
    }

    pub fn status(&self) -> BubbleStatus {
        match self.lock().as_ref() {
            Some(s) => BubbleStatus {
                state: BubbleState::Running,
                bubble_options: Some(s.bubble.clone()),
                notification_options: Some(s.notification.clone()),
                started_at: Some(s.started_at),
            },
            None => BubbleStatus {
                state: BubbleState::Stopped,
                bubble_options: None,
                notification_options: None,
                started_at: None,
            },
        }
    }

    /// The requester's context is gone; the session goes with it.
    pub fn on_context_destroyed(&self) {
        if self.is_running() && !self.stop() {
            tracing::warn!("overlay survived requester context teardown");
        }
    }
}
