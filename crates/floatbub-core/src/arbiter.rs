//! Permission arbiter: synchronous grant queries plus the two request
//! paths (already granted → immediate reply, otherwise grant flow +
//! registered continuation).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::{CommandError, RegistryError};
use crate::platform::OverlayPlatform;
use crate::registry::{ContinuationRegistry, PendingInfo, PermissionReply, Resolution};
use crate::types::{NOTIFICATION_PERMISSION_REQUEST_CODE, PermissionKind, RequestCode};

/// First capability level at which posting notifications needs a grant.
pub const POST_NOTIFICATIONS_MIN_LEVEL: u32 = 33;

/// Bookkeeping for the secondary notification-permission prompt, which
/// acknowledges synchronously and is observed by polling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPermissionStatus {
    /// A prompt was issued and its result has not arrived yet.
    pub prompt_outstanding: bool,
    /// Grant state observed at the last result callback, if any.
    pub last_observed: Option<bool>,
    pub prompts_issued: u32,
}

pub struct PermissionArbiter {
    platform: Arc<dyn OverlayPlatform>,
    registry: ContinuationRegistry,
    notification_status: Mutex<NotificationPermissionStatus>,
}

impl PermissionArbiter {
    pub fn new(platform: Arc<dyn OverlayPlatform>) -> Self {
        Self {
            platform,
            registry: ContinuationRegistry::new(),
            notification_status: Mutex::new(NotificationPermissionStatus::default()),
        }
    }

    fn status_lock(&self) -> MutexGuard<'_, NotificationPermissionStatus> {
        self.notification_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn has_overlay_permission(&self) -> bool {
        self.platform.is_overlay_granted()
    }

    /// Always true below [`POST_NOTIFICATIONS_MIN_LEVEL`].
    pub fn has_post_notifications_permission(&self) -> bool {
        self.platform.capability_level() < POST_NOTIFICATIONS_MIN_LEVEL
            || self.platform.is_post_notifications_granted()
    }

    pub fn has_notification_permission(&self) -> bool {
        self.has_post_notifications_permission()
    }

    pub fn is_granted(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Overlay => self.has_overlay_permission(),
            PermissionKind::PostNotifications => self.has_post_notifications_permission(),
        }
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Request `kind`. Resolves immediately when already granted; otherwise
    /// the reply resolves when the OS reports back under the kind's code.
    pub fn request(&self, kind: PermissionKind) -> Result<PermissionReply, CommandError> {
        if self.is_granted(kind) {
            tracing::debug!(%kind, "permission already granted");
            return Ok(PermissionReply::ready(true));
        }

        let reply = self.registry.register(kind)?;
        let code = kind.request_code();
        let rollback = Rollback {
            registry: &self.registry,
            kind,
            armed: true,
        };
        if let Err(e) = self.platform.launch_grant_flow(kind, code) {
            tracing::warn!(%kind, error = %e, "grant flow launch failed");
            return Err(e.into());
        }
        rollback.disarm();
        tracing::info!(%kind, %code, "grant flow launched, awaiting result");
        Ok(reply)
    }

    pub fn request_overlay_permission(&self) -> Result<PermissionReply, CommandError> {
        self.request(PermissionKind::Overlay)
    }

    pub fn request_post_notifications_permission(&self) -> Result<PermissionReply, CommandError> {
        self.request(PermissionKind::PostNotifications)
    }

    /// Secondary prompt. Returns `true` once the prompt has been issued (or
    /// the permission is already held); the grant outcome only updates
    /// [`NotificationPermissionStatus`].
    pub fn request_notification_permission(&self) -> Result<bool, CommandError> {
        if self.has_notification_permission() {
            self.status_lock().last_observed = Some(true);
            return Ok(true);
        }
        self.platform.launch_grant_flow(
            PermissionKind::PostNotifications,
            NOTIFICATION_PERMISSION_REQUEST_CODE,
        )?;
        let mut status = self.status_lock();
        status.prompt_outstanding = true;
        status.prompts_issued += 1;
        tracing::info!(prompts = status.prompts_issued, "notification prompt issued");
        Ok(true)
    }

    pub fn notification_status(&self) -> NotificationPermissionStatus {
        *self.status_lock()
    }

    // ── Results ──────────────────────────────────────────────────────

    /// Route an OS result callback. `result_code` is informational only:
    /// continuations receive the grant state queried at resolution time.
    pub fn resolve(&self, code: RequestCode, result_code: i32) -> Result<Resolution, RegistryError> {
        tracing::debug!(%code, result_code, "permission result received");
        if code == NOTIFICATION_PERMISSION_REQUEST_CODE {
            let granted = self.has_notification_permission();
            let mut status = self.status_lock();
            status.prompt_outstanding = false;
            status.last_observed = Some(granted);
            return Ok(Resolution::StatusUpdated { granted });
        }
        let result = self.registry.resolve(code, |kind| self.is_granted(kind));
        if let Err(ref e) = result {
            tracing::warn!(%code, error = %e, "spurious permission result");
        }
        result
    }

    /// Abandon every pending continuation (requester context went away).
    pub fn abandon_pending(&self) -> usize {
        let n = self.registry.abandon_all();
        if n > 0 {
            tracing::info!(abandoned = n, "pending permission requests abandoned");
        }
        n
    }

    pub fn pending(&self) -> Vec<PendingInfo> {
        self.registry.pending()
    }
}

/// Cancels a registration unless disarmed, so a grant flow that fails or
/// unwinds never leaves its slot occupied.
struct Rollback<'a> {
    registry: &'a ContinuationRegistry,
    kind: PermissionKind,
    armed: bool,
}

impl Rollback<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.cancel(self.kind);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
