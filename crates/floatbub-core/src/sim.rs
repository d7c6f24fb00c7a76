//! In-memory [`OverlayPlatform`] used by the daemon and by tests.
//!
//! Grant state, overlay windows and broadcast subscriptions are plain
//! fields behind one mutex. Handlers are always invoked after the lock is
//! released so a handler may call back into the platform.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::PlatformError;
use crate::options::{BubbleOptions, NotificationOptions};
use crate::platform::{BroadcastHandler, OverlayHandle, OverlayPlatform, RawBroadcast, SubscriptionId};
use crate::types::{InteractionKind, NOTIFICATION_PERMISSION_REQUEST_CODE, PermissionKind, RequestCode};

/// Default API level: above the post-notifications threshold.
const DEFAULT_CAPABILITY_LEVEL: u32 = 34;

struct Subscription {
    actions: Vec<&'static str>,
    handler: BroadcastHandler,
}

struct SimState {
    capability_level: u32,
    overlay_granted: bool,
    post_notifications_granted: bool,
    reject_overlay: bool,
    fail_release: bool,
    fail_grant_flow: bool,
    fail_subscribe: bool,
    next_handle: u64,
    overlays: BTreeMap<u64, (BubbleOptions, NotificationOptions)>,
    overlays_created: u64,
    launched_flows: Vec<(PermissionKind, RequestCode)>,
    next_subscription: u64,
    subscriptions: BTreeMap<u64, Subscription>,
}

/// Simulated device: every OS primitive the core needs, in memory.
pub struct SimulatedPlatform {
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                capability_level: DEFAULT_CAPABILITY_LEVEL,
                overlay_granted: false,
                post_notifications_granted: false,
                reject_overlay: false,
                fail_release: false,
                fail_grant_flow: false,
                fail_subscribe: false,
                next_handle: 1,
                overlays: BTreeMap::new(),
                overlays_created: 0,
                launched_flows: Vec::new(),
                next_subscription: 1,
                subscriptions: BTreeMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_capability_level(self, level: u32) -> Self {
        self.lock().capability_level = level;
        self
    }

    #[must_use]
    pub fn with_overlay_granted(self, granted: bool) -> Self {
        self.set_overlay_granted(granted);
        self
    }

    #[must_use]
    pub fn with_post_notifications_granted(self, granted: bool) -> Self {
        self.set_post_notifications_granted(granted);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_overlay_granted(&self, granted: bool) {
        self.lock().overlay_granted = granted;
    }

    pub fn set_post_notifications_granted(&self, granted: bool) {
        self.lock().post_notifications_granted = granted;
    }

    /// Make the window manager refuse new overlays.
    pub fn set_reject_overlay(&self, reject: bool) {
        self.lock().reject_overlay = reject;
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.lock().fail_release = fail;
    }

    pub fn set_fail_grant_flow(&self, fail: bool) {
        self.lock().fail_grant_flow = fail;
    }

    /// Make the broadcast service refuse new subscriptions.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    /// Apply the user's answer to the dialog that reports under `code`.
    /// Returns `false` for codes no dialog reports under.
    pub fn apply_grant(&self, code: RequestCode, granted: bool) -> bool {
        let kind = if code == NOTIFICATION_PERMISSION_REQUEST_CODE {
            PermissionKind::PostNotifications
        } else {
            match PermissionKind::from_request_code(code) {
                Some(kind) => kind,
                None => return false,
            }
        };
        match kind {
            PermissionKind::Overlay => self.set_overlay_granted(granted),
            PermissionKind::PostNotifications => self.set_post_notifications_granted(granted),
        }
        true
    }

    pub fn launched_flows(&self) -> Vec<(PermissionKind, RequestCode)> {
        self.lock().launched_flows.clone()
    }

    pub fn live_overlay_count(&self) -> usize {
        self.lock().overlays.len()
    }

    pub fn overlays_created(&self) -> u64 {
        self.lock().overlays_created
    }

    /// Options the most recent live overlay was created with.
    pub fn live_overlay_options(&self) -> Option<(BubbleOptions, NotificationOptions)> {
        self.lock().overlays.values().next_back().cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Publish a broadcast as the overlay surface would. Returns the number
    /// of handlers it was delivered to.
    pub fn emit(&self, broadcast: &RawBroadcast) -> usize {
        let handlers: Vec<BroadcastHandler> = self
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.actions.contains(&broadcast.action.as_str()))
            .map(|s| BroadcastHandler::clone(&s.handler))
            .collect();
        for handler in &handlers {
            handler(broadcast);
        }
        handlers.len()
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayPlatform for SimulatedPlatform {
    fn capability_level(&self) -> u32 {
        self.lock().capability_level
    }

    fn is_overlay_granted(&self) -> bool {
        self.lock().overlay_granted
    }

    fn is_post_notifications_granted(&self) -> bool {
        self.lock().post_notifications_granted
    }

    fn launch_grant_flow(&self, kind: PermissionKind, code: RequestCode) -> Result<(), PlatformError> {
        let mut st = self.lock();
        if st.fail_grant_flow {
            return Err(PlatformError::GrantFlowFailed {
                kind,
                detail: "no activity to handle the settings intent".to_string(),
            });
        }
        st.launched_flows.push((kind, code));
        Ok(())
    }

    fn request_overlay(
        &self,
        bubble: &BubbleOptions,
        notification: &NotificationOptions,
    ) -> Result<OverlayHandle, PlatformError> {
        let mut st = self.lock();
        if st.reject_overlay {
            return Err(PlatformError::OverlayRejected(
                "window manager denied TYPE_APPLICATION_OVERLAY".to_string(),
            ));
        }
        let id = st.next_handle;
        st.next_handle += 1;
        st.overlays_created += 1;
        st.overlays.insert(id, (bubble.clone(), notification.clone()));
        Ok(OverlayHandle(id))
    }

    fn release_overlay(&self, handle: OverlayHandle) -> Result<(), PlatformError> {
        let mut st = self.lock();
        if st.fail_release {
            return Err(PlatformError::ReleaseFailed(format!(
                "overlay {} is still attached",
                handle.0
            )));
        }
        match st.overlays.remove(&handle.0) {
            Some(_) => Ok(()),
            None => Err(PlatformError::ReleaseFailed(format!("unknown overlay {}", handle.0))),
        }
    }

    fn subscribe(
        &self,
        kinds: &[InteractionKind],
        handler: BroadcastHandler,
    ) -> Result<SubscriptionId, PlatformError> {
        if kinds.is_empty() {
            return Err(PlatformError::SubscriptionFailed(
                "empty event filter".to_string(),
            ));
        }
        let mut st = self.lock();
        if st.fail_subscribe {
            return Err(PlatformError::SubscriptionFailed(
                "broadcast service unavailable".to_string(),
            ));
        }
        let id = st.next_subscription;
        st.next_subscription += 1;
        st.subscriptions.insert(
            id,
            Subscription {
                actions: kinds.iter().map(|k| k.action()).collect(),
                handler,
            },
        );
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscriptions.remove(&id.0);
    }
}
