//! Bubble host: one platform, all components, and the requester-context
//! boundary.
//!
//! A requester context becomes available with [`BubbleHost::context_available`]
//! and goes away with [`BubbleHost::context_destroyed`]. Losing the bound
//! context stops the overlay session and abandons pending permission
//! requests; binding a new context only abandons the old one's requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::arbiter::PermissionArbiter;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{PlatformError, RegistryError};
use crate::lifecycle::BubbleController;
use crate::platform::OverlayPlatform;
use crate::registry::Resolution;
use crate::relay::{ContextId, EventRelay, EventSink};
use crate::types::RequestCode;

pub struct BubbleHost {
    arbiter: Arc<PermissionArbiter>,
    controller: Arc<BubbleController>,
    relay: EventRelay,
    dispatcher: Dispatcher,
    next_context: AtomicU64,
}

impl BubbleHost {
    pub fn new(platform: impl OverlayPlatform + 'static) -> Self {
        let platform: Arc<dyn OverlayPlatform> = Arc::new(platform);
        let arbiter = Arc::new(PermissionArbiter::new(Arc::clone(&platform)));
        let controller = Arc::new(BubbleController::new(Arc::clone(&platform)));
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&arbiter), Arc::clone(&controller)),
            relay: EventRelay::new(platform),
            arbiter,
            controller,
            next_context: AtomicU64::new(1),
        }
    }

    pub fn dispatch(&self, name: &str, args: &Value) -> DispatchOutcome {
        self.dispatcher.dispatch(name, args)
    }

    /// OS result callback for a grant flow.
    pub fn on_permission_result(
        &self,
        code: RequestCode,
        result_code: i32,
    ) -> Result<Resolution, RegistryError> {
        self.arbiter.resolve(code, result_code)
    }

    /// Bind a new requester context that receives interaction pushes via `sink`.
    pub fn context_available(&self, sink: EventSink) -> Result<ContextId, PlatformError> {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::SeqCst));
        if self.relay.attach(id, sink)?.is_some() {
            self.arbiter.abandon_pending();
        }
        tracing::info!(context = id.0, "requester context available");
        Ok(id)
    }

    /// The context `id` is gone. No-op unless it is the bound one.
    pub fn context_destroyed(&self, id: ContextId) {
        if !self.relay.detach(id) {
            tracing::debug!(context = id.0, "stale context teardown ignored");
            return;
        }
        self.controller.on_context_destroyed();
        self.arbiter.abandon_pending();
        tracing::info!(context = id.0, "requester context destroyed");
    }

    pub fn bound_context(&self) -> Option<ContextId> {
        self.relay.bound_context()
    }

    pub fn arbiter(&self) -> &PermissionArbiter {
        &self.arbiter
    }

    pub fn controller(&self) -> &BubbleController {
        &self.controller
    }
}
