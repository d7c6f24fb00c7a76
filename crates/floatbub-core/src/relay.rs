//! Event relay: overlay-surface broadcasts → requester pushes.
//!
//! One subscription per bound requester context. The handler checks the
//! currently bound context id before every delivery, so a broadcast racing
//! a rebind never lands in the old context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::error::{EventDecodeError, PlatformError};
use crate::platform::{BroadcastHandler, OverlayPlatform, RawBroadcast, SubscriptionId};
use crate::types::{InteractionEvent, InteractionKind, Point};

/// No context bound.
const UNBOUND: u64 = 0;

/// Identity of a requester execution context. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Push channel into a requester context.
pub type EventSink = mpsc::UnboundedSender<InteractionEvent>;

struct Binding {
    context: ContextId,
    subscription: SubscriptionId,
}

pub struct EventRelay {
    platform: Arc<dyn OverlayPlatform>,
    current: Arc<AtomicU64>,
    binding: Mutex<Option<Binding>>,
}

/// Decode a raw broadcast into an interaction event.
pub fn decode(raw: &RawBroadcast) -> Result<InteractionEvent, EventDecodeError> {
    let kind = InteractionKind::from_action(&raw.action)
        .ok_or_else(|| EventDecodeError::UnknownAction(raw.action.clone()))?;
    let axis = |name: &'static str| {
        raw.extras
            .get(name)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| EventDecodeError::MissingCoordinate {
                action: raw.action.clone(),
                axis: name,
            })
    };
    Ok(InteractionEvent {
        kind,
        position: Point::new(axis("x")?, axis("y")?),
    })
}

impl EventRelay {
    pub fn new(platform: Arc<dyn OverlayPlatform>) -> Self {
        Self {
            platform,
            current: Arc::new(AtomicU64::new(UNBOUND)),
            binding: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `context`, replacing any previous binding. Returns the context
    /// that was replaced. The new subscription is made first, so a failed
    /// subscribe leaves the previous binding in place.
    pub fn attach(&self, context: ContextId, sink: EventSink) -> Result<Option<ContextId>, PlatformError> {
        let mut binding = self.lock();

        let current = Arc::clone(&self.current);
        let handler: BroadcastHandler = Arc::new(move |raw: &RawBroadcast| {
            if current.load(Ordering::SeqCst) != context.0 {
                return;
            }
            match decode(raw) {
                Ok(event) => {
                    if sink.send(event).is_err() {
                        tracing::debug!(context = context.0, "requester push channel closed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable broadcast"),
            }
        });

        let subscription = match self.platform.subscribe(&InteractionKind::ALL, handler) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(context = context.0, error = %e, "event subscription failed");
                return Err(e);
            }
        };

        self.current.store(context.0, Ordering::SeqCst);
        let replaced = binding
            .replace(Binding {
                context,
                subscription,
            })
            .map(|old| {
                self.platform.unsubscribe(old.subscription);
                tracing::info!(old = old.context.0, new = context.0, "requester context replaced");
                old.context
            });
        tracing::debug!(context = context.0, subscription = subscription.0, "event relay bound");
        Ok(replaced)
    }

    /// Tear down the subscription if `context` is the bound one. Returns
    /// whether anything was detached.
    pub fn detach(&self, context: ContextId) -> bool {
        let mut binding = self.lock();
        if !binding.as_ref().is_some_and(|b| b.context == context) {
            return false;
        }
        self.current.store(UNBOUND, Ordering::SeqCst);
        if let Some(b) = binding.take() {
            self.platform.unsubscribe(b.subscription);
        }
        tracing::debug!(context = context.0, "event relay unbound");
        true
    }

    pub fn bound_context(&self) -> Option<ContextId> {
        self.lock().as_ref().map(|b| b.context)
    }
}

// ─── Tests ────────────────────────────────────────────────────────
