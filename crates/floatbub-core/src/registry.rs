//! Continuation registry: matches asynchronous permission results to the
//! caller that triggered them.
//!
//! Each permission kind owns one slot keyed by its request code, so an
//! overlay flow and a notification flow can be pending at the same time
//! and resolve independently. Slot lifecycle:
//!
//! ```text
//! Idle --register--> Pending --resolve--> Resolved (continuation consumed) --> Idle
//!                       |
//!                       +--abandon--> Abandoned --late resolve--> Idle
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::RegistryError;
use crate::types::{PermissionKind, RequestCode};

// ─── Reply handle ────────────────────────────────────────────────────

/// Receiving end of a permission request.
///
/// Immediate and deferred outcomes arrive through the same handle, so the
/// caller never needs to know which path was taken.
#[derive(Debug)]
pub struct PermissionReply {
    rx: oneshot::Receiver<bool>,
}

impl PermissionReply {
    /// A reply that is already resolved.
    pub(crate) fn ready(granted: bool) -> Self {
        let (tx, rx) = oneshot::channel();
        // Receiver is alive in this scope; send cannot fail.
        let _ = tx.send(granted);
        Self { rx }
    }

    /// Non-blocking peek: `Some` once the outcome has been delivered.
    pub fn try_outcome(&mut self) -> Option<bool> {
        self.rx.try_recv().ok()
    }

    /// Wait for the outcome. `None` means the request was abandoned
    /// (requester context destroyed or registration rolled back).
    pub async fn outcome(self) -> Option<bool> {
        self.rx.await.ok()
    }
}

// ─── Pending requests ────────────────────────────────────────────────

struct PendingRequest {
    kind: PermissionKind,
    registered_at: DateTime<Utc>,
    continuation: oneshot::Sender<bool>,
}

/// Read-only view of a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingInfo {
    pub kind: PermissionKind,
    pub request_code: RequestCode,
    pub registered_at: DateTime<Utc>,
}

/// What a `resolve` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The continuation fired with `granted`.
    Delivered { kind: PermissionKind, granted: bool },
    /// The originating caller is gone; the result was discarded.
    Abandoned { kind: PermissionKind },
    /// Secondary notification result: bookkeeping updated, no continuation.
    StatusUpdated { granted: bool },
    /// Code does not belong to any known flow.
    Ignored,
}

#[derive(Default)]
struct Slots {
    pending: HashMap<RequestCode, PendingRequest>,
    abandoned: HashSet<RequestCode>,
}

// ─── Registry ────────────────────────────────────────────────────────

/// Mutex-guarded map from request code to pending continuation.
#[derive(Default)]
pub struct ContinuationRegistry {
    slots: Mutex<Slots>,
}

impl ContinuationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a continuation for `kind` under its fixed request code.
    ///
    /// Rejects a second registration while one is pending; the earlier
    /// continuation is left untouched. A slot whose reply has been dropped
    /// has nobody waiting on it and is taken over.
    pub fn register(&self, kind: PermissionKind) -> Result<PermissionReply, RegistryError> {
        let code = kind.request_code();
        let mut slots = self.lock();
        if let Some(existing) = slots.pending.get(&code) {
            if !existing.continuation.is_closed() {
                return Err(RegistryError::AlreadyPending { kind, code });
            }
            tracing::debug!(%kind, %code, "replacing registration whose reply was dropped");
        }
        let (tx, rx) = oneshot::channel();
        slots.abandoned.remove(&code);
        slots.pending.insert(
            code,
            PendingRequest {
                kind,
                registered_at: Utc::now(),
                continuation: tx,
            },
        );
        tracing::debug!(%kind, %code, "continuation registered");
        Ok(PermissionReply { rx })
    }

    /// Drop a registration without remembering it as abandoned. Used when
    /// the grant flow could not be launched at all.
    pub fn cancel(&self, kind: PermissionKind) -> bool {
        self.lock().pending.remove(&kind.request_code()).is_some()
    }

    /// Resolve `code`, consuming its continuation.
    ///
    /// `current_grant` is asked for the live grant state of the matching
    /// permission; it runs outside the registry lock. Codes that belong to
    /// no permission kind are ignored. A known code with no pending slot is
    /// an error: it means a duplicate or spurious callback.
    pub fn resolve(
        &self,
        code: RequestCode,
        current_grant: impl FnOnce(PermissionKind) -> bool,
    ) -> Result<Resolution, RegistryError> {
        let Some(kind) = PermissionKind::from_request_code(code) else {
            tracing::debug!(%code, "ignoring result for unknown request code");
            return Ok(Resolution::Ignored);
        };
        let granted = current_grant(kind);

        let request = {
            let mut slots = self.lock();
            match slots.pending.remove(&code) {
                Some(request) => request,
                None if slots.abandoned.remove(&code) => {
                    tracing::debug!(%kind, %code, "late result for abandoned request");
                    return Ok(Resolution::Abandoned { kind });
                }
                None => return Err(RegistryError::NoPendingRequest(code)),
            }
        };

        let waited_ms = (Utc::now() - request.registered_at).num_milliseconds();
        if request.continuation.send(granted).is_err() {
            tracing::debug!(%kind, %code, "requester dropped its reply before resolution");
            return Ok(Resolution::Abandoned { kind: request.kind });
        }
        tracing::info!(%kind, %code, granted, waited_ms, "permission request resolved");
        Ok(Resolution::Delivered {
            kind: request.kind,
            granted,
        })
    }

    /// Drop every pending continuation and remember the codes, so late
    /// results are absorbed instead of reported as spurious.
    pub fn abandon_all(&self) -> usize {
        let mut slots = self.lock();
        let codes: Vec<RequestCode> = slots.pending.drain().map(|(code, _)| code).collect();
        slots.abandoned.extend(codes.iter().copied());
        codes.len()
    }

    pub fn is_pending(&self, kind: PermissionKind) -> bool {
        self.lock().pending.contains_key(&kind.request_code())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Snapshot of pending requests, ordered by request code.
    pub fn pending(&self) -> Vec<PendingInfo> {
        let mut out: Vec<PendingInfo> = self
            .lock()
            .pending
            .iter()
            .map(|(code, req)| PendingInfo {
                kind: req.kind,
                request_code: *code,
                registered_at: req.registered_at,
            })
            .collect();
        out.sort_by_key(|p| p.request_code);
        out
    }
}

// ─── Tests ────────────────────────────────────────────────────────
