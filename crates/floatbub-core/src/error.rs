//! Error types for the bubble core.

use thiserror::Error;

use crate::types::{PermissionKind, RequestCode};

/// Failures reported by the platform capability layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("overlay window rejected: {0}")]
    OverlayRejected(String),

    #[error("overlay release failed: {0}")]
    ReleaseFailed(String),

    #[error("grant flow for {kind} could not be launched: {detail}")]
    GrantFlowFailed { kind: PermissionKind, detail: String },

    #[error("event subscription failed: {0}")]
    SubscriptionFailed(String),
}

/// Misuse of the continuation registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} permission request is already pending under request code {code}")]
    AlreadyPending { kind: PermissionKind, code: RequestCode },

    #[error("no pending request for request code {0}")]
    NoPendingRequest(RequestCode),
}

/// Anything that can go wrong while executing a dispatched command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid arguments for {command}: {detail}")]
    InvalidArguments { command: &'static str, detail: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// A raw broadcast that could not be turned into an interaction event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("unknown interaction action {0:?}")]
    UnknownAction(String),

    #[error("broadcast {action:?} is missing numeric extra {axis:?}")]
    MissingCoordinate { action: String, axis: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OVERLAY_PERMISSION_REQUEST_CODE;

    #[test]
    fn already_pending_names_kind_and_code() {
        let err = RegistryError::AlreadyPending {
            kind: PermissionKind::Overlay,
            code: OVERLAY_PERMISSION_REQUEST_CODE,
        };
        assert_eq!(
            err.to_string(),
            "overlay permission request is already pending under request code 1237"
        );
    }
}
