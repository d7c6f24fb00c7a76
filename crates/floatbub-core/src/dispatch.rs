//! Command dispatcher: routes named commands to the arbiter and the
//! lifecycle controller.
//!
//! Every call returns immediately. Request commands hand back a
//! [`PermissionReply`] that may resolve later. Failures, panics included,
//! become a [`TaggedError`]; unknown names become
//! [`DispatchOutcome::NotImplemented`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::arbiter::PermissionArbiter;
use crate::error::CommandError;
use crate::lifecycle::BubbleController;
use crate::options::{BubbleOptions, NotificationOptions};
use crate::registry::PermissionReply;

/// Tag carried by every handler failure.
pub const HANDLER_FAILURE_TAG: &str = "BUBBLE_ERROR";

// ─── Commands ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RequestOverlayPermission,
    HasOverlayPermission,
    RequestPostNotificationsPermission,
    HasPostNotificationsPermission,
    IsRunning,
    StartBubble,
    StopBubble,
    RequestNotificationPermission,
    HasNotificationPermission,
    NotificationPermissionStatus,
    BubbleStatus,
}

impl Command {
    pub const ALL: [Command; 11] = [
        Command::RequestOverlayPermission,
        Command::HasOverlayPermission,
        Command::RequestPostNotificationsPermission,
        Command::HasPostNotificationsPermission,
        Command::IsRunning,
        Command::StartBubble,
        Command::StopBubble,
        Command::RequestNotificationPermission,
        Command::HasNotificationPermission,
        Command::NotificationPermissionStatus,
        Command::BubbleStatus,
    ];

    /// Wire name of the command.
    pub fn name(self) -> &'static str {
        match self {
            Self::RequestOverlayPermission => "requestOverlayPermission",
            Self::HasOverlayPermission => "hasOverlayPermission",
            Self::RequestPostNotificationsPermission => "requestPostNotificationsPermission",
            Self::HasPostNotificationsPermission => "hasPostNotificationsPermission",
            Self::IsRunning => "isRunning",
            Self::StartBubble => "startBubble",
            Self::StopBubble => "stopBubble",
            Self::RequestNotificationPermission => "requestNotificationPermission",
            Self::HasNotificationPermission => "hasNotificationPermission",
            Self::NotificationPermissionStatus => "notificationPermissionStatus",
            Self::BubbleStatus => "bubbleStatus",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

// ─── Outcomes ────────────────────────────────────────────────────────

/// Structured failure: fixed tag plus the original message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedError {
    pub tag: &'static str,
    pub message: String,
}

impl TaggedError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            tag: HANDLER_FAILURE_TAG,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Success(Value),
    /// Result arrives through the reply, possibly already resolved.
    Deferred(PermissionReply),
    Error(TaggedError),
    NotImplemented,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StartBubbleArgs {
    bubble_options: BubbleOptions,
    notification_options: NotificationOptions,
}

// ─── Dispatcher ──────────────────────────────────────────────────────

pub struct Dispatcher {
    arbiter: Arc<PermissionArbiter>,
    controller: Arc<BubbleController>,
}

impl Dispatcher {
    pub fn new(arbiter: Arc<PermissionArbiter>, controller: Arc<BubbleController>) -> Self {
        Self {
            arbiter,
            controller,
        }
    }

    /// Run `name` with `args` to completion.
    pub fn dispatch(&self, name: &str, args: &Value) -> DispatchOutcome {
        let Some(command) = Command::from_name(name) else {
            tracing::debug!(command = name, "command not implemented");
            return DispatchOutcome::NotImplemented;
        };

        let result = catch_unwind(AssertUnwindSafe(|| self.execute(command, args)))
            .unwrap_or_else(|payload| Err(CommandError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(command = command.name(), error = %e, "command failed");
                DispatchOutcome::Error(TaggedError::new(e.to_string()))
            }
        }
    }

    fn execute(&self, command: Command, args: &Value) -> Result<DispatchOutcome, CommandError> {
        let outcome = match command {
            Command::RequestOverlayPermission => {
                DispatchOutcome::Deferred(self.arbiter.request_overlay_permission()?)
            }
            Command::RequestPostNotificationsPermission => {
                DispatchOutcome::Deferred(self.arbiter.request_post_notifications_permission()?)
            }
            Command::HasOverlayPermission => success(self.arbiter.has_overlay_permission()),
            Command::HasPostNotificationsPermission => {
                success(self.arbiter.has_post_notifications_permission())
            }
            Command::IsRunning => success(self.controller.is_running()),
            Command::StartBubble => {
                let args = parse_start_args(args)?;
                success(
                    self.controller
                        .start(args.bubble_options, args.notification_options),
                )
            }
            Command::StopBubble => success(self.controller.stop()),
            Command::RequestNotificationPermission => {
                success(self.arbiter.request_notification_permission()?)
            }
            Command::HasNotificationPermission => {
                success(self.arbiter.has_notification_permission())
            }
            Command::NotificationPermissionStatus => {
                DispatchOutcome::Success(json!(self.arbiter.notification_status()))
            }
            Command::BubbleStatus => DispatchOutcome::Success(json!({
                "bubble": self.controller.status(),
                "pendingRequests": self.arbiter.pending(),
            })),
        };
        Ok(outcome)
    }
}

fn success(value: bool) -> DispatchOutcome {
    DispatchOutcome::Success(Value::Bool(value))
}

/// `null` arguments mean "all defaults".
fn parse_start_args(args: &Value) -> Result<StartBubbleArgs, CommandError> {
    let invalid = |detail: String| CommandError::InvalidArguments {
        command: Command::StartBubble.name(),
        detail,
    };
    let parsed: StartBubbleArgs = if args.is_null() {
        StartBubbleArgs::default()
    } else {
        StartBubbleArgs::deserialize(args).map_err(|e| invalid(e.to_string()))?
    };
    parsed.bubble_options.validate().map_err(invalid)?;
    parsed.notification_options.validate().map_err(invalid)?;
    Ok(parsed)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────
