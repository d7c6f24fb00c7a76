//! floatbub-core: floating bubble overlay coordination.
//! Permission arbitration with request-code continuations, the overlay
//! session state machine, the interaction event relay and the command
//! dispatcher. All OS access goes through [`platform::OverlayPlatform`].

pub mod arbiter;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod options;
pub mod platform;
pub mod registry;
pub mod relay;
pub mod sim;
pub mod types;

pub use arbiter::{NotificationPermissionStatus, POST_NOTIFICATIONS_MIN_LEVEL, PermissionArbiter};
pub use dispatch::{Command, DispatchOutcome, Dispatcher, HANDLER_FAILURE_TAG, TaggedError};
pub use error::{CommandError, EventDecodeError, PlatformError, RegistryError};
pub use host::BubbleHost;
pub use lifecycle::{BubbleController, BubbleStatus};
pub use options::{BubbleOptions, CloseBehavior, NotificationOptions};
pub use platform::{BroadcastHandler, OverlayHandle, OverlayPlatform, RawBroadcast, SubscriptionId};
pub use registry::{ContinuationRegistry, PendingInfo, PermissionReply, Resolution};
pub use relay::{ContextId, EventRelay, EventSink};
pub use sim::SimulatedPlatform;
pub use types::{
    BubbleState, InteractionEvent, InteractionKind, NOTIFICATION_PERMISSION_REQUEST_CODE,
    OVERLAY_PERMISSION_REQUEST_CODE, POST_NOTIFICATIONS_REQUEST_CODE, PermissionKind, Point,
    RequestCode,
};
