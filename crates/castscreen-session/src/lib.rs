//! Screen mirroring session lifecycle.
//!
//! A [`Controller`] owns the single control thread. Every platform
//! callback (remote display API, screen capture, presentation surface,
//! media router) is posted into its queue as a [`ControlMessage`], so all
//! session state transitions happen in one place and in order.
//!
//! The [`SessionRegistry`] holds at most one [`SessionCoordinator`], which
//! in turn owns the [`CaptureSource`], the [`RemoteSessionClient`] and,
//! once the remote display is up, the [`DisplaySurfaceSink`].

pub mod button;
pub mod capture;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod grant;
pub mod platform;
pub mod registry;
pub mod remote;
pub mod sim;
pub mod sink;

pub use button::{remote_route_selected, ButtonOutcome, CastButton, RouteStrategy};
pub use capture::{CaptureSource, VirtualDisplayBinding};
pub use controller::{ControlHandle, Controller, CONTROL_THREAD_NAME};
pub use coordinator::{
    SessionCoordinator, SessionSettings, SessionSummary, StartContext, StartRequest, Step,
};
pub use error::{SessionError, StartError};
pub use events::{CastEvent, ControlMessage, EventSink, SessionEvent, TerminationReason};
pub use grant::{
    CaptureGrant, GrantLedger, GrantToken, RESULT_CANCELED, RESULT_OK, SCREEN_CAPTURE_REQUEST,
};
pub use platform::Platform;
pub use registry::{Dispatch, SessionRegistry};
pub use remote::{ClientOutcome, ClientState, RemoteSessionClient};
pub use sink::{DisplaySurfaceSink, ReadySurface};
