//! Messages into and out of the control loop.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use castscreen_common::{DisplayMetrics, EndpointId, RemoteEndpoint, SessionId, SurfaceSize};

use crate::platform::{DisplayDescriptor, SurfaceId};

// ---------------------------------------------------------------------------
// Session events
// ---------------------------------------------------------------------------

/// Asynchronous results and signals from a session's collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport handshake with the endpoint completed.
    ConnectSucceeded,
    ConnectFailed { code: i32 },
    ConnectionSuspended { cause: i32 },
    RemoteStartSucceeded { display: DisplayDescriptor },
    RemoteStartFailed { status: String },
    /// The receiver ended the remote display session.
    RemoteDisplayEnded { status: String },
    /// Outcome of a best-effort remote display stop.
    RemoteStopCompleted { success: bool },
    ApplicationDisconnected { status: i32 },
    /// The receiver now reports this application as running.
    MetadataChanged { app_id: Option<String> },
    SurfaceChanged { surface: SurfaceId, size: SurfaceSize },
    SurfaceDestroyed { surface: SurfaceId },
    RouteUnselected,
    /// The platform revoked or stopped the screen projection.
    CaptureStopped,
}

// ---------------------------------------------------------------------------
// Termination reasons
// ---------------------------------------------------------------------------

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    RouteUnselected,
    ApplicationDisconnected { status: i32 },
    ApplicationTakeover { app_id: String },
    ConnectionFailed { code: i32 },
    ConnectionSuspended { cause: i32 },
    RemoteStartFailed { status: String },
    RemoteDisplayEnded { status: String },
    PresentationFailed { message: String },
    VirtualDisplayFailed { message: String },
    CaptureStopped,
    StopRequested,
    Shutdown,
}

impl TerminationReason {
    /// Whether the router still points at the remote route and has to be
    /// reset to the default route after teardown.
    pub fn needs_route_reset(&self) -> bool {
        !matches!(self, Self::RouteUnselected)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RouteUnselected => write!(f, "route unselected"),
            Self::ApplicationDisconnected { status } => {
                write!(f, "receiver application disconnected (status {status})")
            }
            Self::ApplicationTakeover { app_id } => {
                write!(f, "another application ({app_id}) took over the receiver")
            }
            Self::ConnectionFailed { code } => write!(f, "connection failed (code {code})"),
            Self::ConnectionSuspended { cause } => {
                write!(f, "connection suspended (cause {cause})")
            }
            Self::RemoteStartFailed { status } => {
                write!(f, "remote display start failed: {status}")
            }
            Self::RemoteDisplayEnded { status } => write!(f, "remote display ended: {status}"),
            Self::PresentationFailed { message } => write!(f, "presentation failed: {message}"),
            Self::VirtualDisplayFailed { message } => {
                write!(f, "virtual display failed: {message}")
            }
            Self::CaptureStopped => write!(f, "screen capture stopped"),
            Self::StopRequested => write!(f, "stop requested"),
            Self::Shutdown => write!(f, "controller shutting down"),
        }
    }
}

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

/// Everything the control loop reacts to.
#[derive(Debug)]
pub enum ControlMessage {
    /// Result of the screen capture permission request.
    PermissionResult {
        request_code: i32,
        result_code: i32,
        payload: Vec<u8>,
    },
    RouteSelected {
        endpoint: RemoteEndpoint,
        metrics: DisplayMetrics,
    },
    RouteUnselected {
        endpoint: EndpointId,
    },
    Session {
        session: SessionId,
        event: SessionEvent,
    },
    /// Host-initiated stop of the active session.
    Stop,
    /// Host screen became visible (resume) or hidden (pause).
    HostVisibility {
        visible: bool,
    },
    Shutdown,
}

/// Per-session entry point into the control queue.
///
/// Cheap to clone and safe to call from any thread; collaborators hold on
/// to one and report through it.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl EventSink {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<ControlMessage>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Queue `event` for the control thread. Returns `false` if the
    /// controller has gone away.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let message = ControlMessage::Session {
            session: self.session.clone(),
            event,
        };
        match self.tx.send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(session = %self.session, "Controller gone, dropping {:?}", e.0);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host events
// ---------------------------------------------------------------------------

/// Events emitted to the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum CastEvent {
    /// Capture permission granted; the route chooser was requested.
    ChooserRequested,
    /// Capture permission was denied.
    CaptureUnavailable,
    SessionStarted {
        session: SessionId,
        endpoint: RemoteEndpoint,
        started_at: DateTime<Utc>,
    },
    Presenting {
        session: SessionId,
        display: DisplayDescriptor,
    },
    SessionEnded {
        session: SessionId,
        reason: TerminationReason,
    },
    /// Another session was active; the route was reset.
    StartRejected {
        endpoint: EndpointId,
        reason: String,
    },
    /// The session could not be constructed.
    StartFailed {
        endpoint: EndpointId,
        error: String,
    },
}
