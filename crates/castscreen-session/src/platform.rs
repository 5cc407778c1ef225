//! Interfaces to the platform collaborators.
//!
//! Implementations are owned by the [`Controller`](crate::Controller) and
//! only ever called from its control thread. Anything they need to report
//! back goes through the [`EventSink`] they are handed.

use std::fmt;

use castscreen_common::{Notification, PlatformError, RemoteEndpoint, SurfaceSize};
use castscreen_config::RemoteDisplayPreset;

use crate::events::EventSink;
use crate::grant::CaptureGrant;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualDisplayId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for VirtualDisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vd-{}", self.0)
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// The receiver-side display resolved by a successful remote display start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayDescriptor {
    pub display_id: u32,
    pub name: String,
    pub size: SurfaceSize,
}

/// Parameters for one virtual display created by a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDisplaySpec {
    pub name: String,
    pub size: SurfaceSize,
    pub density_dpi: u32,
    pub surface: SurfaceId,
    /// Only mirror content owned by the projection's display.
    pub own_content_only: bool,
}

/// Options handed to the remote display API when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub app_id: String,
    pub preset: RemoteDisplayPreset,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// Control category a route must carry to be usable by `app_id`.
pub fn route_category(app_id: &str) -> String {
    format!("cast:{app_id}")
}

/// Router-side description of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub categories: Vec<String>,
}

impl RouteInfo {
    /// The local ("no remote selected") route.
    pub fn default_route() -> Self {
        Self {
            id: "default".into(),
            name: "This device".into(),
            is_default: true,
            categories: Vec::new(),
        }
    }

    /// Route for a discovered endpoint that can run `app_id`.
    pub fn for_endpoint(endpoint: &RemoteEndpoint, app_id: &str) -> Self {
        Self {
            id: endpoint.id.to_string(),
            name: endpoint.friendly_name.clone(),
            is_default: false,
            categories: vec![route_category(app_id)],
        }
    }

    pub fn matches_app(&self, app_id: &str) -> bool {
        let category = route_category(app_id);
        self.categories.iter().any(|c| *c == category)
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The media router. Its selection state must only be touched from the
/// control thread.
pub trait MediaRouter: Send {
    /// Register `sink` to receive `SessionEvent::RouteUnselected`.
    fn add_unselect_listener(&mut self, app_id: &str, sink: EventSink) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId);
    /// Select the local route, i.e. "no remote selected".
    fn select_default_route(&mut self);
    fn selected_route(&self) -> RouteInfo;
    fn show_route_chooser(&mut self, app_id: &str);
    /// Start or stop active discovery for `app_id` routes.
    fn set_discovery(&mut self, app_id: &str, active: bool);
}

/// Turns a capture grant into a live screen projection.
pub trait ScreenCaptureService: Send {
    /// `on_stop` must receive `SessionEvent::CaptureStopped` if the
    /// platform ends the projection on its own.
    fn open_projection(
        &mut self,
        grant: &CaptureGrant,
        on_stop: EventSink,
    ) -> Result<Box<dyn Projection>, PlatformError>;
}

pub trait Projection: Send {
    fn create_virtual_display(
        &mut self,
        spec: &VirtualDisplaySpec,
    ) -> Result<VirtualDisplayId, PlatformError>;
    fn release_virtual_display(&mut self, id: VirtualDisplayId);
    fn stop(&mut self);
}

/// Opens a per-session client for the remote display API.
pub trait RemoteDisplayConnector: Send {
    /// Results of every request on the returned client are reported
    /// through `events`.
    fn open(
        &mut self,
        endpoint: &RemoteEndpoint,
        options: &ConnectOptions,
        events: EventSink,
    ) -> Box<dyn RemoteDisplayApi>;
}

pub trait RemoteDisplayApi: Send {
    /// Reports `ConnectSucceeded`, `ConnectFailed` or `ConnectionSuspended`.
    fn connect(&mut self);
    fn is_connected(&self) -> bool;
    /// Reports `RemoteStartSucceeded` or `RemoteStartFailed`.
    fn start_remote_display(&mut self, app_id: &str) -> Result<(), PlatformError>;
    /// Reports `RemoteStopCompleted`.
    fn stop_remote_display(&mut self) -> Result<(), PlatformError>;
    fn disconnect(&mut self);
}

/// Creates the presentation shown on the remote display.
pub trait PresentationFactory: Send {
    /// Surface size changes and destruction are reported through `events`.
    fn create(
        &mut self,
        display: &DisplayDescriptor,
        events: EventSink,
    ) -> Result<Box<dyn Presentation>, PlatformError>;
}

pub trait Presentation: Send {
    fn show(&mut self) -> Result<(), PlatformError>;
    fn dismiss(&mut self) -> Result<(), PlatformError>;
}

pub trait StatusNotifier: Send {
    /// Show (or replace) the persistent casting indicator.
    fn show_status(&mut self, notification: &Notification) -> Result<(), PlatformError>;
    fn clear_status(&mut self) -> Result<(), PlatformError>;
    /// Transient user-visible notice.
    fn notice(&mut self, notification: &Notification) -> Result<(), PlatformError>;
}

/// Every collaborator the controller drives.
pub struct Platform {
    pub router: Box<dyn MediaRouter>,
    pub capture: Box<dyn ScreenCaptureService>,
    pub remote: Box<dyn RemoteDisplayConnector>,
    pub presentations: Box<dyn PresentationFactory>,
    pub notifier: Box<dyn StatusNotifier>,
}
