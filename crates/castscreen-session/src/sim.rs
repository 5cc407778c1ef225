//! In-process loopback platform.
//!
//! Every collaborator records what it was asked to do and reports results
//! through the [`EventSink`] it was given, exactly like a real platform
//! would from its own threads. Outcomes are scripted up front; the trigger
//! helpers fire receiver-side events on demand. Each sim is a cheap
//! `Clone` over shared state, so a test keeps one handle for inspection
//! while the controller owns another.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use castscreen_common::{
    DisplayMetrics, Notification, NotificationQueue, PlatformError, RemoteEndpoint, SurfaceSize,
};
use castscreen_config::CastConfig;
use tracing::debug;

use crate::controller::ControlHandle;
use crate::events::{EventSink, SessionEvent};
use crate::grant::CaptureGrant;
use crate::platform::{
    ConnectOptions, DisplayDescriptor, ListenerId, MediaRouter, Platform, Presentation,
    PresentationFactory, Projection, RemoteDisplayApi, RemoteDisplayConnector, RouteInfo,
    ScreenCaptureService, StatusNotifier, SurfaceId, VirtualDisplayId, VirtualDisplaySpec,
};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Platform bundle
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct SimPlatform {
    pub router: SimRouter,
    pub capture: SimCaptureService,
    pub remote: SimConnector,
    pub presentations: SimPresentations,
    pub notifier: SimNotifier,
}

impl SimPlatform {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            router: SimRouter::new(app_id),
            ..Self::default()
        }
    }

    /// Boxed collaborators for a [`Controller`](crate::Controller), sharing
    /// state with `self`.
    pub fn platform(&self) -> Platform {
        Platform {
            router: Box::new(self.router.clone()),
            capture: Box::new(self.capture.clone()),
            remote: Box::new(self.remote.clone()),
            presentations: Box::new(self.presentations.clone()),
            notifier: Box::new(self.notifier.clone()),
        }
    }

    /// Simulate the user choosing `endpoint` in the route chooser.
    pub fn pick(&self, handle: &ControlHandle, endpoint: RemoteEndpoint) -> bool {
        self.router.select(&endpoint);
        handle.route_selected(endpoint, DisplayMetrics::default())
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

struct RouterState {
    app_id: String,
    selected: RouteInfo,
    listeners: BTreeMap<u64, (String, EventSink)>,
    next_listener: u64,
    default_selects: usize,
    chooser_requests: usize,
    discovery: bool,
}

#[derive(Clone)]
pub struct SimRouter {
    state: Arc<Mutex<RouterState>>,
}

impl Default for SimRouter {
    fn default() -> Self {
        Self::new(CastConfig::default().app_id)
    }
}

impl SimRouter {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RouterState {
                app_id: app_id.into(),
                selected: RouteInfo::default_route(),
                listeners: BTreeMap::new(),
                next_listener: 1,
                default_selects: 0,
                chooser_requests: 0,
                discovery: false,
            })),
        }
    }

    /// Make the route of `endpoint` the selected one.
    pub fn select(&self, endpoint: &RemoteEndpoint) {
        let mut state = lock(&self.state);
        state.selected = RouteInfo::for_endpoint(endpoint, &state.app_id);
    }

    /// The user deselected the remote route.
    pub fn unselect(&self) -> usize {
        reset_route(&mut lock(&self.state))
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    /// Times the controller asked for the default route.
    pub fn default_selects(&self) -> usize {
        lock(&self.state).default_selects
    }

    pub fn chooser_requests(&self) -> usize {
        lock(&self.state).chooser_requests
    }

    pub fn discovery_active(&self) -> bool {
        lock(&self.state).discovery
    }

    pub fn current(&self) -> RouteInfo {
        lock(&self.state).selected.clone()
    }
}

/// Select the default route, notifying listeners of the route that lost
/// selection. Returns how many listeners were notified.
fn reset_route(state: &mut RouterState) -> usize {
    if state.selected.is_default {
        return 0;
    }
    let previous = std::mem::replace(&mut state.selected, RouteInfo::default_route());
    let mut notified = 0;
    for (app_id, sink) in state.listeners.values() {
        if previous.matches_app(app_id) && sink.emit(SessionEvent::RouteUnselected) {
            notified += 1;
        }
    }
    debug!(route = %previous.id, notified, "Route unselected");
    notified
}

impl MediaRouter for SimRouter {
    fn add_unselect_listener(&mut self, app_id: &str, sink: EventSink) -> ListenerId {
        let mut state = lock(&self.state);
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id, (app_id.to_string(), sink));
        ListenerId(id)
    }

    fn remove_listener(&mut self, id: ListenerId) {
        lock(&self.state).listeners.remove(&id.0);
    }

    fn select_default_route(&mut self) {
        let mut state = lock(&self.state);
        state.default_selects += 1;
        reset_route(&mut state);
    }

    fn selected_route(&self) -> RouteInfo {
        self.current()
    }

    fn show_route_chooser(&mut self, _app_id: &str) {
        lock(&self.state).chooser_requests += 1;
    }

    fn set_discovery(&mut self, _app_id: &str, active: bool) {
        lock(&self.state).discovery = active;
    }
}

// ---------------------------------------------------------------------------
// Screen capture
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CaptureState {
    refuse: bool,
    opened: usize,
    on_stop: Vec<EventSink>,
    created: Vec<(VirtualDisplayId, VirtualDisplaySpec)>,
    released: Vec<VirtualDisplayId>,
    stops: usize,
    next_display: u64,
}

#[derive(Clone, Default)]
pub struct SimCaptureService {
    state: Arc<Mutex<CaptureState>>,
}

impl SimCaptureService {
    /// Make `open_projection` fail, as when the platform hands back no
    /// projection for a grant.
    pub fn refuse_projections(&self, refuse: bool) {
        lock(&self.state).refuse = refuse;
    }

    /// The platform stopped the most recent projection on its own.
    pub fn revoke(&self) -> bool {
        let state = lock(&self.state);
        state
            .on_stop
            .last()
            .is_some_and(|sink| sink.emit(SessionEvent::CaptureStopped))
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).opened
    }

    pub fn created(&self) -> Vec<VirtualDisplaySpec> {
        lock(&self.state)
            .created
            .iter()
            .map(|(_, spec)| spec.clone())
            .collect()
    }

    pub fn released(&self) -> Vec<VirtualDisplayId> {
        lock(&self.state).released.clone()
    }

    /// Virtual displays created and not yet released.
    pub fn live_displays(&self) -> Vec<VirtualDisplayId> {
        let state = lock(&self.state);
        state
            .created
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !state.released.contains(id))
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }
}

impl ScreenCaptureService for SimCaptureService {
    fn open_projection(
        &mut self,
        grant: &CaptureGrant,
        on_stop: EventSink,
    ) -> Result<Box<dyn Projection>, PlatformError> {
        let mut state = lock(&self.state);
        if state.refuse {
            return Err(PlatformError::Capture(format!(
                "no projection for grant {}",
                grant.token()
            )));
        }
        state.opened += 1;
        state.on_stop.push(on_stop);
        Ok(Box::new(SimProjection {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct SimProjection {
    state: Arc<Mutex<CaptureState>>,
}

impl Projection for SimProjection {
    fn create_virtual_display(
        &mut self,
        spec: &VirtualDisplaySpec,
    ) -> Result<VirtualDisplayId, PlatformError> {
        let mut state = lock(&self.state);
        state.next_display += 1;
        let id = VirtualDisplayId(state.next_display);
        state.created.push((id, spec.clone()));
        Ok(id)
    }

    fn release_virtual_display(&mut self, id: VirtualDisplayId) {
        lock(&self.state).released.push(id);
    }

    fn stop(&mut self) {
        lock(&self.state).stops += 1;
    }
}

// ---------------------------------------------------------------------------
// Remote display
// ---------------------------------------------------------------------------

/// How the transport handshake resolves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectScript {
    #[default]
    Succeed,
    Fail(i32),
    Suspend(i32),
    /// Never report a result.
    Silent,
}

/// How a remote display start request resolves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DisplayStartScript {
    #[default]
    Succeed,
    /// Accept the request, then report failure.
    Fail(String),
    /// Reject the request outright.
    Refuse(String),
    Silent,
}

struct ApiRecord {
    endpoint: RemoteEndpoint,
    options: ConnectOptions,
    events: EventSink,
    connected: bool,
    start_requests: Vec<String>,
    stop_requests: usize,
    disconnects: usize,
}

#[derive(Default)]
struct RemoteState {
    connect: ConnectScript,
    start: DisplayStartScript,
    fail_stop: bool,
    apis: Vec<ApiRecord>,
    next_display: u32,
}

#[derive(Clone, Default)]
pub struct SimConnector {
    state: Arc<Mutex<RemoteState>>,
}

impl SimConnector {
    pub fn script_connect(&self, script: ConnectScript) {
        lock(&self.state).connect = script;
    }

    pub fn script_display_start(&self, script: DisplayStartScript) {
        lock(&self.state).start = script;
    }

    pub fn fail_stop(&self, fail: bool) {
        lock(&self.state).fail_stop = fail;
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).apis.len()
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        lock(&self.state).apis.last().map(|api| api.options.clone())
    }

    pub fn last_endpoint(&self) -> Option<RemoteEndpoint> {
        lock(&self.state).apis.last().map(|api| api.endpoint.clone())
    }

    pub fn start_requests(&self) -> Vec<String> {
        lock(&self.state)
            .apis
            .iter()
            .flat_map(|api| api.start_requests.iter().cloned())
            .collect()
    }

    pub fn stop_requests(&self) -> usize {
        lock(&self.state).apis.iter().map(|api| api.stop_requests).sum()
    }

    pub fn disconnect_count(&self) -> usize {
        lock(&self.state).apis.iter().map(|api| api.disconnects).sum()
    }

    /// Deliver `event` through the most recently opened client.
    pub fn fire(&self, event: SessionEvent) -> bool {
        lock(&self.state)
            .apis
            .last()
            .is_some_and(|api| api.events.emit(event))
    }

    pub fn app_disconnected(&self, status: i32) -> bool {
        self.fire(SessionEvent::ApplicationDisconnected { status })
    }

    pub fn metadata_changed(&self, app_id: Option<&str>) -> bool {
        self.fire(SessionEvent::MetadataChanged {
            app_id: app_id.map(str::to_string),
        })
    }

    pub fn connection_failed(&self, code: i32) -> bool {
        self.fire(SessionEvent::ConnectFailed { code })
    }

    pub fn connection_suspended(&self, cause: i32) -> bool {
        self.fire(SessionEvent::ConnectionSuspended { cause })
    }

    pub fn display_ended(&self, status: &str) -> bool {
        self.fire(SessionEvent::RemoteDisplayEnded {
            status: status.to_string(),
        })
    }
}

impl RemoteDisplayConnector for SimConnector {
    fn open(
        &mut self,
        endpoint: &RemoteEndpoint,
        options: &ConnectOptions,
        events: EventSink,
    ) -> Box<dyn RemoteDisplayApi> {
        let mut state = lock(&self.state);
        state.apis.push(ApiRecord {
            endpoint: endpoint.clone(),
            options: options.clone(),
            events,
            connected: false,
            start_requests: Vec::new(),
            stop_requests: 0,
            disconnects: 0,
        });
        Box::new(SimRemoteApi {
            state: Arc::clone(&self.state),
            index: state.apis.len() - 1,
        })
    }
}

pub struct SimRemoteApi {
    state: Arc<Mutex<RemoteState>>,
    index: usize,
}

impl RemoteDisplayApi for SimRemoteApi {
    fn connect(&mut self) {
        let mut state = lock(&self.state);
        let script = state.connect.clone();
        let api = &mut state.apis[self.index];
        match script {
            ConnectScript::Succeed => {
                api.connected = true;
                api.events.emit(SessionEvent::ConnectSucceeded);
            }
            ConnectScript::Fail(code) => {
                api.events.emit(SessionEvent::ConnectFailed { code });
            }
            ConnectScript::Suspend(cause) => {
                api.connected = true;
                api.events.emit(SessionEvent::ConnectionSuspended { cause });
            }
            ConnectScript::Silent => {}
        }
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).apis[self.index].connected
    }

    fn start_remote_display(&mut self, app_id: &str) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        state.next_display += 1;
        let display_id = state.next_display;
        let script = state.start.clone();
        let api = &mut state.apis[self.index];
        api.start_requests.push(app_id.to_string());
        match script {
            DisplayStartScript::Succeed => {
                let display = DisplayDescriptor {
                    display_id,
                    name: format!("{} display", api.endpoint.friendly_name),
                    size: SurfaceSize::new(1280, 720),
                };
                api.events.emit(SessionEvent::RemoteStartSucceeded { display });
                Ok(())
            }
            DisplayStartScript::Fail(status) => {
                api.events.emit(SessionEvent::RemoteStartFailed { status });
                Ok(())
            }
            DisplayStartScript::Refuse(status) => Err(PlatformError::RemoteDisplay(status)),
            DisplayStartScript::Silent => Ok(()),
        }
    }

    fn stop_remote_display(&mut self) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        let fail = state.fail_stop;
        let api = &mut state.apis[self.index];
        api.stop_requests += 1;
        if fail {
            return Err(PlatformError::RemoteDisplay("stop rejected".into()));
        }
        api.events.emit(SessionEvent::RemoteStopCompleted { success: true });
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = lock(&self.state);
        let api = &mut state.apis[self.index];
        api.connected = false;
        api.disconnects += 1;
    }
}

// ---------------------------------------------------------------------------
// Presentations
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PresentationState {
    created: Vec<DisplayDescriptor>,
    sinks: Vec<EventSink>,
    shown: usize,
    dismissed: usize,
    fail_create: bool,
    fail_show: bool,
    surface: Option<SurfaceId>,
    next_surface: u64,
}

impl PresentationState {
    fn fresh_surface(&mut self) -> SurfaceId {
        self.next_surface += 1;
        let id = SurfaceId(self.next_surface);
        self.surface = Some(id);
        id
    }
}

#[derive(Clone, Default)]
pub struct SimPresentations {
    state: Arc<Mutex<PresentationState>>,
}

impl SimPresentations {
    pub fn fail_create(&self, fail: bool) {
        lock(&self.state).fail_create = fail;
    }

    pub fn fail_show(&self, fail: bool) {
        lock(&self.state).fail_show = fail;
    }

    /// Lay out the current presentation's surface at `width`x`height`.
    /// A destroyed surface is replaced by a new one.
    pub fn report_surface(&self, width: u32, height: u32) -> Option<SurfaceId> {
        let mut state = lock(&self.state);
        let existing = state.surface;
        let surface = match existing {
            Some(surface) => surface,
            None => state.fresh_surface(),
        };
        let sink = state.sinks.last()?;
        sink.emit(SessionEvent::SurfaceChanged {
            surface,
            size: SurfaceSize::new(width, height),
        });
        Some(surface)
    }

    pub fn destroy_surface(&self) -> Option<SurfaceId> {
        let mut state = lock(&self.state);
        let surface = state.surface.take()?;
        let sink = state.sinks.last()?;
        sink.emit(SessionEvent::SurfaceDestroyed { surface });
        Some(surface)
    }

    pub fn created(&self) -> Vec<DisplayDescriptor> {
        lock(&self.state).created.clone()
    }

    pub fn is_showing(&self) -> bool {
        let state = lock(&self.state);
        state.shown > state.dismissed
    }

    pub fn dismiss_count(&self) -> usize {
        lock(&self.state).dismissed
    }
}

impl PresentationFactory for SimPresentations {
    fn create(
        &mut self,
        display: &DisplayDescriptor,
        events: EventSink,
    ) -> Result<Box<dyn Presentation>, PlatformError> {
        let mut state = lock(&self.state);
        if state.fail_create {
            return Err(PlatformError::Presentation(format!(
                "display {} is gone",
                display.display_id
            )));
        }
        state.created.push(display.clone());
        state.sinks.push(events);
        state.fresh_surface();
        Ok(Box::new(SimPresentation {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct SimPresentation {
    state: Arc<Mutex<PresentationState>>,
}

impl Presentation for SimPresentation {
    fn show(&mut self) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if state.fail_show {
            return Err(PlatformError::Presentation("window token rejected".into()));
        }
        state.shown += 1;
        Ok(())
    }

    fn dismiss(&mut self) -> Result<(), PlatformError> {
        lock(&self.state).dismissed += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NotifierState {
    status: Option<Notification>,
    status_shows: usize,
    clears: usize,
    notices: NotificationQueue,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct SimNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl SimNotifier {
    /// Make every notifier call fail.
    pub fn fail(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    pub fn status(&self) -> Option<Notification> {
        lock(&self.state).status.clone()
    }

    pub fn status_shows(&self) -> usize {
        lock(&self.state).status_shows
    }

    pub fn clear_count(&self) -> usize {
        lock(&self.state).clears
    }

    pub fn notice_titles(&self) -> Vec<String> {
        lock(&self.state)
            .notices
            .visible()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }
}

impl StatusNotifier for SimNotifier {
    fn show_status(&mut self, notification: &Notification) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if state.fail {
            return Err(PlatformError::Notification("notifications blocked".into()));
        }
        state.status = Some(notification.clone());
        state.status_shows += 1;
        Ok(())
    }

    fn clear_status(&mut self) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if state.fail {
            return Err(PlatformError::Notification("notifications blocked".into()));
        }
        state.status = None;
        state.clears += 1;
        Ok(())
    }

    fn notice(&mut self, notification: &Notification) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if state.fail {
            return Err(PlatformError::Notification("notifications blocked".into()));
        }
        state.notices.push(notification.clone());
        Ok(())
    }
}
