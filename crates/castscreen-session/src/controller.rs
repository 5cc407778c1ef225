//! The control loop.
//!
//! One [`Controller`] owns the platform collaborators and the session
//! registry. Hosts talk to it through a [`ControlHandle`]; collaborators
//! report through the [`EventSink`](crate::EventSink) of their session.
//! Everything lands in one queue and is handled in order on the thread
//! that first processes it.

use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use castscreen_common::{
    DisplayMetrics, EndpointId, Notification, RemoteEndpoint, SessionId, SessionState,
};
use castscreen_config::CastScreenConfig;

use crate::coordinator::{SessionSettings, SessionSummary, StartContext, StartRequest};
use crate::events::{CastEvent, ControlMessage, SessionEvent, TerminationReason};
use crate::grant::{CaptureGrant, GrantLedger, SCREEN_CAPTURE_REQUEST};
use crate::platform::Platform;
use crate::registry::{Dispatch, SessionRegistry};

/// Name of the thread started by [`Controller::spawn`].
pub const CONTROL_THREAD_NAME: &str = "castscreen-control";

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable, thread-safe front door to a [`Controller`].
///
/// Every method only queues a message; it returns `false` once the
/// controller has exited.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
    state: watch::Receiver<SessionState>,
}

impl ControlHandle {
    pub fn permission_result(&self, request_code: i32, result_code: i32, payload: Vec<u8>) -> bool {
        self.send(ControlMessage::PermissionResult {
            request_code,
            result_code,
            payload,
        })
    }

    pub fn route_selected(&self, endpoint: RemoteEndpoint, metrics: DisplayMetrics) -> bool {
        self.send(ControlMessage::RouteSelected { endpoint, metrics })
    }

    pub fn route_unselected(&self, endpoint: EndpointId) -> bool {
        self.send(ControlMessage::RouteUnselected { endpoint })
    }

    /// Stop the active session and reset the route.
    pub fn stop(&self) -> bool {
        self.send(ControlMessage::Stop)
    }

    /// The host screen was resumed (`true`) or paused (`false`).
    pub fn host_visibility(&self, visible: bool) -> bool {
        self.send(ControlMessage::HostVisibility { visible })
    }

    pub fn shutdown(&self) -> bool {
        self.send(ControlMessage::Shutdown)
    }

    /// Last published session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    fn send(&self, message: ControlMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!("Controller gone, dropping {:?}", e.0);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller {
    platform: Platform,
    registry: SessionRegistry,
    ledger: GrantLedger,
    settings: SessionSettings,
    pending_grant: Option<CaptureGrant>,
    /// Weak so the queue closes once every handle and session sink is gone.
    control: mpsc::WeakUnboundedSender<ControlMessage>,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
    /// Received on a foreign thread; handled first on the next pass.
    held: Option<ControlMessage>,
    events: mpsc::UnboundedSender<CastEvent>,
    thread: Option<ThreadId>,
    shutdown: bool,
}

impl Controller {
    pub fn new(
        config: &CastScreenConfig,
        platform: Platform,
    ) -> (Self, ControlHandle, mpsc::UnboundedReceiver<CastEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let registry = SessionRegistry::new();
        let handle = ControlHandle {
            tx: tx.clone(),
            state: registry.subscribe(),
        };
        let controller = Self {
            platform,
            registry,
            ledger: GrantLedger::new(),
            settings: SessionSettings::from(config),
            pending_grant: None,
            control: tx.downgrade(),
            rx,
            held: None,
            events,
            thread: None,
            shutdown: false,
        };
        (controller, handle, events_rx)
    }

    /// Handle every queued message without waiting. Returns how many were
    /// handled.
    pub fn process_pending(&mut self) -> usize {
        if !self.on_control_thread() {
            return 0;
        }
        let mut handled = 0;
        while !self.shutdown {
            let message = match self.held.take() {
                Some(message) => message,
                None => match self.rx.try_recv() {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };
            self.handle(message);
            handled += 1;
        }
        handled
    }

    /// Run until shut down or until every sender is gone. Must be driven
    /// from a single thread (e.g. a current-thread runtime).
    ///
    /// If the loop finds itself on a thread other than the one it is bound
    /// to, it stops without touching the session and hands the controller
    /// back. Nothing queued is lost; drive it again from the bound thread.
    pub async fn run(mut self) -> Result<(), Self> {
        if !self.on_control_thread() {
            return Err(self);
        }
        info!("Control loop started");
        while !self.shutdown {
            let message = match self.held.take() {
                Some(message) => message,
                None => match self.rx.recv().await {
                    Some(message) => message,
                    None => break,
                },
            };
            if !self.on_control_thread() {
                self.held = Some(message);
                return Err(self);
            }
            self.handle(message);
        }
        if !self.shutdown {
            debug!("Every control sender dropped");
            self.shutdown_sessions();
        }
        info!("Control loop stopped");
        Ok(())
    }

    /// Run the loop on a dedicated thread with its own runtime. The thread
    /// yields the controller back if the loop refused to run there.
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<(), Controller>>> {
        thread::Builder::new()
            .name(CONTROL_THREAD_NAME.into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match runtime {
                    Ok(runtime) => runtime.block_on(self.run()),
                    Err(e) => {
                        error!(error = %e, "Failed to build control runtime");
                        Err(self)
                    }
                }
            })
    }

    pub fn state(&self) -> SessionState {
        self.registry.state()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &GrantLedger {
        &self.ledger
    }

    pub fn has_pending_grant(&self) -> bool {
        self.pending_grant.is_some()
    }

    /// Binds the controller to the first thread that processes messages.
    fn on_control_thread(&mut self) -> bool {
        let current = thread::current().id();
        match self.thread {
            None => {
                self.thread = Some(current);
                true
            }
            Some(bound) if bound == current => true,
            Some(bound) => {
                error!(
                    bound = ?bound,
                    current = ?current,
                    "Control loop driven from a foreign thread, refusing"
                );
                false
            }
        }
    }

    fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::PermissionResult {
                request_code,
                result_code,
                payload,
            } => self.on_permission_result(request_code, result_code, payload),
            ControlMessage::RouteSelected { endpoint, metrics } => {
                self.on_route_selected(endpoint, metrics)
            }
            ControlMessage::RouteUnselected { endpoint } => self.on_route_unselected(endpoint),
            ControlMessage::Session { session, event } => self.on_session_event(session, event),
            ControlMessage::Stop => self.end_session(TerminationReason::StopRequested),
            ControlMessage::HostVisibility { visible } => {
                debug!(visible, "Host visibility changed");
                self.platform
                    .router
                    .set_discovery(&self.settings.app_id, visible);
            }
            ControlMessage::Shutdown => self.shutdown_sessions(),
        }
    }

    fn on_permission_result(&mut self, request_code: i32, result_code: i32, payload: Vec<u8>) {
        if request_code != SCREEN_CAPTURE_REQUEST {
            debug!(request_code, "Permission result for another request ignored");
            return;
        }
        let grant = CaptureGrant::new(result_code, payload);
        if !grant.is_success() {
            warn!(result_code, "Screen capture permission denied");
            let notice = Notification::warning(
                "Screen capture unavailable",
                "Screen casting won't work without capture permission",
            );
            if let Err(e) = self.platform.notifier.notice(&notice) {
                warn!(error = %e, "Could not post capture notice");
            }
            self.emit(CastEvent::CaptureUnavailable);
            return;
        }

        info!(grant = %grant.token(), "Screen capture permission granted");
        self.pending_grant = Some(grant);
        self.platform.router.show_route_chooser(&self.settings.app_id);
        self.emit(CastEvent::ChooserRequested);
    }

    fn on_route_selected(&mut self, endpoint: RemoteEndpoint, metrics: DisplayMetrics) {
        info!(endpoint = %endpoint.id, name = %endpoint.friendly_name, "Route selected");

        if let Err(rejection) = self.registry.check_admission() {
            warn!(endpoint = %endpoint.id, reason = %rejection, "Start rejected");
            self.emit(CastEvent::StartRejected {
                endpoint: endpoint.id,
                reason: rejection.to_string(),
            });
            self.platform.router.select_default_route();
            return;
        }

        let Some(control) = self.control.upgrade() else {
            warn!(endpoint = %endpoint.id, "Control queue closed, not starting");
            return;
        };
        let endpoint_id = endpoint.id.clone();
        let request = StartRequest {
            endpoint,
            grant: self.pending_grant.take(),
            metrics,
        };
        let ctx = StartContext {
            platform: &mut self.platform,
            ledger: &self.ledger,
            control: &control,
            settings: &self.settings,
        };

        match self.registry.try_start(request, ctx) {
            Ok(_) => {
                if let Some(session) = self.registry.active() {
                    let summary = session.summary();
                    self.emit(CastEvent::SessionStarted {
                        session: summary.id,
                        endpoint: summary.endpoint,
                        started_at: summary.started_at,
                    });
                }
            }
            Err(e) if e.is_rejection() => {
                warn!(endpoint = %endpoint_id, reason = %e, "Start rejected");
                self.emit(CastEvent::StartRejected {
                    endpoint: endpoint_id,
                    reason: e.to_string(),
                });
                self.platform.router.select_default_route();
            }
            Err(e) => {
                error!(endpoint = %endpoint_id, error = %e, "Session could not be started");
                self.emit(CastEvent::StartFailed {
                    endpoint: endpoint_id,
                    error: e.to_string(),
                });
                self.platform.router.select_default_route();
            }
        }
    }

    fn on_route_unselected(&mut self, endpoint: EndpointId) {
        if let Some(session) = self.registry.active() {
            if session.endpoint().id != endpoint {
                debug!(
                    endpoint = %endpoint,
                    active = %session.endpoint().id,
                    "Unselect of another route ignored"
                );
                return;
            }
        }
        info!(endpoint = %endpoint, "Route unselected by host");
        self.end_session(TerminationReason::RouteUnselected);
    }

    fn on_session_event(&mut self, session: SessionId, event: SessionEvent) {
        match self.registry.dispatch(&session, event, &mut self.platform) {
            Dispatch::Ignored | Dispatch::Handled => {}
            Dispatch::Presenting(display) => self.emit(CastEvent::Presenting { session, display }),
            Dispatch::Ended(summary, reason) => self.finish(summary, reason),
        }
    }

    fn end_session(&mut self, reason: TerminationReason) {
        if let Some(summary) = self.registry.stop(reason.clone(), &mut self.platform) {
            self.finish(summary, reason);
        }
    }

    /// Restore "no remote selected" and tell the host.
    fn finish(&mut self, summary: SessionSummary, reason: TerminationReason) {
        if reason.needs_route_reset() {
            self.platform.router.select_default_route();
        }
        self.emit(CastEvent::SessionEnded {
            session: summary.id,
            reason,
        });
    }

    fn shutdown_sessions(&mut self) {
        info!("Control loop shutting down");
        self.end_session(TerminationReason::Shutdown);
        self.platform
            .router
            .set_discovery(&self.settings.app_id, false);
        self.pending_grant = None;
        self.shutdown = true;
    }

    fn emit(&self, event: CastEvent) {
        if self.events.send(event).is_err() {
            debug!("Host event receiver dropped");
        }
    }
}
