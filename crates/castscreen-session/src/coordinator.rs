//! One mirroring session: capture, remote client and presentation.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use castscreen_common::{
    DisplayMetrics, Notification, RemoteEndpoint, SessionId, SessionState, SurfaceSize,
};
use castscreen_config::{CaptureConfig, CastScreenConfig, RemoteDisplayPreset};

use crate::capture::CaptureSource;
use crate::error::SessionError;
use crate::events::{ControlMessage, EventSink, SessionEvent, TerminationReason};
use crate::grant::{CaptureGrant, GrantLedger};
use crate::platform::{ConnectOptions, DisplayDescriptor, ListenerId, Platform, SurfaceId};
use crate::remote::{ClientOutcome, RemoteSessionClient};
use crate::sink::DisplaySurfaceSink;

// ---------------------------------------------------------------------------
// Settings and requests
// ---------------------------------------------------------------------------

/// The slice of configuration a session needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub app_id: String,
    pub preset: RemoteDisplayPreset,
    pub capture: CaptureConfig,
    pub notifications_enabled: bool,
    pub notification_title: String,
    pub friendly_name_fallback: String,
}

impl From<&CastScreenConfig> for SessionSettings {
    fn from(config: &CastScreenConfig) -> Self {
        Self {
            app_id: config.cast.app_id.clone(),
            preset: config.remote.preset,
            capture: config.capture.clone(),
            notifications_enabled: config.notifications.enabled,
            notification_title: config.notifications.title.clone(),
            friendly_name_fallback: config.cast.friendly_name_fallback.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&CastScreenConfig::default())
    }
}

impl SessionSettings {
    fn display_name_of<'a>(&'a self, endpoint: &'a RemoteEndpoint) -> &'a str {
        if endpoint.friendly_name.trim().is_empty() {
            &self.friendly_name_fallback
        } else {
            &endpoint.friendly_name
        }
    }
}

/// A resolved endpoint plus the grant delivered before it was selected.
#[derive(Debug)]
pub struct StartRequest {
    pub endpoint: RemoteEndpoint,
    pub grant: Option<CaptureGrant>,
    pub metrics: DisplayMetrics,
}

/// What a session borrows from the controller while it is being built.
pub struct StartContext<'a> {
    pub platform: &'a mut Platform,
    pub ledger: &'a GrantLedger,
    pub control: &'a mpsc::UnboundedSender<ControlMessage>,
    pub settings: &'a SessionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub endpoint: RemoteEndpoint,
    pub started_at: DateTime<Utc>,
    /// State at the time of the summary (before teardown for ended sessions).
    pub state: SessionState,
}

/// Result of handling one session event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Presenting(DisplayDescriptor),
    Terminate(TerminationReason),
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct SessionCoordinator {
    id: SessionId,
    endpoint: RemoteEndpoint,
    started_at: DateTime<Utc>,
    state: SessionState,
    events: EventSink,
    capture: CaptureSource,
    client: RemoteSessionClient,
    sink: Option<DisplaySurfaceSink>,
    listener: Option<ListenerId>,
    status_shown: bool,
}

impl SessionCoordinator {
    /// Build the session and issue the connect.
    ///
    /// Capture construction comes first; if it fails nothing else is
    /// allocated and no notification is shown.
    pub fn start(request: StartRequest, ctx: StartContext<'_>) -> Result<Self, SessionError> {
        let StartRequest {
            endpoint,
            grant,
            metrics,
        } = request;
        let settings = ctx.settings;
        let grant = grant.ok_or(SessionError::MissingGrant)?;

        let id = SessionId::new();
        let events = EventSink::new(id.clone(), ctx.control.clone());

        let capture = CaptureSource::new(
            grant,
            ctx.platform.capture.as_mut(),
            ctx.ledger,
            events.clone(),
            settings.capture.virtual_display_name.clone(),
            settings.capture.effective_density(metrics.density_dpi),
        )?;

        let options = ConnectOptions {
            app_id: settings.app_id.clone(),
            preset: settings.preset,
        };
        let mut client = RemoteSessionClient::new(
            endpoint.clone(),
            options,
            ctx.platform.remote.as_mut(),
            events.clone(),
        );
        let listener = ctx
            .platform
            .router
            .add_unselect_listener(&settings.app_id, events.clone());
        client.connect();

        let mut status_shown = false;
        if settings.notifications_enabled {
            let status = Notification::status(
                settings.notification_title.clone(),
                format!("Connected to {}", settings.display_name_of(&endpoint)),
            );
            match ctx.platform.notifier.show_status(&status) {
                Ok(()) => status_shown = true,
                Err(e) => warn!(session = %id, error = %e, "Status notification failed"),
            }
        }

        info!(session = %id, endpoint = %endpoint.id, "Session started");
        Ok(Self {
            id,
            endpoint,
            started_at: Utc::now(),
            state: SessionState::Connecting,
            events,
            capture,
            client,
            sink: None,
            listener: Some(listener),
            status_shown,
        })
    }

    pub fn handle(&mut self, event: SessionEvent, platform: &mut Platform) -> Step {
        match event {
            SessionEvent::SurfaceChanged { surface, size } => self.surface_changed(surface, size),
            SessionEvent::SurfaceDestroyed { surface } => {
                let current = self
                    .sink
                    .as_mut()
                    .is_some_and(|sink| sink.surface_destroyed(surface));
                if current {
                    self.capture.unbind();
                }
                Step::Continue
            }
            SessionEvent::RouteUnselected => {
                info!(session = %self.id, "Route unselected");
                Step::Terminate(TerminationReason::RouteUnselected)
            }
            SessionEvent::CaptureStopped => {
                warn!(session = %self.id, "Screen capture stopped by the platform");
                Step::Terminate(TerminationReason::CaptureStopped)
            }
            SessionEvent::RemoteStopCompleted { .. } => Step::Continue,
            other => match self.client.handle(&other) {
                ClientOutcome::Pending => Step::Continue,
                ClientOutcome::DisplayReady(descriptor) => self.present(descriptor, platform),
                ClientOutcome::Terminate(reason) => Step::Terminate(reason),
            },
        }
    }

    fn present(&mut self, descriptor: DisplayDescriptor, platform: &mut Platform) -> Step {
        match DisplaySurfaceSink::new(
            descriptor.clone(),
            platform.presentations.as_mut(),
            self.events.clone(),
        ) {
            Ok(sink) => {
                self.sink = Some(sink);
                self.client.set_presentation_showing(true);
                self.state = SessionState::Presenting;
                info!(session = %self.id, display = %descriptor.name, "Presenting");
                Step::Presenting(descriptor)
            }
            Err(e) => {
                error!(session = %self.id, error = %e, "Could not present on remote display");
                Step::Terminate(TerminationReason::PresentationFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    fn surface_changed(&mut self, surface: SurfaceId, size: SurfaceSize) -> Step {
        let Some(sink) = self.sink.as_mut() else {
            debug!(session = %self.id, surface = %surface, "Surface change without presentation");
            return Step::Continue;
        };
        let Some(ready) = sink.surface_changed(surface, size) else {
            return Step::Continue;
        };
        match self.capture.bind(ready.surface, ready.size) {
            Ok(_) => Step::Continue,
            Err(e) => {
                error!(session = %self.id, error = %e, "Virtual display bind failed");
                Step::Terminate(TerminationReason::VirtualDisplayFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Unwind every resource. Each step tolerates missing resources and
    /// logs its own failures.
    pub fn teardown(mut self, reason: &TerminationReason, platform: &mut Platform) -> SessionSummary {
        let summary = self.summary();
        info!(
            session = %self.id,
            endpoint = %self.endpoint.id,
            reason = %reason,
            "Tearing down session"
        );

        self.client.disconnect();
        if let Some(listener) = self.listener.take() {
            platform.router.remove_listener(listener);
        }
        if let Some(mut sink) = self.sink.take() {
            sink.dismiss();
        }
        self.capture.release();
        if self.status_shown {
            self.status_shown = false;
            if let Err(e) = platform.notifier.clear_status() {
                warn!(session = %self.id, error = %e, "Could not clear status notification");
            }
        }
        summary
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            endpoint: self.endpoint.clone(),
            started_at: self.started_at,
            state: self.state,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    pub fn capture(&self) -> &CaptureSource {
        &self.capture
    }

    pub fn sink(&self) -> Option<&DisplaySurfaceSink> {
        self.sink.as_ref()
    }
}

#[cfg(test)]
mod tests;
