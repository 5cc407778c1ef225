//! Loopback run: one full session against the simulated platform.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing::{debug, info};

use castscreen_common::{CastError, RemoteEndpoint};
use castscreen_config::CastScreenConfig;
use castscreen_session::sim::SimPlatform;
use castscreen_session::{
    remote_route_selected, ButtonOutcome, CastButton, CastEvent, ControlHandle, Controller,
    RouteStrategy, RESULT_OK,
};

use crate::cli::{Args, EndTrigger};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Button strategy backed by the loopback router. Permission is granted
/// immediately with a fresh payload per request.
struct LoopbackStrategy {
    sim: SimPlatform,
    handle: ControlHandle,
    app_id: String,
    requests: u32,
}

impl RouteStrategy for LoopbackStrategy {
    fn remote_route_selected(&self) -> bool {
        remote_route_selected(&self.sim.router, &self.app_id)
    }

    fn request_capture_permission(&mut self, request_code: i32) {
        self.requests += 1;
        let payload = format!("loopback-grant-{}-{}", std::process::id(), self.requests);
        self.handle
            .permission_result(request_code, RESULT_OK, payload.into_bytes());
    }

    fn show_route_controller(&mut self) {
        info!("Route controller requested");
    }
}

/// Wait for the first event matching `want`, printing every event seen.
async fn wait_for(
    events: &mut UnboundedReceiver<CastEvent>,
    what: &str,
    want: impl Fn(&CastEvent) -> bool,
) -> castscreen_common::Result<CastEvent> {
    loop {
        let event = match timeout(EVENT_TIMEOUT, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(CastError::Session("controller exited".into())),
            Err(_) => return Err(CastError::Session(format!("timed out waiting for {what}"))),
        };
        print_event(&event);
        if want(&event) {
            return Ok(event);
        }
    }
}

fn print_event(event: &CastEvent) {
    match event {
        CastEvent::ChooserRequested => println!("chooser requested"),
        CastEvent::CaptureUnavailable => println!("capture unavailable"),
        CastEvent::SessionStarted {
            session,
            endpoint,
            started_at,
        } => println!(
            "session {session} started on {} at {}",
            endpoint.friendly_name,
            started_at.format("%H:%M:%S%.3f")
        ),
        CastEvent::Presenting { session, display } => println!(
            "session {session} presenting on {} ({})",
            display.name, display.size
        ),
        CastEvent::SessionEnded { session, reason } => {
            println!("session {session} ended: {reason}")
        }
        CastEvent::StartRejected { endpoint, reason } => {
            println!("start on {endpoint} rejected: {reason}")
        }
        CastEvent::StartFailed { endpoint, error } => {
            println!("start on {endpoint} failed: {error}")
        }
    }
}

fn fire(trigger: EndTrigger, sim: &SimPlatform, handle: &ControlHandle) -> bool {
    debug!(?trigger, "Firing end trigger");
    match trigger {
        EndTrigger::Unselect => sim.router.unselect() > 0,
        EndTrigger::Disconnect => sim.remote.app_disconnected(2005),
        EndTrigger::Takeover => sim.remote.metadata_changed(Some("TAKEOVER1")),
        EndTrigger::Suspend => sim.remote.connection_suspended(2),
        EndTrigger::ConnectionFailed => sim.remote.connection_failed(7),
        EndTrigger::DisplayEnded => sim.remote.display_ended("receiver closed the display"),
        EndTrigger::CaptureStopped => sim.capture.revoke(),
        EndTrigger::Stop => handle.stop(),
    }
}

pub async fn run(args: &Args, config: &CastScreenConfig) -> castscreen_common::Result<()> {
    let sim = SimPlatform::new(config.cast.app_id.clone());
    let (controller, handle, mut events) = Controller::new(config, sim.platform());
    let control = controller.spawn()?;
    handle.host_visibility(true);

    let mut button = CastButton::new(LoopbackStrategy {
        sim: sim.clone(),
        handle: handle.clone(),
        app_id: config.cast.app_id.clone(),
        requests: 0,
    });
    if button.click() != ButtonOutcome::PermissionRequested {
        return Err(CastError::Other("cast button did not request permission".into()));
    }
    wait_for(&mut events, "the route chooser", |e| {
        matches!(e, CastEvent::ChooserRequested | CastEvent::CaptureUnavailable)
    })
    .await?;

    let endpoint = RemoteEndpoint::new("loopback-1", args.endpoint.clone());
    sim.pick(&handle, endpoint);
    let presenting = wait_for(&mut events, "the presentation", |e| {
        matches!(
            e,
            CastEvent::Presenting { .. }
                | CastEvent::StartFailed { .. }
                | CastEvent::SessionEnded { .. }
        )
    })
    .await?;
    if !matches!(presenting, CastEvent::Presenting { .. }) {
        handle.shutdown();
        return Err(CastError::Session("session did not reach presenting".into()));
    }

    // Layout passes: the first one has no size yet.
    sim.presentations.report_surface(0, 0);
    sim.presentations.report_surface(1280, 720);
    info!(button = ?button.click(), "Cast button clicked while presenting");

    tokio::time::sleep(Duration::from_millis(args.hold_ms)).await;
    if !fire(args.end_with, &sim, &handle) {
        handle.shutdown();
        return Err(CastError::Other(format!("could not fire {:?}", args.end_with)));
    }
    wait_for(&mut events, "the session to end", |e| {
        matches!(e, CastEvent::SessionEnded { .. })
    })
    .await?;

    let created = sim.capture.created();
    info!(
        virtual_displays = created.len(),
        projections_stopped = sim.capture.stop_count(),
        route_resets = sim.router.default_selects(),
        "Loopback session finished"
    );

    handle.shutdown();
    let outcome = control
        .join()
        .map_err(|_| CastError::Other("control thread panicked".into()))?;
    if outcome.is_err() {
        return Err(CastError::Other("control loop did not run".into()));
    }
    Ok(())
}
