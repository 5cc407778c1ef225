use castscreen_common::{NotificationLevel, SessionState};
use tokio::sync::mpsc;

use super::*;
use crate::grant::{RESULT_CANCELED, RESULT_OK};
use crate::sim::{DisplayStartScript, SimPlatform};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    sim: SimPlatform,
    platform: Platform,
    ledger: GrantLedger,
    settings: SessionSettings,
    tx: mpsc::UnboundedSender<ControlMessage>,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

fn fixture() -> Fixture {
    let sim = SimPlatform::default();
    let platform = sim.platform();
    let (tx, rx) = mpsc::unbounded_channel();
    Fixture {
        sim,
        platform,
        ledger: GrantLedger::new(),
        settings: SessionSettings::default(),
        tx,
        rx,
    }
}

fn request(grant: Option<CaptureGrant>) -> StartRequest {
    StartRequest {
        endpoint: RemoteEndpoint::new("route-1", "Den"),
        grant,
        metrics: DisplayMetrics::default(),
    }
}

fn good_grant() -> Option<CaptureGrant> {
    Some(CaptureGrant::new(RESULT_OK, b"projection-intent".to_vec()))
}

impl Fixture {
    fn start(&mut self, grant: Option<CaptureGrant>) -> Result<SessionCoordinator, SessionError> {
        let ctx = StartContext {
            platform: &mut self.platform,
            ledger: &self.ledger,
            control: &self.tx,
            settings: &self.settings,
        };
        SessionCoordinator::start(request(grant), ctx)
    }

    /// Deliver queued events until one produces something other than
    /// `Continue`.
    fn pump(&mut self, coordinator: &mut SessionCoordinator) -> Step {
        while let Ok(message) = self.rx.try_recv() {
            if let ControlMessage::Session { event, .. } = message {
                let step = coordinator.handle(event, &mut self.platform);
                if step != Step::Continue {
                    return step;
                }
            }
        }
        Step::Continue
    }

    fn presenting(&mut self) -> SessionCoordinator {
        let mut coordinator = self.start(good_grant()).unwrap();
        assert!(matches!(self.pump(&mut coordinator), Step::Presenting(_)));
        coordinator
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[test]
fn start_connects_and_shows_status() {
    let mut f = fixture();
    let coordinator = f.start(good_grant()).unwrap();

    assert_eq!(coordinator.state(), SessionState::Connecting);
    assert!(coordinator.sink().is_none());
    assert_eq!(f.sim.router.listener_count(), 1);
    assert_eq!(f.sim.remote.open_count(), 1);

    let status = f.sim.notifier.status().unwrap();
    assert!(status.persistent);
    assert_eq!(status.level, NotificationLevel::Info);
    assert_eq!(status.title, "Casting screen");
    assert_eq!(status.body, "Connected to Den");
}

#[test]
fn missing_grant_allocates_nothing() {
    let mut f = fixture();
    assert!(matches!(f.start(None), Err(SessionError::MissingGrant)));
    assert_eq!(f.sim.capture.open_count(), 0);
    assert_eq!(f.sim.remote.open_count(), 0);
    assert!(f.sim.notifier.status().is_none());
}

#[test]
fn invalid_grant_allocates_nothing() {
    let mut f = fixture();
    let grant = Some(CaptureGrant::new(RESULT_CANCELED, b"x".to_vec()));
    assert!(matches!(f.start(grant), Err(SessionError::InvalidGrant { .. })));
    assert_eq!(f.sim.remote.open_count(), 0);
    assert_eq!(f.sim.router.listener_count(), 0);
    assert_eq!(f.sim.notifier.status_shows(), 0);
}

#[test]
fn notifications_can_be_disabled() {
    let mut f = fixture();
    f.settings.notifications_enabled = false;
    let coordinator = f.start(good_grant()).unwrap();
    assert!(f.sim.notifier.status().is_none());

    coordinator.teardown(&TerminationReason::StopRequested, &mut f.platform);
    assert_eq!(f.sim.notifier.clear_count(), 0);
}

#[test]
fn density_override_applies_to_binding() {
    let mut f = fixture();
    f.settings.capture.density_dpi_override = 160;
    let mut coordinator = f.presenting();
    f.sim.presentations.report_surface(1280, 720);
    f.pump(&mut coordinator);
    assert_eq!(f.sim.capture.created()[0].density_dpi, 160);
}

#[test]
fn empty_friendly_name_uses_fallback() {
    let mut f = fixture();
    let ctx = StartContext {
        platform: &mut f.platform,
        ledger: &f.ledger,
        control: &f.tx,
        settings: &f.settings,
    };
    let request = StartRequest {
        endpoint: RemoteEndpoint::new("route-9", " "),
        grant: good_grant(),
        metrics: DisplayMetrics::default(),
    };
    SessionCoordinator::start(request, ctx).unwrap();
    assert_eq!(f.sim.notifier.status().unwrap().body, "Connected to remote display");
}

// ---------------------------------------------------------------------------
// Presenting and binding
// ---------------------------------------------------------------------------

#[test]
fn display_start_creates_presentation() {
    let mut f = fixture();
    let coordinator = f.presenting();
    assert_eq!(coordinator.state(), SessionState::Presenting);
    assert!(coordinator.sink().unwrap().is_showing());
    assert!(f.sim.presentations.is_showing());
}

#[test]
fn binding_waits_for_positive_size() {
    let mut f = fixture();
    let mut coordinator = f.presenting();

    f.sim.presentations.report_surface(0, 0);
    f.pump(&mut coordinator);
    assert!(f.sim.capture.created().is_empty());

    f.sim.presentations.report_surface(1280, 720);
    f.pump(&mut coordinator);
    let created = f.sim.capture.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].size, SurfaceSize::new(1280, 720));
    assert_eq!(created[0].density_dpi, DisplayMetrics::default().density_dpi);
}

#[test]
fn resize_rebinds_after_release() {
    let mut f = fixture();
    let mut coordinator = f.presenting();

    f.sim.presentations.report_surface(1280, 720);
    f.pump(&mut coordinator);
    f.sim.presentations.report_surface(1920, 1080);
    f.pump(&mut coordinator);

    assert_eq!(f.sim.capture.created().len(), 2);
    assert_eq!(f.sim.capture.released().len(), 1);
    assert_eq!(f.sim.capture.live_displays().len(), 1);
}

#[test]
fn destroyed_surface_unbinds() {
    let mut f = fixture();
    let mut coordinator = f.presenting();
    f.sim.presentations.report_surface(1280, 720);
    f.pump(&mut coordinator);

    f.sim.presentations.destroy_surface();
    f.pump(&mut coordinator);
    assert!(coordinator.capture().binding().is_none());
    assert!(f.sim.capture.live_displays().is_empty());

    f.sim.presentations.report_surface(1280, 720);
    f.pump(&mut coordinator);
    assert_eq!(f.sim.capture.live_displays().len(), 1);
}

#[test]
fn presentation_failure_terminates() {
    let mut f = fixture();
    f.sim.presentations.fail_create(true);
    let mut coordinator = f.start(good_grant()).unwrap();
    assert!(matches!(
        f.pump(&mut coordinator),
        Step::Terminate(TerminationReason::PresentationFailed { .. })
    ));
}

#[test]
fn display_start_failure_terminates_from_connecting() {
    let mut f = fixture();
    f.sim
        .remote
        .script_display_start(DisplayStartScript::Fail("TIMEOUT".into()));
    let mut coordinator = f.start(good_grant()).unwrap();
    assert_eq!(
        f.pump(&mut coordinator),
        Step::Terminate(TerminationReason::RemoteStartFailed {
            status: "TIMEOUT".into()
        })
    );
    assert_eq!(coordinator.state(), SessionState::Connecting);
}

// ---------------------------------------------------------------------------
// Termination triggers
// ---------------------------------------------------------------------------

#[test]
fn capture_revocation_terminates() {
    let mut f = fixture();
    let mut coordinator = f.presenting();
    f.sim.capture.revoke();
    assert_eq!(
        f.pump(&mut coordinator),
        Step::Terminate(TerminationReason::CaptureStopped)
    );
}

#[test]
fn route_unselect_terminates() {
    let mut f = fixture();
    let mut coordinator = f.presenting();
    f.sim.router.select(coordinator.endpoint());
    f.sim.router.unselect();
    assert_eq!(
        f.pump(&mut coordinator),
        Step::Terminate(TerminationReason::RouteUnselected)
    );
}

#[test]
fn takeover_terminates_while_presenting() {
    let mut f = fixture();
    let mut coordinator = f.presenting();
    f.sim.remote.metadata_changed(Some("B"));
    assert_eq!(
        f.pump(&mut coordinator),
        Step::Terminate(TerminationReason::ApplicationTakeover { app_id: "B".into() })
    );
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[test]
fn teardown_releases_everything() {
    let mut f = fixture();
    let mut coordinator = f.presenting();
    f.sim.presentations.report_surface(1280, 720);
    f.pump(&mut coordinator);

    let summary = coordinator.teardown(&TerminationReason::StopRequested, &mut f.platform);
    assert_eq!(summary.state, SessionState::Presenting);
    assert_eq!(summary.endpoint.friendly_name, "Den");

    assert_eq!(f.sim.remote.stop_requests(), 1);
    assert_eq!(f.sim.remote.disconnect_count(), 1);
    assert_eq!(f.sim.router.listener_count(), 0);
    assert!(!f.sim.presentations.is_showing());
    assert!(f.sim.capture.live_displays().is_empty());
    assert_eq!(f.sim.capture.stop_count(), 1);
    assert!(f.sim.notifier.status().is_none());
}

#[test]
fn teardown_while_connecting_tolerates_missing_sink() {
    let mut f = fixture();
    let coordinator = f.start(good_grant()).unwrap();

    coordinator.teardown(&TerminationReason::ConnectionFailed { code: 15 }, &mut f.platform);
    assert_eq!(f.sim.presentations.dismiss_count(), 0);
    assert_eq!(f.sim.capture.stop_count(), 1);
    assert_eq!(f.sim.notifier.clear_count(), 1);
}

#[test]
fn teardown_continues_past_failures() {
    let mut f = fixture();
    let coordinator = f.presenting();
    f.sim.remote.fail_stop(true);
    f.sim.notifier.fail(true);

    coordinator.teardown(&TerminationReason::StopRequested, &mut f.platform);
    assert_eq!(f.sim.remote.disconnect_count(), 1);
    assert_eq!(f.sim.router.listener_count(), 0);
    assert_eq!(f.sim.capture.stop_count(), 1);
}

#[test]
fn settings_follow_config() {
    let mut config = CastScreenConfig::default();
    config.cast.app_id = "ABCD1234".into();
    config.remote.preset = RemoteDisplayPreset::HighFrameRate;
    config.notifications.title = "Mirroring".into();

    let settings = SessionSettings::from(&config);
    assert_eq!(settings.app_id, "ABCD1234");
    assert_eq!(settings.preset, RemoteDisplayPreset::HighFrameRate);
    assert_eq!(settings.notification_title, "Mirroring");
}
