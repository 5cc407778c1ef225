use castscreen_common::{SessionId, SurfaceSize};
use castscreen_config::RemoteDisplayPreset;
use tokio::sync::mpsc;

use super::*;
use crate::events::ControlMessage;
use crate::sim::{ConnectScript, DisplayStartScript, SimConnector};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    connector: SimConnector,
    client: RemoteSessionClient,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

fn harness(connector: SimConnector) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut boxed = connector.clone();
    let client = RemoteSessionClient::new(
        RemoteEndpoint::new("route-1", "Den"),
        ConnectOptions {
            app_id: "CC1AD845".into(),
            preset: RemoteDisplayPreset::HighQuality,
        },
        &mut boxed,
        EventSink::new(SessionId::new(), tx),
    );
    Harness { connector, client, rx }
}

impl Harness {
    /// Feed every queued event back into the client, collecting outcomes.
    fn pump(&mut self) -> Vec<ClientOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let ControlMessage::Session { event, .. } = message {
                outcomes.push(self.client.handle(&event));
            }
        }
        outcomes
    }

    fn bring_up(&mut self) -> DisplayDescriptor {
        self.client.connect();
        let outcomes = self.pump();
        match outcomes.last() {
            Some(ClientOutcome::DisplayReady(display)) => display.clone(),
            other => panic!("display not ready: {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Connect and start
// ---------------------------------------------------------------------------

#[test]
fn open_passes_options() {
    let h = harness(SimConnector::default());
    let options = h.connector.last_options().unwrap();
    assert_eq!(options.preset, RemoteDisplayPreset::HighQuality);
    assert_eq!(h.client.state(), ClientState::Idle);
}

#[test]
fn connect_then_display_start() {
    let mut h = harness(SimConnector::default());
    let display = h.bring_up();

    assert_eq!(h.client.state(), ClientState::DisplayActive);
    assert_eq!(display.name, "Den display");
    assert_eq!(display.size, SurfaceSize::new(1280, 720));
    assert_eq!(h.connector.start_requests(), vec!["CC1AD845".to_string()]);
}

#[test]
fn second_connect_is_ignored() {
    let mut h = harness(SimConnector::default());
    h.client.connect();
    h.client.connect();
    h.pump();
    assert_eq!(h.connector.start_requests().len(), 1);
}

#[test]
fn connect_failure_terminates() {
    let connector = SimConnector::default();
    connector.script_connect(ConnectScript::Fail(7));
    let mut h = harness(connector);
    h.client.connect();
    assert_eq!(
        h.pump(),
        vec![ClientOutcome::Terminate(TerminationReason::ConnectionFailed { code: 7 })]
    );
}

#[test]
fn suspension_terminates() {
    let connector = SimConnector::default();
    connector.script_connect(ConnectScript::Suspend(2));
    let mut h = harness(connector);
    h.client.connect();
    assert_eq!(
        h.pump(),
        vec![ClientOutcome::Terminate(TerminationReason::ConnectionSuspended { cause: 2 })]
    );
}

#[test]
fn display_start_failure_terminates() {
    let connector = SimConnector::default();
    connector.script_display_start(DisplayStartScript::Fail("NO_DEVICE".into()));
    let mut h = harness(connector);
    h.client.connect();
    let outcomes = h.pump();
    assert_eq!(
        outcomes.last(),
        Some(&ClientOutcome::Terminate(TerminationReason::RemoteStartFailed {
            status: "NO_DEVICE".into()
        }))
    );
}

#[test]
fn refused_display_request_terminates_immediately() {
    let connector = SimConnector::default();
    connector.script_display_start(DisplayStartScript::Refuse("busy".into()));
    let mut h = harness(connector);
    h.client.connect();
    let outcomes = h.pump();
    assert!(matches!(
        outcomes.as_slice(),
        [ClientOutcome::Terminate(TerminationReason::RemoteStartFailed { .. })]
    ));
}

// ---------------------------------------------------------------------------
// Receiver-side triggers
// ---------------------------------------------------------------------------

#[test]
fn app_disconnect_terminates() {
    let mut h = harness(SimConnector::default());
    h.bring_up();
    h.connector.app_disconnected(2005);
    assert_eq!(
        h.pump(),
        vec![ClientOutcome::Terminate(TerminationReason::ApplicationDisconnected {
            status: 2005
        })]
    );
}

#[test]
fn display_end_terminates() {
    let mut h = harness(SimConnector::default());
    h.bring_up();
    h.connector.display_ended("receiver closed");
    assert!(matches!(
        h.pump().as_slice(),
        [ClientOutcome::Terminate(TerminationReason::RemoteDisplayEnded { .. })]
    ));
}

#[test]
fn takeover_requires_showing_presentation() {
    let mut h = harness(SimConnector::default());
    h.bring_up();

    h.connector.metadata_changed(Some("B"));
    assert_eq!(h.pump(), vec![ClientOutcome::Pending]);

    h.client.set_presentation_showing(true);
    h.connector.metadata_changed(Some("B"));
    assert_eq!(
        h.pump(),
        vec![ClientOutcome::Terminate(TerminationReason::ApplicationTakeover {
            app_id: "B".into()
        })]
    );
}

#[test]
fn own_or_missing_metadata_is_not_takeover() {
    let mut h = harness(SimConnector::default());
    h.bring_up();
    h.client.set_presentation_showing(true);

    h.connector.metadata_changed(Some("CC1AD845"));
    h.connector.metadata_changed(None);
    assert_eq!(h.pump(), vec![ClientOutcome::Pending, ClientOutcome::Pending]);
}

// ---------------------------------------------------------------------------
// Disconnect
// ---------------------------------------------------------------------------

#[test]
fn disconnect_before_connect_is_noop() {
    let mut h = harness(SimConnector::default());
    assert!(!h.client.disconnect());
    assert_eq!(h.connector.disconnect_count(), 0);
}

#[test]
fn disconnect_stops_display_then_transport() {
    let mut h = harness(SimConnector::default());
    h.bring_up();

    assert!(h.client.disconnect());
    assert!(!h.client.disconnect());
    assert_eq!(h.client.state(), ClientState::Disconnected);
    assert_eq!(h.connector.stop_requests(), 1);
    assert_eq!(h.connector.disconnect_count(), 1);
}

#[test]
fn disconnect_skips_stop_when_transport_down() {
    let connector = SimConnector::default();
    connector.script_connect(ConnectScript::Silent);
    let mut h = harness(connector);
    h.client.connect();

    assert!(h.client.disconnect());
    assert_eq!(h.connector.stop_requests(), 0);
    assert_eq!(h.connector.disconnect_count(), 1);
}

#[test]
fn failed_stop_still_disconnects() {
    let connector = SimConnector::default();
    connector.fail_stop(true);
    let mut h = harness(connector);
    h.bring_up();

    assert!(h.client.disconnect());
    assert_eq!(h.connector.disconnect_count(), 1);
}

#[test]
fn late_start_result_after_disconnect_is_ignored() {
    let mut h = harness(SimConnector::default());
    h.client.connect();
    h.client.disconnect();
    let outcomes = h.pump();
    assert!(outcomes.iter().all(|o| *o == ClientOutcome::Pending));
}
