//! Client for the remote display API of one endpoint.

use castscreen_common::RemoteEndpoint;
use tracing::{debug, error, info, warn};

use crate::events::{EventSink, SessionEvent, TerminationReason};
use crate::platform::{ConnectOptions, DisplayDescriptor, RemoteDisplayApi, RemoteDisplayConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    StartingDisplay,
    DisplayActive,
    Disconnected,
}

/// What the coordinator should do after the client handled an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutcome {
    Pending,
    DisplayReady(DisplayDescriptor),
    Terminate(TerminationReason),
}

pub struct RemoteSessionClient {
    endpoint: RemoteEndpoint,
    app_id: String,
    api: Box<dyn RemoteDisplayApi>,
    state: ClientState,
    presentation_showing: bool,
}

impl RemoteSessionClient {
    pub fn new(
        endpoint: RemoteEndpoint,
        options: ConnectOptions,
        connector: &mut dyn RemoteDisplayConnector,
        events: EventSink,
    ) -> Self {
        let api = connector.open(&endpoint, &options, events);
        Self {
            endpoint,
            app_id: options.app_id,
            api,
            state: ClientState::Idle,
            presentation_showing: false,
        }
    }

    /// Start the transport handshake. The remote display is requested as
    /// soon as the connection is reported.
    pub fn connect(&mut self) {
        if self.state != ClientState::Idle {
            debug!(endpoint = %self.endpoint.id, state = ?self.state, "Connect ignored");
            return;
        }
        info!(endpoint = %self.endpoint.id, name = %self.endpoint.friendly_name, "Connecting");
        self.state = ClientState::Connecting;
        self.api.connect();
    }

    pub fn handle(&mut self, event: &SessionEvent) -> ClientOutcome {
        match event {
            SessionEvent::ConnectSucceeded => {
                if self.state != ClientState::Connecting {
                    debug!(endpoint = %self.endpoint.id, state = ?self.state, "Late connect result ignored");
                    return ClientOutcome::Pending;
                }
                info!(endpoint = %self.endpoint.id, "Connected, starting remote display");
                self.state = ClientState::StartingDisplay;
                match self.api.start_remote_display(&self.app_id) {
                    Ok(()) => ClientOutcome::Pending,
                    Err(e) => {
                        error!(endpoint = %self.endpoint.id, error = %e, "Remote display request failed");
                        ClientOutcome::Terminate(TerminationReason::RemoteStartFailed {
                            status: e.to_string(),
                        })
                    }
                }
            }
            SessionEvent::ConnectFailed { code } => {
                error!(endpoint = %self.endpoint.id, code, "Connection failed");
                ClientOutcome::Terminate(TerminationReason::ConnectionFailed { code: *code })
            }
            SessionEvent::ConnectionSuspended { cause } => {
                warn!(endpoint = %self.endpoint.id, cause, "Connection suspended");
                ClientOutcome::Terminate(TerminationReason::ConnectionSuspended { cause: *cause })
            }
            SessionEvent::RemoteStartSucceeded {
                display: descriptor,
            } => {
                if self.state != ClientState::StartingDisplay {
                    debug!(endpoint = %self.endpoint.id, state = ?self.state, "Late display start ignored");
                    return ClientOutcome::Pending;
                }
                info!(endpoint = %self.endpoint.id, display = %descriptor.name, "Remote display started");
                self.state = ClientState::DisplayActive;
                ClientOutcome::DisplayReady(descriptor.clone())
            }
            SessionEvent::RemoteStartFailed { status } => {
                error!(endpoint = %self.endpoint.id, %status, "Remote display start failed");
                ClientOutcome::Terminate(TerminationReason::RemoteStartFailed {
                    status: status.clone(),
                })
            }
            SessionEvent::RemoteDisplayEnded { status } => {
                info!(endpoint = %self.endpoint.id, %status, "Remote display ended by receiver");
                ClientOutcome::Terminate(TerminationReason::RemoteDisplayEnded {
                    status: status.clone(),
                })
            }
            SessionEvent::ApplicationDisconnected { status } => {
                warn!(endpoint = %self.endpoint.id, status, "Receiver application disconnected");
                ClientOutcome::Terminate(TerminationReason::ApplicationDisconnected {
                    status: *status,
                })
            }
            SessionEvent::MetadataChanged { app_id: Some(running) }
                if self.presentation_showing && *running != self.app_id =>
            {
                warn!(
                    endpoint = %self.endpoint.id,
                    ours = %self.app_id,
                    running = %running,
                    "Receiver taken over by another application"
                );
                ClientOutcome::Terminate(TerminationReason::ApplicationTakeover {
                    app_id: running.clone(),
                })
            }
            SessionEvent::MetadataChanged { app_id } => {
                debug!(endpoint = %self.endpoint.id, app_id = ?app_id, "Receiver metadata changed");
                ClientOutcome::Pending
            }
            _ => ClientOutcome::Pending,
        }
    }

    /// Presentation visibility gates takeover detection.
    pub fn set_presentation_showing(&mut self, showing: bool) {
        self.presentation_showing = showing;
    }

    /// Stop the remote display if the transport is up, then tear the
    /// transport down. Returns `false` if there was nothing to disconnect.
    pub fn disconnect(&mut self) -> bool {
        if matches!(self.state, ClientState::Idle | ClientState::Disconnected) {
            debug!(endpoint = %self.endpoint.id, state = ?self.state, "Disconnect ignored");
            return false;
        }
        if self.api.is_connected() {
            if let Err(e) = self.api.stop_remote_display() {
                warn!(endpoint = %self.endpoint.id, error = %e, "Remote display stop failed");
            }
        }
        self.api.disconnect();
        self.state = ClientState::Disconnected;
        self.presentation_showing = false;
        info!(endpoint = %self.endpoint.id, "Disconnected");
        true
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

#[cfg(test)]
mod tests;
