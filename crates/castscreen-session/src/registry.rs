//! The single session slot.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use castscreen_common::{SessionId, SessionState};

use crate::coordinator::{SessionCoordinator, SessionSummary, StartContext, StartRequest, Step};
use crate::error::StartError;
use crate::events::{SessionEvent, TerminationReason};
use crate::platform::{DisplayDescriptor, Platform};

/// What happened to a dispatched session event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Stale session id or no session.
    Ignored,
    Handled,
    Presenting(DisplayDescriptor),
    /// The session terminated and has been torn down.
    Ended(SessionSummary, TerminationReason),
}

/// Holds at most one active session and publishes its state.
pub struct SessionRegistry {
    active: Option<Box<SessionCoordinator>>,
    state_tx: watch::Sender<SessionState>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            active: None,
            state_tx,
        }
    }

    /// Whether a start request would be admitted right now.
    pub fn check_admission(&self) -> Result<(), StartError> {
        match &self.active {
            None => Ok(()),
            Some(session) => Err(StartError::AlreadyActive(session.id().clone())),
        }
    }

    /// Build and install a session. On a rejection the caller must reset
    /// the route selection; on a construction failure the slot stays empty.
    pub fn try_start(
        &mut self,
        request: StartRequest,
        ctx: StartContext<'_>,
    ) -> Result<SessionId, StartError> {
        self.check_admission()?;
        let session = SessionCoordinator::start(request, ctx)?;
        let id = session.id().clone();
        self.publish(session.state());
        self.active = Some(Box::new(session));
        Ok(id)
    }

    /// Tear down the active session, if any.
    pub fn stop(
        &mut self,
        reason: TerminationReason,
        platform: &mut Platform,
    ) -> Option<SessionSummary> {
        let Some(session) = self.active.take() else {
            info!(reason = %reason, "No active session to stop");
            return None;
        };

        self.publish(SessionState::TearingDown);
        let summary = (*session).teardown(&reason, platform);
        self.publish(SessionState::Idle);

        info!(session = %summary.id, reason = %reason, "Session ended");
        Some(summary)
    }

    /// Route an event to the session it is tagged with.
    pub fn dispatch(
        &mut self,
        session: &SessionId,
        event: SessionEvent,
        platform: &mut Platform,
    ) -> Dispatch {
        // Stop outcomes usually arrive after the session is gone.
        if let SessionEvent::RemoteStopCompleted { success } = event {
            if success {
                info!(session = %session, "Remote display stopped");
            } else {
                warn!(session = %session, "Remote display stop failed");
            }
        }

        let Some(active) = self.active.as_mut() else {
            debug!(session = %session, ?event, "No active session, event ignored");
            return Dispatch::Ignored;
        };
        if active.id() != session {
            debug!(session = %session, active = %active.id(), ?event, "Stale session event ignored");
            return Dispatch::Ignored;
        }

        match active.handle(event, platform) {
            Step::Continue => Dispatch::Handled,
            Step::Presenting(display) => {
                self.publish(SessionState::Presenting);
                Dispatch::Presenting(display)
            }
            Step::Terminate(reason) => match self.stop(reason.clone(), platform) {
                Some(summary) => Dispatch::Ended(summary, reason),
                None => Dispatch::Handled,
            },
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn active(&self) -> Option<&SessionCoordinator> {
        self.active.as_deref()
    }

    pub fn active_session_id(&self) -> Option<&SessionId> {
        self.active().map(SessionCoordinator::id)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    fn publish(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Session state changed");
        }
    }
}
