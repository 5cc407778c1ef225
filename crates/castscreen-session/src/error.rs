use castscreen_common::{PlatformError, SessionId};

use crate::grant::GrantToken;

/// Failures that prevent a session from being built or a binding from
/// being made.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("capture grant is not usable (result code {result_code})")]
    InvalidGrant { result_code: i32 },

    #[error("capture grant {0} was already consumed")]
    GrantReused(GrantToken),

    #[error("no capture grant was delivered before the route was selected")]
    MissingGrant,

    #[error("screen projection unavailable: {0}")]
    ProjectionUnavailable(#[source] PlatformError),

    #[error("capture source already released")]
    CaptureReleased,

    #[error("virtual display creation failed: {0}")]
    VirtualDisplay(#[source] PlatformError),

    #[error("presentation failed: {0}")]
    Presentation(#[source] PlatformError),
}

/// Why `SessionRegistry::try_start` did not admit a session.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("session {0} is already active")]
    AlreadyActive(SessionId),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl StartError {
    /// Rejections (as opposed to construction failures) leave any active
    /// session untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::AlreadyActive(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_display() {
        let err = SessionError::InvalidGrant { result_code: 0 };
        assert_eq!(err.to_string(), "capture grant is not usable (result code 0)");

        let err = SessionError::ProjectionUnavailable(PlatformError::Capture("null".into()));
        assert_eq!(err.to_string(), "screen projection unavailable: capture error: null");
    }

    #[test]
    fn start_error_wraps_session_error() {
        let err: StartError = SessionError::MissingGrant.into();
        assert!(!err.is_rejection());
        assert!(err.to_string().contains("no capture grant"));
    }

    #[test]
    fn double_start_is_rejection() {
        let err = StartError::AlreadyActive(SessionId::new());
        assert!(err.is_rejection());
    }
}
