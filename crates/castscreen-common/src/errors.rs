use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures reported by a platform collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("capture error: {0}")]
    Capture(String),

    #[error("remote display error: {0}")]
    RemoteDisplay(String),

    #[error("presentation error: {0}")]
    Presentation(String),

    #[error("notification error: {0}")]
    Notification(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CastError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("{0}")]
    Other(String),
}
