use serde::{Deserialize, Serialize};
use std::fmt;

/// Route-level identifier of a discovered remote display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discovered display target, as resolved by the route selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    pub id: EndpointId,
    pub friendly_name: String,
    pub model: Option<String>,
    /// Whether the receiver advertises video output.
    pub video_out: bool,
    /// Whether the receiver can run a remote display session.
    pub remote_display: bool,
}

impl RemoteEndpoint {
    pub fn new(id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            id: EndpointId::new(id),
            friendly_name: friendly_name.into(),
            model: None,
            video_out: true,
            remote_display: true,
        }
    }
}

/// Metrics of the local screen at the time a route is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMetrics {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            density_dpi: 420,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Layout may transiently report a zero dimension.
    pub fn is_drawable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Lifecycle state of the (single) mirroring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Presenting,
    TearingDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Presenting => "presenting",
            Self::TearingDown => "tearing-down",
        };
        f.write_str(name)
    }
}
