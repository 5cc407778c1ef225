//! Configuration schema types for castscreen.
//!
//! All structs use `serde(default)` so partial configs work correctly.

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CastScreenConfig {
    pub cast: CastConfig,
    pub capture: CaptureConfig,
    pub remote: RemoteConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Cast Config
// =============================================================================

/// Receiver application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Id of the Remote Display receiver application. Also used as the
    /// route selector category and to detect takeovers by other apps.
    pub app_id: String,
    /// Shown in the status notification when an endpoint has no name.
    pub friendly_name_fallback: String,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            app_id: "CC1AD845".into(),
            friendly_name_fallback: "remote display".into(),
        }
    }
}

// =============================================================================
// Capture Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Name given to the virtual display that mirrors the screen.
    pub virtual_display_name: String,
    /// Density for the virtual display; 0 uses the host screen's density.
    pub density_dpi_override: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            virtual_display_name: "castscreen-virtual-display".into(),
            density_dpi_override: 0,
        }
    }
}

impl CaptureConfig {
    /// Resolve the density to use given the host screen's density.
    pub fn effective_density(&self, host_density_dpi: u32) -> u32 {
        if self.density_dpi_override == 0 {
            host_density_dpi
        } else {
            self.density_dpi_override
        }
    }
}

// =============================================================================
// Remote Config
// =============================================================================

/// Encoder configuration preset requested from the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteDisplayPreset {
    #[default]
    InteractiveRealtime,
    HighQuality,
    HighFrameRate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub preset: RemoteDisplayPreset,
}

// =============================================================================
// Notification Config
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Show the persistent "casting" status while a session is active.
    pub enabled: bool,
    pub title: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: "Casting screen".into(),
        }
    }
}

// =============================================================================
// Logging Config
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
