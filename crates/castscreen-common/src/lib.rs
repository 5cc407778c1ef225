pub mod errors;
pub mod id;
pub mod notifications;
pub mod types;

pub use errors::{CastError, ConfigError, PlatformError};
pub use id::{new_id, SessionId};
pub use notifications::{Notification, NotificationLevel, NotificationQueue};
pub use types::{DisplayMetrics, EndpointId, RemoteEndpoint, SessionState, SurfaceSize};

pub type Result<T> = std::result::Result<T, CastError>;
