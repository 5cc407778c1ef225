//! Screen capture source.
//!
//! Owns the projection obtained from a [`CaptureGrant`] and at most one
//! virtual display mirroring the screen into a sink surface.

use castscreen_common::SurfaceSize;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::events::EventSink;
use crate::grant::{CaptureGrant, GrantLedger};
use crate::platform::{
    Projection, ScreenCaptureService, SurfaceId, VirtualDisplayId, VirtualDisplaySpec,
};

/// A live virtual display rendering into a sink surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualDisplayBinding {
    pub display: VirtualDisplayId,
    pub surface: SurfaceId,
    pub size: SurfaceSize,
    pub density_dpi: u32,
}

pub struct CaptureSource {
    projection: Option<Box<dyn Projection>>,
    binding: Option<VirtualDisplayBinding>,
    display_name: String,
    density_dpi: u32,
}

impl CaptureSource {
    /// Redeem `grant` for a projection.
    ///
    /// The grant is recorded in `ledger` before the platform is asked for
    /// the projection, so a grant is spent even if the platform refuses it.
    /// `on_stop` receives `SessionEvent::CaptureStopped` when the platform
    /// ends the projection.
    pub fn new(
        grant: CaptureGrant,
        service: &mut dyn ScreenCaptureService,
        ledger: &GrantLedger,
        on_stop: EventSink,
        display_name: impl Into<String>,
        density_dpi: u32,
    ) -> Result<Self, SessionError> {
        if !grant.is_valid() {
            return Err(SessionError::InvalidGrant {
                result_code: grant.result_code(),
            });
        }
        ledger.consume(grant.token())?;

        let session = on_stop.session().clone();
        let projection = service
            .open_projection(&grant, on_stop)
            .map_err(SessionError::ProjectionUnavailable)?;

        info!(session = %session, grant = %grant.token(), "Screen projection acquired");
        Ok(Self {
            projection: Some(projection),
            binding: None,
            display_name: display_name.into(),
            density_dpi,
        })
    }

    /// Mirror the screen into `surface` at `size`.
    ///
    /// Returns `Ok(false)` if that exact binding already exists. Any other
    /// binding is released before the new virtual display is created.
    pub fn bind(&mut self, surface: SurfaceId, size: SurfaceSize) -> Result<bool, SessionError> {
        if self.projection.is_none() {
            return Err(SessionError::CaptureReleased);
        }
        if let Some(current) = &self.binding {
            if current.surface == surface && current.size == size {
                debug!(surface = %surface, size = %size, "Binding unchanged");
                return Ok(false);
            }
        }
        self.unbind();

        let spec = VirtualDisplaySpec {
            name: self.display_name.clone(),
            size,
            density_dpi: self.density_dpi,
            surface,
            own_content_only: true,
        };
        let projection = self
            .projection
            .as_mut()
            .ok_or(SessionError::CaptureReleased)?;
        let vd = projection
            .create_virtual_display(&spec)
            .map_err(SessionError::VirtualDisplay)?;

        info!(display = %vd, surface = %surface, size = %size, "Virtual display bound");
        self.binding = Some(VirtualDisplayBinding {
            display: vd,
            surface,
            size,
            density_dpi: self.density_dpi,
        });
        Ok(true)
    }

    /// Release the current binding, keeping the projection.
    pub fn unbind(&mut self) -> bool {
        let Some(binding) = self.binding.take() else {
            return false;
        };
        if let Some(projection) = self.projection.as_mut() {
            projection.release_virtual_display(binding.display);
        }
        debug!(display = %binding.display, "Virtual display released");
        true
    }

    /// Release the binding and stop the projection. Returns `false` if the
    /// source was already released.
    pub fn release(&mut self) -> bool {
        if self.projection.is_none() {
            return false;
        }
        self.unbind();
        if let Some(mut projection) = self.projection.take() {
            projection.stop();
        }
        info!("Screen projection released");
        true
    }

    pub fn binding(&self) -> Option<&VirtualDisplayBinding> {
        self.binding.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.projection.is_none()
    }

    pub fn density_dpi(&self) -> u32 {
        self.density_dpi
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        if self.release() {
            warn!("Capture source dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castscreen_common::SessionId;
    use tokio::sync::mpsc;

    use crate::grant::{RESULT_CANCELED, RESULT_OK};
    use crate::sim::SimCaptureService;

    fn sink() -> EventSink {
        let (tx, _) = mpsc::unbounded_channel();
        EventSink::new(SessionId::new(), tx)
    }

    fn source(service: &mut SimCaptureService, ledger: &GrantLedger) -> CaptureSource {
        let grant = CaptureGrant::new(RESULT_OK, b"projection-intent".to_vec());
        CaptureSource::new(grant, service, ledger, sink(), "vd", 320).unwrap()
    }

    #[test]
    fn canceled_grant_is_rejected_without_projection() {
        let mut service = SimCaptureService::default();
        let ledger = GrantLedger::new();
        let grant = CaptureGrant::new(RESULT_CANCELED, b"intent".to_vec());
        let token = grant.token().clone();

        let err = CaptureSource::new(grant, &mut service, &ledger, sink(), "vd", 320)
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::InvalidGrant { result_code: 0 }));
        assert_eq!(service.open_count(), 0);
        assert!(!ledger.is_consumed(&token));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let mut service = SimCaptureService::default();
        let grant = CaptureGrant::new(RESULT_OK, Vec::new());
        let result = CaptureSource::new(grant, &mut service, &GrantLedger::new(), sink(), "vd", 1);
        assert!(matches!(result, Err(SessionError::InvalidGrant { .. })));
    }

    #[test]
    fn refused_projection_still_spends_grant() {
        let mut service = SimCaptureService::default();
        service.refuse_projections(true);
        let ledger = GrantLedger::new();
        let grant = CaptureGrant::new(RESULT_OK, b"intent".to_vec());
        let token = grant.token().clone();

        let result = CaptureSource::new(grant, &mut service, &ledger, sink(), "vd", 1);
        assert!(matches!(result, Err(SessionError::ProjectionUnavailable(_))));
        assert!(ledger.is_consumed(&token));
    }

    #[test]
    fn reused_grant_is_rejected() {
        let mut service = SimCaptureService::default();
        let ledger = GrantLedger::new();
        let _first = source(&mut service, &ledger);

        let again = CaptureGrant::new(RESULT_OK, b"projection-intent".to_vec());
        let result = CaptureSource::new(again, &mut service, &ledger, sink(), "vd", 320);
        assert!(matches!(result, Err(SessionError::GrantReused(_))));
        assert_eq!(service.open_count(), 1);
    }

    #[test]
    fn bind_uses_surface_size_and_density() {
        let mut service = SimCaptureService::default();
        let mut capture = source(&mut service, &GrantLedger::new());

        assert!(capture.bind(SurfaceId(1), SurfaceSize::new(1280, 720)).unwrap());
        let created = service.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].size, SurfaceSize::new(1280, 720));
        assert_eq!(created[0].density_dpi, 320);
        assert_eq!(created[0].name, "vd");
        assert!(created[0].own_content_only);
    }

    #[test]
    fn identical_rebind_is_noop() {
        let mut service = SimCaptureService::default();
        let mut capture = source(&mut service, &GrantLedger::new());

        capture.bind(SurfaceId(1), SurfaceSize::new(1280, 720)).unwrap();
        assert!(!capture.bind(SurfaceId(1), SurfaceSize::new(1280, 720)).unwrap());
        assert_eq!(service.created().len(), 1);
        assert!(service.released().is_empty());
    }

    #[test]
    fn resize_releases_prior_binding_first() {
        let mut service = SimCaptureService::default();
        let mut capture = source(&mut service, &GrantLedger::new());

        capture.bind(SurfaceId(1), SurfaceSize::new(1280, 720)).unwrap();
        let first = capture.binding().unwrap().display;
        capture.bind(SurfaceId(1), SurfaceSize::new(1920, 1080)).unwrap();

        assert_eq!(service.released(), vec![first]);
        assert_eq!(service.live_displays().len(), 1);
        assert_eq!(capture.binding().unwrap().size, SurfaceSize::new(1920, 1080));
    }

    #[test]
    fn release_is_idempotent() {
        let mut service = SimCaptureService::default();
        let mut capture = source(&mut service, &GrantLedger::new());
        capture.bind(SurfaceId(1), SurfaceSize::new(640, 480)).unwrap();

        assert!(capture.release());
        assert!(!capture.release());
        assert!(capture.is_released());
        assert!(capture.binding().is_none());
        assert_eq!(service.stop_count(), 1);
        assert!(service.live_displays().is_empty());
    }

    #[test]
    fn bind_after_release_fails() {
        let mut service = SimCaptureService::default();
        let mut capture = source(&mut service, &GrantLedger::new());
        capture.release();
        assert!(matches!(
            capture.bind(SurfaceId(1), SurfaceSize::new(640, 480)),
            Err(SessionError::CaptureReleased)
        ));
    }

    #[test]
    fn drop_releases_projection() {
        let mut service = SimCaptureService::default();
        {
            let _capture = source(&mut service, &GrantLedger::new());
        }
        assert_eq!(service.stop_count(), 1);
    }
}
