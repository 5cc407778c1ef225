//! Presentation on the remote display.

use castscreen_common::SurfaceSize;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::events::EventSink;
use crate::platform::{DisplayDescriptor, Presentation, PresentationFactory, SurfaceId};

/// A surface with a drawable size, ready to be bound to the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadySurface {
    pub surface: SurfaceId,
    pub size: SurfaceSize,
}

/// Surface container for the resolved remote display.
pub struct DisplaySurfaceSink {
    display: DisplayDescriptor,
    presentation: Option<Box<dyn Presentation>>,
    surface: Option<(SurfaceId, SurfaceSize)>,
}

impl DisplaySurfaceSink {
    /// Create and show a presentation on `descriptor`.
    pub fn new(
        descriptor: DisplayDescriptor,
        factory: &mut dyn PresentationFactory,
        events: EventSink,
    ) -> Result<Self, SessionError> {
        let mut presentation = factory
            .create(&descriptor, events)
            .map_err(SessionError::Presentation)?;
        if let Err(e) = presentation.show() {
            let _ = presentation.dismiss();
            return Err(SessionError::Presentation(e));
        }
        info!(display = %descriptor.name, id = descriptor.display_id, "Presentation shown");
        Ok(Self {
            display: descriptor,
            presentation: Some(presentation),
            surface: None,
        })
    }

    /// Record a surface size change. Yields a [`ReadySurface`] only once the
    /// surface has a drawable size.
    pub fn surface_changed(&mut self, surface: SurfaceId, size: SurfaceSize) -> Option<ReadySurface> {
        if self.presentation.is_none() {
            debug!(surface = %surface, "Surface change after dismiss ignored");
            return None;
        }
        self.surface = Some((surface, size));
        if !size.is_drawable() {
            debug!(surface = %surface, size = %size, "Surface not drawable yet");
            return None;
        }
        Some(ReadySurface { surface, size })
    }

    /// Forget `surface`. Returns `true` if it was the current one.
    pub fn surface_destroyed(&mut self, surface: SurfaceId) -> bool {
        match self.surface {
            Some((current, _)) if current == surface => {
                self.surface = None;
                debug!(surface = %surface, "Surface destroyed");
                true
            }
            _ => false,
        }
    }

    pub fn dismiss(&mut self) {
        let Some(mut presentation) = self.presentation.take() else {
            return;
        };
        self.surface = None;
        match presentation.dismiss() {
            Ok(()) => info!(display = %self.display.name, "Presentation dismissed"),
            Err(e) => warn!(display = %self.display.name, error = %e, "Presentation dismiss failed"),
        }
    }

    pub fn is_showing(&self) -> bool {
        self.presentation.is_some()
    }

    pub fn display(&self) -> &DisplayDescriptor {
        &self.display
    }

    pub fn surface(&self) -> Option<(SurfaceId, SurfaceSize)> {
        self.surface
    }
}
