//! Cast button behavior.
//!
//! The button asks for screen capture permission when nothing is being
//! cast yet, and opens the route controller otherwise. The widget itself
//! is the host's business; it only injects a [`RouteStrategy`].

use tracing::debug;

use crate::grant::SCREEN_CAPTURE_REQUEST;
use crate::platform::MediaRouter;

/// Capabilities the button needs from the host.
pub trait RouteStrategy {
    /// A remote route usable by our receiver application is selected.
    fn remote_route_selected(&self) -> bool;
    /// Start the platform permission flow; the result is delivered with
    /// `request_code` to `ControlHandle::permission_result`.
    fn request_capture_permission(&mut self, request_code: i32);
    fn show_route_controller(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonOutcome {
    /// Detached, or a route dialog is already up.
    Ignored,
    PermissionRequested,
    ControllerShown,
}

pub struct CastButton<S> {
    strategy: S,
    attached: bool,
    dialog_showing: bool,
}

impl<S: RouteStrategy> CastButton<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            attached: true,
            dialog_showing: false,
        }
    }

    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    /// Track whether a chooser or controller dialog is currently shown.
    pub fn set_dialog_showing(&mut self, showing: bool) {
        self.dialog_showing = showing;
    }

    pub fn click(&mut self) -> ButtonOutcome {
        if !self.attached || self.dialog_showing {
            debug!(
                attached = self.attached,
                dialog = self.dialog_showing,
                "Cast button click ignored"
            );
            return ButtonOutcome::Ignored;
        }
        if self.strategy.remote_route_selected() {
            self.strategy.show_route_controller();
            ButtonOutcome::ControllerShown
        } else {
            self.strategy.request_capture_permission(SCREEN_CAPTURE_REQUEST);
            ButtonOutcome::PermissionRequested
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }
}

/// Whether `router` currently has a remote route for `app_id` selected.
pub fn remote_route_selected(router: &dyn MediaRouter, app_id: &str) -> bool {
    let route = router.selected_route();
    !route.is_default && route.matches_app(app_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use castscreen_common::RemoteEndpoint;

    use crate::sim::SimRouter;

    #[derive(Default)]
    struct Recorder {
        remote: bool,
        permission_requests: Vec<i32>,
        controllers: usize,
    }

    impl RouteStrategy for Recorder {
        fn remote_route_selected(&self) -> bool {
            self.remote
        }

        fn request_capture_permission(&mut self, request_code: i32) {
            self.permission_requests.push(request_code);
        }

        fn show_route_controller(&mut self) {
            self.controllers += 1;
        }
    }

    #[test]
    fn click_without_route_requests_permission() {
        let mut button = CastButton::new(Recorder::default());
        assert_eq!(button.click(), ButtonOutcome::PermissionRequested);
        assert_eq!(button.strategy().permission_requests, vec![SCREEN_CAPTURE_REQUEST]);
    }

    #[test]
    fn click_with_route_shows_controller() {
        let mut button = CastButton::new(Recorder::default());
        button.strategy_mut().remote = true;
        assert_eq!(button.click(), ButtonOutcome::ControllerShown);
        assert_eq!(button.strategy().controllers, 1);
        assert!(button.strategy().permission_requests.is_empty());
    }

    #[test]
    fn detached_or_dialog_up_is_ignored() {
        let mut button = CastButton::new(Recorder::default());
        button.set_attached(false);
        assert_eq!(button.click(), ButtonOutcome::Ignored);

        button.set_attached(true);
        button.set_dialog_showing(true);
        assert_eq!(button.click(), ButtonOutcome::Ignored);
        assert!(button.strategy().permission_requests.is_empty());
    }

    #[test]
    fn router_selection_check() {
        let router = SimRouter::new("CC1AD845");
        assert!(!remote_route_selected(&router, "CC1AD845"));

        router.select(&RemoteEndpoint::new("route-1", "Den"));
        assert!(remote_route_selected(&router, "CC1AD845"));
        assert!(!remote_route_selected(&router, "OTHERAPP"));
    }
}
