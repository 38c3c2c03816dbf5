//! Page navigation buttons
//!
//! These own no actions or feedbacks. A press asks the surface navigator to
//! change the page of the surface the press came from; releases and presses
//! without a surface are ignored.

use tracing::debug;

use crate::host::SurfaceNavigator;
use crate::model::ControlId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Up,
    Down,
    /// Resets the surface to its home page
    Number,
}

#[derive(Debug, Clone)]
pub struct PageButton {
    control_id: ControlId,
    kind: PageKind,
}

impl PageButton {
    pub fn new(control_id: ControlId, kind: PageKind) -> Self {
        Self { control_id, kind }
    }

    pub fn control_id(&self) -> &ControlId {
        &self.control_id
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    /// Returns true if a navigation request was issued
    pub fn press(&self, pressed: bool, surface_id: Option<&str>, navigator: &dyn SurfaceNavigator) -> bool {
        let Some(surface) = surface_id.filter(|_| pressed) else {
            return false;
        };
        debug!("{} → {:?} on surface {}", self.control_id, self.kind, surface);
        match self.kind {
            PageKind::Up => navigator.device_page_up(surface),
            PageKind::Down => navigator.device_page_down(surface),
            PageKind::Number => navigator.device_page_set(surface, 1),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{RecordingSurfaces, SurfaceCall};

    #[test]
    fn test_only_press_with_surface_navigates() {
        let surfaces = RecordingSurfaces::default();
        let up = PageButton::new(ControlId::new("loc:1/0/0"), PageKind::Up);

        assert!(!up.press(true, None, &surfaces));
        assert!(!up.press(false, Some("deck"), &surfaces));
        assert!(up.press(true, Some("deck"), &surfaces));

        assert_eq!(surfaces.calls(), vec![SurfaceCall::PageUp("deck".into())]);
    }

    #[test]
    fn test_page_number_goes_home() {
        let surfaces = RecordingSurfaces::default();
        let home = PageButton::new(ControlId::new("loc:3/0/0"), PageKind::Number);
        home.press(true, Some("deck"), &surfaces);
        assert_eq!(surfaces.calls(), vec![SurfaceCall::PageSet("deck".into(), 1)]);
    }
}
