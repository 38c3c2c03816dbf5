//! State shared by every surface button with actions

use serde_json::{Map, Value};

use crate::fragments::FragmentFeedbacks;
use crate::host::ModuleDispatch;
use crate::model::{ButtonStyle, ControlDocument, ControlId, UnparsedStyle};

#[derive(Debug, Clone)]
pub struct ButtonBase {
    pub control_id: ControlId,
    pub style: ButtonStyle,
    pub feedbacks: FragmentFeedbacks,
    pub pushed: bool,
    pub actions_running: bool,
}

impl ButtonBase {
    pub fn new(control_id: ControlId) -> Self {
        Self {
            feedbacks: FragmentFeedbacks::new(control_id.clone(), Vec::new(), false),
            control_id,
            style: ButtonStyle::default(),
            pushed: false,
            actions_running: false,
        }
    }

    pub fn from_document(control_id: ControlId, doc: &ControlDocument) -> Self {
        Self {
            feedbacks: FragmentFeedbacks::new(
                control_id.clone(),
                doc.feedbacks.clone().unwrap_or_default(),
                false,
            ),
            control_id,
            style: doc.style.clone().unwrap_or_default(),
            pushed: false,
            actions_running: false,
        }
    }

    pub fn set_actions_running(&mut self, running: bool) -> bool {
        let changed = self.actions_running != running;
        self.actions_running = running;
        changed
    }

    pub fn style_set_fields(&mut self, diff: &Map<String, Value>) -> bool {
        self.style.apply_fields(diff)
    }

    /// Base style with feedbacks composed on top
    pub fn unparsed_style(&self, modules: &ModuleDispatch, step_cycle: Option<usize>) -> UnparsedStyle {
        let (style, image_buffers) = self.feedbacks.compose_style(self.style.to_map(), modules);
        UnparsedStyle {
            style,
            image_buffers,
            pushed: self.pushed,
            actions_running: self.actions_running,
            step_cycle,
        }
    }

    /// Document sections every button persists
    pub fn document(&self, doc: &mut ControlDocument) {
        doc.style = Some(self.style.clone());
        doc.feedbacks = Some(self.feedbacks.feedbacks().to_vec());
    }
}
