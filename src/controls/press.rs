//! Press button: `down` on press, `up` on release

use serde_json::{Map, Value};

use super::{ButtonBase, ControlContext, HasActions, HasFeedbacks, HasOptions, HasPushedState};
use crate::error::ControlResult;
use crate::fragments::{FragmentActions, FragmentFeedbacks};
use crate::model::{
    set_option_field, ActionSetId, ButtonOptions, ButtonStyle, ControlDocument, ControlId,
    ControlType,
};
use crate::scheduler::Scheduler;

#[derive(Debug)]
pub struct PressButton {
    base: ButtonBase,
    options: ButtonOptions,
    actions: FragmentActions,
}

impl PressButton {
    pub fn new(control_id: ControlId) -> Self {
        Self {
            actions: FragmentActions::with_sets(
                control_id.clone(),
                &[ActionSetId::Down, ActionSetId::Up],
            ),
            base: ButtonBase::new(control_id),
            options: ButtonOptions::default(),
        }
    }

    pub fn from_document(control_id: ControlId, doc: ControlDocument) -> ControlResult<Self> {
        let options = doc.options_as::<ButtonOptions>()?;
        let base = ButtonBase::from_document(control_id.clone(), &doc);
        let actions = match doc.action_sets {
            Some(sets) => FragmentActions::new(control_id, sets),
            None => FragmentActions::with_sets(control_id, &[ActionSetId::Down, ActionSetId::Up]),
        };
        Ok(Self {
            base,
            options,
            actions,
        })
    }

    pub fn control_id(&self) -> &ControlId {
        &self.base.control_id
    }

    pub fn base(&self) -> &ButtonBase {
        &self.base
    }

    pub fn to_document(&self) -> ControlDocument {
        let mut doc = ControlDocument::empty(ControlType::Press);
        self.base.document(&mut doc);
        doc.options = Some(self.options_value());
        doc.action_sets = Some(self.actions.sets().clone());
        doc
    }
}

impl HasActions for PressButton {
    fn fragment(&self, _step: Option<u32>) -> Option<&FragmentActions> {
        Some(&self.actions)
    }

    fn fragment_mut(&mut self, _step: Option<u32>) -> Option<&mut FragmentActions> {
        Some(&mut self.actions)
    }

    fn fragments(&self) -> Vec<&FragmentActions> {
        vec![&self.actions]
    }

    fn fragments_mut(&mut self) -> Vec<&mut FragmentActions> {
        vec![&mut self.actions]
    }

    fn relative_delay(&self) -> bool {
        self.options.relative_delay
    }

    fn actions_running(&self) -> bool {
        self.base.actions_running
    }

    fn set_actions_running(&mut self, running: bool) -> bool {
        self.base.set_actions_running(running)
    }
}

impl HasFeedbacks for PressButton {
    fn feedbacks(&self) -> &FragmentFeedbacks {
        &self.base.feedbacks
    }

    fn feedbacks_mut(&mut self) -> &mut FragmentFeedbacks {
        &mut self.base.feedbacks
    }

    fn base_style(&self) -> Option<&ButtonStyle> {
        Some(&self.base.style)
    }

    fn style_set_fields(&mut self, diff: &Map<String, Value>) -> bool {
        self.base.style_set_fields(diff)
    }
}

impl HasOptions for PressButton {
    fn options_value(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }

    fn options_set_field(&mut self, key: &str, value: Value) -> bool {
        set_option_field(&mut self.options, key, value)
    }
}

impl HasPushedState for PressButton {
    fn pushed(&self) -> bool {
        self.base.pushed
    }

    fn press(
        &mut self,
        pressed: bool,
        surface_id: Option<&str>,
        force: bool,
        ctx: &mut ControlContext<'_>,
    ) {
        if self.base.pushed == pressed && !force {
            return;
        }
        self.base.pushed = pressed;

        let set_id = if pressed {
            ActionSetId::Down
        } else {
            ActionSetId::Up
        };
        ctx.run_set(&self.actions, set_id, surface_id, self.options.relative_delay);
    }

    fn force_release(&mut self, _scheduler: &mut Scheduler) -> bool {
        std::mem::replace(&mut self.base.pushed, false)
    }
}
