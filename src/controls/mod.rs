//! Control state machines
//!
//! A [`Control`] is a tagged union of the control kinds. Shared behavior is
//! expressed through capability traits ([`HasActions`], [`HasFeedbacks`],
//! [`HasSteps`], [`HasActionSets`], [`HasOptions`], [`HasPushedState`]) that
//! callers query with the `as_*` accessors instead of matching on the kind.

use serde_json::{Map, Value};

use crate::error::ControlResult;
use crate::fragments::{FragmentActions, FragmentFeedbacks};
use crate::host::{ModuleDispatch, RunActionExtras};
use crate::model::{
    ActionSetId, ButtonStyle, ControlDocument, ControlId, ControlType, DrawStyle, RuntimeSnapshot,
};
use crate::runner::ActionRunner;
use crate::scheduler::Scheduler;

mod button;
mod group;
mod hold;
mod page;
mod press;
mod stepped;
mod timed;
mod trigger;

pub use button::ButtonBase;
pub use group::ActionGroup;
pub use hold::{select_release_set, HoldTracker, Release};
pub use page::{PageButton, PageKind};
pub use press::PressButton;
pub use stepped::SteppedButton;
pub use timed::{TimedButton, TimedOptions};
pub use trigger::TriggerControl;

/// Engine state a control may touch while handling input
pub struct ControlContext<'a> {
    pub scheduler: &'a mut Scheduler,
    pub runner: &'a mut ActionRunner,
}

impl ControlContext<'_> {
    /// Run the enabled actions of one set
    pub fn run_set(
        &mut self,
        fragment: &FragmentActions,
        set_id: ActionSetId,
        surface_id: Option<&str>,
        relative_delay: bool,
    ) -> usize {
        let actions = fragment.runnable(set_id);
        if actions.is_empty() {
            return 0;
        }
        let extras = RunActionExtras::new(
            fragment.control_id().clone(),
            surface_id.map(str::to_string),
        );
        self.runner
            .run_multiple(self.scheduler, &actions, &extras, relative_delay)
    }
}

/// Controls that own action sets
pub trait HasActions {
    /// Fragment of a step (current step when `None`); flat controls ignore the step
    fn fragment(&self, step: Option<u32>) -> Option<&FragmentActions>;
    fn fragment_mut(&mut self, step: Option<u32>) -> Option<&mut FragmentActions>;
    fn fragments(&self) -> Vec<&FragmentActions>;
    fn fragments_mut(&mut self) -> Vec<&mut FragmentActions>;
    fn relative_delay(&self) -> bool;
    fn actions_running(&self) -> bool;
    /// Returns true if the flag changed
    fn set_actions_running(&mut self, running: bool) -> bool;
}

/// Controls whose numeric action sets can be added, removed and renamed
pub trait HasActionSets: HasActions {
    fn action_set_add(&mut self, step: Option<u32>) -> Option<ActionSetId>;
    fn action_set_remove(
        &mut self,
        step: Option<u32>,
        set_id: ActionSetId,
        modules: &ModuleDispatch,
    ) -> bool;
    fn action_set_rename(&mut self, step: Option<u32>, old_id: ActionSetId, new_id: ActionSetId)
        -> bool;
    fn action_set_run_while_held(&mut self, step: Option<u32>, set_id: ActionSetId, enabled: bool)
        -> bool;
}

/// Controls cycling through steps
pub trait HasSteps {
    fn step_ids(&self) -> Vec<u32>;
    fn current_step(&self) -> u32;
    fn step_add(&mut self) -> u32;
    fn step_remove(&mut self, step: u32, modules: &ModuleDispatch) -> bool;
    fn step_duplicate(&mut self, step: u32, modules: &ModuleDispatch) -> Option<u32>;
    fn step_swap(&mut self, a: u32, b: u32) -> bool;
    fn step_select(&mut self, step: u32) -> bool;
    fn step_rename(&mut self, step: u32, name: Option<String>) -> bool;
}

/// Controls with feedbacks (style feedbacks, or conditions for triggers)
pub trait HasFeedbacks {
    fn feedbacks(&self) -> &FragmentFeedbacks;
    fn feedbacks_mut(&mut self) -> &mut FragmentFeedbacks;

    fn base_style(&self) -> Option<&ButtonStyle> {
        None
    }

    fn style_set_fields(&mut self, _diff: &Map<String, Value>) -> bool {
        false
    }
}

pub trait HasOptions {
    fn options_value(&self) -> Value;
    /// Update one option; unknown keys and mistyped values are rejected
    fn options_set_field(&mut self, key: &str, value: Value) -> bool;
}

/// Controls with a pushed state driven by surface input
pub trait HasPushedState {
    fn pushed(&self) -> bool;

    fn press(
        &mut self,
        pressed: bool,
        surface_id: Option<&str>,
        force: bool,
        ctx: &mut ControlContext<'_>,
    );

    /// Returns true if rotation is handled by this control
    fn rotate(
        &mut self,
        _clockwise: bool,
        _surface_id: Option<&str>,
        _ctx: &mut ControlContext<'_>,
    ) -> bool {
        false
    }

    /// A hold-while-held threshold elapsed for a surface still pressing
    fn hold_elapsed(&mut self, _surface_id: &str, _set_id: ActionSetId, _ctx: &mut ControlContext<'_>) {}

    /// Drop pushed state and pending holds without running release actions
    ///
    /// Returns true if the control was pushed.
    fn force_release(&mut self, scheduler: &mut Scheduler) -> bool;
}

/// One addressable automation unit
#[derive(Debug)]
pub enum Control {
    Press(PressButton),
    Step(SteppedButton),
    Normal(SteppedButton),
    Timed(TimedButton),
    PageUp(PageButton),
    PageDown(PageButton),
    PageNumber(PageButton),
    Trigger(TriggerControl),
}

impl Control {
    /// Fresh control of a kind with its default sets
    pub fn new(control_id: ControlId, kind: ControlType) -> Self {
        match kind {
            ControlType::Press => Control::Press(PressButton::new(control_id)),
            ControlType::Button => Control::Normal(SteppedButton::new(control_id, kind)),
            ControlType::Step => Control::Step(SteppedButton::new(control_id, kind)),
            ControlType::Timed => Control::Timed(TimedButton::new(control_id)),
            ControlType::PageUp => Control::PageUp(PageButton::new(control_id, PageKind::Up)),
            ControlType::PageDown => Control::PageDown(PageButton::new(control_id, PageKind::Down)),
            ControlType::PageNum => {
                Control::PageNumber(PageButton::new(control_id, PageKind::Number))
            }
            ControlType::Trigger => Control::Trigger(TriggerControl::new(control_id)),
        }
    }

    /// Rebuild a control from its persisted document
    pub fn from_document(control_id: ControlId, doc: ControlDocument) -> ControlResult<Self> {
        let control = match doc.kind {
            ControlType::Press => Control::Press(PressButton::from_document(control_id, doc)?),
            ControlType::Button => Control::Normal(SteppedButton::from_document(control_id, doc)?),
            ControlType::Step => Control::Step(SteppedButton::from_document(control_id, doc)?),
            ControlType::Timed => Control::Timed(TimedButton::from_document(control_id, doc)?),
            ControlType::PageUp => Control::PageUp(PageButton::new(control_id, PageKind::Up)),
            ControlType::PageDown => Control::PageDown(PageButton::new(control_id, PageKind::Down)),
            ControlType::PageNum => {
                Control::PageNumber(PageButton::new(control_id, PageKind::Number))
            }
            ControlType::Trigger => Control::Trigger(TriggerControl::from_document(control_id, doc)?),
        };
        Ok(control)
    }

    /// Parse a raw JSON document
    pub fn from_value(control_id: ControlId, value: Value) -> ControlResult<Self> {
        let doc: ControlDocument = serde_json::from_value(value)?;
        Self::from_document(control_id, doc)
    }

    pub fn control_id(&self) -> &ControlId {
        match self {
            Control::Press(c) => c.control_id(),
            Control::Step(c) | Control::Normal(c) => c.control_id(),
            Control::Timed(c) => c.control_id(),
            Control::PageUp(c) | Control::PageDown(c) | Control::PageNumber(c) => c.control_id(),
            Control::Trigger(c) => c.control_id(),
        }
    }

    pub fn control_type(&self) -> ControlType {
        match self {
            Control::Press(_) => ControlType::Press,
            Control::Step(_) => ControlType::Step,
            Control::Normal(_) => ControlType::Button,
            Control::Timed(_) => ControlType::Timed,
            Control::PageUp(_) => ControlType::PageUp,
            Control::PageDown(_) => ControlType::PageDown,
            Control::PageNumber(_) => ControlType::PageNum,
            Control::Trigger(_) => ControlType::Trigger,
        }
    }

    pub fn to_document(&self) -> ControlDocument {
        match self {
            Control::Press(c) => c.to_document(),
            Control::Step(c) | Control::Normal(c) => c.to_document(),
            Control::Timed(c) => c.to_document(),
            Control::PageUp(_) | Control::PageDown(_) | Control::PageNumber(_) => {
                ControlDocument::empty(self.control_type())
            }
            Control::Trigger(c) => c.to_document(),
        }
    }

    pub fn runtime_snapshot(&self) -> RuntimeSnapshot {
        let mut snapshot = RuntimeSnapshot {
            pushed: self.as_pushed().map(|p| p.pushed()).unwrap_or(false),
            actions_running: self.as_actions().map(|a| a.actions_running()).unwrap_or(false),
            ..Default::default()
        };
        match self {
            Control::Step(c) | Control::Normal(c) => {
                snapshot.current_step_id = Some(c.current_step().to_string());
            }
            Control::Trigger(c) => snapshot.last_executed = c.last_executed(),
            _ => {}
        }
        snapshot
    }

    /// What the renderer should draw; triggers draw nothing
    pub fn draw_style(&self, modules: &ModuleDispatch) -> Option<DrawStyle> {
        match self {
            Control::Press(c) => Some(DrawStyle::Button(c.base().unparsed_style(modules, None))),
            Control::Step(c) | Control::Normal(c) => Some(DrawStyle::Button(c.unparsed_style(modules))),
            Control::Timed(c) => Some(DrawStyle::Button(c.base().unparsed_style(modules, None))),
            Control::PageUp(_) => Some(DrawStyle::PageUp),
            Control::PageDown(_) => Some(DrawStyle::PageDown),
            Control::PageNumber(_) => Some(DrawStyle::PageNumber),
            Control::Trigger(_) => None,
        }
    }

    /// Subscribe every action and feedback with its connection
    pub fn subscribe_all(&self, modules: &ModuleDispatch) {
        if let Some(actions) = self.as_actions() {
            for fragment in actions.fragments() {
                fragment.subscribe_all(modules);
            }
        }
        if let Some(feedbacks) = self.as_feedbacks() {
            feedbacks.feedbacks().subscribe_all(modules);
        }
    }

    /// Release every action and feedback subscription
    pub fn cleanup_all(&self, modules: &ModuleDispatch) {
        if let Some(actions) = self.as_actions() {
            for fragment in actions.fragments() {
                fragment.cleanup_all(modules);
            }
        }
        if let Some(feedbacks) = self.as_feedbacks() {
            feedbacks.feedbacks().cleanup_all(modules);
        }
    }

    pub fn as_actions(&self) -> Option<&dyn HasActions> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_actions_mut(&mut self) -> Option<&mut dyn HasActions> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_action_sets_mut(&mut self) -> Option<&mut dyn HasActionSets> {
        match self {
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_steps(&self) -> Option<&dyn HasSteps> {
        match self {
            Control::Step(c) | Control::Normal(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_steps_mut(&mut self) -> Option<&mut dyn HasSteps> {
        match self {
            Control::Step(c) | Control::Normal(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_feedbacks(&self) -> Option<&dyn HasFeedbacks> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_feedbacks_mut(&mut self) -> Option<&mut dyn HasFeedbacks> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_options(&self) -> Option<&dyn HasOptions> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_options_mut(&mut self) -> Option<&mut dyn HasOptions> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_pushed(&self) -> Option<&dyn HasPushedState> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_pushed_mut(&mut self) -> Option<&mut dyn HasPushedState> {
        match self {
            Control::Press(c) => Some(c),
            Control::Step(c) | Control::Normal(c) => Some(c),
            Control::Timed(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_page(&self) -> Option<&PageButton> {
        match self {
            Control::PageUp(c) | Control::PageDown(c) | Control::PageNumber(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_trigger(&self) -> Option<&TriggerControl> {
        match self {
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_trigger_mut(&mut self) -> Option<&mut TriggerControl> {
        match self {
            Control::Trigger(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use crate::host::testing::TestHarness;
    use crate::model::{ActionInstance, FeedbackInstance};
    use serde_json::json;

    #[test]
    fn test_capabilities_by_kind() {
        let id = ControlId::new("loc:1/0/0");
        let press = Control::new(id.clone(), ControlType::Press);
        assert!(press.as_actions().is_some());
        assert!(press.as_steps().is_none());
        assert!(press.as_pushed().is_some());

        let page = Control::new(id.clone(), ControlType::PageUp);
        assert!(page.as_actions().is_none());
        assert!(page.as_feedbacks().is_none());
        assert!(page.as_page().is_some());

        let harness = TestHarness::new();
        let trigger = Control::new(ControlId::for_trigger("t"), ControlType::Trigger);
        assert!(trigger.as_pushed().is_none());
        assert!(trigger.draw_style(&harness.services.modules).is_none());
        assert_eq!(page.draw_style(&harness.services.modules), Some(DrawStyle::PageUp));
    }

    #[test]
    fn test_document_round_trip_keeps_sets_feedbacks_and_options() {
        let id = ControlId::new("loc:1/2/3");
        let doc: ControlDocument = serde_json::from_value(json!({
            "type": "button",
            "style": { "text": "REC", "bgcolor": 16711680 },
            "options": { "relativeDelay": true, "rotaryActions": false, "stepAutoProgress": true },
            "feedbacks": [
                { "id": "f1", "instance_id": "obs", "type": "recording", "style": { "bgcolor": 255 } }
            ],
            "steps": {
                "0": {
                    "action_sets": {
                        "down": [ { "id": "a1", "instance": "obs", "action": "record", "delay": 0 } ],
                        "up": [],
                        "2000": [ { "id": "a2", "instance": "obs", "action": "stop", "delay": 100 } ]
                    },
                    "options": { "runWhileHeld": [2000] }
                },
                "1": { "action_sets": { "down": [], "up": [] }, "options": {} }
            }
        }))
        .unwrap();

        let control = Control::from_document(id.clone(), doc.clone()).unwrap();
        let rebuilt = Control::from_document(id, control.to_document()).unwrap();

        assert_eq!(rebuilt.to_document(), control.to_document());
        assert_eq!(control.to_document().steps, doc.steps);
        assert_eq!(control.to_document().feedbacks, doc.feedbacks);
        assert_eq!(
            control.to_document().options_as::<crate::model::ButtonOptions>().unwrap(),
            doc.options_as::<crate::model::ButtonOptions>().unwrap()
        );

        let first = rebuilt.as_actions().unwrap().fragment(Some(0)).unwrap();
        let expected: &ActionInstance = first.find("a2").unwrap();
        assert_eq!(expected.delay, 100);
        let fb: &FeedbackInstance = &rebuilt.as_feedbacks().unwrap().feedbacks().feedbacks()[0];
        assert_eq!(fb.style["bgcolor"], json!(255));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = Control::from_value(ControlId::new("loc:1/0/0"), json!({ "type": "fader" }));
        assert!(matches!(result, Err(ControlError::InvalidDocument(_))));
    }
}
