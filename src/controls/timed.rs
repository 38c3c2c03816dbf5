//! Timed button: flat action sets selected by how long the button was held

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::trace;

use super::{
    ActionGroup, ButtonBase, ControlContext, HasActionSets, HasActions, HasFeedbacks, HasOptions,
    HasPushedState, HoldTracker,
};
use crate::error::ControlResult;
use crate::fragments::{FragmentActions, FragmentFeedbacks};
use crate::host::ModuleDispatch;
use crate::model::{
    set_option_field, ActionSetId, ActionSets, ButtonOptions, ButtonStyle, ControlDocument,
    ControlId, ControlType,
};
use crate::scheduler::Scheduler;

/// Persisted options of a timed button
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedOptions {
    #[serde(flatten)]
    pub button: ButtonOptions,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub run_while_held: BTreeSet<u64>,
}

fn default_sets() -> ActionSets {
    [
        ActionSetId::Down,
        ActionSetId::DEFAULT,
        ActionSetId::RotateLeft,
        ActionSetId::RotateRight,
    ]
    .into_iter()
    .map(|id| (id, Vec::new()))
    .collect()
}

#[derive(Debug)]
pub struct TimedButton {
    base: ButtonBase,
    options: ButtonOptions,
    group: ActionGroup,
    hold: HoldTracker,
}

impl TimedButton {
    pub fn new(control_id: ControlId) -> Self {
        Self {
            group: ActionGroup::flat(control_id.clone(), default_sets(), BTreeSet::new()),
            base: ButtonBase::new(control_id),
            options: ButtonOptions::default(),
            hold: HoldTracker::default(),
        }
    }

    pub fn from_document(control_id: ControlId, doc: ControlDocument) -> ControlResult<Self> {
        let options = doc.options_as::<TimedOptions>()?;
        let base = ButtonBase::from_document(control_id.clone(), &doc);
        let mut sets = doc.action_sets.unwrap_or_else(default_sets);
        sets.entry(ActionSetId::DEFAULT).or_default();

        Ok(Self {
            base,
            group: ActionGroup::flat(control_id, sets, options.run_while_held),
            options: options.button,
            hold: HoldTracker::default(),
        })
    }

    pub fn control_id(&self) -> &ControlId {
        &self.base.control_id
    }

    pub fn base(&self) -> &ButtonBase {
        &self.base
    }

    pub fn to_document(&self) -> ControlDocument {
        let mut doc = ControlDocument::empty(ControlType::Timed);
        self.base.document(&mut doc);
        doc.options = Some(self.options_value());
        doc.action_sets = Some(self.group.actions.sets().clone());
        doc
    }
}

impl HasActions for TimedButton {
    fn fragment(&self, _step: Option<u32>) -> Option<&FragmentActions> {
        Some(&self.group.actions)
    }

    fn fragment_mut(&mut self, _step: Option<u32>) -> Option<&mut FragmentActions> {
        Some(&mut self.group.actions)
    }

    fn fragments(&self) -> Vec<&FragmentActions> {
        vec![&self.group.actions]
    }

    fn fragments_mut(&mut self) -> Vec<&mut FragmentActions> {
        vec![&mut self.group.actions]
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

impl HasActionSets for TimedButton {
    fn action_set_add(&mut self, _step: Option<u32>) -> Option<ActionSetId> {
        Some(self.group.set_add())
    }

    fn action_set_remove(
        &mut self,
        _step: Option<u32>,
        set_id: ActionSetId,
        modules: &ModuleDispatch,
    ) -> bool {
        self.group.set_remove(set_id, modules)
    }

    fn action_set_rename(
        &mut self,
        _step: Option<u32>,
        old_id: ActionSetId,
        new_id: ActionSetId,
    ) -> bool {
        self.group.set_rename(old_id, new_id)
    }

    fn action_set_run_while_held(
        &mut self,
        _step: Option<u32>,
        set_id: ActionSetId,
        enabled: bool,
    ) -> bool {
        self.group.set_run_while_held(set_id, enabled)
    }
}

impl HasFeedbacks for TimedButton {
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

impl HasOptions for TimedButton {
    fn options_value(&self) -> Value {
        let options = TimedOptions {
            button: self.options.clone(),
            run_while_held: self.group.run_while_held.clone(),
        };
        serde_json::to_value(options).unwrap_or(Value::Null)
    }

    fn options_set_field(&mut self, key: &str, value: Value) -> bool {
        set_option_field(&mut self.options, key, value)
    }
}

impl HasPushedState for TimedButton {
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
        let control_id = self.base.control_id.clone();
        let mut duration_ms = 0;
        if let Some(surface) = surface_id {
            if pressed {
                self.hold
                    .press(&control_id, surface, None, &self.group.run_while_held, ctx.scheduler);
            } else if let Some(release) = self.hold.release(&control_id, surface, ctx.scheduler) {
                duration_ms = release.duration_ms;
            }
        }

        if self.base.pushed == pressed && !force {
            return;
        }
        self.base.pushed = pressed;

        let relative = self.options.relative_delay;
        if pressed {
            ctx.run_set(&self.group.actions, ActionSetId::Down, surface_id, relative);
        } else {
            match self.group.release_set(duration_ms) {
                Some(set_id) => {
                    trace!("{} released after {}ms, running {}", control_id, duration_ms, set_id);
                    ctx.run_set(&self.group.actions, set_id, surface_id, relative);
                }
                None => trace!("{} released after {}ms, nothing to run", control_id, duration_ms),
            }
        }
    }

    fn rotate(
        &mut self,
        clockwise: bool,
        surface_id: Option<&str>,
        ctx: &mut ControlContext<'_>,
    ) -> bool {
        if !self.options.rotary_actions {
            return false;
        }
        ctx.run_set(
            &self.group.actions,
            ActionSetId::rotate(clockwise),
            surface_id,
            self.options.relative_delay,
        );
        true
    }

    fn hold_elapsed(&mut self, surface_id: &str, set_id: ActionSetId, ctx: &mut ControlContext<'_>) {
        if self.hold.held_step(surface_id).is_none() {
            return;
        }
        ctx.run_set(
            &self.group.actions,
            set_id,
            Some(surface_id),
            self.options.relative_delay,
        );
    }

    fn force_release(&mut self, scheduler: &mut Scheduler) -> bool {
        self.hold.clear(&self.base.control_id, scheduler);
        std::mem::replace(&mut self.base.pushed, false)
    }
}
