//! Stepped button (`button` and `step` types)
//!
//! Each step owns its own action sets. Press runs `down` of the current step;
//! release runs the long-press set matching the hold duration, or `up`, of the
//! step that was current when the press started. With auto-progress, a
//! release advances to the next step in key order, wrapping around.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::trace;

use super::{
    ActionGroup, ButtonBase, ControlContext, HasActionSets, HasActions, HasFeedbacks, HasOptions,
    HasPushedState, HasSteps, HoldTracker,
};
use crate::error::ControlResult;
use crate::fragments::{FragmentActions, FragmentFeedbacks};
use crate::host::ModuleDispatch;
use crate::model::{
    set_option_field, ActionSetId, ButtonOptions, ButtonStyle, ControlDocument, ControlId,
    ControlType, StepModel, UnparsedStyle,
};
use crate::scheduler::Scheduler;

#[derive(Debug)]
pub struct SteppedButton {
    kind: ControlType,
    base: ButtonBase,
    options: ButtonOptions,
    steps: BTreeMap<u32, ActionGroup>,
    current_step: u32,
    hold: HoldTracker,
}

impl SteppedButton {
    pub fn new(control_id: ControlId, kind: ControlType) -> Self {
        let mut steps = BTreeMap::new();
        steps.insert(0, ActionGroup::from_step(control_id.clone(), StepModel::default()));
        Self {
            kind,
            base: ButtonBase::new(control_id),
            options: ButtonOptions::default(),
            steps,
            current_step: 0,
            hold: HoldTracker::default(),
        }
    }

    pub fn from_document(control_id: ControlId, doc: ControlDocument) -> ControlResult<Self> {
        let options = doc.options_as::<ButtonOptions>()?;
        let base = ButtonBase::from_document(control_id.clone(), &doc);

        let mut steps: BTreeMap<u32, ActionGroup> = doc
            .steps
            .unwrap_or_default()
            .into_iter()
            .map(|(id, step)| (id, ActionGroup::from_step(control_id.clone(), step)))
            .collect();
        if steps.is_empty() {
            steps.insert(0, ActionGroup::from_step(control_id, StepModel::default()));
        }
        let current_step = steps.keys().next().copied().unwrap_or(0);

        Ok(Self {
            kind: doc.kind,
            base,
            options,
            steps,
            current_step,
            hold: HoldTracker::default(),
        })
    }

    pub fn control_id(&self) -> &ControlId {
        &self.base.control_id
    }

    pub fn to_document(&self) -> ControlDocument {
        let mut doc = ControlDocument::empty(self.kind);
        self.base.document(&mut doc);
        doc.options = Some(self.options_value());
        doc.steps = Some(
            self.steps
                .iter()
                .map(|(id, group)| (*id, group.to_step_model()))
                .collect(),
        );
        doc
    }

    pub fn unparsed_style(&self, modules: &ModuleDispatch) -> UnparsedStyle {
        let step_cycle = (self.steps.len() > 1)
            .then(|| self.steps.keys().position(|k| *k == self.current_step))
            .flatten()
            .map(|index| index + 1);
        self.base.unparsed_style(modules, step_cycle)
    }

    fn resolve_step(&self, step: Option<u32>) -> u32 {
        step.unwrap_or(self.current_step)
    }

    fn group_mut(&mut self, step: Option<u32>) -> Option<&mut ActionGroup> {
        let key = self.resolve_step(step);
        self.steps.get_mut(&key)
    }

    /// Next step in key order, wrapping to the first
    fn step_after(&self, step: u32) -> u32 {
        step.checked_add(1)
            .and_then(|next| self.steps.range(next..).next())
            .or_else(|| self.steps.iter().next())
            .map(|(id, _)| *id)
            .unwrap_or(step)
    }
}

impl HasActions for SteppedButton {
    fn fragment(&self, step: Option<u32>) -> Option<&FragmentActions> {
        self.steps
            .get(&self.resolve_step(step))
            .map(|group| &group.actions)
    }

    fn fragment_mut(&mut self, step: Option<u32>) -> Option<&mut FragmentActions> {
        self.group_mut(step).map(|group| &mut group.actions)
    }

    fn fragments(&self) -> Vec<&FragmentActions> {
        self.steps.values().map(|group| &group.actions).collect()
    }

    fn fragments_mut(&mut self) -> Vec<&mut FragmentActions> {
        self.steps
            .values_mut()
            .map(|group| &mut group.actions)
            .collect()
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

impl HasActionSets for SteppedButton {
    fn action_set_add(&mut self, step: Option<u32>) -> Option<ActionSetId> {
        self.group_mut(step).map(ActionGroup::set_add)
    }

    fn action_set_remove(
        &mut self,
        step: Option<u32>,
        set_id: ActionSetId,
        modules: &ModuleDispatch,
    ) -> bool {
        self.group_mut(step)
            .map(|group| group.set_remove(set_id, modules))
            .unwrap_or(false)
    }

    fn action_set_rename(
        &mut self,
        step: Option<u32>,
        old_id: ActionSetId,
        new_id: ActionSetId,
    ) -> bool {
        self.group_mut(step)
            .map(|group| group.set_rename(old_id, new_id))
            .unwrap_or(false)
    }

    fn action_set_run_while_held(
        &mut self,
        step: Option<u32>,
        set_id: ActionSetId,
        enabled: bool,
    ) -> bool {
        self.group_mut(step)
            .map(|group| group.set_run_while_held(set_id, enabled))
            .unwrap_or(false)
    }
}

impl HasSteps for SteppedButton {
    fn step_ids(&self) -> Vec<u32> {
        self.steps.keys().copied().collect()
    }

    fn current_step(&self) -> u32 {
        self.current_step
    }

    fn step_add(&mut self) -> u32 {
        let id = match self.steps.keys().next_back() {
            None => 0,
            Some(last) => last
                .checked_add(1)
                .or_else(|| (0..u32::MAX).find(|id| !self.steps.contains_key(id)))
                .unwrap_or(*last),
        };
        self.steps.insert(
            id,
            ActionGroup::from_step(self.base.control_id.clone(), StepModel::default()),
        );
        id
    }

    fn step_remove(&mut self, step: u32, modules: &ModuleDispatch) -> bool {
        if self.steps.len() <= 1 {
            return false;
        }
        let Some(group) = self.steps.remove(&step) else {
            return false;
        };
        group.actions.cleanup_all(modules);

        if self.current_step == step {
            self.current_step = self
                .steps
                .range(step..)
                .next()
                .or_else(|| self.steps.iter().next())
                .map(|(id, _)| *id)
                .unwrap_or(0);
        }
        true
    }

    /// Insert a copy right after the original, shifting later steps up
    fn step_duplicate(&mut self, step: u32, modules: &ModuleDispatch) -> Option<u32> {
        // Shifting later steps up needs room above the last key
        let target = step.checked_add(1)?;
        if self.steps.keys().next_back().copied() == Some(u32::MAX) {
            return None;
        }
        let copy = self.steps.get(&step)?.clone_with_fresh_ids();

        let later: Vec<u32> = self.steps.range(target..).map(|(id, _)| *id).rev().collect();
        for id in later {
            if let Some(group) = self.steps.remove(&id) {
                self.steps.insert(id + 1, group);
            }
        }
        if self.current_step > step {
            self.current_step += 1;
        }

        copy.actions.subscribe_all(modules);
        self.steps.insert(target, copy);
        Some(target)
    }

    fn step_swap(&mut self, a: u32, b: u32) -> bool {
        if a == b || !self.steps.contains_key(&a) || !self.steps.contains_key(&b) {
            return false;
        }
        let (Some(first), Some(second)) = (self.steps.remove(&a), self.steps.remove(&b)) else {
            return false;
        };
        self.steps.insert(a, second);
        self.steps.insert(b, first);
        true
    }

    fn step_select(&mut self, step: u32) -> bool {
        if !self.steps.contains_key(&step) {
            return false;
        }
        self.current_step = step;
        true
    }

    fn step_rename(&mut self, step: u32, name: Option<String>) -> bool {
        match self.steps.get_mut(&step) {
            Some(group) => {
                group.name = name.filter(|n| !n.is_empty());
                true
            }
            None => false,
        }
    }
}

impl HasFeedbacks for SteppedButton {
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

impl HasOptions for SteppedButton {
    fn options_value(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }

    fn options_set_field(&mut self, key: &str, value: Value) -> bool {
        set_option_field(&mut self.options, key, value)
    }
}

impl HasPushedState for SteppedButton {
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
        let mut pressed_step = self.current_step;
        let mut duration_ms = 0;

        if let Some(surface) = surface_id {
            if pressed {
                if let Some(group) = self.steps.get(&self.current_step) {
                    self.hold.press(
                        &control_id,
                        surface,
                        Some(self.current_step),
                        &group.run_while_held,
                        ctx.scheduler,
                    );
                }
            } else if let Some(release) = self.hold.release(&control_id, surface, ctx.scheduler) {
                duration_ms = release.duration_ms;
                if let Some(step) = release.step.filter(|s| self.steps.contains_key(s)) {
                    pressed_step = step;
                }
            }
        }

        if self.base.pushed == pressed && !force {
            return;
        }
        self.base.pushed = pressed;

        if !pressed && self.options.step_auto_progress && self.current_step == pressed_step {
            let next = self.step_after(self.current_step);
            trace!("{} progressing to step {}", control_id, next);
            self.current_step = next;
        }

        let relative = self.options.relative_delay;
        let Some(group) = self.steps.get(&pressed_step) else {
            return;
        };
        if pressed {
            ctx.run_set(&group.actions, ActionSetId::Down, surface_id, relative);
        } else if let Some(set_id) = group.release_set(duration_ms) {
            trace!(
                "{} released after {}ms, running {} of step {}",
                control_id,
                duration_ms,
                set_id,
                pressed_step
            );
            ctx.run_set(&group.actions, set_id, surface_id, relative);
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
        let Some(group) = self.steps.get(&self.current_step) else {
            return false;
        };
        ctx.run_set(
            &group.actions,
            ActionSetId::rotate(clockwise),
            surface_id,
            self.options.relative_delay,
        );
        true
    }

    fn hold_elapsed(&mut self, surface_id: &str, set_id: ActionSetId, ctx: &mut ControlContext<'_>) {
        let Some(Some(step)) = self.hold.held_step(surface_id) else {
            return;
        };
        if let Some(group) = self.steps.get(&step) {
            ctx.run_set(
                &group.actions,
                set_id,
                Some(surface_id),
                self.options.relative_delay,
            );
        }
    }

    fn force_release(&mut self, scheduler: &mut Scheduler) -> bool {
        self.hold.clear(&self.base.control_id, scheduler);
        std::mem::replace(&mut self.base.pushed, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{action, TestHarness};

    fn button() -> SteppedButton {
        SteppedButton::new(ControlId::new("loc:1/0/0"), ControlType::Button)
    }

    #[test]
    fn test_step_add_remove_select() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut b = button();

        assert!(!b.step_remove(0, modules));
        assert_eq!(b.step_add(), 1);
        assert_eq!(b.step_add(), 2);
        assert!(b.step_select(2));
        assert!(!b.step_select(7));

        assert!(b.step_remove(2, modules));
        assert_eq!(b.current_step(), 0);
        assert_eq!(b.step_ids(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_duplicate_shifts_later_steps() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut b = button();
        b.step_add();
        b.fragment_mut(Some(0))
            .unwrap()
            .action_add(ActionSetId::Down, action("a"), modules);
        b.fragment_mut(Some(1))
            .unwrap()
            .action_add(ActionSetId::Down, action("b"), modules);
        b.step_select(1);

        assert_eq!(b.step_duplicate(0, modules), Some(1));
        assert_eq!(b.step_ids(), vec![0, 1, 2]);
        assert_eq!(b.current_step(), 2);
        assert!(b.fragment(Some(2)).unwrap().find("b").is_some());

        let copied = &b.fragment(Some(1)).unwrap().set(ActionSetId::Down).unwrap()[0];
        assert_eq!(copied.definition_id, "do");
        assert_ne!(copied.id, "a");
    }

    #[test]
    fn test_swap_and_rename() {
        let mut b = button();
        b.step_add();
        assert!(b.step_rename(1, Some("Live".into())));
        assert!(b.step_swap(0, 1));
        assert_eq!(b.to_document().steps.unwrap()[&0].options.name.as_deref(), Some("Live"));
        assert!(!b.step_swap(0, 0));
        assert!(!b.step_swap(0, 9));
    }

    #[test]
    fn test_step_cycle_in_style() {
        let harness = TestHarness::new();
        let mut b = button();
        assert_eq!(b.unparsed_style(&harness.services.modules).step_cycle, None);
        b.step_add();
        b.step_select(1);
        assert_eq!(b.unparsed_style(&harness.services.modules).step_cycle, Some(2));
    }
}
