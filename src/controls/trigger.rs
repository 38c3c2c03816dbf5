//! Trigger: a non-surface control fired by time or system events

use serde_json::Value;
use tracing::{debug, trace};

use super::{ControlContext, HasActions, HasFeedbacks, HasOptions};
use crate::error::ControlResult;
use crate::fragments::{FragmentActions, FragmentFeedbacks};
use crate::model::{
    set_option_field, ActionSetId, ControlDocument, ControlId, ControlType, TriggerEvent,
    TriggerEventType, TriggerOptions,
};

#[derive(Debug)]
pub struct TriggerControl {
    control_id: ControlId,
    options: TriggerOptions,
    actions: FragmentActions,
    /// Boolean feedbacks that must all hold for an event to run the actions
    conditions: FragmentFeedbacks,
    events: Vec<TriggerEvent>,
    last_executed: Option<i64>,
    actions_running: bool,
}

impl TriggerControl {
    pub fn new(control_id: ControlId) -> Self {
        Self {
            actions: FragmentActions::with_sets(control_id.clone(), &[ActionSetId::DEFAULT]),
            conditions: FragmentFeedbacks::new(control_id.clone(), Vec::new(), true),
            control_id,
            options: TriggerOptions::default(),
            events: Vec::new(),
            last_executed: None,
            actions_running: false,
        }
    }

    pub fn from_document(control_id: ControlId, doc: ControlDocument) -> ControlResult<Self> {
        let options = doc.options_as::<TriggerOptions>()?;
        let mut sets = doc.action_sets.unwrap_or_default();
        sets.entry(ActionSetId::DEFAULT).or_default();

        Ok(Self {
            actions: FragmentActions::new(control_id.clone(), sets),
            conditions: FragmentFeedbacks::new(
                control_id.clone(),
                doc.feedbacks.unwrap_or_default(),
                true,
            ),
            control_id,
            options,
            events: doc.events.unwrap_or_default(),
            last_executed: None,
            actions_running: false,
        })
    }

    pub fn control_id(&self) -> &ControlId {
        &self.control_id
    }

    pub fn to_document(&self) -> ControlDocument {
        let mut doc = ControlDocument::empty(ControlType::Trigger);
        doc.options = Some(self.options_value());
        doc.action_sets = Some(self.actions.sets().clone());
        doc.feedbacks = Some(self.conditions.feedbacks().to_vec());
        doc.events = Some(self.events.clone());
        doc
    }

    pub fn enabled(&self) -> bool {
        self.options.enabled
    }

    /// Returns true if the flag changed
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.options.enabled != enabled;
        self.options.enabled = enabled;
        changed
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn sort_order(&self) -> i64 {
        self.options.sort_order
    }

    /// Milliseconds since the Unix epoch of the last run
    pub fn last_executed(&self) -> Option<i64> {
        self.last_executed
    }

    /// Run the actions if conditions hold (or are ignored)
    ///
    /// Actions carry the trigger id as their surface id so that presses they
    /// cause are never reported back as control-press events.
    pub fn execute(&mut self, ctx: &mut ControlContext<'_>, now_ms: i64, ignore_conditions: bool) -> bool {
        if !ignore_conditions {
            if !self.options.enabled {
                return false;
            }
            if !self.conditions.check_conditions() {
                debug!("Trigger {} conditions not met", self.control_id);
                return false;
            }
        }
        self.last_executed = Some(now_ms);
        let ran = ctx.run_set(
            &self.actions,
            ActionSetId::DEFAULT,
            Some(self.control_id.as_str()),
            self.options.relative_delay,
        );
        trace!("Trigger {} ran {} actions", self.control_id, ran);
        true
    }

    pub fn events(&self) -> &[TriggerEvent] {
        &self.events
    }

    pub fn event(&self, event_id: &str) -> Option<&TriggerEvent> {
        self.events.iter().find(|e| e.id == event_id)
    }

    fn event_mut(&mut self, event_id: &str) -> Option<&mut TriggerEvent> {
        self.events.iter_mut().find(|e| e.id == event_id)
    }

    /// Add an event with the default options of its type, returning its id
    pub fn event_add(&mut self, kind: TriggerEventType) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.events.push(TriggerEvent::new(id.clone(), kind));
        id
    }

    pub fn event_remove(&mut self, event_id: &str) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.id != event_id);
        self.events.len() != before
    }

    /// Copy inserted right after the original
    pub fn event_duplicate(&mut self, event_id: &str) -> Option<String> {
        let index = self.events.iter().position(|e| e.id == event_id)?;
        let mut copy = self.events[index].clone();
        copy.id = uuid::Uuid::new_v4().to_string();
        let id = copy.id.clone();
        self.events.insert(index + 1, copy);
        Some(id)
    }

    pub fn event_enabled(&mut self, event_id: &str, enabled: bool) -> bool {
        match self.event_mut(event_id) {
            Some(event) => {
                event.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn event_set_option(&mut self, event_id: &str, key: &str, value: Value) -> bool {
        match self.event_mut(event_id) {
            Some(event) => {
                event.options.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn event_reorder(&mut self, event_id: &str, new_index: usize) -> bool {
        let Some(index) = self.events.iter().position(|e| e.id == event_id) else {
            return false;
        };
        let event = self.events.remove(index);
        let new_index = new_index.min(self.events.len());
        self.events.insert(new_index, event);
        true
    }
}

impl HasActions for TriggerControl {
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
        self.actions_running
    }

    fn set_actions_running(&mut self, running: bool) -> bool {
        let changed = self.actions_running != running;
        self.actions_running = running;
        changed
    }
}

impl HasFeedbacks for TriggerControl {
    fn feedbacks(&self) -> &FragmentFeedbacks {
        &self.conditions
    }

    fn feedbacks_mut(&mut self) -> &mut FragmentFeedbacks {
        &mut self.conditions
    }
}

impl HasOptions for TriggerControl {
    fn options_value(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }

    fn options_set_field(&mut self, key: &str, value: Value) -> bool {
        set_option_field(&mut self.options, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{action, feedback, flush_tasks, TestHarness};
    use crate::runner::ActionRunner;
    use crate::scheduler::Scheduler;
    use serde_json::json;
    use std::collections::HashMap;

    fn trigger(harness: &TestHarness) -> TriggerControl {
        let mut t = TriggerControl::new(ControlId::for_trigger("t1"));
        t.actions
            .action_add(ActionSetId::DEFAULT, action("a1"), &harness.services.modules);
        t
    }

    #[tokio::test]
    async fn test_execute_runs_default_set_with_trigger_as_surface() {
        let harness = TestHarness::new();
        let mut scheduler = Scheduler::new();
        let mut runner = ActionRunner::new(harness.services.modules.clone());
        let mut t = trigger(&harness);

        let mut ctx = ControlContext {
            scheduler: &mut scheduler,
            runner: &mut runner,
        };
        assert!(t.execute(&mut ctx, 1_700_000_000_000, false));
        flush_tasks().await;

        assert_eq!(harness.host.runs(), vec!["a1".to_string()]);
        assert_eq!(t.last_executed(), Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_conditions_gate_execution_unless_ignored() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut scheduler = Scheduler::new();
        let mut runner = ActionRunner::new(modules.clone());
        let mut t = trigger(&harness);
        assert!(t.conditions.feedback_add(feedback("c1"), modules));

        let mut ctx = ControlContext {
            scheduler: &mut scheduler,
            runner: &mut runner,
        };
        assert!(!t.execute(&mut ctx, 1, false));
        assert!(t.execute(&mut ctx, 2, true));

        let values = HashMap::from([("c1".to_string(), json!(true))]);
        t.conditions.update_values("test", &values);
        assert!(t.execute(&mut ctx, 3, false));

        t.set_enabled(false);
        assert!(!t.execute(&mut ctx, 4, false));
        assert_eq!(t.last_executed(), Some(3));
    }

    #[test]
    fn test_event_crud() {
        let mut t = TriggerControl::new(ControlId::for_trigger("t1"));
        let first = t.event_add(TriggerEventType::Interval);
        let second = t.event_add(TriggerEventType::Startup);
        let copy = t.event_duplicate(&first).unwrap();

        let ids: Vec<_> = t.events().iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![first.clone(), copy.clone(), second.clone()]);

        assert!(t.event_set_option(&copy, "seconds", json!(2)));
        assert!(t.event_enabled(&first, false));
        assert!(t.event_reorder(&second, 0));
        assert_eq!(t.events()[0].id, second);
        assert!(t.event_remove(&first));
        assert!(!t.event_remove(&first));
        assert_eq!(t.event(&copy).unwrap().options["seconds"], json!(2));
    }

    #[test]
    fn test_document_keeps_events_and_conditions() {
        let mut t = TriggerControl::new(ControlId::for_trigger("t1"));
        t.event_add(TriggerEventType::TimeOfDay);
        assert!(t.options_set_field("name", json!("Nightly")));
        assert!(!t.options_set_field("enabled", json!("yes")));

        let doc = t.to_document();
        let rebuilt = TriggerControl::from_document(t.control_id().clone(), doc.clone()).unwrap();
        assert_eq!(rebuilt.to_document(), doc);
        assert_eq!(rebuilt.name(), "Nightly");
    }
}
