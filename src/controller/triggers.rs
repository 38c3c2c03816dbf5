//! Trigger controls, their events and the event sources that fire them

use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use tracing::{debug, info, trace};

use super::EditOutcome;
use crate::controls::{Control, ControlContext, TriggerControl};
use crate::error::{Capability, ControlError, ControlResult};
use crate::model::{ControlId, TriggerEventType};
use crate::triggers::Firing;

impl super::Controller {
    fn modify_trigger<R: EditOutcome>(
        &mut self,
        control_id: &ControlId,
        edit: impl FnOnce(&mut TriggerControl) -> R,
    ) -> ControlResult<R> {
        self.modify(control_id, |control, _| {
            let trigger = control
                .as_trigger_mut()
                .ok_or_else(|| ControlError::not_supported(control_id, Capability::Events))?;
            Ok(edit(trigger))
        })
    }

    /// Rebuild every event registration of a trigger from its current state
    pub(crate) fn sync_trigger(&mut self, control_id: &ControlId) {
        let Some(trigger) = self.controls.get(control_id).and_then(Control::as_trigger) else {
            return;
        };
        self.triggers.sync_control(
            control_id,
            trigger.enabled(),
            trigger.events(),
            Local::now(),
            &mut self.scheduler,
        );
    }

    /// Re-register a single event after it changed, leaving siblings alone
    fn sync_trigger_event(&mut self, control_id: &ControlId, event_id: &str) {
        self.triggers.unregister(control_id, event_id);
        let Some(trigger) = self.controls.get(control_id).and_then(Control::as_trigger) else {
            return;
        };
        if !trigger.enabled() {
            return;
        }
        if let Some(event) = trigger.event(event_id).filter(|e| e.enabled) {
            self.triggers.register(control_id, event, Local::now());
        }
    }

    /// Create an empty trigger; a random id is used when none is given
    pub fn create_trigger(&mut self, id: Option<&str>) -> ControlResult<ControlId> {
        let raw = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let control_id = ControlId::for_trigger(&raw);
        if self.controls.contains_key(&control_id) {
            return Err(ControlError::InvalidControlId(control_id.to_string()));
        }
        self.insert_control(Control::new(control_id.clone(), crate::model::ControlType::Trigger));
        self.persist(&control_id);
        info!("⚡ Created trigger {}", control_id);
        Ok(control_id)
    }

    /// Trigger ids ordered for display
    pub fn trigger_ids(&self) -> Vec<ControlId> {
        let mut triggers: Vec<&TriggerControl> =
            self.controls.values().filter_map(Control::as_trigger).collect();
        triggers.sort_by(|a, b| {
            a.sort_order()
                .cmp(&b.sort_order())
                .then_with(|| a.name().cmp(b.name()))
        });
        triggers.into_iter().map(|t| t.control_id().clone()).collect()
    }

    /// Run the actions of a trigger now, ignoring its conditions
    pub fn trigger_test(&mut self, control_id: &ControlId) -> ControlResult<bool> {
        let Some(control) = self.controls.get_mut(control_id) else {
            return Ok(self.unknown_control(control_id));
        };
        let trigger = control
            .as_trigger_mut()
            .ok_or_else(|| ControlError::not_supported(control_id, Capability::Events))?;
        let mut ctx = ControlContext {
            scheduler: &mut self.scheduler,
            runner: &mut self.runner,
        };
        let ran = trigger.execute(&mut ctx, Utc::now().timestamp_millis(), true);
        self.sync_running(control_id);
        self.settle();
        Ok(ran)
    }

    /// Enable or disable a trigger together with all of its events
    pub fn trigger_set_enabled(&mut self, control_id: &ControlId, enabled: bool) -> ControlResult<bool> {
        let changed = self.modify_trigger(control_id, |t| t.set_enabled(enabled))?;
        if changed {
            self.sync_trigger(control_id);
        }
        Ok(changed)
    }

    /// Add an event with default options, returning its id
    pub fn event_add(
        &mut self,
        control_id: &ControlId,
        kind: TriggerEventType,
    ) -> ControlResult<Option<String>> {
        let event_id = self.modify_trigger(control_id, |t| Some(t.event_add(kind)))?;
        if let Some(event_id) = &event_id {
            self.sync_trigger_event(control_id, event_id);
        }
        Ok(event_id)
    }

    pub fn event_remove(&mut self, control_id: &ControlId, event_id: &str) -> ControlResult<bool> {
        let removed = self.modify_trigger(control_id, |t| t.event_remove(event_id))?;
        if removed {
            self.triggers.unregister(control_id, event_id);
        }
        Ok(removed)
    }

    pub fn event_duplicate(
        &mut self,
        control_id: &ControlId,
        event_id: &str,
    ) -> ControlResult<Option<String>> {
        let copy = self.modify_trigger(control_id, |t| t.event_duplicate(event_id))?;
        if let Some(copy) = &copy {
            self.sync_trigger_event(control_id, copy);
        }
        Ok(copy)
    }

    pub fn event_enabled(
        &mut self,
        control_id: &ControlId,
        event_id: &str,
        enabled: bool,
    ) -> ControlResult<bool> {
        let changed = self.modify_trigger(control_id, |t| t.event_enabled(event_id, enabled))?;
        if changed {
            self.sync_trigger_event(control_id, event_id);
        }
        Ok(changed)
    }

    pub fn event_set_option(
        &mut self,
        control_id: &ControlId,
        event_id: &str,
        key: &str,
        value: Value,
    ) -> ControlResult<bool> {
        let changed = self.modify_trigger(control_id, |t| t.event_set_option(event_id, key, value))?;
        if changed {
            self.sync_trigger_event(control_id, event_id);
        }
        Ok(changed)
    }

    pub fn event_reorder(
        &mut self,
        control_id: &ControlId,
        event_id: &str,
        new_index: usize,
    ) -> ControlResult<bool> {
        self.modify_trigger(control_id, |t| t.event_reorder(event_id, new_index))
    }

    // =========================================================================
    // Event sources
    // =========================================================================

    /// Advance the trigger clock; returns the number of events fired
    pub fn tick(&mut self, tick: u64, now: DateTime<Local>) -> usize {
        let firings = self.triggers.timer.on_tick(tick, now);
        let count = firings.len();
        self.deferred.extend(firings);
        self.settle();
        count
    }

    /// The process finished starting up; fires startup events once
    pub fn signal_ready(&mut self) -> usize {
        let firings = self.triggers.misc.on_ready(&mut self.scheduler);
        let count = firings.len();
        self.deferred.extend(firings);
        self.settle();
        count
    }

    /// A UI client connected
    pub fn client_connected(&mut self) -> usize {
        let firings = self.triggers.misc.on_client_connect(&mut self.scheduler);
        let count = firings.len();
        self.deferred.extend(firings);
        self.settle();
        count
    }

    /// Run one queued event of a trigger
    ///
    /// The event may have been removed or disabled since it was queued, in
    /// which case nothing happens.
    pub(crate) fn fire_trigger_event(&mut self, firing: &Firing) {
        let Some(trigger) = self
            .controls
            .get_mut(&firing.control_id)
            .and_then(|c| c.as_trigger_mut())
        else {
            debug!("Dropping event of missing trigger {}", firing.control_id);
            return;
        };
        if !trigger.event(&firing.event_id).is_some_and(|e| e.enabled) {
            trace!("Event {} of {} is gone", firing.event_id, firing.control_id);
            return;
        }
        let mut ctx = ControlContext {
            scheduler: &mut self.scheduler,
            runner: &mut self.runner,
        };
        if trigger.execute(&mut ctx, Utc::now().timestamp_millis(), false) {
            trace!("Trigger {} fired by {}", firing.control_id, firing.event_id);
        }
        self.sync_running(&firing.control_id);
    }
}
