//! Action and action-set operations

use serde_json::{Map, Value};
use tracing::debug;

use crate::controls::{Control, HasActions};
use crate::error::{Capability, ControlError, ControlResult};
use crate::fragments::FragmentActions;
use crate::model::{ActionInstance, ActionSetId, ControlId};

fn actions_of<'a>(
    control: &'a mut Control,
    control_id: &ControlId,
) -> ControlResult<&'a mut dyn HasActions> {
    control
        .as_actions_mut()
        .ok_or_else(|| ControlError::not_supported(control_id, Capability::Actions))
}

/// Fragment (of any step) holding an action
fn fragment_with<'a>(
    actions: &'a mut dyn HasActions,
    action_id: &str,
) -> Option<&'a mut FragmentActions> {
    actions
        .fragments_mut()
        .into_iter()
        .find(|f| f.find(action_id).is_some())
}

impl super::Controller {
    /// Add an action to an existing set; the set is never created implicitly
    pub fn action_add(
        &mut self,
        control_id: &ControlId,
        step: Option<u32>,
        set_id: ActionSetId,
        action: ActionInstance,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            let actions = actions_of(control, control_id)?;
            Ok(actions
                .fragment_mut(step)
                .map(|f| f.action_add(set_id, action, modules))
                .unwrap_or(false))
        })
    }

    pub fn action_remove(&mut self, control_id: &ControlId, action_id: &str) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            let actions = actions_of(control, control_id)?;
            Ok(fragment_with(actions, action_id)
                .map(|f| f.action_remove(action_id, modules))
                .unwrap_or(false))
        })
    }

    /// Duplicate an action right after itself, returning the copy's id
    pub fn action_duplicate(
        &mut self,
        control_id: &ControlId,
        action_id: &str,
    ) -> ControlResult<Option<String>> {
        self.modify(control_id, |control, modules| {
            let actions = actions_of(control, control_id)?;
            Ok(fragment_with(actions, action_id)
                .and_then(|f| f.action_duplicate(action_id, modules)))
        })
    }

    pub fn action_enabled(
        &mut self,
        control_id: &ControlId,
        action_id: &str,
        enabled: bool,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            let actions = actions_of(control, control_id)?;
            Ok(fragment_with(actions, action_id)
                .map(|f| f.action_enabled(action_id, enabled, modules))
                .unwrap_or(false))
        })
    }

    pub fn action_set_delay(
        &mut self,
        control_id: &ControlId,
        action_id: &str,
        delay: u64,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            let actions = actions_of(control, control_id)?;
            Ok(fragment_with(actions, action_id)
                .map(|f| f.action_set_delay(action_id, delay))
                .unwrap_or(false))
        })
    }

    pub fn action_set_option(
        &mut self,
        control_id: &ControlId,
        action_id: &str,
        key: &str,
        value: Value,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            let actions = actions_of(control, control_id)?;
            Ok(fragment_with(actions, action_id)
                .map(|f| f.action_set_option(action_id, key, value, modules))
                .unwrap_or(false))
        })
    }

    /// Replace the options of an action matched by id
    pub fn action_replace(
        &mut self,
        control_id: &ControlId,
        replacement: &ActionInstance,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            let actions = actions_of(control, control_id)?;
            Ok(fragment_with(actions, &replacement.id)
                .map(|f| f.action_replace(replacement, modules))
                .unwrap_or(false))
        })
    }

    /// Move an action to a position in any set of any step of the same control
    pub fn action_reorder(
        &mut self,
        control_id: &ControlId,
        action_id: &str,
        dest_step: Option<u32>,
        dest_set: ActionSetId,
        dest_index: usize,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            let actions = actions_of(control, control_id)?;
            let has_dest = actions
                .fragment(dest_step)
                .map(|f| f.has_set(dest_set))
                .unwrap_or(false);
            if !has_dest {
                return Ok(false);
            }
            let Some((set_id, index, action)) =
                fragment_with(actions, action_id).and_then(|f| f.take_action(action_id))
            else {
                return Ok(false);
            };
            let moved = actions
                .fragment_mut(dest_step)
                .map(|f| f.insert_action(dest_set, dest_index, action.clone()))
                .unwrap_or(false);
            if !moved {
                // Destination vanished in between; put the action back
                if let Some(origin) = actions.fragments_mut().into_iter().find(|f| f.has_set(set_id)) {
                    origin.insert_action(set_id, index, action);
                }
            }
            Ok(moved)
        })
    }

    /// Add the next numeric set, returning its id
    pub fn action_set_add(
        &mut self,
        control_id: &ControlId,
        step: Option<u32>,
    ) -> ControlResult<Option<ActionSetId>> {
        self.modify(control_id, |control, _| {
            let sets = control
                .as_action_sets_mut()
                .ok_or_else(|| ControlError::not_supported(control_id, Capability::ActionSets))?;
            Ok(sets.action_set_add(step))
        })
    }

    pub fn action_set_remove(
        &mut self,
        control_id: &ControlId,
        step: Option<u32>,
        set_id: ActionSetId,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            let sets = control
                .as_action_sets_mut()
                .ok_or_else(|| ControlError::not_supported(control_id, Capability::ActionSets))?;
            Ok(sets.action_set_remove(step, set_id, modules))
        })
    }

    pub fn action_set_rename(
        &mut self,
        control_id: &ControlId,
        step: Option<u32>,
        old_id: ActionSetId,
        new_id: ActionSetId,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            let sets = control
                .as_action_sets_mut()
                .ok_or_else(|| ControlError::not_supported(control_id, Capability::ActionSets))?;
            Ok(sets.action_set_rename(step, old_id, new_id))
        })
    }

    pub fn action_set_run_while_held(
        &mut self,
        control_id: &ControlId,
        step: Option<u32>,
        set_id: ActionSetId,
        enabled: bool,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            let sets = control
                .as_action_sets_mut()
                .ok_or_else(|| ControlError::not_supported(control_id, Capability::ActionSets))?;
            Ok(sets.action_set_run_while_held(step, set_id, enabled))
        })
    }

    /// Snapshot of an action for a learn request
    pub fn action_for_learn(&self, control_id: &ControlId, action_id: &str) -> Option<ActionInstance> {
        self.controls
            .get(control_id)?
            .as_actions()?
            .fragments()
            .into_iter()
            .find_map(|f| f.find(action_id).cloned())
    }

    /// Apply learned option values if the action still exists
    pub fn action_learn_apply(
        &mut self,
        control_id: &ControlId,
        action_id: &str,
        values: Map<String, Value>,
    ) -> ControlResult<bool> {
        let applied = self.modify(control_id, |control, modules| {
            let actions = actions_of(control, control_id)?;
            Ok(fragment_with(actions, action_id)
                .map(|f| f.action_update_options(action_id, values, modules))
                .unwrap_or(false))
        })?;
        if !applied {
            debug!("Learned values for {} on {} discarded", action_id, control_id);
        }
        Ok(applied)
    }
}
