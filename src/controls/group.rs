//! Action sets of one step (or of a flat control) plus their hold options

use std::collections::BTreeSet;

use super::hold::select_release_set;
use crate::fragments::FragmentActions;
use crate::host::ModuleDispatch;
use crate::model::{ActionSetId, ActionSets, ControlId, StepModel, StepOptions};

#[derive(Debug, Clone)]
pub struct ActionGroup {
    pub actions: FragmentActions,
    /// Thresholds fired while held instead of on release
    pub run_while_held: BTreeSet<u64>,
    pub name: Option<String>,
    /// Set `0` is the non-removable release default
    protect_default: bool,
}

impl ActionGroup {
    pub fn from_step(control_id: ControlId, step: StepModel) -> Self {
        Self {
            actions: FragmentActions::new(control_id, step.action_sets),
            run_while_held: step.options.run_while_held,
            name: step.options.name,
            protect_default: false,
        }
    }

    pub fn flat(control_id: ControlId, sets: ActionSets, run_while_held: BTreeSet<u64>) -> Self {
        Self {
            actions: FragmentActions::new(control_id, sets),
            run_while_held,
            name: None,
            protect_default: true,
        }
    }

    pub fn to_step_model(&self) -> StepModel {
        StepModel {
            action_sets: self.actions.sets().clone(),
            options: StepOptions {
                run_while_held: self.run_while_held.clone(),
                name: self.name.clone(),
            },
        }
    }

    fn is_protected(&self, set_id: ActionSetId) -> bool {
        self.protect_default && set_id == ActionSetId::DEFAULT
    }

    /// Add the next numeric set
    pub fn set_add(&mut self) -> ActionSetId {
        let set_id = self.actions.next_threshold_set();
        self.actions.set_add(set_id);
        set_id
    }

    pub fn set_remove(&mut self, set_id: ActionSetId, modules: &ModuleDispatch) -> bool {
        let Some(threshold) = set_id.threshold() else {
            return false;
        };
        if self.is_protected(set_id) || !self.actions.set_remove(set_id, modules) {
            return false;
        }
        self.run_while_held.remove(&threshold);
        true
    }

    pub fn set_rename(&mut self, old_id: ActionSetId, new_id: ActionSetId) -> bool {
        let (Some(old), Some(new)) = (old_id.threshold(), new_id.threshold()) else {
            return false;
        };
        if self.is_protected(old_id) || self.is_protected(new_id) {
            return false;
        }
        if !self.actions.set_rename(old_id, new_id) {
            return false;
        }
        if self.run_while_held.remove(&old) {
            self.run_while_held.insert(new);
        }
        true
    }

    pub fn set_run_while_held(&mut self, set_id: ActionSetId, enabled: bool) -> bool {
        let Some(threshold) = set_id.threshold() else {
            return false;
        };
        if threshold == 0 || !self.actions.has_set(set_id) {
            return false;
        }
        if enabled {
            self.run_while_held.insert(threshold);
        } else {
            self.run_while_held.remove(&threshold);
        }
        true
    }

    /// Set a release runs, skipping thresholds already fired while held
    pub fn release_set(&self, duration_ms: u64) -> Option<ActionSetId> {
        let selected = select_release_set(self.actions.sets(), duration_ms)?;
        match selected.threshold() {
            Some(t) if self.run_while_held.contains(&t) => None,
            _ => Some(selected),
        }
    }

    pub fn clone_with_fresh_ids(&self) -> Self {
        Self {
            actions: self.actions.clone_with_fresh_ids(),
            run_while_held: self.run_while_held.clone(),
            name: self.name.clone(),
            protect_default: self.protect_default,
        }
    }
}
