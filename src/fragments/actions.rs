//! FragmentActions - action-set storage of one control (or one step)

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::host::ModuleDispatch;
use crate::model::{ActionInstance, ActionSetId, ActionSets, ControlId};

/// Ordered action lists keyed by set id
///
/// Every mutation returns whether it took effect. Addressing a missing set or
/// action is a no-op; structure is never created implicitly.
#[derive(Debug, Clone)]
pub struct FragmentActions {
    control_id: ControlId,
    sets: ActionSets,
}

impl FragmentActions {
    pub fn new(control_id: ControlId, sets: ActionSets) -> Self {
        Self { control_id, sets }
    }

    /// Fragment with the given sets, all empty
    pub fn with_sets(control_id: ControlId, set_ids: &[ActionSetId]) -> Self {
        let sets = set_ids.iter().map(|id| (*id, Vec::new())).collect();
        Self::new(control_id, sets)
    }

    pub fn control_id(&self) -> &ControlId {
        &self.control_id
    }

    pub fn sets(&self) -> &ActionSets {
        &self.sets
    }

    pub fn has_set(&self, set_id: ActionSetId) -> bool {
        self.sets.contains_key(&set_id)
    }

    pub fn set(&self, set_id: ActionSetId) -> Option<&[ActionInstance]> {
        self.sets.get(&set_id).map(Vec::as_slice)
    }

    /// Enabled actions of a set, in order
    pub fn runnable(&self, set_id: ActionSetId) -> Vec<ActionInstance> {
        self.sets
            .get(&set_id)
            .map(|actions| actions.iter().filter(|a| !a.disabled).cloned().collect())
            .unwrap_or_default()
    }

    pub fn find(&self, action_id: &str) -> Option<&ActionInstance> {
        self.sets.values().flatten().find(|a| a.id == action_id)
    }

    fn find_mut(&mut self, action_id: &str) -> Option<&mut ActionInstance> {
        self.sets.values_mut().flatten().find(|a| a.id == action_id)
    }

    /// Position of an action as (set, index)
    pub fn locate(&self, action_id: &str) -> Option<(ActionSetId, usize)> {
        self.sets.iter().find_map(|(set_id, actions)| {
            actions
                .iter()
                .position(|a| a.id == action_id)
                .map(|index| (*set_id, index))
        })
    }

    pub fn action_add(
        &mut self,
        set_id: ActionSetId,
        action: ActionInstance,
        modules: &ModuleDispatch,
    ) -> bool {
        let Some(actions) = self.sets.get_mut(&set_id) else {
            return false;
        };
        modules.action_update(&action, &self.control_id);
        actions.push(action);
        true
    }

    pub fn action_remove(&mut self, action_id: &str, modules: &ModuleDispatch) -> bool {
        match self.take_action(action_id) {
            Some((_, _, action)) => {
                modules.action_delete(&action);
                true
            }
            None => false,
        }
    }

    /// Copy an action (with a fresh id) right after the original
    pub fn action_duplicate(&mut self, action_id: &str, modules: &ModuleDispatch) -> Option<String> {
        let (set_id, index) = self.locate(action_id)?;
        let actions = self.sets.get_mut(&set_id)?;

        let mut copy = actions[index].clone();
        copy.id = Uuid::new_v4().to_string();
        modules.action_update(&copy, &self.control_id);

        let new_id = copy.id.clone();
        actions.insert(index + 1, copy);
        Some(new_id)
    }

    pub fn action_enabled(&mut self, action_id: &str, enabled: bool, modules: &ModuleDispatch) -> bool {
        let control_id = self.control_id.clone();
        let Some(action) = self.find_mut(action_id) else {
            return false;
        };
        action.disabled = !enabled;
        if enabled {
            modules.action_update(action, &control_id);
        } else {
            modules.action_delete(action);
        }
        true
    }

    pub fn action_set_delay(&mut self, action_id: &str, delay: u64) -> bool {
        match self.find_mut(action_id) {
            Some(action) => {
                action.delay = delay;
                true
            }
            None => false,
        }
    }

    pub fn action_set_option(
        &mut self,
        action_id: &str,
        key: &str,
        value: Value,
        modules: &ModuleDispatch,
    ) -> bool {
        let control_id = self.control_id.clone();
        let Some(action) = self.find_mut(action_id) else {
            return false;
        };
        action.options.insert(key.to_string(), value);
        modules.action_update(action, &control_id);
        true
    }

    /// Replace definition and options of an existing action, keeping id and delay
    pub fn action_replace(&mut self, replacement: &ActionInstance, modules: &ModuleDispatch) -> bool {
        let control_id = self.control_id.clone();
        let Some(action) = self.find_mut(&replacement.id) else {
            return false;
        };
        action.definition_id = replacement.definition_id.clone();
        action.options = replacement.options.clone();
        modules.action_update(action, &control_id);
        true
    }

    /// Overwrite options learned from the connection
    pub fn action_update_options(
        &mut self,
        action_id: &str,
        options: Map<String, Value>,
        modules: &ModuleDispatch,
    ) -> bool {
        let control_id = self.control_id.clone();
        let Some(action) = self.find_mut(action_id) else {
            return false;
        };
        action.options = options;
        modules.action_update(action, &control_id);
        true
    }

    /// Detach an action without notifying its connection
    pub fn take_action(&mut self, action_id: &str) -> Option<(ActionSetId, usize, ActionInstance)> {
        let (set_id, index) = self.locate(action_id)?;
        let action = self.sets.get_mut(&set_id)?.remove(index);
        Some((set_id, index, action))
    }

    /// Insert a detached action, clamping the index to the set length
    pub fn insert_action(&mut self, set_id: ActionSetId, index: usize, action: ActionInstance) -> bool {
        let Some(actions) = self.sets.get_mut(&set_id) else {
            return false;
        };
        let index = index.min(actions.len());
        actions.insert(index, action);
        true
    }

    pub fn set_add(&mut self, set_id: ActionSetId) -> bool {
        if self.sets.contains_key(&set_id) {
            return false;
        }
        self.sets.insert(set_id, Vec::new());
        true
    }

    /// Next free numeric set id: max + 1000, or 1000 when none exists
    pub fn next_threshold_set(&self) -> ActionSetId {
        let max = self
            .sets
            .keys()
            .filter_map(ActionSetId::threshold)
            .max();
        match max {
            Some(max) => ActionSetId::Threshold(max.saturating_add(1000)),
            None => ActionSetId::Threshold(1000),
        }
    }

    pub fn set_remove(&mut self, set_id: ActionSetId, modules: &ModuleDispatch) -> bool {
        match self.sets.remove(&set_id) {
            Some(actions) => {
                for action in &actions {
                    modules.action_delete(action);
                }
                true
            }
            None => false,
        }
    }

    pub fn set_rename(&mut self, old_id: ActionSetId, new_id: ActionSetId) -> bool {
        if self.sets.contains_key(&new_id) {
            return false;
        }
        match self.sets.remove(&old_id) {
            Some(actions) => {
                self.sets.insert(new_id, actions);
                true
            }
            None => false,
        }
    }

    /// Drop every action of a connection without notifying it
    pub fn forget_connection(&mut self, connection_id: &str) -> bool {
        self.retain_actions(|a| a.connection_id != connection_id)
    }

    /// Drop actions whose connection is unknown (the internal one is always known)
    pub fn verify_connections(&mut self, known: &HashSet<String>) -> bool {
        self.retain_actions(|a| a.is_internal() || known.contains(&a.connection_id))
    }

    fn retain_actions(&mut self, keep: impl Fn(&ActionInstance) -> bool) -> bool {
        let mut changed = false;
        for actions in self.sets.values_mut() {
            let before = actions.len();
            actions.retain(|a| keep(a));
            changed |= actions.len() != before;
        }
        if changed {
            debug!("Dropped actions from {}", self.control_id);
        }
        changed
    }

    pub fn subscribe_all(&self, modules: &ModuleDispatch) {
        for action in self.sets.values().flatten() {
            modules.action_update(action, &self.control_id);
        }
    }

    pub fn cleanup_all(&self, modules: &ModuleDispatch) {
        for action in self.sets.values().flatten() {
            modules.action_delete(action);
        }
    }

    /// Deep copy with fresh action ids, not yet subscribed
    pub fn clone_with_fresh_ids(&self) -> Self {
        let mut sets = self.sets.clone();
        for action in sets.values_mut().flatten() {
            action.id = Uuid::new_v4().to_string();
        }
        Self::new(self.control_id.clone(), sets)
    }

    pub fn into_sets(self) -> ActionSets {
        self.sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{action, flush_tasks, HostCall, TestHarness};
    use serde_json::json;

    fn fragment() -> FragmentActions {
        FragmentActions::with_sets(
            ControlId::new("loc:1/0/0"),
            &[ActionSetId::Down, ActionSetId::Up],
        )
    }

    #[tokio::test]
    async fn test_add_into_missing_set_is_rejected() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        let before = frag.sets().clone();

        assert!(!frag.action_add(ActionSetId::Threshold(500), action("a"), modules));
        assert_eq!(frag.sets(), &before);

        flush_tasks().await;
        assert!(harness.host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_subscriptions_follow_mutations() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();

        assert!(frag.action_add(ActionSetId::Down, action("a"), modules));
        assert!(frag.action_enabled("a", false, modules));
        // disabled, so no resubscription
        assert!(frag.action_set_option("a", "scene", json!("Live"), modules));
        assert!(frag.action_remove("a", modules));
        assert!(!frag.action_remove("a", modules));

        flush_tasks().await;
        assert_eq!(
            harness.host.calls(),
            vec![
                HostCall::ActionUpdate("a".into()),
                HostCall::ActionDelete("a".into()),
                HostCall::ActionDelete("a".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_inserts_after_original() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        frag.action_add(ActionSetId::Down, action("a"), modules);
        frag.action_add(ActionSetId::Down, action("b"), modules);

        let copy = frag.action_duplicate("a", modules).unwrap();
        let ids: Vec<&str> = frag.set(ActionSetId::Down).unwrap().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", copy.as_str(), "b"]);
    }

    #[test]
    fn test_set_ids_and_rename() {
        let mut frag = fragment();
        assert_eq!(frag.next_threshold_set(), ActionSetId::Threshold(1000));
        assert!(frag.set_add(ActionSetId::Threshold(1000)));
        assert!(!frag.set_add(ActionSetId::Threshold(1000)));
        assert_eq!(frag.next_threshold_set(), ActionSetId::Threshold(2000));

        assert!(frag.set_rename(ActionSetId::Threshold(1000), ActionSetId::Threshold(1500)));
        assert!(!frag.set_rename(ActionSetId::Threshold(1000), ActionSetId::Threshold(3000)));
        assert!(!frag.set_rename(ActionSetId::Threshold(1500), ActionSetId::Down));
    }

    #[tokio::test]
    async fn test_forget_and_verify_connections() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        frag.action_add(ActionSetId::Down, action("a"), modules);
        frag.action_add(ActionSetId::Up, ActionInstance::new("b", "gone", "x"), modules);
        frag.action_add(ActionSetId::Up, ActionInstance::new("c", "internal", "panic"), modules);

        let known: HashSet<String> = ["test".to_string()].into_iter().collect();
        assert!(frag.verify_connections(&known));
        assert!(frag.find("b").is_none());
        assert!(frag.find("c").is_some());

        assert!(frag.forget_connection("test"));
        assert!(!frag.forget_connection("test"));
        assert!(frag.find("a").is_none());
    }
}
