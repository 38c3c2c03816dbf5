//! Creating, importing, relocating and destroying controls

use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::controls::Control;
use crate::error::{ControlError, ControlResult};
use crate::model::{ControlDocument, ControlId, ControlLocation, ControlType};
use crate::runner::ActionRunner;
use crate::scheduler::TimerOwner;

impl super::Controller {
    /// Check that a control of `kind` may live at `control_id`
    fn validate_target(&self, control_id: &ControlId, kind: ControlType) -> ControlResult<()> {
        match (control_id.location(), kind) {
            (Some(location), kind) if kind.is_button() => self
                .services
                .resolver
                .get_control_id_at(&location)
                .map(|_| ())
                .ok_or(ControlError::LocationOutOfRange(location)),
            (None, ControlType::Trigger) if control_id.is_trigger() => Ok(()),
            _ => Err(ControlError::InvalidControlId(control_id.to_string())),
        }
    }

    fn location_id(&self, location: &ControlLocation) -> ControlResult<ControlId> {
        self.services
            .resolver
            .get_control_id_at(location)
            .ok_or(ControlError::LocationOutOfRange(*location))
    }

    /// Register a control: subscribe its actions and feedbacks, arm trigger events
    pub(crate) fn insert_control(&mut self, control: Control) {
        let control_id = control.control_id().clone();
        control.subscribe_all(&self.services.modules);
        self.controls.insert(control_id.clone(), control);
        if control_id.is_trigger() {
            self.sync_trigger(&control_id);
        }
    }

    /// Unregister a control, cancelling everything it has pending
    pub(crate) fn remove_control(&mut self, control_id: &ControlId) -> Option<Control> {
        let control = self.controls.remove(control_id)?;
        ActionRunner::abort_control(&mut self.scheduler, control_id);
        self.scheduler
            .cancel_where(|owner| matches!(owner, TimerOwner::Hold(id, _) if id == control_id));
        self.triggers.clear_control(control_id, &mut self.scheduler);
        control.cleanup_all(&self.services.modules);
        Some(control)
    }

    /// Create a fresh button at a grid location, replacing whatever was there
    pub fn create_button_control(
        &mut self,
        location: &ControlLocation,
        kind: ControlType,
    ) -> ControlResult<ControlId> {
        if !kind.is_button() {
            return Err(ControlError::UnknownControlType(kind.to_string()));
        }
        let control_id = self.location_id(location)?;
        self.remove_control(&control_id);
        self.insert_control(Control::new(control_id.clone(), kind));
        self.commit(&control_id);
        debug!("Created {} at {}", kind, location);
        Ok(control_id)
    }

    /// Replace a control with one built from a document
    ///
    /// The document is validated before the existing control is touched.
    pub fn import_control(
        &mut self,
        control_id: &ControlId,
        doc: ControlDocument,
        fresh_ids: bool,
    ) -> ControlResult<()> {
        self.validate_target(control_id, doc.kind)?;
        let doc = if fresh_ids { doc.with_fresh_ids() } else { doc };
        let control = Control::from_document(control_id.clone(), doc)?;
        self.remove_control(control_id);
        self.insert_control(control);
        self.commit(control_id);
        Ok(())
    }

    /// Destroy a control, optionally recreating it empty as another kind
    ///
    /// Returns false if there was nothing to reset.
    pub fn reset_control(
        &mut self,
        control_id: &ControlId,
        new_kind: Option<ControlType>,
    ) -> ControlResult<bool> {
        if let Some(kind) = new_kind {
            self.validate_target(control_id, kind)?;
        }
        let existed = self.remove_control(control_id).is_some();
        if let Some(kind) = new_kind {
            self.insert_control(Control::new(control_id.clone(), kind));
        } else if !existed {
            return Ok(false);
        }
        self.commit(control_id);
        Ok(true)
    }

    /// Copy a control onto a location with new action and feedback ids
    pub fn copy_control(&mut self, from: &ControlId, to: &ControlLocation) -> ControlResult<bool> {
        let Some(doc) = self.get_control(from) else {
            return Ok(self.unknown_control(from));
        };
        let target = self.location_id(to)?;
        if &target == from {
            return Ok(false);
        }
        self.import_control(&target, doc, true)?;
        Ok(true)
    }

    /// Move a control to an empty location
    ///
    /// Pending work of the control is cancelled. Returns false if the
    /// destination is occupied.
    pub fn move_control(&mut self, from: &ControlLocation, to: &ControlLocation) -> ControlResult<bool> {
        let source = self.location_id(from)?;
        let target = self.location_id(to)?;
        if source == target || self.controls.contains_key(&target) {
            return Ok(false);
        }
        let Some(doc) = self.get_control(&source) else {
            return Ok(self.unknown_control(&source));
        };
        let control = Control::from_document(target.clone(), doc)?;
        self.remove_control(&source);
        self.insert_control(control);
        self.commit(&source);
        self.commit(&target);
        Ok(true)
    }

    /// Exchange the controls at two locations; either may be empty
    pub fn swap_controls(&mut self, a: &ControlLocation, b: &ControlLocation) -> ControlResult<bool> {
        let a_id = self.location_id(a)?;
        let b_id = self.location_id(b)?;
        if a_id == b_id {
            return Ok(false);
        }
        let a_doc = self.get_control(&a_id);
        let b_doc = self.get_control(&b_id);
        if a_doc.is_none() && b_doc.is_none() {
            return Ok(false);
        }
        // Build both before touching either
        let to_b = a_doc
            .map(|doc| Control::from_document(b_id.clone(), doc))
            .transpose()?;
        let to_a = b_doc
            .map(|doc| Control::from_document(a_id.clone(), doc))
            .transpose()?;

        self.remove_control(&a_id);
        self.remove_control(&b_id);
        for control in to_a.into_iter().chain(to_b) {
            self.insert_control(control);
        }
        self.commit(&a_id);
        self.commit(&b_id);
        Ok(true)
    }

    /// Populate the registry from persisted documents at startup
    ///
    /// Keys are raw control ids. Invalid entries are skipped with a warning.
    /// Returns the number of controls loaded.
    pub fn load_documents(&mut self, docs: impl IntoIterator<Item = (String, Value)>) -> usize {
        let mut loaded = 0;
        for (raw_id, value) in docs {
            let control_id = match self.resolve_control_id(&raw_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping stored control {}: {}", raw_id, e);
                    continue;
                }
            };
            match Control::from_value(control_id.clone(), value) {
                Ok(control) => {
                    self.remove_control(&control_id);
                    self.insert_control(control);
                    self.request_redraw(&control_id);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping stored control {}: {}", control_id, e),
            }
        }
        info!("📦 Loaded {} controls", loaded);
        loaded
    }

    /// Drop every action and feedback of a connection that was deleted
    ///
    /// Returns the number of controls changed.
    pub fn forget_instance(&mut self, connection_id: &str) -> usize {
        self.prune_connections(|fragment_actions, fragment_feedbacks| {
            let a = fragment_actions
                .map(|fragments| {
                    fragments
                        .into_iter()
                        .fold(false, |acc, f| f.forget_connection(connection_id) | acc)
                })
                .unwrap_or(false);
            let b = fragment_feedbacks
                .map(|f| f.forget_connection(connection_id))
                .unwrap_or(false);
            a | b
        })
    }

    /// Drop actions and feedbacks of connections not in `known`
    ///
    /// Returns the number of controls changed.
    pub fn verify_instance_ids(&mut self, known: &HashSet<String>) -> usize {
        self.prune_connections(|fragment_actions, fragment_feedbacks| {
            let a = fragment_actions
                .map(|fragments| {
                    fragments
                        .into_iter()
                        .fold(false, |acc, f| f.verify_connections(known) | acc)
                })
                .unwrap_or(false);
            let b = fragment_feedbacks
                .map(|f| f.verify_connections(known))
                .unwrap_or(false);
            a | b
        })
    }

    fn prune_connections(
        &mut self,
        mut prune: impl FnMut(
            Option<Vec<&mut crate::fragments::FragmentActions>>,
            Option<&mut crate::fragments::FragmentFeedbacks>,
        ) -> bool,
    ) -> usize {
        let mut changed = Vec::new();
        for (control_id, control) in self.controls.iter_mut() {
            let mut touched = false;
            if let Some(actions) = control.as_actions_mut() {
                touched |= prune(Some(actions.fragments_mut()), None);
            }
            if let Some(feedbacks) = control.as_feedbacks_mut() {
                touched |= prune(None, Some(feedbacks.feedbacks_mut()));
            }
            if touched {
                changed.push(control_id.clone());
            }
        }
        for control_id in &changed {
            self.commit(control_id);
        }
        changed.len()
    }

    /// Cancel delayed actions and hold timers of one control
    ///
    /// With `skip_up` the control is also forced unpushed without running its
    /// release actions. Returns the number of timers cancelled.
    pub fn abort_control_delayed(&mut self, control_id: &ControlId, skip_up: bool) -> usize {
        let mut cancelled = ActionRunner::abort_control(&mut self.scheduler, control_id);
        cancelled += self
            .scheduler
            .cancel_where(|owner| matches!(owner, TimerOwner::Hold(id, _) if id == control_id));

        if skip_up {
            let was_pushed = self
                .controls
                .get_mut(control_id)
                .and_then(|c| c.as_pushed_mut())
                .map(|p| p.force_release(&mut self.scheduler))
                .unwrap_or(false);
            if was_pushed {
                self.pushed_changed(control_id, false, None);
            }
        }
        self.sync_running(control_id);
        cancelled
    }

    /// Cancel every delayed action and hold timer of every control
    pub fn abort_all_delayed(&mut self) -> usize {
        let running = ActionRunner::abort_all(&mut self.scheduler);
        self.scheduler
            .cancel_where(|owner| matches!(owner, TimerOwner::Hold(..)));
        for control_id in &running {
            self.sync_running(control_id);
        }
        info!("🛑 Aborted delayed actions of {} controls", running.len());
        running.len()
    }

    /// Stop all pending work before the process exits
    pub fn shutdown(&mut self) {
        self.abort_all_delayed();
        self.flush_redraws();
        let dropped = self.scheduler.cancel_all() + self.runner.clear_internal() + self.deferred.len();
        self.deferred.clear();
        if dropped > 0 {
            debug!("Dropped {} pending items on shutdown", dropped);
        }
        info!("Controller stopped with {} controls", self.controls.len());
    }
}
