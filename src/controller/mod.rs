//! Controls registry - owns every control and routes operations to it
//!
//! The Controller is the single owner of:
//! - The map of control id to control state machine
//! - The timer scheduler and the action runner
//! - Trigger event registrations and the deferred trigger queue
//! - The debounced redraw queue
//!
//! Every operation runs to completion on `&mut self`. Internal actions and
//! trigger firings produced while handling an operation are queued and drained
//! by [`Controller::settle`] before the public call returns.

mod actions;
mod feedbacks;
mod internal;
mod lifecycle;
mod redraw;
mod steps;
mod triggers;


pub use feedbacks::FeedbackValue;
pub use redraw::RedrawQueue;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::config::EngineConfig;
use crate::controls::{Control, ControlContext};
use crate::error::{Capability, ControlError, ControlResult};
use crate::host::{EngineServices, ModuleDispatch};
use crate::model::{ControlDocument, ControlId, ParsedControlId, RuntimeSnapshot};
use crate::runner::ActionRunner;
use crate::scheduler::{Scheduler, TimerJob, TimerOwner};
use crate::triggers::{Firing, TriggerEvents};

/// Store key prefix of persisted control documents
pub const CONTROLS_PREFIX: &str = "controls/";

/// Store key of one control document
pub fn storage_key(control_id: &ControlId) -> String {
    format!("{}{}", CONTROLS_PREFIX, control_id)
}

/// Runtime tunables of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Window in which redraw requests for a control are coalesced
    pub redraw_debounce: Duration,
    /// Upper bound of internal actions and trigger firings drained per call
    pub max_deferred_iterations: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            redraw_debounce: Duration::from_millis(20),
            max_deferred_iterations: 1000,
        }
    }
}

impl From<&EngineConfig> for ControllerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            redraw_debounce: Duration::from_millis(config.redraw_debounce_ms),
            max_deferred_iterations: config.max_deferred_iterations,
        }
    }
}

/// Whether an edit changed anything worth persisting
pub(crate) trait EditOutcome: Default {
    fn changed(&self) -> bool;
}

impl EditOutcome for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl<T> EditOutcome for Option<T> {
    fn changed(&self) -> bool {
        self.is_some()
    }
}

pub struct Controller {
    pub(crate) controls: HashMap<ControlId, Control>,
    pub(crate) services: EngineServices,
    pub(crate) scheduler: Scheduler,
    pub(crate) runner: ActionRunner,
    pub(crate) triggers: TriggerEvents,
    pub(crate) redraw: RedrawQueue,
    /// Trigger firings waiting to run after the current event source
    pub(crate) deferred: VecDeque<Firing>,
    pub(crate) settings: ControllerSettings,
}

impl Controller {
    pub fn new(services: EngineServices, settings: ControllerSettings) -> Self {
        Self {
            controls: HashMap::new(),
            runner: ActionRunner::new(services.modules.clone()),
            services,
            scheduler: Scheduler::new(),
            triggers: TriggerEvents::new(),
            redraw: RedrawQueue::new(settings.redraw_debounce),
            deferred: VecDeque::new(),
            settings,
        }
    }

    pub fn services(&self) -> &EngineServices {
        &self.services
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Apply new tunables; pending timers keep their deadlines
    pub fn update_settings(&mut self, settings: ControllerSettings) {
        self.redraw.set_debounce(settings.redraw_debounce);
        self.settings = settings;
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn redraw_queue(&self) -> &RedrawQueue {
        &self.redraw
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn control(&self, control_id: &ControlId) -> Option<&Control> {
        self.controls.get(control_id)
    }

    pub fn get_control(&self, control_id: &ControlId) -> Option<ControlDocument> {
        self.controls.get(control_id).map(Control::to_document)
    }

    pub fn get_all_controls(&self) -> BTreeMap<ControlId, ControlDocument> {
        self.controls
            .iter()
            .map(|(id, control)| (id.clone(), control.to_document()))
            .collect()
    }

    pub fn runtime_snapshot(&self, control_id: &ControlId) -> Option<RuntimeSnapshot> {
        self.controls.get(control_id).map(Control::runtime_snapshot)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Validate a raw id, mapping legacy bank ids onto grid locations
    pub fn resolve_control_id(&self, raw: &str) -> ControlResult<ControlId> {
        let id = ControlId::new(raw);
        match id.parse() {
            Some(ParsedControlId::Location(location)) => self
                .services
                .resolver
                .get_control_id_at(&location)
                .ok_or(ControlError::LocationOutOfRange(location)),
            Some(ParsedControlId::LegacyBank { page, bank }) => self
                .services
                .resolver
                .get_control_id_at_old_bank_index(page, bank)
                .ok_or_else(|| ControlError::InvalidControlId(raw.to_string())),
            Some(ParsedControlId::Trigger(_)) => Ok(id),
            None => Err(ControlError::InvalidControlId(raw.to_string())),
        }
    }

    // =========================================================================
    // Commit helpers
    // =========================================================================

    /// Write the current document of a control, or delete it if gone
    pub(crate) fn persist(&self, control_id: &ControlId) {
        let value = self
            .controls
            .get(control_id)
            .and_then(|c| serde_json::to_value(c.to_document()).ok());
        self.services.store.set_key(&storage_key(control_id), value);
    }

    /// Persist and redraw after a successful edit
    pub(crate) fn commit(&mut self, control_id: &ControlId) {
        self.persist(control_id);
        self.request_redraw(control_id);
    }

    pub(crate) fn request_redraw(&mut self, control_id: &ControlId) {
        self.redraw.request(control_id, &mut self.scheduler);
    }

    pub(crate) fn unknown_control<R: Default>(&self, control_id: &ControlId) -> R {
        warn!("Control {} does not exist", control_id);
        R::default()
    }

    /// Mirror the delayed-action state of a control onto its running flag
    pub(crate) fn sync_running(&mut self, control_id: &ControlId) {
        let running = ActionRunner::is_running(&self.scheduler, control_id);
        let Some(actions) = self
            .controls
            .get_mut(control_id)
            .and_then(|c| c.as_actions_mut())
        else {
            return;
        };
        if actions.set_actions_running(running) {
            trace!("{} running = {}", control_id, running);
            self.request_redraw(control_id);
        }
    }

    /// Run an edit against a control, committing it if anything changed
    pub(crate) fn modify<R: EditOutcome>(
        &mut self,
        control_id: &ControlId,
        edit: impl FnOnce(&mut Control, &ModuleDispatch) -> ControlResult<R>,
    ) -> ControlResult<R> {
        let modules = self.services.modules.clone();
        let Some(control) = self.controls.get_mut(control_id) else {
            return Ok(self.unknown_control(control_id));
        };
        let outcome = edit(control, &modules)?;
        if outcome.changed() {
            self.commit(control_id);
        }
        Ok(outcome)
    }

    /// Update a single option of a control
    pub fn options_set_field(
        &mut self,
        control_id: &ControlId,
        key: &str,
        value: Value,
    ) -> ControlResult<bool> {
        let changed = self.modify(control_id, |control, _| {
            let options = control
                .as_options_mut()
                .ok_or_else(|| ControlError::not_supported(control_id, Capability::Options))?;
            Ok(options.options_set_field(key, value))
        })?;
        // Toggling `enabled` through options must arm or disarm the events
        if changed && control_id.is_trigger() {
            self.sync_trigger(control_id);
        }
        Ok(changed)
    }

    // =========================================================================
    // Surface input
    // =========================================================================

    /// Press or release a control
    ///
    /// Returns false if the control does not exist.
    pub fn press_control(
        &mut self,
        control_id: &ControlId,
        pressed: bool,
        surface_id: Option<&str>,
        force: bool,
    ) -> ControlResult<bool> {
        let result = self.press_inner(control_id, pressed, surface_id, force);
        self.settle();
        result
    }

    pub(crate) fn press_inner(
        &mut self,
        control_id: &ControlId,
        pressed: bool,
        surface_id: Option<&str>,
        force: bool,
    ) -> ControlResult<bool> {
        let Some(control) = self.controls.get_mut(control_id) else {
            return Ok(self.unknown_control(control_id));
        };

        if let Some(page) = control.as_page() {
            page.press(pressed, surface_id, self.services.navigator.as_ref());
        } else {
            let step_before = control.as_steps().map(|s| s.current_step());
            let pushable = control
                .as_pushed_mut()
                .ok_or_else(|| ControlError::not_supported(control_id, Capability::PushedState))?;
            let was_pushed = pushable.pushed();
            let mut ctx = ControlContext {
                scheduler: &mut self.scheduler,
                runner: &mut self.runner,
            };
            pushable.press(pressed, surface_id, force, &mut ctx);
            let now_pushed = pushable.pushed();
            let step_after = control.as_steps().map(|s| s.current_step());

            if was_pushed != now_pushed {
                self.pushed_changed(control_id, now_pushed, surface_id);
            } else if step_before != step_after {
                self.request_redraw(control_id);
            }
            self.sync_running(control_id);
        }

        let firings = self
            .triggers
            .misc
            .on_control_press(control_id, pressed, surface_id);
        self.deferred.extend(firings);
        Ok(true)
    }

    /// Rotate a control; returns false if it does not handle rotation
    pub fn rotate_control(
        &mut self,
        control_id: &ControlId,
        clockwise: bool,
        surface_id: Option<&str>,
    ) -> ControlResult<bool> {
        let result = self.rotate_inner(control_id, clockwise, surface_id);
        self.settle();
        result
    }

    pub(crate) fn rotate_inner(
        &mut self,
        control_id: &ControlId,
        clockwise: bool,
        surface_id: Option<&str>,
    ) -> ControlResult<bool> {
        let Some(control) = self.controls.get_mut(control_id) else {
            return Ok(self.unknown_control(control_id));
        };
        if control.as_page().is_some() {
            return Ok(false);
        }
        let pushable = control
            .as_pushed_mut()
            .ok_or_else(|| ControlError::not_supported(control_id, Capability::PushedState))?;
        let mut ctx = ControlContext {
            scheduler: &mut self.scheduler,
            runner: &mut self.runner,
        };
        let handled = pushable.rotate(clockwise, surface_id, &mut ctx);
        self.sync_running(control_id);
        Ok(handled)
    }

    /// Notify mirrors and redraw after a pushed-state change
    pub(crate) fn pushed_changed(
        &mut self,
        control_id: &ControlId,
        pushed: bool,
        surface_id: Option<&str>,
    ) {
        if let Some(location) = control_id.location() {
            self.services
                .mirror
                .update_button_state(&location, pushed, surface_id);
        }
        self.request_redraw(control_id);
    }

    // =========================================================================
    // Timers and deferred work
    // =========================================================================

    /// Fire every timer due at `now`, returning how many fired
    pub fn run_due_timers(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(due) = self.scheduler.pop_due(now) {
            fired += 1;
            self.handle_timer(due.owner, due.job);
            self.settle();
        }
        fired
    }

    fn handle_timer(&mut self, owner: TimerOwner, job: TimerJob) {
        match (owner, job) {
            (TimerOwner::Actions(control_id), TimerJob::RunAction { action, extras }) => {
                self.runner.execute(&action, &extras);
                self.sync_running(&control_id);
            }
            (TimerOwner::Hold(control_id, surface_id), TimerJob::HoldSet { set_id }) => {
                if let Some(pushable) = self
                    .controls
                    .get_mut(&control_id)
                    .and_then(|c| c.as_pushed_mut())
                {
                    let mut ctx = ControlContext {
                        scheduler: &mut self.scheduler,
                        runner: &mut self.runner,
                    };
                    pushable.hold_elapsed(&surface_id, set_id, &mut ctx);
                }
                self.sync_running(&control_id);
            }
            (TimerOwner::TriggerEvent(control_id), TimerJob::FireEvent { event_id }) => {
                self.deferred.push_back(Firing {
                    control_id,
                    event_id,
                });
            }
            (TimerOwner::Redraw, TimerJob::FlushRedraw) => self.flush_redraws(),
            (owner, job) => warn!("Ignoring mismatched timer {:?} / {:?}", owner, job),
        }
    }

    /// Drain queued internal actions and trigger firings
    pub(crate) fn settle(&mut self) {
        let mut iterations = 0;
        loop {
            if iterations >= self.settings.max_deferred_iterations {
                let dropped = self.runner.clear_internal() + self.deferred.len();
                self.deferred.clear();
                warn!(
                    "Stopped after {} deferred steps, dropped {} (action loop?)",
                    iterations, dropped
                );
                break;
            }
            if let Some((action, extras)) = self.runner.take_internal() {
                self.run_internal(&action, &extras);
            } else if let Some(firing) = self.deferred.pop_front() {
                self.fire_trigger_event(&firing);
            } else {
                break;
            }
            iterations += 1;
        }
    }
}
