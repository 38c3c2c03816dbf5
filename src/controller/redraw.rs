//! Debounced redraw requests

use std::collections::BTreeSet;
use std::time::Duration;
use tracing::trace;

use crate::model::{referenced_variables, ControlId, DrawStyle, UnparsedStyle};
use crate::scheduler::{Scheduler, TimerId, TimerJob, TimerOwner};

/// Controls waiting to be redrawn, flushed once per debounce window
#[derive(Debug)]
pub struct RedrawQueue {
    pending: BTreeSet<ControlId>,
    timer: Option<TimerId>,
    debounce: Duration,
    /// Total requests accepted, duplicates within a window included
    requests: u64,
}

impl RedrawQueue {
    pub fn new(debounce: Duration) -> Self {
        Self {
            pending: BTreeSet::new(),
            timer: None,
            debounce,
            requests: 0,
        }
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    pub fn request(&mut self, control_id: &ControlId, scheduler: &mut Scheduler) {
        self.requests += 1;
        self.pending.insert(control_id.clone());
        if self.timer.is_none() {
            self.timer = Some(scheduler.schedule(
                TimerOwner::Redraw,
                self.debounce,
                TimerJob::FlushRedraw,
            ));
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn is_pending(&self, control_id: &ControlId) -> bool {
        self.pending.contains(control_id)
    }

    /// Drain pending controls, cancelling the flush timer if still armed
    pub fn take(&mut self, scheduler: &mut Scheduler) -> BTreeSet<ControlId> {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
        std::mem::take(&mut self.pending)
    }
}

impl super::Controller {
    /// Draw every pending control now
    pub fn flush_redraws(&mut self) {
        let pending = self.redraw.take(&mut self.scheduler);
        for control_id in pending {
            let style = match self.controls.get(&control_id) {
                Some(control) => control.draw_style(&self.services.modules),
                // Removed grid buttons are drawn blank
                None if !control_id.is_trigger() => {
                    Some(DrawStyle::Button(UnparsedStyle::default()))
                }
                None => None,
            };
            if let Some(style) = style {
                trace!("Drawing {}", control_id);
                self.services.renderer.draw_control(&control_id, &style);
            }
        }
    }

    /// Redraw controls whose text references one of the changed variables
    ///
    /// Returns the number of controls scheduled for redraw.
    pub fn on_variables_changed(&mut self, changed: &[String]) -> usize {
        if changed.is_empty() {
            return 0;
        }
        let affected: Vec<ControlId> = self
            .controls
            .iter()
            .filter(|(_, control)| {
                control
                    .as_feedbacks()
                    .and_then(|f| f.base_style())
                    .map(|style| {
                        referenced_variables(&style.text)
                            .iter()
                            .any(|name| changed.contains(name))
                    })
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for control_id in &affected {
            self.request_redraw(control_id);
        }
        affected.len()
    }
}
