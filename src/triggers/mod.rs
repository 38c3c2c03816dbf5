//! Trigger event sub-engines
//!
//! [`TimerEvents`] handles clock ticks, [`MiscEvents`] handles process and
//! control signals. Neither runs anything: they return [`Firing`]s that the
//! controller queues and executes after the current event source returns.

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::model::{ControlId, EventSchedule, TriggerEvent};
use crate::scheduler::{Scheduler, TimerOwner};

mod misc_events;
mod timer_events;

pub use misc_events::MiscEvents;
pub use timer_events::{next_execution, TimerEvents};

/// One event of one trigger that should run now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    pub control_id: ControlId,
    pub event_id: String,
}

impl Firing {
    pub fn new(control_id: &ControlId, event_id: &str) -> Self {
        Self {
            control_id: control_id.clone(),
            event_id: event_id.to_string(),
        }
    }
}

/// Registrations of every enabled event of every enabled trigger
#[derive(Debug, Default)]
pub struct TriggerEvents {
    pub timer: TimerEvents,
    pub misc: MiscEvents,
}

impl TriggerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one event; returns false if its options are unusable
    pub fn register(&mut self, control_id: &ControlId, event: &TriggerEvent, now: DateTime<Local>) -> bool {
        let Some(schedule) = event.schedule() else {
            warn!(
                "Trigger {} event {} has invalid {:?} options",
                control_id, event.id, event.kind
            );
            return false;
        };
        match schedule {
            EventSchedule::Interval { period_ticks } => {
                self.timer.add_interval(control_id, &event.id, period_ticks)
            }
            EventSchedule::TimeOfDay { time, days } => {
                self.timer
                    .add_time_of_day(control_id, &event.id, time, days, now)
            }
            EventSchedule::Startup { delay_ms } => {
                self.misc.add_startup(control_id, &event.id, delay_ms)
            }
            EventSchedule::ClientConnect { delay_ms } => {
                self.misc.add_client_connect(control_id, &event.id, delay_ms)
            }
            EventSchedule::ControlPress { pressed } => {
                self.misc.add_control_press(control_id, &event.id, pressed)
            }
        }
        true
    }

    pub fn unregister(&mut self, control_id: &ControlId, event_id: &str) {
        self.timer.remove(control_id, event_id);
        self.misc.remove(control_id, event_id);
    }

    /// Drop every registration and pending delayed firing of a trigger
    pub fn clear_control(&mut self, control_id: &ControlId, scheduler: &mut Scheduler) {
        self.timer.clear_control(control_id);
        self.misc.clear_control(control_id);
        scheduler.cancel_where(|owner| *owner == TimerOwner::TriggerEvent(control_id.clone()));
    }

    /// Re-register a trigger from scratch, or only clear it when disabled
    ///
    /// Re-registering restarts interval counting from the current tick.
    pub fn sync_control(
        &mut self,
        control_id: &ControlId,
        enabled: bool,
        events: &[TriggerEvent],
        now: DateTime<Local>,
        scheduler: &mut Scheduler,
    ) {
        self.clear_control(control_id, scheduler);
        if !enabled {
            debug!("Trigger {} disabled", control_id);
            return;
        }
        for event in events.iter().filter(|e| e.enabled) {
            self.register(control_id, event, now);
        }
    }
}
