//! System-driven trigger events: startup, client connect and control presses

use std::time::Duration;
use tracing::debug;

use super::Firing;
use crate::model::ControlId;
use crate::scheduler::{Scheduler, TimerJob, TimerOwner};

#[derive(Debug, Clone, Copy, PartialEq)]
enum MiscKind {
    Startup { delay_ms: u64 },
    ClientConnect { delay_ms: u64 },
    ControlPress { pressed: bool },
}

#[derive(Debug, Clone)]
struct MiscEntry {
    control_id: ControlId,
    event_id: String,
    kind: MiscKind,
}

#[derive(Debug, Default)]
pub struct MiscEvents {
    entries: Vec<MiscEntry>,
    ready: bool,
}

impl MiscEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, control_id: &ControlId, event_id: &str, kind: MiscKind) {
        self.remove(control_id, event_id);
        self.entries.push(MiscEntry {
            control_id: control_id.clone(),
            event_id: event_id.to_string(),
            kind,
        });
    }

    pub fn add_startup(&mut self, control_id: &ControlId, event_id: &str, delay_ms: u64) {
        self.add(control_id, event_id, MiscKind::Startup { delay_ms });
    }

    pub fn add_client_connect(&mut self, control_id: &ControlId, event_id: &str, delay_ms: u64) {
        self.add(control_id, event_id, MiscKind::ClientConnect { delay_ms });
    }

    pub fn add_control_press(&mut self, control_id: &ControlId, event_id: &str, pressed: bool) {
        self.add(control_id, event_id, MiscKind::ControlPress { pressed });
    }

    pub fn remove(&mut self, control_id: &ControlId, event_id: &str) {
        self.entries
            .retain(|e| !(e.control_id == *control_id && e.event_id == event_id));
    }

    pub fn clear_control(&mut self, control_id: &ControlId) {
        self.entries.retain(|e| e.control_id != *control_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The process finished starting; only the first call fires startup events
    pub fn on_ready(&mut self, scheduler: &mut Scheduler) -> Vec<Firing> {
        if self.ready {
            return Vec::new();
        }
        self.ready = true;
        self.fire_delayed(scheduler, |kind| match kind {
            MiscKind::Startup { delay_ms } => Some(delay_ms),
            _ => None,
        })
    }

    pub fn on_client_connect(&self, scheduler: &mut Scheduler) -> Vec<Firing> {
        self.fire_delayed(scheduler, |kind| match kind {
            MiscKind::ClientConnect { delay_ms } => Some(delay_ms),
            _ => None,
        })
    }

    /// A control reported a press or release
    ///
    /// Presses originating from a trigger (its id used as surface id) are
    /// ignored so triggers cannot fire each other in a loop.
    pub fn on_control_press(
        &self,
        control_id: &ControlId,
        pressed: bool,
        surface_id: Option<&str>,
    ) -> Vec<Firing> {
        if control_id.is_trigger() || surface_id.is_some_and(ControlId::str_is_trigger) {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| e.kind == MiscKind::ControlPress { pressed })
            .map(|e| Firing::new(&e.control_id, &e.event_id))
            .collect()
    }

    /// Zero delays fire now, the rest become `FireEvent` timers
    fn fire_delayed(
        &self,
        scheduler: &mut Scheduler,
        delay_of: impl Fn(MiscKind) -> Option<u64>,
    ) -> Vec<Firing> {
        let mut now = Vec::new();
        for entry in &self.entries {
            let Some(delay_ms) = delay_of(entry.kind) else {
                continue;
            };
            if delay_ms == 0 {
                now.push(Firing::new(&entry.control_id, &entry.event_id));
            } else {
                debug!(
                    "Trigger {} event {} in {}ms",
                    entry.control_id, entry.event_id, delay_ms
                );
                scheduler.schedule(
                    TimerOwner::TriggerEvent(entry.control_id.clone()),
                    Duration::from_millis(delay_ms),
                    TimerJob::FireEvent {
                        event_id: entry.event_id.clone(),
                    },
                );
            }
        }
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_startup_fires_once_with_delays_as_timers() {
        let t1 = ControlId::for_trigger("t1");
        let t2 = ControlId::for_trigger("t2");
        let mut misc = MiscEvents::new();
        let mut scheduler = Scheduler::new();
        misc.add_startup(&t1, "now", 0);
        misc.add_startup(&t2, "later", 500);

        let fired = misc.on_ready(&mut scheduler);
        assert_eq!(fired, vec![Firing::new(&t1, "now")]);
        assert_eq!(
            scheduler.count_where(|o| *o == TimerOwner::TriggerEvent(t2.clone())),
            1
        );
        assert!(misc.on_ready(&mut scheduler).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_connect_fires_every_time() {
        let t1 = ControlId::for_trigger("t1");
        let mut misc = MiscEvents::new();
        let mut scheduler = Scheduler::new();
        misc.add_client_connect(&t1, "e", 0);

        assert_eq!(misc.on_client_connect(&mut scheduler).len(), 1);
        assert_eq!(misc.on_client_connect(&mut scheduler).len(), 1);
    }

    #[test]
    fn test_control_press_ignores_trigger_sources() {
        let t1 = ControlId::for_trigger("t1");
        let button = ControlId::new("loc:1/0/0");
        let mut misc = MiscEvents::new();
        misc.add_control_press(&t1, "down", true);
        misc.add_control_press(&t1, "up", false);

        assert_eq!(
            misc.on_control_press(&button, true, Some("deck")),
            vec![Firing::new(&t1, "down")]
        );
        assert_eq!(
            misc.on_control_press(&button, false, None),
            vec![Firing::new(&t1, "up")]
        );
        assert!(misc
            .on_control_press(&button, true, Some(t1.as_str()))
            .is_empty());

        misc.remove(&t1, "down");
        assert!(misc.on_control_press(&button, true, None).is_empty());
    }
}
