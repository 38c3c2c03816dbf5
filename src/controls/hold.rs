//! Per-surface press tracking, hold-while-held timers and release-set selection

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use crate::model::{ActionSetId, ActionSets, ControlId, SurfaceId};
use crate::scheduler::{Scheduler, TimerJob, TimerOwner};

/// Pick the set a release runs after being held `duration_ms`
///
/// The largest positive threshold not exceeding the duration wins. Without
/// one, `up` runs, or the default set `0` when there is no `up`.
pub fn select_release_set(sets: &ActionSets, duration_ms: u64) -> Option<ActionSetId> {
    let threshold = sets
        .keys()
        .filter_map(ActionSetId::threshold)
        .filter(|t| *t > 0 && *t <= duration_ms)
        .max();

    match threshold {
        Some(t) => Some(ActionSetId::Threshold(t)),
        None if sets.contains_key(&ActionSetId::Up) => Some(ActionSetId::Up),
        None if sets.contains_key(&ActionSetId::DEFAULT) => Some(ActionSetId::DEFAULT),
        None => None,
    }
}

#[derive(Debug, Clone)]
struct HeldPress {
    step: Option<u32>,
    started: Instant,
}

/// Outcome of releasing a tracked press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// Step that was current when the press started
    pub step: Option<u32>,
    pub duration_ms: u64,
}

/// Presses currently held, keyed by originating surface
#[derive(Debug, Default)]
pub struct HoldTracker {
    held: HashMap<SurfaceId, HeldPress>,
}

impl HoldTracker {
    /// Start tracking a press and arm one timer per hold-while-held threshold
    pub fn press(
        &mut self,
        control_id: &ControlId,
        surface_id: &str,
        step: Option<u32>,
        run_while_held: &BTreeSet<u64>,
        scheduler: &mut Scheduler,
    ) {
        Self::cancel_timers(control_id, surface_id, scheduler);
        self.held.insert(
            surface_id.to_string(),
            HeldPress {
                step,
                started: Instant::now(),
            },
        );

        for threshold in run_while_held.iter().filter(|t| **t > 0) {
            scheduler.schedule(
                TimerOwner::Hold(control_id.clone(), surface_id.to_string()),
                Duration::from_millis(*threshold),
                TimerJob::HoldSet {
                    set_id: ActionSetId::Threshold(*threshold),
                },
            );
        }
    }

    /// Stop tracking a press, cancelling its hold timers
    pub fn release(
        &mut self,
        control_id: &ControlId,
        surface_id: &str,
        scheduler: &mut Scheduler,
    ) -> Option<Release> {
        Self::cancel_timers(control_id, surface_id, scheduler);
        let press = self.held.remove(surface_id)?;
        Some(Release {
            step: press.step,
            duration_ms: press.started.elapsed().as_millis() as u64,
        })
    }

    /// Step a still-held press started on
    pub fn held_step(&self, surface_id: &str) -> Option<Option<u32>> {
        self.held.get(surface_id).map(|p| p.step)
    }

    /// Forget every press and cancel every hold timer of the control
    pub fn clear(&mut self, control_id: &ControlId, scheduler: &mut Scheduler) {
        self.held.clear();
        scheduler.cancel_where(|owner| matches!(owner, TimerOwner::Hold(id, _) if id == control_id));
    }

    fn cancel_timers(control_id: &ControlId, surface_id: &str, scheduler: &mut Scheduler) {
        scheduler.cancel_where(|owner| {
            matches!(owner, TimerOwner::Hold(id, surface) if id == control_id && surface == surface_id)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(ids: &[ActionSetId]) -> ActionSets {
        ids.iter().map(|id| (*id, Vec::new())).collect()
    }

    #[test]
    fn test_release_selection() {
        let stepped = sets(&[
            ActionSetId::Down,
            ActionSetId::Up,
            ActionSetId::Threshold(1000),
            ActionSetId::Threshold(3000),
        ]);
        assert_eq!(select_release_set(&stepped, 0), Some(ActionSetId::Up));
        assert_eq!(select_release_set(&stepped, 999), Some(ActionSetId::Up));
        assert_eq!(select_release_set(&stepped, 1000), Some(ActionSetId::Threshold(1000)));
        assert_eq!(select_release_set(&stepped, 5000), Some(ActionSetId::Threshold(3000)));

        let timed = sets(&[ActionSetId::Down, ActionSetId::DEFAULT, ActionSetId::Threshold(1000)]);
        assert_eq!(select_release_set(&timed, 500), Some(ActionSetId::DEFAULT));
        assert_eq!(select_release_set(&timed, 1500), Some(ActionSetId::Threshold(1000)));

        assert_eq!(select_release_set(&sets(&[ActionSetId::Down]), 10), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_arms_and_release_cancels_hold_timers() {
        let mut scheduler = Scheduler::new();
        let mut tracker = HoldTracker::default();
        let id = ControlId::new("loc:1/0/0");
        let held: BTreeSet<u64> = [500, 2000].into_iter().collect();

        tracker.press(&id, "desk", Some(0), &held, &mut scheduler);
        tracker.press(&id, "tablet", Some(0), &BTreeSet::new(), &mut scheduler);
        assert_eq!(scheduler.active_count(), 2);
        assert_eq!(tracker.held_step("desk"), Some(Some(0)));

        tokio::time::advance(Duration::from_millis(750)).await;
        let release = tracker.release(&id, "desk", &mut scheduler).unwrap();
        assert_eq!(release.duration_ms, 750);
        assert_eq!(scheduler.active_count(), 0);

        // The other surface is still tracked independently
        assert!(tracker.release(&id, "tablet", &mut scheduler).is_some());
        assert!(tracker.release(&id, "tablet", &mut scheduler).is_none());
    }
}
