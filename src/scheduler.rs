//! Deadline-ordered timer queue owned by the controller
//!
//! Timers never run on their own task. The engine actor asks for the next
//! deadline, sleeps until then and pops whatever is due, so every firing is
//! processed in the same single-threaded turn model as presses and CRUD
//! calls. Cancellation is a map removal and cannot race a firing.
//!
//! Timers with equal deadlines pop in the order they were scheduled.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::host::RunActionExtras;
use crate::model::{ActionInstance, ActionSetId, ControlId, SurfaceId};

/// Handle to a pending timer
pub type TimerId = u64;

/// Who a timer belongs to, used for bulk cancellation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerOwner {
    /// Delayed action of a control; counts towards its running state
    Actions(ControlId),
    /// Hold-while-held timer of one surface pressing a control
    Hold(ControlId, SurfaceId),
    /// Delayed startup/client-connect event of a trigger
    TriggerEvent(ControlId),
    /// Debounced redraw flush
    Redraw,
}

impl TimerOwner {
    pub fn control_id(&self) -> Option<&ControlId> {
        match self {
            TimerOwner::Actions(id) | TimerOwner::Hold(id, _) | TimerOwner::TriggerEvent(id) => {
                Some(id)
            }
            TimerOwner::Redraw => None,
        }
    }
}

/// What to do when a timer fires
#[derive(Debug, Clone, PartialEq)]
pub enum TimerJob {
    RunAction {
        action: ActionInstance,
        extras: RunActionExtras,
    },
    HoldSet {
        set_id: ActionSetId,
    },
    FireEvent {
        event_id: String,
    },
    FlushRedraw,
}

#[derive(Debug)]
struct PendingTimer {
    deadline: Instant,
    owner: TimerOwner,
    job: TimerJob,
}

/// A timer popped from the queue
#[derive(Debug, Clone, PartialEq)]
pub struct DueTimer {
    pub id: TimerId,
    pub owner: TimerOwner,
    pub job: TimerJob,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    /// (deadline, id) -> id; id doubles as the FIFO sequence number
    queue: BTreeMap<(Instant, TimerId), TimerId>,
    timers: HashMap<TimerId, PendingTimer>,
    next_id: TimerId,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a job `delay` from now
    pub fn schedule(&mut self, owner: TimerOwner, delay: Duration, job: TimerJob) -> TimerId {
        self.schedule_at(Instant::now() + delay, owner, job)
    }

    pub fn schedule_at(&mut self, deadline: Instant, owner: TimerOwner, job: TimerJob) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;

        trace!(id, ?owner, "Timer set");
        self.queue.insert((deadline, id), id);
        self.timers.insert(
            id,
            PendingTimer {
                deadline,
                owner,
                job,
            },
        );
        id
    }

    /// Cancel a timer. No-op if it doesn't exist or has already fired.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.remove(&id) {
            Some(timer) => {
                self.queue.remove(&(timer.deadline, id));
                trace!(id, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every timer whose owner matches, returning how many were removed
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&TimerOwner) -> bool) -> usize {
        let ids: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, timer)| predicate(&timer.owner))
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            self.cancel(*id);
        }
        ids.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        self.queue.clear();
        self.timers.clear();
        count
    }

    pub fn count_where(&self, mut predicate: impl FnMut(&TimerOwner) -> bool) -> usize {
        self.timers
            .values()
            .filter(|timer| predicate(&timer.owner))
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest timer whose deadline is at or before `now`
    ///
    /// Callers pop one at a time so that a firing may cancel later timers.
    pub fn pop_due(&mut self, now: Instant) -> Option<DueTimer> {
        let (&(deadline, id), _) = self.queue.iter().next()?;
        if deadline > now {
            return None;
        }
        self.queue.remove(&(deadline, id));
        let timer = self.timers.remove(&id)?;
        trace!(id, owner = ?timer.owner, "Timer fired");
        Some(DueTimer {
            id,
            owner: timer.owner,
            job: timer.job,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: &str) -> TimerOwner {
        TimerOwner::Actions(ControlId::new(id))
    }

    fn event(id: &str) -> TimerJob {
        TimerJob::FireEvent {
            event_id: id.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pops_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(owner("a"), Duration::from_millis(300), event("late"));
        scheduler.schedule(owner("a"), Duration::from_millis(100), event("early"));

        assert!(scheduler.pop_due(Instant::now()).is_none());

        tokio::time::advance(Duration::from_millis(500)).await;
        let now = Instant::now();
        assert_eq!(scheduler.pop_due(now).unwrap().job, event("early"));
        assert_eq!(scheduler.pop_due(now).unwrap().job, event("late"));
        assert!(scheduler.pop_due(now).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_deadlines_keep_schedule_order() {
        let mut scheduler = Scheduler::new();
        let deadline = Instant::now() + Duration::from_millis(50);
        scheduler.schedule_at(deadline, owner("a"), event("first"));
        scheduler.schedule_at(deadline, owner("b"), event("second"));

        let popped = scheduler.pop_due(deadline).unwrap();
        assert_eq!(popped.job, event("first"));
        assert_eq!(popped.owner, owner("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_where_only_touches_matching_owner() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(owner("a"), Duration::from_millis(10), event("a1"));
        scheduler.schedule(owner("a"), Duration::from_millis(20), event("a2"));
        scheduler.schedule(owner("b"), Duration::from_millis(30), event("b1"));

        let a = owner("a");
        assert_eq!(scheduler.cancel_where(|o| *o == a), 2);
        assert_eq!(scheduler.active_count(), 1);

        tokio::time::advance(Duration::from_millis(50)).await;
        let popped = scheduler.pop_due(Instant::now()).unwrap();
        assert_eq!(popped.owner, owner("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_and_all() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule(TimerOwner::Redraw, Duration::from_millis(10), TimerJob::FlushRedraw);
        scheduler.schedule(owner("a"), Duration::from_millis(10), event("x"));

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.count_where(|o| *o == TimerOwner::Redraw), 0);

        assert_eq!(scheduler.cancel_all(), 1);
        assert!(scheduler.next_deadline().is_none());
    }
}
