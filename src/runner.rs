//! ActionRunner - executes ordered action lists with delays
//!
//! Zero-delay actions run synchronously in list order. Every delayed action
//! gets its own timer owned by the control, so delayed actions may complete
//! out of list order when their delays are out of order.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

use crate::host::{ModuleDispatch, RunActionExtras};
use crate::model::{ActionInstance, ControlId};
use crate::scheduler::{Scheduler, TimerJob, TimerOwner};

/// Effective delay of each action in invocation order
///
/// Relative mode chains delays cumulatively; absolute mode uses each delay
/// verbatim from the invocation time.
pub fn effective_delays(actions: &[ActionInstance], relative: bool) -> Vec<u64> {
    let mut total = 0u64;
    actions
        .iter()
        .map(|action| {
            if relative {
                total = total.saturating_add(action.delay);
                total
            } else {
                action.delay
            }
        })
        .collect()
}

pub struct ActionRunner {
    modules: ModuleDispatch,
    /// Actions for the internal pseudo-connection, drained by the controller
    internal: VecDeque<(ActionInstance, RunActionExtras)>,
}

impl ActionRunner {
    pub fn new(modules: ModuleDispatch) -> Self {
        Self {
            modules,
            internal: VecDeque::new(),
        }
    }

    pub fn modules(&self) -> &ModuleDispatch {
        &self.modules
    }

    /// Run a list of actions for one control invocation
    ///
    /// Disabled actions are skipped. Returns the number of timers scheduled.
    pub fn run_multiple(
        &mut self,
        scheduler: &mut Scheduler,
        actions: &[ActionInstance],
        extras: &RunActionExtras,
        relative_delay: bool,
    ) -> usize {
        let enabled: Vec<ActionInstance> = actions.iter().filter(|a| !a.disabled).cloned().collect();
        let delays = effective_delays(&enabled, relative_delay);

        let mut scheduled = 0;
        for (action, delay) in enabled.into_iter().zip(delays) {
            if delay == 0 {
                self.execute(&action, extras);
            } else {
                scheduler.schedule(
                    TimerOwner::Actions(extras.control_id.clone()),
                    Duration::from_millis(delay),
                    TimerJob::RunAction {
                        action,
                        extras: extras.clone(),
                    },
                );
                scheduled += 1;
            }
        }

        if scheduled > 0 {
            debug!(
                "Control {} has {} delayed action(s) pending",
                extras.control_id, scheduled
            );
        }
        scheduled
    }

    /// Execute one action now
    pub fn execute(&mut self, action: &ActionInstance, extras: &RunActionExtras) {
        trace!(
            "Running {}.{} ({}) for {}",
            action.connection_id,
            action.definition_id,
            action.id,
            extras.control_id
        );
        if action.is_internal() {
            self.internal.push_back((action.clone(), extras.clone()));
        } else {
            self.modules.action_run(action, extras);
        }
    }

    pub fn take_internal(&mut self) -> Option<(ActionInstance, RunActionExtras)> {
        self.internal.pop_front()
    }

    pub fn clear_internal(&mut self) -> usize {
        let count = self.internal.len();
        self.internal.clear();
        count
    }

    /// Whether a control still has delayed actions pending
    pub fn is_running(scheduler: &Scheduler, control_id: &ControlId) -> bool {
        scheduler.count_where(|owner| matches!(owner, TimerOwner::Actions(id) if id == control_id)) > 0
    }

    /// Cancel every delayed action of one control
    pub fn abort_control(scheduler: &mut Scheduler, control_id: &ControlId) -> usize {
        scheduler.cancel_where(|owner| matches!(owner, TimerOwner::Actions(id) if id == control_id))
    }

    /// Cancel every delayed action, returning the controls that were running
    pub fn abort_all(scheduler: &mut Scheduler) -> Vec<ControlId> {
        let mut running = Vec::new();
        scheduler.cancel_where(|owner| match owner {
            TimerOwner::Actions(id) => {
                if !running.contains(id) {
                    running.push(id.clone());
                }
                true
            }
            _ => false,
        });
        running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{action, flush_tasks, TestHarness};
    use crate::model::INTERNAL_CONNECTION;
    use proptest::prelude::*;
    use tokio::time::Instant;

    fn extras(id: &str) -> RunActionExtras {
        RunActionExtras::new(ControlId::new(id), Some("desk".into()))
    }

    #[test]
    fn test_relative_delays_chain() {
        let actions = vec![
            action("a").with_delay(100),
            action("b"),
            action("c").with_delay(50),
        ];
        assert_eq!(effective_delays(&actions, true), vec![100, 100, 150]);
        assert_eq!(effective_delays(&actions, false), vec![100, 0, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_runs_in_order_and_delayed_are_scheduled() {
        let harness = TestHarness::new();
        let mut scheduler = Scheduler::new();
        let mut runner = ActionRunner::new(harness.services.modules.clone());

        let actions = vec![
            action("slow").with_delay(200),
            action("one"),
            action("fast").with_delay(100),
            action("two"),
        ];
        let scheduled = runner.run_multiple(&mut scheduler, &actions, &extras("loc:1/0/0"), false);
        assert_eq!(scheduled, 2);
        assert!(ActionRunner::is_running(&scheduler, &ControlId::new("loc:1/0/0")));

        flush_tasks().await;
        assert_eq!(harness.host.runs(), vec!["one", "two"]);

        // Delays are independent, so "fast" overtakes "slow"
        tokio::time::advance(Duration::from_millis(250)).await;
        while let Some(due) = scheduler.pop_due(Instant::now()) {
            if let TimerJob::RunAction { action, extras } = due.job {
                runner.execute(&action, &extras);
            }
        }
        flush_tasks().await;
        assert_eq!(harness.host.runs(), vec!["one", "two", "fast", "slow"]);
        assert!(!ActionRunner::is_running(&scheduler, &ControlId::new("loc:1/0/0")));
    }

    #[tokio::test]
    async fn test_disabled_and_internal_actions() {
        let harness = TestHarness::new();
        let mut scheduler = Scheduler::new();
        let mut runner = ActionRunner::new(harness.services.modules.clone());

        let mut off = action("off");
        off.disabled = true;
        let internal = ActionInstance::new("i", INTERNAL_CONNECTION, "panic");

        runner.run_multiple(&mut scheduler, &[off, internal], &extras("loc:1/0/1"), true);
        flush_tasks().await;

        assert!(harness.host.runs().is_empty());
        let (queued, _) = runner.take_internal().unwrap();
        assert_eq!(queued.definition_id, "panic");
        assert!(runner.take_internal().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_control_leaves_other_controls() {
        let harness = TestHarness::new();
        let mut scheduler = Scheduler::new();
        let mut runner = ActionRunner::new(harness.services.modules.clone());
        let delayed = [action("x").with_delay(100)];

        runner.run_multiple(&mut scheduler, &delayed, &extras("loc:1/0/0"), false);
        runner.run_multiple(&mut scheduler, &delayed, &extras("loc:1/0/1"), false);

        assert_eq!(ActionRunner::abort_control(&mut scheduler, &ControlId::new("loc:1/0/0")), 1);
        assert!(!ActionRunner::is_running(&scheduler, &ControlId::new("loc:1/0/0")));
        assert!(ActionRunner::is_running(&scheduler, &ControlId::new("loc:1/0/1")));

        let aborted = ActionRunner::abort_all(&mut scheduler);
        assert_eq!(aborted, vec![ControlId::new("loc:1/0/1")]);
        assert_eq!(scheduler.active_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_relative_delays_are_prefix_sums(delays in proptest::collection::vec(0u64..10_000, 0..20)) {
            let actions: Vec<ActionInstance> = delays
                .iter()
                .enumerate()
                .map(|(i, d)| action(&i.to_string()).with_delay(*d))
                .collect();

            let relative = effective_delays(&actions, true);
            let absolute = effective_delays(&actions, false);

            prop_assert_eq!(&absolute, &delays);
            prop_assert!(relative.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(relative.last().copied().unwrap_or(0), delays.iter().sum::<u64>());
        }
    }
}
