//! Clock-driven trigger events: tick intervals and time of day

use chrono::{DateTime, Datelike, Days, Local, NaiveTime, TimeZone};
use tracing::trace;

use super::Firing;
use crate::model::ControlId;

#[derive(Debug, Clone)]
struct IntervalEntry {
    control_id: ControlId,
    event_id: String,
    period: u64,
    last_fired: u64,
}

#[derive(Debug, Clone)]
struct TimeOfDayEntry {
    control_id: ControlId,
    event_id: String,
    time: NaiveTime,
    days: Vec<u32>,
    next: Option<DateTime<Local>>,
}

/// Interval and time-of-day registrations, advanced by an external tick
#[derive(Debug, Default)]
pub struct TimerEvents {
    last_tick: u64,
    intervals: Vec<IntervalEntry>,
    time_of_day: Vec<TimeOfDayEntry>,
}

impl TimerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// Register an interval; counting starts from the last tick seen
    pub fn add_interval(&mut self, control_id: &ControlId, event_id: &str, period: u64) {
        self.remove(control_id, event_id);
        self.intervals.push(IntervalEntry {
            control_id: control_id.clone(),
            event_id: event_id.to_string(),
            period,
            last_fired: self.last_tick,
        });
    }

    pub fn add_time_of_day(
        &mut self,
        control_id: &ControlId,
        event_id: &str,
        time: NaiveTime,
        days: Vec<u32>,
        now: DateTime<Local>,
    ) {
        self.remove(control_id, event_id);
        let next = next_execution(&now, time, &days);
        trace!("Time-of-day event {} next at {:?}", event_id, next);
        self.time_of_day.push(TimeOfDayEntry {
            control_id: control_id.clone(),
            event_id: event_id.to_string(),
            time,
            days,
            next,
        });
    }

    pub fn remove(&mut self, control_id: &ControlId, event_id: &str) {
        self.intervals
            .retain(|e| !(e.control_id == *control_id && e.event_id == event_id));
        self.time_of_day
            .retain(|e| !(e.control_id == *control_id && e.event_id == event_id));
    }

    pub fn clear_control(&mut self, control_id: &ControlId) {
        self.intervals.retain(|e| e.control_id != *control_id);
        self.time_of_day.retain(|e| e.control_id != *control_id);
    }

    pub fn len(&self) -> usize {
        self.intervals.len() + self.time_of_day.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance to `tick` and collect everything due
    pub fn on_tick(&mut self, tick: u64, now: DateTime<Local>) -> Vec<Firing> {
        self.last_tick = tick;
        let mut due = Vec::new();

        for entry in &mut self.intervals {
            if tick.saturating_sub(entry.last_fired) >= entry.period {
                entry.last_fired = tick;
                due.push(Firing::new(&entry.control_id, &entry.event_id));
            }
        }

        for entry in &mut self.time_of_day {
            let Some(next) = entry.next else {
                continue;
            };
            if now >= next {
                entry.next = next_execution(&now, entry.time, &entry.days);
                due.push(Firing::new(&entry.control_id, &entry.event_id));
            }
        }

        due
    }
}

/// Next moment strictly after `now` at `time` on one of `days` (0 = Sunday)
///
/// Starts from today, rolls one day forward if the time already passed, then
/// to the nearest allowed weekday. Local times that do not exist (DST gaps)
/// are skipped.
pub fn next_execution<Tz: TimeZone>(
    now: &DateTime<Tz>,
    time: NaiveTime,
    days: &[u32],
) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    (0..=7u64).find_map(|offset| {
        let date = today.checked_add_days(Days::new(offset))?;
        if !days.contains(&date.weekday().num_days_from_sunday()) {
            return None;
        }
        let candidate = now
            .timezone()
            .from_local_datetime(&date.and_time(time))
            .earliest()?;
        (candidate > *now).then_some(candidate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc, Weekday};
    use proptest::prelude::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_interval_fires_every_period_after_enable() {
        let control = ControlId::for_trigger("t");
        let mut timers = TimerEvents::new();
        let now = Local::now();
        for tick in 1..=3 {
            timers.on_tick(tick, now);
        }

        timers.add_interval(&control, "e", 5);
        let fired: Vec<u64> = (4..=18)
            .filter(|tick| !timers.on_tick(*tick, now).is_empty())
            .collect();
        assert_eq!(fired, vec![8, 13, 18]);
    }

    #[test]
    fn test_reregistering_resets_baseline() {
        let control = ControlId::for_trigger("t");
        let mut timers = TimerEvents::new();
        let now = Local::now();
        timers.add_interval(&control, "e", 2);
        timers.clear_control(&control);
        for tick in 1..=10 {
            assert!(timers.on_tick(tick, now).is_empty());
        }

        timers.add_interval(&control, "e", 2);
        assert!(timers.on_tick(11, now).is_empty());
        assert_eq!(timers.on_tick(12, now).len(), 1);
    }

    #[test]
    fn test_time_of_day_later_today() {
        // 2024-06-05 is a Wednesday
        let now = utc("2024-06-05T08:00:00Z");
        let next = next_execution(&now, hms(9, 30, 0), &[3]).unwrap();
        assert_eq!(next, utc("2024-06-05T09:30:00Z"));
    }

    #[test]
    fn test_time_of_day_rolls_to_next_allowed_day() {
        let now = utc("2024-06-05T10:00:00Z");
        let next = next_execution(&now, hms(9, 30, 0), &[3]).unwrap();
        assert_eq!(next, utc("2024-06-12T09:30:00Z"));

        let next = next_execution(&now, hms(9, 30, 0), &[0, 5]).unwrap();
        assert_eq!(next.weekday(), Weekday::Fri);
        assert_eq!(next, utc("2024-06-07T09:30:00Z"));
    }

    #[test]
    fn test_time_of_day_without_days_never_runs() {
        let now = utc("2024-06-05T10:00:00Z");
        assert!(next_execution(&now, hms(9, 30, 0), &[]).is_none());
    }

    #[test]
    fn test_time_of_day_fires_once_and_reschedules() {
        let control = ControlId::for_trigger("t");
        let mut timers = TimerEvents::new();
        let now = Local::now();
        timers.add_time_of_day(&control, "e", hms(12, 0, 0), (0..7).collect(), now);

        assert!(timers.on_tick(1, now).is_empty());
        let later = now + Duration::days(2);
        assert_eq!(timers.on_tick(2, later).len(), 1);
        assert!(timers.on_tick(3, later).is_empty());
    }

    proptest! {
        #[test]
        fn prop_next_execution_is_future_allowed_and_within_a_week(
            secs in 0i64..(3 * 365 * 86_400),
            h in 0u32..24, m in 0u32..60, s in 0u32..60,
            days in proptest::collection::btree_set(0u32..7, 1..7),
        ) {
            let now = utc("2023-01-01T00:00:00Z") + Duration::seconds(secs);
            let days: Vec<u32> = days.into_iter().collect();
            let next = next_execution(&now, hms(h, m, s), &days).unwrap();

            prop_assert!(next > now);
            prop_assert!(next - now <= Duration::days(8));
            prop_assert_eq!(next.time(), hms(h, m, s));
            prop_assert!(days.contains(&next.weekday().num_days_from_sunday()));
        }
    }
}
