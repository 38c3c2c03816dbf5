//! Trigger events and their typed options

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Kind of event that can fire a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEventType {
    Interval,
    #[serde(rename = "timeofday")]
    TimeOfDay,
    Startup,
    ClientConnect,
    ButtonPress,
    ButtonDepress,
}

impl TriggerEventType {
    /// Options a freshly added event starts with
    pub fn default_options(&self) -> Map<String, Value> {
        let value = match self {
            TriggerEventType::Interval => json!({ "seconds": 10 }),
            TriggerEventType::TimeOfDay => {
                json!({ "time": "00:00:00", "days": [0, 1, 2, 3, 4, 5, 6] })
            }
            TriggerEventType::Startup => json!({ "delay": 10000 }),
            TriggerEventType::ClientConnect => json!({ "delay": 0 }),
            TriggerEventType::ButtonPress | TriggerEventType::ButtonDepress => json!({}),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// An automation event owned by exactly one trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TriggerEventType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub options: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl TriggerEvent {
    pub fn new(id: impl Into<String>, kind: TriggerEventType) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
            options: kind.default_options(),
        }
    }

    /// Interpret the raw options according to the event type
    pub fn schedule(&self) -> Option<EventSchedule> {
        let options = Value::Object(self.options.clone());
        match self.kind {
            TriggerEventType::Interval => {
                let opts: IntervalOptions = serde_json::from_value(options).ok()?;
                (opts.seconds > 0).then_some(EventSchedule::Interval {
                    period_ticks: opts.seconds,
                })
            }
            TriggerEventType::TimeOfDay => {
                let opts: TimeOfDayOptions = serde_json::from_value(options).ok()?;
                let time = NaiveTime::parse_from_str(&opts.time, "%H:%M:%S").ok()?;
                let days = opts.days.into_iter().filter(|d| *d < 7).collect();
                Some(EventSchedule::TimeOfDay { time, days })
            }
            TriggerEventType::Startup => {
                let opts: DelayOptions = serde_json::from_value(options).ok()?;
                Some(EventSchedule::Startup {
                    delay_ms: opts.delay,
                })
            }
            TriggerEventType::ClientConnect => {
                let opts: DelayOptions = serde_json::from_value(options).ok()?;
                Some(EventSchedule::ClientConnect {
                    delay_ms: opts.delay,
                })
            }
            TriggerEventType::ButtonPress => Some(EventSchedule::ControlPress { pressed: true }),
            TriggerEventType::ButtonDepress => {
                Some(EventSchedule::ControlPress { pressed: false })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntervalOptions {
    seconds: u64,
}

#[derive(Debug, Deserialize)]
struct TimeOfDayOptions {
    time: String,
    #[serde(default)]
    days: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct DelayOptions {
    #[serde(default)]
    delay: u64,
}

/// Validated registration parameters of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventSchedule {
    Interval { period_ticks: u64 },
    /// `days` uses 0 = Sunday .. 6 = Saturday
    TimeOfDay { time: NaiveTime, days: Vec<u32> },
    Startup { delay_ms: u64 },
    ClientConnect { delay_ms: u64 },
    ControlPress { pressed: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_into_schedules() {
        for kind in [
            TriggerEventType::Interval,
            TriggerEventType::TimeOfDay,
            TriggerEventType::Startup,
            TriggerEventType::ClientConnect,
            TriggerEventType::ButtonPress,
            TriggerEventType::ButtonDepress,
        ] {
            let event = TriggerEvent::new("e", kind);
            assert!(event.schedule().is_some(), "{:?} default should be valid", kind);
        }
    }

    #[test]
    fn test_bad_options_have_no_schedule() {
        let mut event = TriggerEvent::new("e", TriggerEventType::Interval);
        event.options.insert("seconds".into(), json!(0));
        assert!(event.schedule().is_none());

        let mut event = TriggerEvent::new("e", TriggerEventType::TimeOfDay);
        event.options.insert("time".into(), json!("25:00:00"));
        assert!(event.schedule().is_none());
    }

    #[test]
    fn test_type_wire_names() {
        let value = serde_json::to_value(TriggerEventType::TimeOfDay).unwrap();
        assert_eq!(value, json!("timeofday"));
        let value = serde_json::to_value(TriggerEventType::ClientConnect).unwrap();
        assert_eq!(value, json!("client_connect"));
    }
}
