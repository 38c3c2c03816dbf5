//! Action instances, action-set keys and steps

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Connection id of the engine's own pseudo-connection
pub const INTERNAL_CONNECTION: &str = "internal";

/// One module-executed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    /// Unique within the owning control
    pub id: String,
    /// Connection that executes this action
    #[serde(rename = "instance")]
    pub connection_id: String,
    /// Action definition id within the connection
    #[serde(rename = "action")]
    pub definition_id: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    /// Delay in milliseconds
    #[serde(default)]
    pub delay: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl ActionInstance {
    pub fn new(
        id: impl Into<String>,
        connection_id: impl Into<String>,
        definition_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            connection_id: connection_id.into(),
            definition_id: definition_id.into(),
            options: Map::new(),
            delay: 0,
            disabled: false,
        }
    }

    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn is_internal(&self) -> bool {
        self.connection_id == INTERNAL_CONNECTION
    }
}

/// Key of an action set
///
/// Serialized as a plain string so it can be used as a JSON object key:
/// `down`, `up`, `rotate_left`, `rotate_right` or a decimal duration in ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionSetId {
    Down,
    Up,
    RotateLeft,
    RotateRight,
    /// Hold-duration threshold in milliseconds
    Threshold(u64),
}

impl ActionSetId {
    /// Default set of flat controls (Timed release default, Trigger actions)
    pub const DEFAULT: ActionSetId = ActionSetId::Threshold(0);

    pub fn threshold(&self) -> Option<u64> {
        match self {
            ActionSetId::Threshold(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn is_threshold(&self) -> bool {
        self.threshold().is_some()
    }

    pub fn rotate(clockwise: bool) -> Self {
        if clockwise {
            ActionSetId::RotateRight
        } else {
            ActionSetId::RotateLeft
        }
    }
}

impl fmt::Display for ActionSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSetId::Down => f.write_str("down"),
            ActionSetId::Up => f.write_str("up"),
            ActionSetId::RotateLeft => f.write_str("rotate_left"),
            ActionSetId::RotateRight => f.write_str("rotate_right"),
            ActionSetId::Threshold(ms) => write!(f, "{}", ms),
        }
    }
}

impl FromStr for ActionSetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "down" => Ok(ActionSetId::Down),
            "up" => Ok(ActionSetId::Up),
            "rotate_left" => Ok(ActionSetId::RotateLeft),
            "rotate_right" => Ok(ActionSetId::RotateRight),
            other => other
                .parse::<u64>()
                .map(ActionSetId::Threshold)
                .map_err(|_| format!("invalid action set id '{}'", other)),
        }
    }
}

impl Serialize for ActionSetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ActionSetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered action lists keyed by set id
pub type ActionSets = BTreeMap<ActionSetId, Vec<ActionInstance>>;

/// Per-step options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOptions {
    /// Threshold sets fired while the button is still held
    #[serde(default)]
    pub run_while_held: BTreeSet<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Persisted shape of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepModel {
    #[serde(default)]
    pub action_sets: ActionSets,
    #[serde(default)]
    pub options: StepOptions,
}

impl Default for StepModel {
    fn default() -> Self {
        let mut action_sets = ActionSets::new();
        action_sets.insert(ActionSetId::Down, Vec::new());
        action_sets.insert(ActionSetId::Up, Vec::new());
        action_sets.insert(ActionSetId::RotateLeft, Vec::new());
        action_sets.insert(ActionSetId::RotateRight, Vec::new());
        Self {
            action_sets,
            options: StepOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_id_parse_and_display() {
        for raw in ["down", "up", "rotate_left", "rotate_right", "0", "1500"] {
            let id: ActionSetId = raw.parse().unwrap();
            assert_eq!(id.to_string(), raw);
        }
        assert!("sideways".parse::<ActionSetId>().is_err());
        assert!("-5".parse::<ActionSetId>().is_err());
    }

    #[test]
    fn test_sets_serialize_as_object_keys() {
        let mut sets = ActionSets::new();
        sets.insert(ActionSetId::Down, vec![]);
        sets.insert(ActionSetId::Threshold(1000), vec![]);
        let value = serde_json::to_value(&sets).unwrap();
        assert_eq!(value, json!({ "down": [], "1000": [] }));

        let back: ActionSets = serde_json::from_value(value).unwrap();
        assert_eq!(back, sets);
    }

    #[test]
    fn test_action_wire_names() {
        let action = ActionInstance::new("a1", "obs", "scene").with_delay(250);
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["instance"], "obs");
        assert_eq!(value["action"], "scene");
        assert_eq!(value["delay"], 250);
        assert!(value.get("disabled").is_none());
    }

    #[test]
    fn test_step_options_camel_case() {
        let step: StepModel = serde_json::from_value(json!({
            "action_sets": { "down": [], "up": [], "2000": [] },
            "options": { "runWhileHeld": [2000] }
        }))
        .unwrap();
        assert!(step.options.run_while_held.contains(&2000));
        assert!(step.action_sets.contains_key(&ActionSetId::Threshold(2000)));
    }
}
