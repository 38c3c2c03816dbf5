//! Persisted control documents, options and runtime snapshots

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::action::{ActionSets, StepModel};
use super::event::TriggerEvent;
use super::feedback::FeedbackInstance;
use super::style::ButtonStyle;

/// Persisted control type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Press,
    /// Normal stepped button
    Button,
    Step,
    Timed,
    PageUp,
    PageDown,
    PageNum,
    Trigger,
}

impl ControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Press => "press",
            ControlType::Button => "button",
            ControlType::Step => "step",
            ControlType::Timed => "timed",
            ControlType::PageUp => "pageup",
            ControlType::PageDown => "pagedown",
            ControlType::PageNum => "pagenum",
            ControlType::Trigger => "trigger",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.to_string())).ok()
    }

    pub fn is_button(&self) -> bool {
        !matches!(self, ControlType::Trigger)
    }
}

impl std::fmt::Display for ControlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One JSON document per control id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDocument {
    #[serde(rename = "type")]
    pub kind: ControlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedbacks: Option<Vec<FeedbackInstance>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_sets: Option<ActionSets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<BTreeMap<u32, StepModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<TriggerEvent>>,
}

impl ControlDocument {
    pub fn empty(kind: ControlType) -> Self {
        Self {
            kind,
            style: None,
            options: None,
            feedbacks: None,
            action_sets: None,
            steps: None,
            events: None,
        }
    }

    /// Deserialize the options field, falling back to defaults when absent
    pub fn options_as<T: DeserializeOwned + Default>(&self) -> Result<T, serde_json::Error> {
        match &self.options {
            Some(value) => serde_json::from_value(value.clone()),
            None => Ok(T::default()),
        }
    }

    /// Same document with new action, feedback and event ids, for copies
    pub fn with_fresh_ids(mut self) -> Self {
        let fresh = || uuid::Uuid::new_v4().to_string();
        let sets = self
            .action_sets
            .iter_mut()
            .chain(self.steps.iter_mut().flat_map(|steps| {
                steps.values_mut().map(|step| &mut step.action_sets)
            }));
        for sets in sets {
            for action in sets.values_mut().flatten() {
                action.id = fresh();
            }
        }
        for feedback in self.feedbacks.iter_mut().flatten() {
            feedback.id = fresh();
        }
        for event in self.events.iter_mut().flatten() {
            event.id = fresh();
        }
        self
    }
}

/// Options shared by surface buttons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonOptions {
    /// Delays chain from the previous action instead of the invocation
    #[serde(default)]
    pub relative_delay: bool,
    #[serde(default)]
    pub rotary_actions: bool,
    #[serde(default = "default_true")]
    pub step_auto_progress: bool,
}

impl Default for ButtonOptions {
    fn default() -> Self {
        Self {
            relative_delay: false,
            rotary_actions: false,
            step_auto_progress: true,
        }
    }
}

/// Options of a trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOptions {
    #[serde(default = "default_trigger_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub relative_delay: bool,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            name: default_trigger_name(),
            enabled: true,
            sort_order: 0,
            relative_delay: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_trigger_name() -> String {
    "New Trigger".to_string()
}

/// Set one field of a serde options struct, rejecting unknown keys and mistyped values
pub fn set_option_field<T>(options: &mut T, key: &str, value: Value) -> bool
where
    T: Serialize + DeserializeOwned,
{
    let mut map = match serde_json::to_value(&*options) {
        Ok(Value::Object(map)) => map,
        _ => return false,
    };
    if !map.contains_key(key) {
        return false;
    }
    map.insert(key.to_string(), value);

    match serde_json::from_value::<T>(Value::Object(map)) {
        Ok(updated) => {
            *options = updated;
            true
        }
        Err(_) => false,
    }
}

/// Non-persisted runtime state, exposed separately from the document
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RuntimeSnapshot {
    pub pushed: bool,
    pub actions_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    /// Milliseconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_type_names() {
        assert_eq!(ControlType::from_str("pagenum"), Some(ControlType::PageNum));
        assert_eq!(ControlType::from_str("button"), Some(ControlType::Button));
        assert_eq!(ControlType::from_str("fader"), None);
        assert_eq!(ControlType::PageUp.to_string(), "pageup");
    }

    #[test]
    fn test_set_option_field() {
        let mut opts = ButtonOptions::default();
        assert!(set_option_field(&mut opts, "rotaryActions", json!(true)));
        assert!(opts.rotary_actions);

        assert!(!set_option_field(&mut opts, "rotaryActions", json!("yes")));
        assert!(opts.rotary_actions);

        assert!(!set_option_field(&mut opts, "noSuchOption", json!(true)));
    }

    #[test]
    fn test_fresh_ids_touch_every_section() {
        let doc: ControlDocument = serde_json::from_value(json!({
            "type": "button",
            "feedbacks": [ { "id": "f1", "instance_id": "obs", "type": "live" } ],
            "steps": {
                "0": { "action_sets": { "down": [ { "id": "a1", "instance": "obs", "action": "go" } ] } }
            }
        }))
        .unwrap();

        let copy = doc.clone().with_fresh_ids();
        let action = &copy.steps.as_ref().unwrap()[&0].action_sets[&crate::model::ActionSetId::Down][0];
        assert_ne!(action.id, "a1");
        assert_eq!(action.definition_id, "go");
        assert_ne!(copy.feedbacks.as_ref().unwrap()[0].id, "f1");
    }

    #[test]
    fn test_document_skips_absent_sections() {
        let doc = ControlDocument::empty(ControlType::PageUp);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!({ "type": "pageup" }));
    }
}
