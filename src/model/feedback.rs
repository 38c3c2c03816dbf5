//! Feedback instances

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a feedback's value participates in style composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    /// Truthy value applies the instance's style override
    Boolean,
    /// Object value is merged into the style as-is
    Advanced,
}

/// A module-reported value bound to a control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInstance {
    pub id: String,
    #[serde(rename = "instance_id")]
    pub connection_id: String,
    #[serde(rename = "type")]
    pub definition_id: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    /// Partial style override applied when a boolean feedback is truthy
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub style: Map<String, Value>,
    #[serde(rename = "isInverted", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_inverted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl FeedbackInstance {
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
            style: Map::new(),
            is_inverted: false,
            disabled: false,
        }
    }

    pub fn with_style(mut self, key: &str, value: Value) -> Self {
        self.style.insert(key.to_string(), value);
        self
    }
}

/// JavaScript-style truthiness of a cached value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("on")));
        assert!(is_truthy(&json!({})));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn test_feedback_wire_names() {
        let fb = FeedbackInstance::new("f1", "atem", "tally").with_style("bgcolor", json!(255));
        let value = serde_json::to_value(&fb).unwrap();
        assert_eq!(value["instance_id"], "atem");
        assert_eq!(value["type"], "tally");
        assert_eq!(value["style"]["bgcolor"], 255);
        assert!(value.get("isInverted").is_none());
    }
}
