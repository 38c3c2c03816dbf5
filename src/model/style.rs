//! Button styling: base style, composed style and draw requests

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the image payload inside an advanced feedback value
pub const IMAGE_BUFFER_KEY: &str = "imageBuffer";
/// Key of the optional placement of that payload
pub const IMAGE_BUFFER_POSITION_KEY: &str = "imageBufferPosition";

/// Style keys a base style accepts
pub const STYLE_KEYS: &[&str] = &[
    "text",
    "size",
    "color",
    "bgcolor",
    "alignment",
    "pngalignment",
    "png64",
    "show_topbar",
];

fn default_size() -> Value {
    Value::String("auto".to_string())
}

fn default_color() -> u32 {
    0xFF_FF_FF
}

fn default_alignment() -> String {
    "center:center".to_string()
}

/// Base (persisted) style of a button
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonStyle {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_size")]
    pub size: Value,
    #[serde(default = "default_color")]
    pub color: u32,
    #[serde(default)]
    pub bgcolor: u32,
    #[serde(default = "default_alignment")]
    pub alignment: String,
    #[serde(default = "default_alignment")]
    pub pngalignment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_topbar: Option<bool>,
}

impl Default for ButtonStyle {
    fn default() -> Self {
        Self {
            text: String::new(),
            size: default_size(),
            color: default_color(),
            bgcolor: 0,
            alignment: default_alignment(),
            pngalignment: default_alignment(),
            png64: None,
            show_topbar: None,
        }
    }
}

impl ButtonStyle {
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Apply a partial update. Unknown keys or mistyped values reject the whole diff.
    pub fn apply_fields(&mut self, diff: &Map<String, Value>) -> bool {
        if diff.is_empty() || diff.keys().any(|k| !STYLE_KEYS.contains(&k.as_str())) {
            return false;
        }

        let mut merged = self.to_map();
        for (key, value) in diff {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }

        match serde_json::from_value::<ButtonStyle>(Value::Object(merged)) {
            Ok(updated) => {
                *self = updated;
                true
            }
            Err(_) => false,
        }
    }
}

/// One drawable layer contributed by an advanced feedback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageBufferLayer {
    pub feedback_id: String,
    pub buffer: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
}

/// Style after feedback composition, before any rendering
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UnparsedStyle {
    pub style: Map<String, Value>,
    pub image_buffers: Vec<ImageBufferLayer>,
    pub pushed: bool,
    pub actions_running: bool,
    /// 1-based index of the current step when a control has more than one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_cycle: Option<usize>,
}

impl UnparsedStyle {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.style.get(key)
    }
}

/// What the renderer is asked to draw for a control
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DrawStyle {
    Button(UnparsedStyle),
    PageUp,
    PageDown,
    PageNumber,
}

/// Variables referenced as `$(label:name)` inside a text
pub fn referenced_variables(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("$(") {
        let after = &rest[start + 2..];
        match after.find(')') {
            Some(end) => {
                let name = &after[..end];
                if name.contains(':') && !name.is_empty() {
                    found.push(name.to_string());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_fields_updates_known_keys() {
        let mut style = ButtonStyle::default();
        let diff = json!({ "text": "REC", "bgcolor": 0xFF0000 });
        assert!(style.apply_fields(diff.as_object().unwrap()));
        assert_eq!(style.text, "REC");
        assert_eq!(style.bgcolor, 0xFF0000);
    }

    #[test]
    fn test_apply_fields_rejects_unknown_or_mistyped() {
        let mut style = ButtonStyle::default();
        let unknown = json!({ "blink": true });
        assert!(!style.apply_fields(unknown.as_object().unwrap()));

        let mistyped = json!({ "color": "red" });
        assert!(!style.apply_fields(mistyped.as_object().unwrap()));
        assert_eq!(style, ButtonStyle::default());
    }

    #[test]
    fn test_referenced_variables() {
        let vars = referenced_variables("Tally $(obs:scene) / $(internal:time_hms) $(bad)");
        assert_eq!(vars, vec!["obs:scene", "internal:time_hms"]);
        assert!(referenced_variables("no vars $(").is_empty());
    }
}
