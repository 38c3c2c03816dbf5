//! FragmentFeedbacks - feedback storage, cached values and style composition

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::host::ModuleDispatch;
use crate::model::{
    is_truthy, ControlId, FeedbackInstance, FeedbackKind, ImageBufferLayer, IMAGE_BUFFER_KEY,
    IMAGE_BUFFER_POSITION_KEY, STYLE_KEYS,
};

#[derive(Debug, Clone)]
pub struct FragmentFeedbacks {
    control_id: ControlId,
    feedbacks: Vec<FeedbackInstance>,
    /// Last value reported per feedback id (never persisted)
    cached: HashMap<String, Value>,
    /// Only boolean feedbacks are accepted (trigger conditions)
    boolean_only: bool,
}

impl FragmentFeedbacks {
    pub fn new(control_id: ControlId, feedbacks: Vec<FeedbackInstance>, boolean_only: bool) -> Self {
        Self {
            control_id,
            feedbacks,
            cached: HashMap::new(),
            boolean_only,
        }
    }

    pub fn feedbacks(&self) -> &[FeedbackInstance] {
        &self.feedbacks
    }

    pub fn find(&self, feedback_id: &str) -> Option<&FeedbackInstance> {
        self.feedbacks.iter().find(|f| f.id == feedback_id)
    }

    fn find_mut(&mut self, feedback_id: &str) -> Option<&mut FeedbackInstance> {
        self.feedbacks.iter_mut().find(|f| f.id == feedback_id)
    }

    pub fn cached_value(&self, feedback_id: &str) -> Option<&Value> {
        self.cached.get(feedback_id)
    }

    fn kind_of(feedback: &FeedbackInstance, modules: &ModuleDispatch) -> FeedbackKind {
        modules
            .feedback_kind(&feedback.connection_id, &feedback.definition_id)
            .unwrap_or(FeedbackKind::Boolean)
    }

    pub fn feedback_add(&mut self, feedback: FeedbackInstance, modules: &ModuleDispatch) -> bool {
        if self.find(&feedback.id).is_some() {
            return false;
        }
        if self.boolean_only
            && modules.feedback_kind(&feedback.connection_id, &feedback.definition_id)
                != Some(FeedbackKind::Boolean)
        {
            return false;
        }
        modules.feedback_update(&feedback, &self.control_id);
        self.feedbacks.push(feedback);
        true
    }

    pub fn feedback_remove(&mut self, feedback_id: &str, modules: &ModuleDispatch) -> bool {
        let Some(index) = self.feedbacks.iter().position(|f| f.id == feedback_id) else {
            return false;
        };
        let feedback = self.feedbacks.remove(index);
        self.cached.remove(feedback_id);
        modules.feedback_delete(&feedback);
        true
    }

    pub fn feedback_duplicate(&mut self, feedback_id: &str, modules: &ModuleDispatch) -> Option<String> {
        let index = self.feedbacks.iter().position(|f| f.id == feedback_id)?;
        let mut copy = self.feedbacks[index].clone();
        copy.id = Uuid::new_v4().to_string();
        modules.feedback_update(&copy, &self.control_id);

        let new_id = copy.id.clone();
        self.feedbacks.insert(index + 1, copy);
        Some(new_id)
    }

    pub fn feedback_enabled(&mut self, feedback_id: &str, enabled: bool, modules: &ModuleDispatch) -> bool {
        let control_id = self.control_id.clone();
        let Some(feedback) = self.find_mut(feedback_id) else {
            return false;
        };
        feedback.disabled = !enabled;
        if enabled {
            modules.feedback_update(feedback, &control_id);
        } else {
            modules.feedback_delete(feedback);
            self.cached.remove(feedback_id);
        }
        true
    }

    pub fn feedback_set_option(
        &mut self,
        feedback_id: &str,
        key: &str,
        value: Value,
        modules: &ModuleDispatch,
    ) -> bool {
        let control_id = self.control_id.clone();
        let Some(feedback) = self.find_mut(feedback_id) else {
            return false;
        };
        feedback.options.insert(key.to_string(), value);
        modules.feedback_update(feedback, &control_id);
        true
    }

    /// Only boolean feedbacks can be inverted
    pub fn feedback_set_inverted(
        &mut self,
        feedback_id: &str,
        inverted: bool,
        modules: &ModuleDispatch,
    ) -> bool {
        let Some(kind) = self.find(feedback_id).map(|f| Self::kind_of(f, modules)) else {
            return false;
        };
        if kind != FeedbackKind::Boolean {
            return false;
        }
        match self.find_mut(feedback_id) {
            Some(feedback) => {
                feedback.is_inverted = inverted;
                true
            }
            None => false,
        }
    }

    /// Move a feedback to a new position; later feedbacks win style ties
    pub fn feedback_reorder(&mut self, feedback_id: &str, new_index: usize) -> bool {
        let Some(index) = self.feedbacks.iter().position(|f| f.id == feedback_id) else {
            return false;
        };
        let feedback = self.feedbacks.remove(index);
        let new_index = new_index.min(self.feedbacks.len());
        self.feedbacks.insert(new_index, feedback);
        true
    }

    /// Replace definition and options of an existing feedback
    pub fn feedback_replace(&mut self, replacement: &FeedbackInstance, modules: &ModuleDispatch) -> bool {
        let control_id = self.control_id.clone();
        let Some(feedback) = self.find_mut(&replacement.id) else {
            return false;
        };
        feedback.definition_id = replacement.definition_id.clone();
        feedback.options = replacement.options.clone();
        modules.feedback_update(feedback, &control_id);
        self.cached.remove(&replacement.id);
        true
    }

    pub fn feedback_update_options(
        &mut self,
        feedback_id: &str,
        options: Map<String, Value>,
        modules: &ModuleDispatch,
    ) -> bool {
        let control_id = self.control_id.clone();
        let Some(feedback) = self.find_mut(feedback_id) else {
            return false;
        };
        feedback.options = options;
        modules.feedback_update(feedback, &control_id);
        true
    }

    /// Choose which style keys a boolean feedback overrides
    ///
    /// Newly selected keys start from the base style value.
    pub fn feedback_set_style_selection(
        &mut self,
        feedback_id: &str,
        keys: &[String],
        base_style: &Map<String, Value>,
        modules: &ModuleDispatch,
    ) -> bool {
        if self.boolean_only || keys.iter().any(|k| !STYLE_KEYS.contains(&k.as_str())) {
            return false;
        }
        let Some(kind) = self.find(feedback_id).map(|f| Self::kind_of(f, modules)) else {
            return false;
        };
        if kind != FeedbackKind::Boolean {
            return false;
        }
        let Some(feedback) = self.find_mut(feedback_id) else {
            return false;
        };

        let mut style = Map::new();
        for key in keys {
            let value = feedback
                .style
                .get(key)
                .or_else(|| base_style.get(key))
                .cloned()
                .unwrap_or(Value::Null);
            style.insert(key.clone(), value);
        }
        feedback.style = style;
        true
    }

    /// Set one override value; the key must already be selected
    pub fn feedback_set_style_value(&mut self, feedback_id: &str, key: &str, value: Value) -> bool {
        let Some(feedback) = self.find_mut(feedback_id) else {
            return false;
        };
        match feedback.style.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Cache new values reported by one connection
    ///
    /// Returns true only if some cached value actually changed.
    pub fn update_values(&mut self, connection_id: &str, values: &HashMap<String, Value>) -> bool {
        let mut changed = false;
        for feedback in &self.feedbacks {
            if feedback.disabled || feedback.connection_id != connection_id {
                continue;
            }
            let Some(value) = values.get(&feedback.id) else {
                continue;
            };
            if self.cached.get(&feedback.id) != Some(value) {
                self.cached.insert(feedback.id.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Compose enabled feedbacks over a base style, in list order
    pub fn compose_style(
        &self,
        mut style: Map<String, Value>,
        modules: &ModuleDispatch,
    ) -> (Map<String, Value>, Vec<ImageBufferLayer>) {
        let mut layers = Vec::new();

        for feedback in self.feedbacks.iter().filter(|f| !f.disabled) {
            let Some(value) = self.cached.get(&feedback.id) else {
                continue;
            };
            match Self::kind_of(feedback, modules) {
                FeedbackKind::Boolean => {
                    if is_truthy(value) != feedback.is_inverted {
                        for (key, v) in &feedback.style {
                            style.insert(key.clone(), v.clone());
                        }
                    }
                }
                FeedbackKind::Advanced => {
                    let Value::Object(map) = value else {
                        continue;
                    };
                    for (key, v) in map {
                        if key == IMAGE_BUFFER_KEY || key == IMAGE_BUFFER_POSITION_KEY {
                            continue;
                        }
                        style.insert(key.clone(), v.clone());
                    }
                    if let Some(buffer) = map.get(IMAGE_BUFFER_KEY) {
                        layers.push(ImageBufferLayer {
                            feedback_id: feedback.id.clone(),
                            buffer: buffer.clone(),
                            position: map.get(IMAGE_BUFFER_POSITION_KEY).cloned(),
                        });
                    }
                }
            }
        }

        (style, layers)
    }

    /// Every enabled feedback is truthy after inversion
    pub fn check_conditions(&self) -> bool {
        self.feedbacks
            .iter()
            .filter(|f| !f.disabled)
            .all(|f| match self.cached.get(&f.id) {
                Some(value) => is_truthy(value) != f.is_inverted,
                None => false,
            })
    }

    pub fn forget_connection(&mut self, connection_id: &str) -> bool {
        self.retain_feedbacks(|f| f.connection_id != connection_id)
    }

    pub fn verify_connections(&mut self, known: &HashSet<String>) -> bool {
        self.retain_feedbacks(|f| known.contains(&f.connection_id))
    }

    fn retain_feedbacks(&mut self, keep: impl Fn(&FeedbackInstance) -> bool) -> bool {
        let before = self.feedbacks.len();
        let cached = &mut self.cached;
        self.feedbacks.retain(|f| {
            let kept = keep(f);
            if !kept {
                cached.remove(&f.id);
            }
            kept
        });
        self.feedbacks.len() != before
    }

    pub fn subscribe_all(&self, modules: &ModuleDispatch) {
        for feedback in &self.feedbacks {
            modules.feedback_update(feedback, &self.control_id);
        }
    }

    pub fn cleanup_all(&self, modules: &ModuleDispatch) {
        for feedback in &self.feedbacks {
            modules.feedback_delete(feedback);
        }
    }

    pub fn into_feedbacks(self) -> Vec<FeedbackInstance> {
        self.feedbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{feedback, flush_tasks, HostCall, TestHarness, TEST_CONNECTION};
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn fragment() -> FragmentFeedbacks {
        FragmentFeedbacks::new(ControlId::new("loc:1/0/0"), Vec::new(), false)
    }

    #[tokio::test]
    async fn test_later_feedback_wins() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        frag.feedback_add(feedback("a").with_style("bgcolor", json!(0xFF0000)), modules);
        frag.feedback_add(feedback("b").with_style("bgcolor", json!(0x0000FF)), modules);
        frag.update_values(TEST_CONNECTION, &values(&[("a", json!(true)), ("b", json!(true))]));

        let mut base = Map::new();
        base.insert("bgcolor".into(), json!(0));
        let (style, _) = frag.compose_style(base.clone(), modules);
        assert_eq!(style["bgcolor"], json!(0x0000FF));

        frag.update_values(TEST_CONNECTION, &values(&[("b", json!(false))]));
        let (style, _) = frag.compose_style(base, modules);
        assert_eq!(style["bgcolor"], json!(0xFF0000));
    }

    #[tokio::test]
    async fn test_advanced_value_merges_and_collects_image_buffers() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        let mut preview = feedback("p");
        preview.definition_id = "preview".into();
        frag.feedback_add(preview, modules);

        frag.update_values(
            TEST_CONNECTION,
            &values(&[(
                "p",
                json!({ "text": "LIVE", "imageBuffer": "AAAA", "imageBufferPosition": { "x": 4 } }),
            )]),
        );

        let (style, layers) = frag.compose_style(Map::new(), modules);
        assert_eq!(style["text"], json!("LIVE"));
        assert!(style.get(IMAGE_BUFFER_KEY).is_none());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].buffer, json!("AAAA"));
        assert_eq!(layers[0].position, Some(json!({ "x": 4 })));
    }

    #[tokio::test]
    async fn test_update_values_reports_changes_only() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        frag.feedback_add(feedback("a"), modules);

        assert!(frag.update_values(TEST_CONNECTION, &values(&[("a", json!(1))])));
        assert!(!frag.update_values(TEST_CONNECTION, &values(&[("a", json!(1))])));
        assert!(!frag.update_values("other", &values(&[("a", json!(2))])));
        assert_eq!(frag.cached_value("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_disable_and_remove_prune_cache() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        frag.feedback_add(feedback("a"), modules);
        frag.feedback_add(feedback("b"), modules);
        frag.update_values(TEST_CONNECTION, &values(&[("a", json!(true)), ("b", json!(true))]));

        assert!(frag.feedback_enabled("a", false, modules));
        assert!(frag.cached_value("a").is_none());
        assert!(frag.feedback_remove("b", modules));
        assert!(frag.cached_value("b").is_none());

        flush_tasks().await;
        assert_eq!(
            harness.host.calls(),
            vec![
                HostCall::FeedbackUpdate("a".into()),
                HostCall::FeedbackUpdate("b".into()),
                HostCall::FeedbackDelete("a".into()),
                HostCall::FeedbackDelete("b".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_conditions_respect_inversion() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = FragmentFeedbacks::new(ControlId::for_trigger("t"), Vec::new(), true);

        let mut preview = feedback("p");
        preview.definition_id = "preview".into();
        assert!(!frag.feedback_add(preview, modules));

        frag.feedback_add(feedback("a"), modules);
        assert!(!frag.check_conditions());

        frag.update_values(TEST_CONNECTION, &values(&[("a", json!(false))]));
        assert!(!frag.check_conditions());
        assert!(frag.feedback_set_inverted("a", true, modules));
        assert!(frag.check_conditions());
    }

    #[tokio::test]
    async fn test_style_selection_seeds_from_base() {
        let harness = TestHarness::new();
        let modules = &harness.services.modules;
        let mut frag = fragment();
        frag.feedback_add(feedback("a"), modules);

        let mut base = Map::new();
        base.insert("color".into(), json!(0xFFFFFF));
        let keys = vec!["color".to_string(), "bgcolor".to_string()];
        assert!(frag.feedback_set_style_selection("a", &keys, &base, modules));
        assert_eq!(frag.find("a").unwrap().style["color"], json!(0xFFFFFF));

        assert!(frag.feedback_set_style_value("a", "bgcolor", json!(0xFF0000)));
        assert!(!frag.feedback_set_style_value("a", "text", json!("nope")));

        let bad = vec!["blink".to_string()];
        assert!(!frag.feedback_set_style_selection("a", &bad, &base, modules));
    }
}
