//! Feedback operations, base style and feedback value updates

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::controls::{Control, HasFeedbacks};
use crate::error::{Capability, ControlError, ControlResult};
use crate::model::{ButtonStyle, ControlId, FeedbackInstance};

/// One value reported by a connection for a feedback of a control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackValue {
    pub control_id: ControlId,
    pub feedback_id: String,
    pub value: Value,
}

fn feedbacks_of<'a>(
    control: &'a mut Control,
    control_id: &ControlId,
) -> ControlResult<&'a mut dyn HasFeedbacks> {
    control
        .as_feedbacks_mut()
        .ok_or_else(|| ControlError::not_supported(control_id, Capability::Feedbacks))
}

impl super::Controller {
    pub fn feedback_add(&mut self, control_id: &ControlId, feedback: FeedbackInstance) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_add(feedback, modules))
        })
    }

    pub fn feedback_remove(&mut self, control_id: &ControlId, feedback_id: &str) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_remove(feedback_id, modules))
        })
    }

    pub fn feedback_duplicate(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
    ) -> ControlResult<Option<String>> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_duplicate(feedback_id, modules))
        })
    }

    pub fn feedback_enabled(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
        enabled: bool,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_enabled(feedback_id, enabled, modules))
        })
    }

    pub fn feedback_set_option(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
        key: &str,
        value: Value,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_set_option(feedback_id, key, value, modules))
        })
    }

    pub fn feedback_set_inverted(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
        inverted: bool,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_set_inverted(feedback_id, inverted, modules))
        })
    }

    pub fn feedback_reorder(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
        new_index: usize,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_reorder(feedback_id, new_index))
        })
    }

    pub fn feedback_replace(
        &mut self,
        control_id: &ControlId,
        replacement: &FeedbackInstance,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_replace(replacement, modules))
        })
    }

    pub fn feedback_set_style_selection(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
        keys: &[String],
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            let target = feedbacks_of(control, control_id)?;
            let base = target
                .base_style()
                .map(ButtonStyle::to_map)
                .unwrap_or_default();
            Ok(target
                .feedbacks_mut()
                .feedback_set_style_selection(feedback_id, keys, &base, modules))
        })
    }

    pub fn feedback_set_style_value(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
        key: &str,
        value: Value,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_set_style_value(feedback_id, key, value))
        })
    }

    /// Change fields of the base style
    pub fn style_set_fields(
        &mut self,
        control_id: &ControlId,
        diff: &Map<String, Value>,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, _| {
            let target = feedbacks_of(control, control_id)?;
            if target.base_style().is_none() {
                return Err(ControlError::not_supported(control_id, Capability::Feedbacks));
            }
            Ok(target.style_set_fields(diff))
        })
    }

    /// Snapshot of a feedback for a learn request
    pub fn feedback_for_learn(
        &self,
        control_id: &ControlId,
        feedback_id: &str,
    ) -> Option<FeedbackInstance> {
        self.controls
            .get(control_id)?
            .as_feedbacks()?
            .feedbacks()
            .find(feedback_id)
            .cloned()
    }

    /// Apply learned option values if the feedback still exists
    pub fn feedback_learn_apply(
        &mut self,
        control_id: &ControlId,
        feedback_id: &str,
        values: Map<String, Value>,
    ) -> ControlResult<bool> {
        self.modify(control_id, |control, modules| {
            Ok(feedbacks_of(control, control_id)?
                .feedbacks_mut()
                .feedback_update_options(feedback_id, values, modules))
        })
    }

    /// Cache values reported by one connection, redrawing only what changed
    ///
    /// Returns the number of controls whose values changed.
    pub fn update_feedback_values(&mut self, connection_id: &str, values: &[FeedbackValue]) -> usize {
        let mut by_control: HashMap<&ControlId, HashMap<String, Value>> = HashMap::new();
        for v in values {
            by_control
                .entry(&v.control_id)
                .or_default()
                .insert(v.feedback_id.clone(), v.value.clone());
        }

        let mut changed = Vec::new();
        for (control_id, values) in by_control {
            let Some(feedbacks) = self
                .controls
                .get_mut(control_id)
                .and_then(|c| c.as_feedbacks_mut())
            else {
                continue;
            };
            if feedbacks.feedbacks_mut().update_values(connection_id, &values) {
                changed.push(control_id.clone());
            }
        }

        for control_id in &changed {
            self.request_redraw(control_id);
        }
        changed.len()
    }
}
