//! Console collaborators - log everything for testing and debugging
//!
//! Useful for exercising control configurations without any real device
//! connection or surface attached.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};

use super::{ModuleHost, RedrawSink, RunActionExtras, StateMirror, SurfaceNavigator};
use crate::model::{ActionInstance, ControlId, ControlLocation, DrawStyle, FeedbackInstance, FeedbackKind};

/// A connection that logs every call it receives
pub struct ConsoleModuleHost {
    id: String,
    /// Feedback definitions reported as advanced; everything else is boolean
    advanced_feedbacks: HashSet<String>,
}

impl ConsoleModuleHost {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            advanced_feedbacks: HashSet::new(),
        }
    }

    pub fn with_advanced_feedback(mut self, definition_id: impl Into<String>) -> Self {
        self.advanced_feedbacks.insert(definition_id.into());
        self
    }
}

#[async_trait]
impl ModuleHost for ConsoleModuleHost {
    fn connection_id(&self) -> &str {
        &self.id
    }

    fn feedback_kind(&self, definition_id: &str) -> Option<FeedbackKind> {
        if self.advanced_feedbacks.contains(definition_id) {
            Some(FeedbackKind::Advanced)
        } else {
            Some(FeedbackKind::Boolean)
        }
    }

    async fn action_run(&self, action: &ActionInstance, extras: &RunActionExtras) -> Result<()> {
        let options = serde_json::to_string(&action.options)?;
        info!(
            "🎮 Connection '{}' → {} {} [{} via {}]",
            self.id,
            action.definition_id,
            options,
            extras.control_id,
            extras.surface_id.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    async fn action_update(&self, action: &ActionInstance, control_id: &ControlId) -> Result<()> {
        debug!("'{}' subscribed action {} on {}", self.id, action.id, control_id);
        Ok(())
    }

    async fn action_delete(&self, action: &ActionInstance) -> Result<()> {
        debug!("'{}' released action {}", self.id, action.id);
        Ok(())
    }

    async fn feedback_update(
        &self,
        feedback: &FeedbackInstance,
        control_id: &ControlId,
    ) -> Result<()> {
        debug!("'{}' subscribed feedback {} on {}", self.id, feedback.id, control_id);
        Ok(())
    }

    async fn feedback_delete(&self, feedback: &FeedbackInstance) -> Result<()> {
        debug!("'{}' released feedback {}", self.id, feedback.id);
        Ok(())
    }

    async fn action_learn_values(
        &self,
        _action: &ActionInstance,
    ) -> Result<Option<Map<String, Value>>> {
        Ok(None)
    }

    async fn feedback_learn_values(
        &self,
        _feedback: &FeedbackInstance,
        _control_id: &ControlId,
    ) -> Result<Option<Map<String, Value>>> {
        Ok(None)
    }
}

/// Surface-side collaborators that only log
#[derive(Debug, Default)]
pub struct ConsoleSurfaces;

impl SurfaceNavigator for ConsoleSurfaces {
    fn device_page_up(&self, surface_id: &str) {
        info!("📄 Surface '{}' → page up", surface_id);
    }

    fn device_page_down(&self, surface_id: &str) {
        info!("📄 Surface '{}' → page down", surface_id);
    }

    fn device_page_set(&self, surface_id: &str, page: u32) {
        info!("📄 Surface '{}' → page {}", surface_id, page);
    }
}

impl StateMirror for ConsoleSurfaces {
    fn update_button_state(
        &self,
        location: &ControlLocation,
        pushed: bool,
        surface_id: Option<&str>,
    ) {
        debug!(
            "Button {} {} (surface: {})",
            location,
            if pushed { "pushed" } else { "released" },
            surface_id.unwrap_or("-")
        );
    }
}

impl RedrawSink for ConsoleSurfaces {
    fn draw_control(&self, control_id: &ControlId, style: &DrawStyle) {
        match style {
            DrawStyle::Button(unparsed) => {
                let text = unparsed.get("text").map(ToString::to_string);
                debug!(
                    "🎨 Draw {} text={} pushed={}",
                    control_id,
                    text.as_deref().unwrap_or("-"),
                    unparsed.pushed
                );
            }
            other => debug!("🎨 Draw {} {:?}", control_id, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_host_reports_kinds_and_runs() {
        let host = ConsoleModuleHost::new("test").with_advanced_feedback("preview");
        let extras = RunActionExtras::new(ControlId::new("loc:1/0/0"), Some("desk".into()));

        assert_eq!(host.connection_id(), "test");
        assert_eq!(host.feedback_kind("preview"), Some(FeedbackKind::Advanced));
        assert_eq!(host.feedback_kind("tally"), Some(FeedbackKind::Boolean));

        let run = ActionInstance::new("a1", "test", "one").with_option("scene", serde_json::json!(2));
        host.action_run(&run, &extras).await.unwrap();
        assert_eq!(extras.location, Some(ControlLocation::new(1, 0, 0)));
    }
}
