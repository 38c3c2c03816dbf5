//! Recording collaborators for unit tests

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use super::{
    ConnectionRegistry, EngineServices, GridLocationResolver, ModuleDispatch, ModuleHost,
    PersistenceStore, RedrawSink, RunActionExtras, StateMirror, SurfaceNavigator,
};
use crate::config::GridConfig;
use crate::model::{
    ActionInstance, ControlId, ControlLocation, DrawStyle, FeedbackInstance, FeedbackKind,
};

/// Connection id of the recording host
pub const TEST_CONNECTION: &str = "test";

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Run {
        action_id: String,
        control_id: ControlId,
        surface_id: Option<String>,
    },
    ActionUpdate(String),
    ActionDelete(String),
    FeedbackUpdate(String),
    FeedbackDelete(String),
}

/// Module host that records every call
pub struct RecordingHost {
    id: String,
    calls: Mutex<Vec<HostCall>>,
    advanced: HashSet<String>,
    failing_actions: HashSet<String>,
    learned: Mutex<Option<Map<String, Value>>>,
}

impl RecordingHost {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: Mutex::new(Vec::new()),
            advanced: HashSet::new(),
            failing_actions: HashSet::new(),
            learned: Mutex::new(None),
        }
    }

    pub fn with_advanced(mut self, definition_id: &str) -> Self {
        self.advanced.insert(definition_id.to_string());
        self
    }

    /// Make `action_run` fail for a definition
    pub fn with_failing(mut self, definition_id: &str) -> Self {
        self.failing_actions.insert(definition_id.to_string());
        self
    }

    pub fn set_learned(&self, values: Map<String, Value>) {
        *self.learned.lock() = Some(values);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    /// Ids of executed actions, in execution order
    pub fn runs(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HostCall::Run { action_id, .. } => Some(action_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl ModuleHost for RecordingHost {
    fn connection_id(&self) -> &str {
        &self.id
    }

    fn feedback_kind(&self, definition_id: &str) -> Option<FeedbackKind> {
        if self.advanced.contains(definition_id) {
            Some(FeedbackKind::Advanced)
        } else {
            Some(FeedbackKind::Boolean)
        }
    }

    async fn action_run(&self, action: &ActionInstance, extras: &RunActionExtras) -> Result<()> {
        self.calls.lock().push(HostCall::Run {
            action_id: action.id.clone(),
            control_id: extras.control_id.clone(),
            surface_id: extras.surface_id.clone(),
        });
        if self.failing_actions.contains(&action.definition_id) {
            bail!("{} refused", action.definition_id);
        }
        Ok(())
    }

    async fn action_update(&self, action: &ActionInstance, _control_id: &ControlId) -> Result<()> {
        self.calls
            .lock()
            .push(HostCall::ActionUpdate(action.id.clone()));
        Ok(())
    }

    async fn action_delete(&self, action: &ActionInstance) -> Result<()> {
        self.calls
            .lock()
            .push(HostCall::ActionDelete(action.id.clone()));
        Ok(())
    }

    async fn feedback_update(
        &self,
        feedback: &FeedbackInstance,
        _control_id: &ControlId,
    ) -> Result<()> {
        self.calls
            .lock()
            .push(HostCall::FeedbackUpdate(feedback.id.clone()));
        Ok(())
    }

    async fn feedback_delete(&self, feedback: &FeedbackInstance) -> Result<()> {
        self.calls
            .lock()
            .push(HostCall::FeedbackDelete(feedback.id.clone()));
        Ok(())
    }

    async fn action_learn_values(
        &self,
        _action: &ActionInstance,
    ) -> Result<Option<Map<String, Value>>> {
        Ok(self.learned.lock().clone())
    }

    async fn feedback_learn_values(
        &self,
        _feedback: &FeedbackInstance,
        _control_id: &ControlId,
    ) -> Result<Option<Map<String, Value>>> {
        Ok(self.learned.lock().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    PageUp(String),
    PageDown(String),
    PageSet(String, u32),
    ButtonState(ControlLocation, bool, Option<String>),
}

/// Surface, store and renderer collaborators that record every call
#[derive(Default)]
pub struct RecordingSurfaces {
    calls: Mutex<Vec<SurfaceCall>>,
    draws: Mutex<Vec<(ControlId, DrawStyle)>>,
    writes: Mutex<Vec<(String, Option<Value>)>>,
}

impl RecordingSurfaces {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().clone()
    }

    pub fn draws(&self) -> Vec<(ControlId, DrawStyle)> {
        self.draws.lock().clone()
    }

    pub fn writes(&self) -> Vec<(String, Option<Value>)> {
        self.writes.lock().clone()
    }

    /// Last value written for a key
    pub fn last_write(&self, key: &str) -> Option<Option<Value>> {
        self.writes
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
        self.draws.lock().clear();
        self.writes.lock().clear();
    }
}

impl SurfaceNavigator for RecordingSurfaces {
    fn device_page_up(&self, surface_id: &str) {
        self.calls
            .lock()
            .push(SurfaceCall::PageUp(surface_id.to_string()));
    }

    fn device_page_down(&self, surface_id: &str) {
        self.calls
            .lock()
            .push(SurfaceCall::PageDown(surface_id.to_string()));
    }

    fn device_page_set(&self, surface_id: &str, page: u32) {
        self.calls
            .lock()
            .push(SurfaceCall::PageSet(surface_id.to_string(), page));
    }
}

impl StateMirror for RecordingSurfaces {
    fn update_button_state(
        &self,
        location: &ControlLocation,
        pushed: bool,
        surface_id: Option<&str>,
    ) {
        self.calls.lock().push(SurfaceCall::ButtonState(
            *location,
            pushed,
            surface_id.map(str::to_string),
        ));
    }
}

impl RedrawSink for RecordingSurfaces {
    fn draw_control(&self, control_id: &ControlId, style: &DrawStyle) {
        self.draws.lock().push((control_id.clone(), style.clone()));
    }
}

impl PersistenceStore for RecordingSurfaces {
    fn set_key(&self, path: &str, value: Option<Value>) {
        self.writes.lock().push((path.to_string(), value));
    }
}

/// Engine services wired to recording collaborators
pub struct TestHarness {
    pub services: EngineServices,
    pub host: Arc<RecordingHost>,
    pub surfaces: Arc<RecordingSurfaces>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_host(RecordingHost::new(TEST_CONNECTION).with_advanced("preview"))
    }

    pub fn with_host(host: RecordingHost) -> Self {
        let host = Arc::new(host);
        let surfaces = Arc::new(RecordingSurfaces::default());
        let registry = ConnectionRegistry::new();
        registry.register(host.clone());

        let services = EngineServices {
            modules: ModuleDispatch::new(Arc::new(registry)),
            navigator: surfaces.clone(),
            store: surfaces.clone(),
            resolver: Arc::new(GridLocationResolver::new(GridConfig::default())),
            mirror: surfaces.clone(),
            renderer: surfaces.clone(),
        };

        Self {
            services,
            host,
            surfaces,
        }
    }
}

/// Let spawned module-host calls run to completion
pub async fn flush_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn action(id: &str) -> ActionInstance {
    ActionInstance::new(id, TEST_CONNECTION, "do")
}

pub fn feedback(id: &str) -> FeedbackInstance {
    FeedbackInstance::new(id, TEST_CONNECTION, "tally")
}
