//! EngineHandle - cloneable front for the engine actor
//!
//! Fire-and-forget methods for surface input and module reports, and async
//! methods with oneshot channels for everything that needs an answer.

use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::commands::EngineCommand;
use crate::controller::{Controller, ControllerSettings, FeedbackValue};
use crate::error::{ControlError, ControlResult};
use crate::host::ModuleDispatch;
use crate::model::{ControlDocument, ControlId, RuntimeSnapshot};

#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    modules: ModuleDispatch,
}

impl EngineHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<EngineCommand>, modules: ModuleDispatch) -> Self {
        Self { cmd_tx, modules }
    }

    fn send(&self, cmd: EngineCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Engine stopped, command dropped");
        }
    }

    // =========================================================================
    // Hot path methods (fire-and-forget, no await)
    // =========================================================================

    pub fn press(&self, control_id: ControlId, pressed: bool, surface_id: Option<String>) {
        self.send(EngineCommand::Press {
            control_id,
            pressed,
            surface_id,
            force: false,
        });
    }

    /// Press ignoring the current pushed state
    pub fn force_press(&self, control_id: ControlId, pressed: bool, surface_id: Option<String>) {
        self.send(EngineCommand::Press {
            control_id,
            pressed,
            surface_id,
            force: true,
        });
    }

    pub fn rotate(&self, control_id: ControlId, clockwise: bool, surface_id: Option<String>) {
        self.send(EngineCommand::Rotate {
            control_id,
            clockwise,
            surface_id,
        });
    }

    pub fn update_feedback_values(&self, connection_id: impl Into<String>, values: Vec<FeedbackValue>) {
        self.send(EngineCommand::FeedbackValues {
            connection_id: connection_id.into(),
            values,
        });
    }

    pub fn variables_changed(&self, names: Vec<String>) {
        self.send(EngineCommand::VariablesChanged(names));
    }

    pub fn client_connected(&self) {
        self.send(EngineCommand::ClientConnected);
    }

    pub fn signal_ready(&self) {
        self.send(EngineCommand::SignalReady);
    }

    pub fn update_settings(&self, settings: ControllerSettings) {
        self.send(EngineCommand::UpdateSettings(settings));
    }

    // =========================================================================
    // Request-response methods
    // =========================================================================

    /// Run a closure against the controller on the actor task
    pub async fn with_controller<R, F>(&self, f: F) -> ControlResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Controller) -> R + Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let call = Box::new(move |controller: &mut Controller| {
            let _ = response_tx.send(f(controller));
        });
        self.cmd_tx
            .send(EngineCommand::Call(call))
            .map_err(|_| ControlError::EngineStopped)?;
        response_rx.await.map_err(|_| ControlError::EngineStopped)
    }

    pub async fn get_control(&self, control_id: ControlId) -> ControlResult<Option<ControlDocument>> {
        self.with_controller(move |c| c.get_control(&control_id)).await
    }

    pub async fn get_all_controls(&self) -> ControlResult<BTreeMap<ControlId, ControlDocument>> {
        self.with_controller(|c| c.get_all_controls()).await
    }

    pub async fn runtime_snapshot(&self, control_id: ControlId) -> ControlResult<Option<RuntimeSnapshot>> {
        self.with_controller(move |c| c.runtime_snapshot(&control_id)).await
    }

    /// Ask the owning connection for option values of an action and apply them
    ///
    /// The engine keeps running while the connection answers. Values are
    /// discarded if the action was removed in the meantime.
    pub async fn action_learn_values(&self, control_id: ControlId, action_id: String) -> ControlResult<bool> {
        let (id, aid) = (control_id.clone(), action_id.clone());
        let Some(action) = self
            .with_controller(move |c| c.action_for_learn(&id, &aid))
            .await?
        else {
            return Ok(false);
        };
        let Some(host) = self.modules.host(&action.connection_id) else {
            return Ok(false);
        };
        let values = match host.action_learn_values(&action).await {
            Ok(Some(values)) => values,
            Ok(None) => return Ok(false),
            Err(e) => {
                debug!("Learn for action {} failed: {:#}", action_id, e);
                return Ok(false);
            }
        };
        self.with_controller(move |c| c.action_learn_apply(&control_id, &action_id, values))
            .await?
    }

    /// Ask the owning connection for option values of a feedback and apply them
    pub async fn feedback_learn_values(
        &self,
        control_id: ControlId,
        feedback_id: String,
    ) -> ControlResult<bool> {
        let (id, fid) = (control_id.clone(), feedback_id.clone());
        let Some(feedback) = self
            .with_controller(move |c| c.feedback_for_learn(&id, &fid))
            .await?
        else {
            return Ok(false);
        };
        let Some(host) = self.modules.host(&feedback.connection_id) else {
            return Ok(false);
        };
        let values = match host.feedback_learn_values(&feedback, &control_id).await {
            Ok(Some(values)) => values,
            Ok(None) => return Ok(false),
            Err(e) => {
                debug!("Learn for feedback {} failed: {:#}", feedback_id, e);
                return Ok(false);
            }
        };
        self.with_controller(move |c| c.feedback_learn_apply(&control_id, &feedback_id, values))
            .await?
    }

    /// Abort all pending work and stop the actor
    pub async fn shutdown(&self) -> ControlResult<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::Shutdown {
                response: response_tx,
            })
            .map_err(|_| ControlError::EngineStopped)?;
        response_rx.await.map_err(|_| ControlError::EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineActor;
    use crate::host::testing::{action, flush_tasks, TestHarness};
    use crate::model::{ActionSetId, ControlLocation, ControlType};
    use serde_json::{json, Map};
    use std::time::Duration;

    fn spawn(harness: &TestHarness) -> EngineHandle {
        let controller = Controller::new(harness.services.clone(), ControllerSettings::default());
        EngineActor::spawn(controller, Duration::from_secs(1))
    }

    async fn button(handle: &EngineHandle) -> ControlId {
        handle
            .with_controller(|c| {
                let id = c
                    .create_button_control(&ControlLocation::new(1, 0, 0), ControlType::Press)
                    .unwrap();
                c.action_add(&id, None, ActionSetId::Down, action("a").with_delay(500))
                    .unwrap();
                id
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_actions_fire_from_the_actor_loop() {
        let h = TestHarness::new();
        let handle = spawn(&h);
        let id = button(&handle).await;

        handle.press(id.clone(), true, None);
        let running = handle.runtime_snapshot(id.clone()).await.unwrap().unwrap();
        assert!(running.actions_running);

        tokio::time::sleep(Duration::from_millis(600)).await;
        flush_tasks().await;
        assert_eq!(h.host.runs(), vec!["a"]);
        let done = handle.runtime_snapshot(id).await.unwrap().unwrap();
        assert!(!done.actions_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_learned_values_are_applied() {
        let h = TestHarness::new();
        let handle = spawn(&h);
        let id = button(&handle).await;
        let mut learned = Map::new();
        learned.insert("scene".into(), json!("Live"));
        h.host.set_learned(learned);

        assert!(handle
            .action_learn_values(id.clone(), "a".into())
            .await
            .unwrap());
        assert!(!handle
            .action_learn_values(id.clone(), "missing".into())
            .await
            .unwrap());

        let doc = handle.get_control(id).await.unwrap().unwrap();
        let sets = doc.action_sets.unwrap();
        assert_eq!(sets[&ActionSetId::Down][0].options["scene"], json!("Live"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_fail_after_shutdown() {
        let h = TestHarness::new();
        let handle = spawn(&h);
        handle.shutdown().await.unwrap();
        tokio::task::yield_now().await;

        assert!(matches!(
            handle.get_all_controls().await,
            Err(ControlError::EngineStopped)
        ));
    }
}
