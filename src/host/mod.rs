//! External collaborators of the engine
//!
//! The engine never performs device I/O itself. Connections (module hosts)
//! execute actions and report feedback values, surfaces handle paging, a
//! store persists documents, and a renderer draws composed styles. All of
//! them are injected at construction time.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::model::{
    ActionInstance, ControlId, ControlLocation, DrawStyle, FeedbackInstance, FeedbackKind,
    SurfaceId,
};

pub mod console;
pub mod grid;
pub mod registry;

#[cfg(test)]
pub mod testing;

pub use console::{ConsoleModuleHost, ConsoleSurfaces};
pub use grid::GridLocationResolver;
pub use registry::ConnectionRegistry;

/// Context handed to a connection when it executes an action
#[derive(Debug, Clone, PartialEq)]
pub struct RunActionExtras {
    /// Control whose action set is running
    pub control_id: ControlId,
    /// Surface that originated the invocation, if any
    pub surface_id: Option<SurfaceId>,
    /// Grid location of the control, if it has one
    pub location: Option<ControlLocation>,
}

impl RunActionExtras {
    pub fn new(control_id: ControlId, surface_id: Option<SurfaceId>) -> Self {
        let location = control_id.location();
        Self {
            control_id,
            surface_id,
            location,
        }
    }
}

/// A connection: the unit that performs device I/O for its actions and feedbacks
///
/// Note: All methods take &self to support Arc<dyn ModuleHost>.
/// Every async method may fail; the engine logs failures and moves on.
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Connection id (e.g., "obs", "atem-1")
    fn connection_id(&self) -> &str;

    /// How a feedback definition composes into styles
    fn feedback_kind(&self, definition_id: &str) -> Option<FeedbackKind>;

    /// Execute an action
    async fn action_run(&self, action: &ActionInstance, extras: &RunActionExtras) -> Result<()>;

    /// Subscribe an action (added, enabled or options changed)
    async fn action_update(&self, action: &ActionInstance, control_id: &ControlId) -> Result<()>;

    /// Release resources held for an action (removed or disabled)
    async fn action_delete(&self, action: &ActionInstance) -> Result<()>;

    /// Subscribe a feedback so the connection starts reporting its value
    async fn feedback_update(
        &self,
        feedback: &FeedbackInstance,
        control_id: &ControlId,
    ) -> Result<()>;

    /// Stop reporting a feedback
    async fn feedback_delete(&self, feedback: &FeedbackInstance) -> Result<()>;

    /// Ask the connection for option values matching the device's current state
    async fn action_learn_values(
        &self,
        action: &ActionInstance,
    ) -> Result<Option<Map<String, Value>>>;

    /// Ask the connection for option values matching the device's current state
    async fn feedback_learn_values(
        &self,
        feedback: &FeedbackInstance,
        control_id: &ControlId,
    ) -> Result<Option<Map<String, Value>>>;
}

/// Lookup of connections by id
pub trait ModuleRegistry: Send + Sync {
    fn connection(&self, connection_id: &str) -> Option<Arc<dyn ModuleHost>>;
}

/// Page navigation on surfaces
pub trait SurfaceNavigator: Send + Sync {
    fn device_page_up(&self, surface_id: &str);
    fn device_page_down(&self, surface_id: &str);
    fn device_page_set(&self, surface_id: &str, page: u32);
}

/// Durable key/value writes (fire-and-forget); `None` deletes the key
pub trait PersistenceStore: Send + Sync {
    fn set_key(&self, path: &str, value: Option<Value>);
}

/// Maps grid addressing schemes to control ids
pub trait LocationResolver: Send + Sync {
    fn get_control_id_at(&self, location: &ControlLocation) -> Option<ControlId>;
    fn get_control_id_at_old_bank_index(&self, page: u32, bank: u32) -> Option<ControlId>;
}

/// External protocol mirrors of button state
pub trait StateMirror: Send + Sync {
    fn update_button_state(
        &self,
        location: &ControlLocation,
        pushed: bool,
        surface_id: Option<&str>,
    );
}

/// Receives composed styles for drawing
pub trait RedrawSink: Send + Sync {
    fn draw_control(&self, control_id: &ControlId, style: &DrawStyle);
}

/// All collaborators the engine needs, injected once
#[derive(Clone)]
pub struct EngineServices {
    pub modules: ModuleDispatch,
    pub navigator: Arc<dyn SurfaceNavigator>,
    pub store: Arc<dyn PersistenceStore>,
    pub resolver: Arc<dyn LocationResolver>,
    pub mirror: Arc<dyn StateMirror>,
    pub renderer: Arc<dyn RedrawSink>,
}

/// A queued module-host call
type QueuedCall = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Fire-and-forget front for module-host calls
///
/// Each connection gets one worker task draining an unbounded queue, so calls
/// reach a connection in the order the engine issued them. Failures are logged
/// at debug level and never reach the caller. Calls addressed to the internal
/// pseudo-connection or to unknown connections are dropped.
#[derive(Clone)]
pub struct ModuleDispatch {
    registry: Arc<dyn ModuleRegistry>,
    queues: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<QueuedCall>>>>,
}

impl ModuleDispatch {
    pub fn new(registry: Arc<dyn ModuleRegistry>) -> Self {
        Self {
            registry,
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a call to the queue of a connection, starting its worker if needed
    fn enqueue<F>(&self, connection_id: &str, call: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut queues = self.queues.lock();
        let mut call: QueuedCall = Box::pin(call);
        if let Some(tx) = queues.get(connection_id) {
            match tx.send(call) {
                Ok(()) => {
                    trace!("Module call queued for '{}'", connection_id);
                    return;
                }
                // Worker gone with its runtime; start a fresh one
                Err(mpsc::error::SendError(returned)) => call = returned,
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, module call dropped");
            return;
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedCall>();
        let worker_id = connection_id.to_string();
        runtime.spawn(async move {
            while let Some(call) = rx.recv().await {
                call.await;
            }
            debug!("Module queue for '{}' closed", worker_id);
        });
        if tx.send(call).is_err() {
            warn!("Module queue for '{}' refused a call", connection_id);
        }
        queues.insert(connection_id.to_string(), tx);
    }

    /// Look up the connection behind an id (never the internal one)
    pub fn host(&self, connection_id: &str) -> Option<Arc<dyn ModuleHost>> {
        if connection_id == crate::model::INTERNAL_CONNECTION {
            return None;
        }
        self.registry.connection(connection_id)
    }

    pub fn feedback_kind(&self, connection_id: &str, definition_id: &str) -> Option<FeedbackKind> {
        self.host(connection_id)?.feedback_kind(definition_id)
    }

    pub fn action_run(&self, action: &ActionInstance, extras: &RunActionExtras) {
        let Some(host) = self.host(&action.connection_id) else {
            debug!(
                "Dropping action {} for unknown connection '{}'",
                action.id, action.connection_id
            );
            return;
        };
        let connection_id = action.connection_id.clone();
        let action = action.clone();
        let extras = extras.clone();
        self.enqueue(&connection_id, async move {
            if let Err(e) = host.action_run(&action, &extras).await {
                debug!(
                    "Action {} ({}.{}) failed: {}",
                    action.id, action.connection_id, action.definition_id, e
                );
            }
        });
    }

    pub fn action_update(&self, action: &ActionInstance, control_id: &ControlId) {
        if action.disabled {
            return;
        }
        let Some(host) = self.host(&action.connection_id) else {
            return;
        };
        let connection_id = action.connection_id.clone();
        let action = action.clone();
        let control_id = control_id.clone();
        self.enqueue(&connection_id, async move {
            if let Err(e) = host.action_update(&action, &control_id).await {
                debug!("Subscribing action {} failed: {}", action.id, e);
            }
        });
    }

    pub fn action_delete(&self, action: &ActionInstance) {
        let Some(host) = self.host(&action.connection_id) else {
            return;
        };
        let connection_id = action.connection_id.clone();
        let action = action.clone();
        self.enqueue(&connection_id, async move {
            if let Err(e) = host.action_delete(&action).await {
                debug!("Cleaning up action {} failed: {}", action.id, e);
            }
        });
    }

    pub fn feedback_update(&self, feedback: &FeedbackInstance, control_id: &ControlId) {
        if feedback.disabled {
            return;
        }
        let Some(host) = self.host(&feedback.connection_id) else {
            return;
        };
        let connection_id = feedback.connection_id.clone();
        let feedback = feedback.clone();
        let control_id = control_id.clone();
        self.enqueue(&connection_id, async move {
            if let Err(e) = host.feedback_update(&feedback, &control_id).await {
                debug!("Subscribing feedback {} failed: {}", feedback.id, e);
            }
        });
    }

    pub fn feedback_delete(&self, feedback: &FeedbackInstance) {
        let Some(host) = self.host(&feedback.connection_id) else {
            return;
        };
        let connection_id = feedback.connection_id.clone();
        let feedback = feedback.clone();
        self.enqueue(&connection_id, async move {
            if let Err(e) = host.feedback_delete(&feedback).await {
                debug!("Cleaning up feedback {} failed: {}", feedback.id, e);
            }
        });
    }
}
