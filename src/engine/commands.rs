//! Commands accepted by the engine actor
//!
//! Commands are divided into two categories:
//! - **Hot path** (no response): surface input, clock ticks and feedback values
//! - **Request-response**: a closure run against the controller whose result
//!   travels back over a oneshot channel

use tokio::sync::oneshot;

use crate::controller::{Controller, ControllerSettings, FeedbackValue};
use crate::model::ControlId;

/// Work run on the actor task with exclusive access to the controller
pub type ControllerFn = Box<dyn FnOnce(&mut Controller) + Send>;

pub enum EngineCommand {
    // -------------------------------------------------------------------------
    // Hot path commands (no response - fire and forget)
    // -------------------------------------------------------------------------
    /// Press or release from a surface
    Press {
        control_id: ControlId,
        pressed: bool,
        surface_id: Option<String>,
        force: bool,
    },

    /// Encoder rotation from a surface
    Rotate {
        control_id: ControlId,
        clockwise: bool,
        surface_id: Option<String>,
    },

    /// Values reported by one connection
    FeedbackValues {
        connection_id: String,
        values: Vec<FeedbackValue>,
    },

    /// Names of variables whose values changed
    VariablesChanged(Vec<String>),

    /// A UI client connected
    ClientConnected,

    /// Startup finished; fires startup events
    SignalReady,

    /// New tunables from a reloaded configuration
    UpdateSettings(ControllerSettings),

    // -------------------------------------------------------------------------
    // Request-response commands
    // -------------------------------------------------------------------------
    /// Run a closure against the controller
    Call(ControllerFn),

    /// Abort everything and stop the actor
    Shutdown { response: oneshot::Sender<()> },
}

impl EngineCommand {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Press { .. } => "press",
            EngineCommand::Rotate { .. } => "rotate",
            EngineCommand::FeedbackValues { .. } => "feedback_values",
            EngineCommand::VariablesChanged(_) => "variables_changed",
            EngineCommand::ClientConnected => "client_connected",
            EngineCommand::SignalReady => "signal_ready",
            EngineCommand::UpdateSettings(_) => "update_settings",
            EngineCommand::Call(_) => "call",
            EngineCommand::Shutdown { .. } => "shutdown",
        }
    }
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::Press {
                control_id,
                pressed,
                surface_id,
                force,
            } => f
                .debug_struct("Press")
                .field("control_id", control_id)
                .field("pressed", pressed)
                .field("surface_id", surface_id)
                .field("force", force)
                .finish(),
            EngineCommand::Rotate {
                control_id,
                clockwise,
                surface_id,
            } => f
                .debug_struct("Rotate")
                .field("control_id", control_id)
                .field("clockwise", clockwise)
                .field("surface_id", surface_id)
                .finish(),
            EngineCommand::FeedbackValues {
                connection_id,
                values,
            } => f
                .debug_struct("FeedbackValues")
                .field("connection_id", connection_id)
                .field("count", &values.len())
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}
