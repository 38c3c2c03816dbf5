//! Error types for caller misuse and structural failures
//!
//! Validation problems (unknown set, step or action id) are not errors: the
//! mutating call simply returns `false`. `ControlError` is reserved for calls
//! that can never succeed, such as adding an action to a page-navigation button.

use thiserror::Error;

use crate::model::{ControlId, ControlLocation};

/// Convenient result alias for engine operations
pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// Capability a control must implement for an operation to make sense
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Actions,
    Feedbacks,
    Steps,
    ActionSets,
    Options,
    PushedState,
    Events,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Actions => "actions",
            Capability::Feedbacks => "feedbacks",
            Capability::Steps => "steps",
            Capability::ActionSets => "action sets",
            Capability::Options => "options",
            Capability::PushedState => "pushed state",
            Capability::Events => "events",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control {control_id} does not support {capability}")]
    NotSupported {
        control_id: ControlId,
        capability: Capability,
    },

    #[error("invalid control id '{0}'")]
    InvalidControlId(String),

    #[error("location {0} is outside the grid")]
    LocationOutOfRange(ControlLocation),

    #[error("unknown control type '{0}'")]
    UnknownControlType(String),

    #[error("invalid control document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("control {0} not found")]
    NotFound(ControlId),

    #[error("engine has stopped")]
    EngineStopped,
}

impl ControlError {
    pub(crate) fn not_supported(control_id: &ControlId, capability: Capability) -> Self {
        ControlError::NotSupported {
            control_id: control_id.clone(),
            capability,
        }
    }
}
