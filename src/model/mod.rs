//! Engine data model
//!
//! Plain serde types shared by the fragments, controls and collaborators.

mod action;
mod document;
mod event;
mod feedback;
mod ids;
mod style;

pub use action::{
    ActionInstance, ActionSetId, ActionSets, StepModel, StepOptions, INTERNAL_CONNECTION,
};
pub use document::{
    set_option_field, ButtonOptions, ControlDocument, ControlType, RuntimeSnapshot,
    TriggerOptions,
};
pub use event::{EventSchedule, TriggerEvent, TriggerEventType};
pub use feedback::{is_truthy, FeedbackInstance, FeedbackKind};
pub use ids::{ControlId, ControlLocation, ParsedControlId, SurfaceId};
pub use style::{
    referenced_variables, ButtonStyle, DrawStyle, ImageBufferLayer, UnparsedStyle,
    IMAGE_BUFFER_KEY, IMAGE_BUFFER_POSITION_KEY, STYLE_KEYS,
};
