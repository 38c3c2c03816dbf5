//! Engine actor and its handle
//!
//! The [`Controller`](crate::controller::Controller) is a plain state machine.
//! [`EngineActor`] runs it on one task, waking for commands, timer deadlines
//! and trigger clock ticks. [`EngineHandle`] is the cloneable front used by
//! surfaces, connections and the REPL.

mod actor;
mod commands;
mod handle;

pub use actor::EngineActor;
pub use commands::{ControllerFn, EngineCommand};
pub use handle::EngineHandle;
