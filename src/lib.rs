//! Control Hub - control-surface automation engine
//!
//! Buttons and triggers map surface input and protocol events to action
//! sequences run on module connections. Button styling is composed from the
//! feedback values those connections report.
//!
//! The [`controller::Controller`] is a single-threaded state machine;
//! [`engine::EngineActor`] runs it on one tokio task behind a cloneable
//! [`engine::EngineHandle`].

pub mod cli;
pub mod config;
pub mod controller;
pub mod controls;
pub mod engine;
pub mod error;
pub mod fragments;
pub mod host;
pub mod model;
pub mod persistence;
pub mod runner;
pub mod scheduler;
pub mod triggers;

pub use controller::{Controller, ControllerSettings};
pub use engine::{EngineActor, EngineHandle};
pub use error::{ControlError, ControlResult};
