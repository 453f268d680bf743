//! Dataset tree: path-scoped refresh controller and the pieces around it.
//!
//! Seams: `model` (state, messages, commands), `controller` (pure `update`),
//! `store` (serialized mutations), `render` (view policy), `catalog` and
//! `dispatcher` (data access off-thread), `runtime` (event loop and timers).

#![allow(missing_docs)]

pub mod catalog;
pub mod controller;
pub mod dispatcher;
pub mod model;
pub mod render;
pub mod runtime;
pub mod store;
pub mod timer;

#[cfg(test)]
mod test_harness;
#[cfg(test)]
mod test_properties;

pub use controller::{ControllerSettings, RefreshController, update};
pub use model::{ControllerCmd, ControllerMsg, TreeState, is_toggled};
pub use runtime::{RenderSink, Session, SessionEvent, UserInput};
