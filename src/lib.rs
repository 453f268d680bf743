#![forbid(unsafe_code)]

//! dataset_tree — a path-scoped dataset tree browser.
//!
//! The tree shows the datasets under one *path* (a dataset-name qualifier).
//! Edits to the path are debounced into a single refetch; explicit refresh
//! and path submit bypass the delay.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use dataset_tree::prelude::*;
//! ```
//!
//! The controller is a pure function over a state snapshot:
//!
//! ```rust,no_run
//! use dataset_tree::tree::{ControllerMsg, ControllerSettings, RefreshController, TreeState, update};
//!
//! let mut ctl = RefreshController::new(ControllerSettings::default());
//! let cmds = update(&mut ctl, &TreeState::for_user("ibmuser"), ControllerMsg::Init);
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod tree;
