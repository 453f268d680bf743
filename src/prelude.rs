//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use dataset_tree::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DstError, Result};
pub use crate::core::qualifier::QualifierPattern;

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};

// Tree
pub use crate::tree::catalog::{Catalog, DatasetSource, ReloadableCatalog};
pub use crate::tree::controller::{ControllerSettings, RefreshController, update};
pub use crate::tree::dispatcher::{FetchDispatcher, FetchJob, FetchOutcome, ThreadDispatcher};
pub use crate::tree::model::{ControllerCmd, ControllerMsg, Organization, TreeState, is_toggled};
pub use crate::tree::render::{TreeView, render};
pub use crate::tree::runtime::{RenderSink, Session, SessionEvent, UserInput};
pub use crate::tree::store::{StoreAction, TreeStore};
