//! Core types: errors, configuration, qualifier handling.

pub mod config;
pub mod errors;
pub mod qualifier;
