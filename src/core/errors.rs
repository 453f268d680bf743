//! DST-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DstError>;

/// Top-level error type for the dataset tree browser.
#[derive(Debug, Error)]
pub enum DstError {
    #[error("[DST-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DST-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DST-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DST-2001] invalid qualifier {qualifier:?}: {details}")]
    InvalidQualifier { qualifier: String, details: String },

    #[error("[DST-2002] catalog parse failure in {path}: {details}")]
    CatalogParse { path: PathBuf, details: String },

    #[error("[DST-2003] dataset not found: {name}")]
    DatasetNotFound { name: String },

    #[error("[DST-2004] dataset {name} has no members (organization {organization})")]
    NotPartitioned { name: String, organization: String },

    #[error("[DST-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DST-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DST-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DST-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DstError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DST-1001",
            Self::MissingConfig { .. } => "DST-1002",
            Self::ConfigParse { .. } => "DST-1003",
            Self::InvalidQualifier { .. } => "DST-2001",
            Self::CatalogParse { .. } => "DST-2002",
            Self::DatasetNotFound { .. } => "DST-2003",
            Self::NotPartitioned { .. } => "DST-2004",
            Self::Serialization { .. } => "DST-2101",
            Self::Io { .. } => "DST-3002",
            Self::ChannelClosed { .. } => "DST-3003",
            Self::Runtime { .. } => "DST-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DstError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DstError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
