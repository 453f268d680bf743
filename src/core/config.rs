//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DstError, Result};
use crate::core::qualifier;
use crate::logger::jsonl::JsonlConfig;
use crate::tree::controller::ControllerSettings;

/// Longest debounce accepted, in milliseconds.
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Full dstree configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub session: SessionConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
    /// File the config was loaded from (or would have been).
    #[serde(skip)]
    pub source: PathBuf,
}

/// Refresh controller knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    pub debounce_ms: u64,
    /// Path opened on mount. Empty means the session username.
    pub default_path: String,
    pub uppercase_paths: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Empty means `$USER`.
    pub username: String,
    /// Whether the viewer may see the tree at all.
    pub validated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogConfig {
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_log: PathBuf,
    pub fallback_log: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            default_path: String::new(),
            uppercase_paths: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            validated: true,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            file: home_dir().join(".config").join("dstree").join("catalog.toml"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jsonl_log: home_dir()
                .join(".local")
                .join("share")
                .join("dstree")
                .join("activity.jsonl"),
            fallback_log: Some(PathBuf::from("/tmp/dstree-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[DST-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir().join(".config").join("dstree").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path is not an error; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    /// Like [`Config::load`], with an injectable environment.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DstError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(DstError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.source = path_buf;
        cfg.apply_env_overrides_from(lookup)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over canonical JSON, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Controller knobs with the default path normalized.
    #[must_use]
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            debounce: Duration::from_millis(self.controller.debounce_ms),
            default_path: qualifier::normalize(
                &self.controller.default_path,
                self.controller.uppercase_paths,
            ),
            uppercase_paths: self.controller.uppercase_paths,
        }
    }

    /// Path the tree opens on: configured default, else the username.
    #[must_use]
    pub fn resolved_default_path(&self) -> String {
        let configured = &self.controller.default_path;
        let raw = if configured.trim().is_empty() {
            &self.session.username
        } else {
            configured
        };
        qualifier::normalize(raw, self.controller.uppercase_paths)
    }

    /// JSONL writer settings derived from `[logging]`.
    #[must_use]
    pub fn jsonl_config(&self) -> JsonlConfig {
        JsonlConfig {
            path: self.logging.jsonl_log.clone(),
            fallback_path: self.logging.fallback_log.clone(),
            max_size_bytes: self.logging.max_size_bytes,
            max_rotated_files: self.logging.max_rotated_files,
        }
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DSTREE_DEBOUNCE_MS") {
            self.controller.debounce_ms = parse_env_u64("DSTREE_DEBOUNCE_MS", &raw)?;
        }
        if let Some(raw) = lookup("DSTREE_DEFAULT_PATH") {
            self.controller.default_path = raw;
        }
        if let Some(raw) = lookup("DSTREE_UPPERCASE_PATHS") {
            self.controller.uppercase_paths = parse_env_bool("DSTREE_UPPERCASE_PATHS", &raw)?;
        }
        if let Some(raw) = lookup("DSTREE_USERNAME") {
            self.session.username = raw;
        }
        if let Some(raw) = lookup("DSTREE_VALIDATED") {
            self.session.validated = parse_env_bool("DSTREE_VALIDATED", &raw)?;
        }
        if let Some(raw) = lookup("DSTREE_CATALOG_FILE") {
            self.catalog.file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DSTREE_LOG_ENABLED") {
            self.logging.enabled = parse_env_bool("DSTREE_LOG_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("DSTREE_JSONL_LOG") {
            self.logging.jsonl_log = PathBuf::from(raw);
        }

        // Session user falls back to the login name.
        if self.session.username.trim().is_empty()
            && let Some(user) = lookup("USER").or_else(|| lookup("LOGNAME"))
        {
            self.session.username = user;
        }
        Ok(())
    }

    /// Expand a leading `~/` in file paths and trim the username.
    fn normalize_paths(&mut self) {
        let home = env::var_os("HOME").map(PathBuf::from);
        let expand = |path: &mut PathBuf| {
            if let (Some(home), Ok(rest)) = (home.as_ref(), path.strip_prefix("~")) {
                *path = home.join(rest);
            }
        };
        expand(&mut self.catalog.file);
        expand(&mut self.logging.jsonl_log);
        if let Some(fallback) = self.logging.fallback_log.as_mut() {
            expand(fallback);
        }
        self.session.username = self.session.username.trim().to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_DEBOUNCE_MS).contains(&self.controller.debounce_ms) {
            return Err(DstError::InvalidConfig {
                details: format!(
                    "controller.debounce_ms must be in [1,{MAX_DEBOUNCE_MS}], got {}",
                    self.controller.debounce_ms
                ),
            });
        }
        if self.resolved_default_path().is_empty() {
            return Err(DstError::InvalidConfig {
                details: "controller.default_path is empty and no session username is known \
                          (set session.username or DSTREE_USERNAME)"
                    .to_string(),
            });
        }
        if self.resolved_default_path().len() > qualifier::MAX_QUALIFIER_LEN {
            return Err(DstError::InvalidConfig {
                details: format!(
                    "default path exceeds {} characters",
                    qualifier::MAX_QUALIFIER_LEN
                ),
            });
        }
        if self.logging.max_rotated_files == 0 {
            return Err(DstError::InvalidConfig {
                details: "logging.max_rotated_files must be >= 1".to_string(),
            });
        }
        if self.logging.max_size_bytes == 0 {
            return Err(DstError::InvalidConfig {
                details: "logging.max_size_bytes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|error| DstError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim().parse::<bool>().map_err(|error| DstError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
