//! JSONL logger: append-only line-delimited JSON activity log.
//!
//! Each line is a self-contained JSON object assembled in memory and written
//! with a single `write_all`, so a tailing reader never sees half a line.
//!
//! Four-level fallback chain:
//! 1. Primary file path
//! 2. Fallback path (e.g. under `/tmp`)
//! 3. stderr with `[DST-JSONL]` prefix
//! 4. Silent discard (a browsing session never dies for logging failures)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DstError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types for the tree session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionStop,
    PathChanged,
    RefreshScheduled,
    RefreshFired,
    RefreshRequested,
    FetchStarted,
    FetchCompleted,
    FetchFailed,
    MembersFetched,
    Error,
}

/// One log line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Current path / qualifier at the time of the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Previous path for transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    /// Child dataset the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,
    /// Number of items returned by a fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Deferred refresh timer identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// DST error code if the action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: utc_timestamp(),
            event,
            severity,
            path: None,
            previous_path: None,
            child: None,
            count: None,
            timer: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where the writer currently sends lines. Each step down the chain is
/// one-way for the life of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl WriterState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Optional fallback path (e.g. on a different filesystem).
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the active file would grow past this many bytes.
    pub max_size_bytes: u64,
    /// Rotated generations kept next to the active file (`.1` newest).
    pub max_rotated_files: u32,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/dstree/activity.jsonl"),
            fallback_path: None,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// An open log file and how much of it is already used.
struct ActiveFile {
    path: PathBuf,
    out: BufWriter<File>,
    len: u64,
}

impl ActiveFile {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| DstError::io(parent, source))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| DstError::io(path, source))?;
        let len = file.metadata().map_or(0, |m| m.len());
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::with_capacity(WRITE_BUFFER, file),
            len,
        })
    }

    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.out.write_all(line)?;
        self.len += line.len() as u64;
        Ok(())
    }
}

const WRITE_BUFFER: usize = 16 * 1024;

/// Append-only JSONL log writer with size rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    state: WriterState,
    active: Option<ActiveFile>,
}

impl JsonlWriter {
    /// Open the primary log, stepping down the chain until something works.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            state: WriterState::Primary,
            active: None,
        };
        match ActiveFile::open(&writer.config.path) {
            Ok(file) => writer.active = Some(file),
            Err(e) => writer.step_down(&e.to_string()),
        }
        writer
    }

    /// Serialize `entry` and append it as one line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.emit(line.as_bytes());
            }
            Err(e) => diag(&format!("serialize error: {e}")),
        }
    }

    /// Flush buffered lines and sync the file to disk.
    pub fn flush(&mut self) {
        if let Some(active) = self.active.as_mut() {
            let _ = active.out.flush();
            let _ = active.out.get_ref().sync_data();
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    fn emit(&mut self, line: &[u8]) {
        loop {
            match self.state {
                WriterState::Primary | WriterState::Fallback => {
                    let Some(active) = self.active.as_mut() else {
                        self.step_down("no open file");
                        continue;
                    };
                    if active.len > 0 && active.len + line.len() as u64 > self.config.max_size_bytes {
                        if let Err(e) = self.rotate() {
                            self.step_down(&e.to_string());
                            continue;
                        }
                    }
                    let Some(active) = self.active.as_mut() else {
                        continue;
                    };
                    match active.append(line) {
                        Ok(()) => return,
                        Err(e) => self.step_down(&e.to_string()),
                    }
                }
                WriterState::Stderr => {
                    let mut err = io::stderr().lock();
                    if err.write_all(b"[DST-JSONL] ").and_then(|()| err.write_all(line)).is_err() {
                        self.state = WriterState::Discard;
                    }
                    return;
                }
                WriterState::Discard => return,
            }
        }
    }

    /// Move one step down: primary to fallback (if configured and openable),
    /// anything file-backed to stderr.
    fn step_down(&mut self, reason: &str) {
        self.active = None;
        if self.state == WriterState::Primary {
            if let Some(fallback) = self.config.fallback_path.clone() {
                match ActiveFile::open(&fallback) {
                    Ok(file) => {
                        diag(&format!(
                            "primary log unusable ({reason}), using fallback: {}",
                            fallback.display()
                        ));
                        self.active = Some(file);
                        self.state = WriterState::Fallback;
                        return;
                    }
                    Err(e) => diag(&format!("fallback log unusable ({e})")),
                }
            }
        }
        if matches!(self.state, WriterState::Primary | WriterState::Fallback) {
            diag(&format!("log file unusable ({reason}), using stderr"));
            self.state = WriterState::Stderr;
        }
    }

    /// Shift `base.N-1` to `base.N` down to `base` to `base.1`, then reopen.
    fn rotate(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        let _ = active.out.flush();
        let base = active.path.clone();
        drop(active);

        let keep = self.config.max_rotated_files;
        let _ = fs::remove_file(rotated_name(&base, keep));
        for generation in (1..keep).rev() {
            let _ = rename(rotated_name(&base, generation), rotated_name(&base, generation + 1));
        }
        rename(&base, rotated_name(&base, 1)).map_err(|source| DstError::io(&base, source))?;

        self.active = Some(ActiveFile::open(&base)?);
        Ok(())
    }
}

// ──────────────────────── helpers ────────────────────────

fn diag(message: &str) {
    let _ = writeln!(io::stderr(), "[DST-JSONL] {message}");
}

/// `activity.jsonl` → `activity.jsonl.2`.
fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

fn utc_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
