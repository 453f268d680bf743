//! Activity logger: session events to the JSONL log, off the session thread.
//!
//! Architecture: a dedicated logger thread owns the [`JsonlWriter`]. The
//! session sends [`ActivityEvent`]s through a bounded crossbeam channel.
//! `try_send()` means a slow disk never stalls path edits or timer handling.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{DstError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Events recorded by a browsing session.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    SessionStarted {
        version: String,
        config_hash: String,
        username: String,
    },
    SessionStopped {
        reason: String,
        uptime_ms: u64,
    },
    PathChanged {
        from: String,
        to: String,
    },
    RefreshScheduled {
        timer: u64,
        path: String,
        delay_ms: u64,
    },
    RefreshFired {
        timer: u64,
        path: String,
    },
    /// Explicit refresh or path-form submit.
    RefreshRequested {
        path: String,
        source: &'static str,
    },
    FetchStarted {
        path: String,
    },
    FetchCompleted {
        path: String,
        count: usize,
        duration_ms: u64,
        stale: bool,
    },
    FetchFailed {
        path: String,
        error_code: String,
        error_message: String,
    },
    MembersFetched {
        child: String,
        count: usize,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

/// Options for the logger thread.
pub struct ActivityLoggerConfig {
    pub jsonl_config: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle plus its join handle.
///
/// The thread runs until `handle.shutdown()` is called or every handle is
/// dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("dstree-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config.jsonl_config, &dropped_clone))
        .map_err(|e| DstError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SessionStarted {
            version,
            config_hash,
            username,
        } => {
            let mut e = LogEntry::new(EventType::SessionStart, Severity::Info);
            e.details = Some(format!(
                "version={version} config_hash={config_hash} user={username}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SessionStopped { reason, uptime_ms } => {
            let mut e = LogEntry::new(EventType::SessionStop, Severity::Info);
            e.details = Some(format!("reason={reason}"));
            e.duration_ms = Some(*uptime_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::PathChanged { from, to } => {
            let mut e = LogEntry::new(EventType::PathChanged, Severity::Info);
            e.previous_path = Some(from.clone());
            e.path = Some(to.clone());
            e
        }
        ActivityEvent::RefreshScheduled {
            timer,
            path,
            delay_ms,
        } => {
            let mut e = LogEntry::new(EventType::RefreshScheduled, Severity::Info);
            e.timer = Some(*timer);
            e.path = Some(path.clone());
            e.duration_ms = Some(*delay_ms);
            e
        }
        ActivityEvent::RefreshFired { timer, path } => {
            let mut e = LogEntry::new(EventType::RefreshFired, Severity::Info);
            e.timer = Some(*timer);
            e.path = Some(path.clone());
            e
        }
        ActivityEvent::RefreshRequested { path, source } => {
            let mut e = LogEntry::new(EventType::RefreshRequested, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(format!("source={source}"));
            e
        }
        ActivityEvent::FetchStarted { path } => {
            let mut e = LogEntry::new(EventType::FetchStarted, Severity::Info);
            e.path = Some(path.clone());
            e
        }
        ActivityEvent::FetchCompleted {
            path,
            count,
            duration_ms,
            stale,
        } => {
            let mut e = LogEntry::new(EventType::FetchCompleted, Severity::Info);
            e.path = Some(path.clone());
            e.count = Some(*count);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            if *stale {
                e.details = Some("stale=true".to_string());
            }
            e
        }
        ActivityEvent::FetchFailed {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::FetchFailed, Severity::Warning);
            e.path = Some(path.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::MembersFetched { child, count } => {
            let mut e = LogEntry::new(EventType::MembersFetched, Severity::Info);
            e.child = Some(child.clone());
            e.count = Some(*count);
            e.ok = Some(true);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::SessionStop, Severity::Info),
    }
}

// ──────────────────── tests ────────────────────
