//! Fetch dispatcher: runs children/members loads off the session thread.
//!
//! Architecture: a dedicated worker thread owns nothing but a shared
//! [`DatasetSource`]. Jobs arrive over a bounded crossbeam channel and each
//! result is posted back to the session's event channel as a
//! [`FetchOutcome`]. `submit()` never blocks the session loop.
//!
//! Shutdown is a disconnect, not a queued message: dropping the stop sender
//! wakes the worker even when the job queue is full or the worker is parked
//! on a full session inbox.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{
    Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError, bounded, select,
};

use super::catalog::DatasetSource;
use super::model::Organization;
use crate::core::errors::{DstError, Result};

/// Default bounded capacity of the job queue.
pub const JOB_QUEUE_CAPACITY: usize = 64;

/// A load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchJob {
    Children(String),
    Members(String),
}

impl FetchJob {
    /// Short label for logs.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Children(path) => path,
            Self::Members(child) => child,
        }
    }
}

/// Result of one job.
#[derive(Debug)]
pub enum FetchOutcome {
    Children {
        path: String,
        result: Result<Vec<(String, Organization)>>,
    },
    Members {
        child: String,
        result: Result<Vec<String>>,
    },
}

/// Issues asynchronous loads on behalf of the session.
pub trait FetchDispatcher {
    /// Queue a job. Errors mean the job was not accepted.
    fn submit(&self, job: FetchJob) -> Result<()>;

    /// Stop accepting work and release the worker.
    fn shutdown(&mut self) {}
}

/// Run one job synchronously against a source.
pub fn run_job(source: &dyn DatasetSource, job: FetchJob) -> FetchOutcome {
    match job {
        FetchJob::Children(path) => {
            let result = source.list_children(&path);
            FetchOutcome::Children { path, result }
        }
        FetchJob::Members(child) => {
            let result = source.list_members(&child);
            FetchOutcome::Members { child, result }
        }
    }
}

/// How long the worker waits on a full session inbox before checking for
/// shutdown again.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Worker-thread dispatcher.
pub struct ThreadDispatcher {
    tx: Option<Sender<FetchJob>>,
    /// Never sent on; dropping it tells the worker to stop.
    stop: Option<Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl ThreadDispatcher {
    /// Spawn the worker. Outcomes are converted into `T` and sent on `sink`;
    /// the worker exits when the sink disconnects or on shutdown.
    pub fn spawn<T>(
        source: Arc<dyn DatasetSource>,
        capacity: usize,
        sink: Sender<T>,
    ) -> Result<Self>
    where
        T: From<FetchOutcome> + Send + 'static,
    {
        let (tx, rx) = bounded::<FetchJob>(capacity.max(1));
        let (stop, stop_rx) = bounded::<()>(0);
        let join = thread::Builder::new()
            .name("dstree-fetch".to_string())
            .spawn(move || worker_main(&rx, &stop_rx, source.as_ref(), &sink))
            .map_err(|e| DstError::Runtime {
                details: format!("failed to spawn fetch worker: {e}"),
            })?;
        Ok(Self {
            tx: Some(tx),
            stop: Some(stop),
            join: Some(join),
        })
    }
}

impl FetchDispatcher for ThreadDispatcher {
    fn submit(&self, job: FetchJob) -> Result<()> {
        let closed = DstError::ChannelClosed {
            component: "fetch-dispatcher",
        };
        let Some(tx) = self.tx.as_ref() else {
            return Err(closed);
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DstError::Runtime {
                details: "fetch queue is full".to_string(),
            }),
            Err(TrySendError::Disconnected(_)) => Err(closed),
        }
    }

    fn shutdown(&mut self) {
        self.stop.take();
        self.tx.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main<T>(
    rx: &Receiver<FetchJob>,
    stop: &Receiver<()>,
    source: &dyn DatasetSource,
    sink: &Sender<T>,
) where
    T: From<FetchOutcome>,
{
    loop {
        let job = select! {
            recv(stop) -> _ => return,
            recv(rx) -> msg => match msg {
                Ok(job) => job,
                Err(_) => return,
            },
        };
        if !post(sink, stop, T::from(run_job(source, job))) {
            return;
        }
    }
}

/// Hand one outcome to the session. False once the session is gone or
/// shutdown was requested while the inbox stayed full.
fn post<T>(sink: &Sender<T>, stop: &Receiver<()>, mut value: T) -> bool {
    loop {
        match sink.send_timeout(value, STOP_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Disconnected(_)) => return false,
            Err(SendTimeoutError::Timeout(back)) => {
                if matches!(stop.try_recv(), Err(TryRecvError::Disconnected)) {
                    return false;
                }
                value = back;
            }
        }
    }
}
