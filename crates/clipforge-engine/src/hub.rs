//! Progress hub: long-lived job records with server-push fan-out.
//!
//! Ownership is strictly one-way: the hub owns jobs, a job owns its
//! listener set, listeners know the job only by id. Workers publish from
//! blocking threads; listeners consume from async tasks. A listener that
//! cannot keep up is detached rather than allowed to block the rest.

use crate::progress::JobProgress;
use clipforge_core::CancelFlag;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-listener buffer. A handle further behind than this is dropped.
const LISTENER_BUFFER: usize = 16;

struct Listener {
    id: u64,
    tx: mpsc::Sender<JobProgress>,
}

/// One live job record.
pub struct JobHandle {
    pub id: Uuid,
    pub cancel: CancelFlag,
    latest: Mutex<JobProgress>,
    listeners: Mutex<Vec<Listener>>,
}

impl JobHandle {
    /// Latest known progress snapshot.
    pub fn snapshot(&self) -> JobProgress {
        self.latest.lock().clone()
    }
}

/// Owns all job records and fans progress out to attached listeners.
#[derive(Default)]
pub struct ProgressHub {
    jobs: Mutex<HashMap<Uuid, Arc<JobHandle>>>,
    next_listener_id: AtomicU64,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a job record. Returns synchronously, before any work runs.
    pub fn submit(&self, total_clips: u32) -> Arc<JobHandle> {
        let job = Arc::new(JobHandle {
            id: Uuid::new_v4(),
            cancel: CancelFlag::new(),
            latest: Mutex::new(JobProgress::queued(total_clips)),
            listeners: Mutex::new(Vec::new()),
        });
        self.jobs.lock().insert(job.id, Arc::clone(&job));
        info!(job = %job.id, total_clips, "Job submitted");
        job
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<JobHandle>> {
        self.jobs.lock().get(&id).cloned()
    }

    /// Attach a listener. The latest snapshot is replayed immediately; if
    /// the job is already terminal the stream closes right after it.
    ///
    /// Returns the listener id (for [`detach`](Self::detach)) and the
    /// receiving end of the stream.
    pub fn attach(&self, id: Uuid) -> Option<(u64, mpsc::Receiver<JobProgress>)> {
        let job = self.get(id)?;
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        let listener_id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);

        let latest = job.snapshot();
        let terminal = latest.is_terminal();
        // Replay cannot fail: the channel is fresh and empty.
        let _ = tx.try_send(latest);

        if !terminal {
            job.listeners.lock().push(Listener {
                id: listener_id,
                tx,
            });
        }
        debug!(job = %id, listener = listener_id, terminal, "Listener attached");
        Some((listener_id, rx))
    }

    /// Remove a listener; safe to call repeatedly or after the fact.
    pub fn detach(&self, id: Uuid, listener_id: u64) {
        if let Some(job) = self.get(id) {
            job.listeners.lock().retain(|l| l.id != listener_id);
        }
    }

    /// Record a new snapshot and push it to every listener. Send failures
    /// detach only the failing handle; a terminal snapshot closes all
    /// streams after delivery.
    pub fn publish(&self, job: &JobHandle, progress: JobProgress) {
        *job.latest.lock() = progress.clone();

        let mut listeners = job.listeners.lock();
        listeners.retain(|listener| match listener.tx.try_send(progress.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(listener = listener.id, "Listener too slow; detaching");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if progress.is_terminal() {
            // Dropping the senders closes every surviving stream after the
            // terminal event they just received.
            listeners.clear();
        }
    }

    /// Flip a job's cancel flag. Returns false for unknown jobs.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.get(id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }
}
