//! Write queue replay.
//!
//! Drains the queue strictly in order, one request at a time. The head is
//! only removed after the backend confirms it, so a crash mid-replay leaves it
//! queued rather than lost or duplicated.
//!
//! ### Failure policy
//! - Auth rejection: credentials cleared, loop stops, no attempt counted
//! - Transient (connectivity, 5xx, 408, 429): attempt counted, loop stops
//! - Permanent (other 4xx): attempt counted; once `max_attempts` is reached
//!   the entry moves to the dead-letter list and the loop continues
//!
//! Only one replay runs at a time per engine. Sharing a store between
//! processes is not supported.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tripsync_core::{CredentialStore, Error, WriteQueue};

use crate::classify::{FailureClass, classify, is_permanent_rejection};
use crate::connectivity::ConnectivityMonitor;
use crate::dispatch::authorize;
use crate::status::StatusBoard;
use crate::transport::Transport;

/// Why a replay ended before the queue was empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The head failed in a way that may succeed later.
    Transient { url: String, error: String, attempts: u32 },
    /// Credentials were rejected; they have been cleared.
    AuthRejected { url: String },
    /// The monitor reported offline before the next entry.
    WentOffline,
    /// The queue was cleared or replaced underneath the replay.
    QueueChanged,
}

/// Summary of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replayed: usize,
    pub dead_lettered: usize,
    pub remaining: usize,
    pub stopped: Option<StopReason>,
    /// Another replay was already running; nothing was attempted.
    pub skipped: bool,
}

impl ReplayReport {
    pub fn is_drained(&self) -> bool {
        !self.skipped && self.remaining == 0
    }
}

#[derive(Clone)]
pub struct ReplayEngine {
    transport: Arc<dyn Transport>,
    queue: WriteQueue,
    credentials: CredentialStore,
    monitor: ConnectivityMonitor,
    status: StatusBoard,
    max_attempts: u32,
    running: Arc<Mutex<()>>,
}

impl ReplayEngine {
    pub(crate) fn new(
        transport: Arc<dyn Transport>, queue: WriteQueue, credentials: CredentialStore, monitor: ConnectivityMonitor,
        status: StatusBoard, max_attempts: u32,
    ) -> Self {
        Self { transport, queue, credentials, monitor, status, max_attempts, running: Arc::new(Mutex::new(())) }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Drain the queue until it is empty or an entry fails.
    ///
    /// Replay failures are reported in the returned [`ReplayReport`], not as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the queue cannot be read or written.
    pub async fn run(&self) -> Result<ReplayReport, Error> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("replay already in progress");
            return Ok(ReplayReport { skipped: true, remaining: self.queue.len().await?, ..Default::default() });
        };

        let mut report = ReplayReport::default();
        let stopped = self.drain(&mut report).await?;
        report.stopped = stopped;
        report.remaining = self.queue.len().await?;
        self.status.set_pending(report.remaining);

        tracing::info!(
            replayed = report.replayed,
            dead_lettered = report.dead_lettered,
            pending = report.remaining,
            stopped = ?report.stopped,
            "replay finished"
        );
        Ok(report)
    }

    async fn drain(&self, report: &mut ReplayReport) -> Result<Option<StopReason>, Error> {
        loop {
            if !self.monitor.is_online() {
                return Ok(Some(StopReason::WentOffline));
            }
            let Some(head) = self.queue.peek_head().await? else {
                return Ok(None);
            };

            let api_origin = self.transport.api_origin();
            let wire = authorize(&head.to_request(), &self.credentials, api_origin.as_deref()).await?;
            let err = match self.transport.send(&wire).await {
                Ok(_) => {
                    if !self.queue.complete_head(&head).await? {
                        return Ok(Some(StopReason::QueueChanged));
                    }
                    report.replayed += 1;
                    self.status.set_pending(self.queue.len().await?);
                    tracing::debug!(method = %head.method, url = %head.url, "replayed queued mutation");
                    continue;
                }
                Err(err) => err,
            };

            let class = classify(&err, self.monitor.is_online());
            if class == FailureClass::Auth {
                self.credentials.clear().await?;
                tracing::warn!(url = %head.url, "credentials rejected during replay");
                return Ok(Some(StopReason::AuthRejected { url: head.url }));
            }

            let reason = err.reason();
            let Some(updated) = self.queue.record_failure(&head, &reason).await? else {
                return Ok(Some(StopReason::QueueChanged));
            };

            let exhausted = self.max_attempts > 0 && updated.attempts >= self.max_attempts;
            if class == FailureClass::Other && is_permanent_rejection(&err) && exhausted {
                if !self.queue.dead_letter_head(&updated, &reason).await? {
                    return Ok(Some(StopReason::QueueChanged));
                }
                report.dead_lettered += 1;
                continue;
            }

            tracing::debug!(url = %head.url, attempts = updated.attempts, error = %reason, "replay stopped");
            return Ok(Some(StopReason::Transient { url: updated.url, error: reason, attempts: updated.attempts }));
        }
    }
}
