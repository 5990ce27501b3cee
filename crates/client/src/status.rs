//! Derived sync status.
//!
//! [`SyncStatus`] is never persisted. It is recomputed from the connectivity
//! monitor and the write queue length and published on a watch channel.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::connectivity::ConnectivityState;
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub was_offline: bool,
    pub pending_count: usize,
}

#[derive(Clone)]
pub(crate) struct StatusBoard {
    tx: Arc<watch::Sender<SyncStatus>>,
}

impl StatusBoard {
    pub(crate) fn new(initial: SyncStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn current(&self) -> SyncStatus {
        *self.tx.borrow()
    }

    pub(crate) fn set_pending(&self, pending_count: usize) {
        self.tx.send_if_modified(|status| {
            let changed = status.pending_count != pending_count;
            status.pending_count = pending_count;
            changed
        });
    }

    pub(crate) fn set_connectivity(&self, state: ConnectivityState) {
        self.tx.send_if_modified(|status| {
            let changed = status.online != state.online || status.was_offline != state.was_offline;
            status.online = state.online;
            status.was_offline = state.was_offline;
            changed
        });
    }

    pub(crate) fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Call `callback` with each new status. Rapid updates may coalesce; the
    /// callback always sees the latest value.
    pub(crate) fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(SyncStatus) + Send + 'static,
    {
        let mut rx = self.watch();
        Subscription::new(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let status = *rx.borrow_and_update();
                callback(status);
            }
        }))
    }
}
