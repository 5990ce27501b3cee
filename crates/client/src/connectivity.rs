//! Connectivity monitor.
//!
//! Two observable states, online and offline, plus the transient
//! `was_offline` flag raised on reconnect. The monitor never probes the
//! network itself: some platform signal calls [`ConnectivityMonitor::report`]
//! and the monitor deduplicates, so subscribers see exactly one event per
//! genuine transition.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::subscription::Subscription;

const TRANSITION_BUFFER: usize = 32;

/// Snapshot of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityState {
    pub online: bool,
    /// Set on `Offline -> Online`, cleared by acknowledgement or by going
    /// offline again.
    pub was_offline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    WentOffline,
    CameOnline,
}

struct Inner {
    state: watch::Sender<ConnectivityState>,
    transitions: broadcast::Sender<Transition>,
}

/// Cheaply cloneable handle; clones share state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(ConnectivityState { online: initially_online, was_offline: false });
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self { inner: Arc::new(Inner { state, transitions }) }
    }

    pub fn is_online(&self) -> bool {
        self.inner.state.borrow().online
    }

    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.borrow()
    }

    /// Feed a platform connectivity signal.
    ///
    /// Returns the transition if the signal changed state, `None` for a
    /// repeated signal. Transitions are published while the state lock is
    /// held, so subscribers observe them in the order they happened.
    pub fn report(&self, online: bool) -> Option<Transition> {
        let mut transition = None;
        self.inner.state.send_if_modified(|state| {
            if state.online == online {
                return false;
            }
            let t = if online { Transition::CameOnline } else { Transition::WentOffline };
            state.online = online;
            state.was_offline = online;
            // no receivers is fine
            let _ = self.inner.transitions.send(t);
            transition = Some(t);
            true
        });

        if let Some(t) = transition {
            tracing::info!(transition = ?t, "connectivity changed");
        }
        transition
    }

    /// Clear `was_offline` once the "back online" notice has been shown.
    pub fn acknowledge_reconnect(&self) {
        self.inner.state.send_if_modified(|state| std::mem::replace(&mut state.was_offline, false));
    }

    /// Receiver for raw transition events.
    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.inner.transitions.subscribe()
    }

    /// Receiver for state snapshots.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.inner.state.subscribe()
    }

    /// Invoke `callback` once per transition until the subscription is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Transition) + Send + 'static,
    {
        let mut rx = self.transitions();
        Subscription::new(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(t) => callback(t),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "connectivity subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor").field("state", &self.state()).finish()
    }
}
