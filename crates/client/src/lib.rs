//! Network side of tripsync.
//!
//! This crate provides the HTTP transport, connectivity monitor, failure
//! classification, dispatcher and replay engine, tied together by
//! [`SyncEngine`], the single handle UI collaborators talk to.

pub mod classify;
pub mod connectivity;
pub mod dispatch;
pub mod engine;
pub mod replay;
pub mod resources;
pub mod status;
pub mod subscription;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{FailureClass, classify};
pub use connectivity::{ConnectivityMonitor, ConnectivityState, Transition};
pub use dispatch::{DispatchOutcome, Dispatcher, Provenance};
pub use engine::{EngineOptions, QueueStatus, SyncEngine};
pub use replay::{ReplayEngine, ReplayReport, StopReason};
pub use resources::Resource;
pub use status::SyncStatus;
pub use subscription::Subscription;
pub use transport::http::HttpConfig;
pub use transport::{ApiResponse, HttpTransport, Transport, TransportError};
