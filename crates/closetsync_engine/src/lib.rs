//! # closetsync engine
//!
//! Offline-first synchronization engine for user profile state.
//!
//! This crate provides:
//! - Durable operation queue ([`DurableQueue`])
//! - Resilient network client with timeout, retry and offline fallback
//!   ([`NetworkClient`])
//! - Remote profile service abstraction ([`RemoteProfileService`])
//! - Connectivity tracking ([`ConnectivityMonitor`])
//! - The sync orchestrator ([`SyncOrchestrator`])
//!
//! ## Architecture
//!
//! The engine implements a **drain-then-merge** cycle:
//! 1. Dispatch queued operations to the server in arrival order
//! 2. Persist the updated queue
//! 3. Fetch the remote snapshot, merge it with local state and publish it
//!
//! Cycles are triggered by a periodic timer, by the device coming back
//! online, by enqueuing while online and by explicit [`SyncOrchestrator::sync_now`].
//!
//! ## Key Invariants
//!
//! - At most one drain cycle runs at a time; extra triggers are dropped
//! - Operations are dispatched in enqueue order; one failure does not stop the rest
//! - Failed operations are retried on later cycles, then abandoned and reported
//! - A failed remote fetch leaves local state untouched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod error;
mod http;
mod profile_store;
mod queue;
mod state;
mod transport;

pub use config::{Backoff, CallOptions, SyncConfig, LAST_SYNC_KEY, PROFILE_KEY, QUEUE_KEY};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpRequest, HttpResponse, Method, NetworkClient, ReqwestClient, ResponseBody,
};
pub use profile_store::{MemoryProfileStore, ProfileStore, StoredProfileStore};
pub use queue::DurableQueue;
pub use state::{
    DispatchFailure, MergeOutcome, SkipReason, SyncCycleResult, SyncHandle, SyncOrchestrator,
    SyncOutcome, SyncState, SyncStats, SyncStatus,
};
pub use transport::{HttpProfileService, MockProfileService, RemoteProfileService};
