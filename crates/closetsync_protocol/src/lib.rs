//! # closetsync protocol
//!
//! Data model and pure algorithms for closetsync.
//!
//! This crate provides:
//! - [`Operation`] and [`Mutation`] for queued user-state changes
//! - [`UserProfile`] snapshots with closet and feedback state
//! - [`OperationLog`], the in-memory operation queue
//! - [`merge`], the last-write-wins-per-field merge of two snapshots
//!
//! This is a pure crate with no I/O operations. Persistence lives in
//! `closetsync_storage`, network and scheduling in `closetsync_engine`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod merge;
mod operation;
mod oplog;
mod profile;

pub use error::{ProtocolError, ProtocolResult};
pub use merge::{merge, merge_optional};
pub use operation::{
    current_timestamp, ClosetItemChanges, FeedbackList, Mutation, Operation, OperationId,
    OperationKind, Timestamp,
};
pub use oplog::{FailureOutcome, OperationLog};
pub use profile::{ClosetItem, Feedback, Outfit, UserProfile};
