//! The replicated-store seam.
//!
//! Tandem clients never talk to a concrete database; every component is
//! written against the [`Store`] trait: path-addressed reads and writes,
//! whole-value and child-append subscriptions, a connectivity signal, and
//! last-will registration. Server timestamps are opaque sentinels resolved
//! by the store at write time (see `tandem_schema::Timestamp`).
//!
//! [`MemoryStore`] is a complete in-process implementation. It backs the
//! test suite and offline play, and doubles as the reference semantics for
//! any real backend: per-path serialized writes, atomic multi-path
//! removal, and snapshot (never torn) change notifications.

use tandem_schema::Path;
use thiserror::Error;

mod backend;
mod memory;

pub use backend::{ChildEvent, ChildFeed, Store, ValueFeed};
pub use memory::MemoryStore;

/// Errors surfaced by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: no connectivity")]
    Unavailable,

    #[error("permission denied at {0}")]
    PermissionDenied(Path),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("no value at {0}")]
    NotFound(Path),

    #[error("value already exists at {0}")]
    AlreadyExists(Path),

    #[error("store request timed out")]
    Timeout,

    #[error("malformed record: {0}")]
    Serialization(#[from] serde_json::Error),
}
