//! Synchronization core
//!
//! This module orchestrates reconciliation between the local store and the
//! remote workspace service:
//!
//! - [`engine`]: full and incremental sync passes, page upserts, the
//!   deletion sweep, and pushing locally-dirty pages back out
//! - [`conflict`]: last-writer-wins resolution with a local-wins tie-break,
//!   plus optional field-level merging
//! - [`scheduler`]: due-database selection and lease-guarded execution with
//!   at-most-one concurrent run per database

pub mod conflict;
pub mod engine;
pub mod scheduler;

// Re-export main types for convenience
pub use conflict::{ConflictResolver, MergedProperties};
pub use engine::{PushReport, RecordSyncReport, SyncDirection, SyncEngine, UpsertOutcome};
pub use scheduler::{RunReport, Scheduler};
