//! workspace-sync - resilient synchronization core for a hosted workspace API
//!
//! This crate keeps a local SQLite store consistent with an external
//! hierarchical document/database service (databases containing pages with
//! typed properties and content blocks). It reconciles the two
//! independently-mutable stores, survives transient network and rate-limit
//! failures without corrupting state, resolves edit conflicts
//! deterministically, and guarantees at most one concurrent sync run per
//! remote database.

pub mod cache;
pub mod config;
pub mod coordination;
pub mod database;
pub mod error;
pub mod models;
pub mod monitor;
pub mod remote;
pub mod resilience;
pub mod server;
pub mod sync;
