//! Remote workspace API access
//!
//! This module provides the typed wrapper over the workspace service's HTTP
//! surface. It is split into:
//!
//! - [`api`]: wire types matching the remote contract (camelCase JSON)
//! - [`client`]: the [`WorkspaceApi`] trait and its reqwest-backed
//!   implementation, mapping every HTTP outcome to a typed [`crate::error::ApiError`]
//!
//! Calls never mutate local state; side effects are confined to the remote
//! service. Resilience (retry, circuit breaking) is layered on top by the
//! decorators in [`crate::resilience`].

pub mod api;
pub mod client;

// Re-export main types for convenience
pub use api::{
    BlockListResponse, CreatePageRequest, DatabasePayload, PagePayload, QueryRequest,
    QueryResponse, SearchRequest, UpdatePageRequest,
};
pub use client::{HttpWorkspaceClient, WorkspaceApi};
