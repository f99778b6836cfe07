//! # Livelink Connector
//!
//! Incremental traversal of a Livelink document repository for a search
//! indexer.
//!
//! ## Traversal core
//!
//! - [`traversal`] - Checkpointed, time-bounded traversal loop
//! - [`checkpoint`] - The four-field checkpoint and its text format
//! - [`genealogist`] - Location filtering by walking the hierarchy
//! - [`queries`] - Per-dialect query templates
//! - [`document`] - Add and delete documents with their properties
//!
//! ## Architecture
//!
//! ```text
//! checkpoint ──► TraversalManager ──► Repository ──► RepositoryClient
//!                    │     ▲                          (SQL Server, Oracle)
//!                    │     └── Genealogist (LRU caches)
//!                    ▼
//!               DocumentList ──► DocumentSink ──► CheckpointStore
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Common test patterns that are acceptable
#![cfg_attr(
    test,
    allow(
        clippy::field_reassign_with_default,
        clippy::float_cmp,
        clippy::manual_let_else,
        clippy::needless_return,
        clippy::unreadable_literal,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::no_effect_underscore_binding,
        unused_mut
    )
)]

// ── Foundations ──

/// Connector error types.
pub mod error;

/// Connector configuration types.
pub mod config;

/// Date encodings for checkpoints, queries and properties.
pub mod date_format;

/// Bounded LRU cache.
pub mod cache;

/// Traversal metrics.
pub mod metrics;

// ── Repository access ──

/// Repository client capability and query results.
pub mod client;

/// Dialect query templates.
pub mod queries;

/// Typed repository operations.
pub mod repository;

// ── Traversal ──

/// Traversal checkpoint.
pub mod checkpoint;

/// Hierarchy-walking location filter.
pub mod genealogist;

/// Documents and document batches.
pub mod document;

/// Incremental traversal manager.
pub mod traversal;

// ── Runtime ──

/// Checkpoint persistence.
pub mod store;

/// Background traversal driver.
pub mod runtime;

/// Testing utilities (mock repository, recording client, sinks).
pub mod testing;

pub use checkpoint::Checkpoint;
pub use config::LivelinkConfig;
pub use document::{Action, Document, DocumentList};
pub use error::ConnectorError;
pub use traversal::{TraversalManager, TraversalOutcome};
