// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Checkpointed bulk table transfer
//!
//! A table is cloned in bounded-time invocations. Each invocation receives the
//! checkpoint returned by the previous one, does as much work as its
//! [`TimeBudget`] allows, and returns an updated checkpoint. The caller keeps
//! re-invoking until the checkpoint reports `complete`.
//!
//! - [`Exporter`]: scans one segment of the source table, one shard per page
//! - [`Importer`]: replays shards into the destination table in batches
//! - [`SchemaCloner`]: copies the base table schema through the shard store
//!
//! Throttling is absorbed with a [`BackoffPolicy`]; running out of time is a
//! normal return with `complete = false`. Everything else is a [`CloneError`].

mod backoff;
mod budget;
mod error;
mod export;
mod import;
mod schema;
mod state;

pub use backoff::{BackoffPolicy, BASE_INTERVAL, MAX_INTERVAL};
pub use budget::{EXPORT_SAFETY_MARGIN, IMPORT_SAFETY_MARGIN, TimeBudget};
pub use error::{CloneError, ErrorKind};
pub use export::Exporter;
pub use import::{Importer, PROGRESS_INTERVAL, ProgressMeter, ProgressTick};
pub use schema::SchemaCloner;
pub use state::{
    CloneJob, DEFAULT_BATCH_SIZE, DEFAULT_SCAN_LIMIT, ExportCheckpoint, ImportCheckpoint,
    ImportConfig, SchemaResult, SegmentDescriptor,
};

pub type Result<T> = std::result::Result<T, CloneError>;
