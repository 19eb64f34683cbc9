// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Checkpoints and job descriptors
//!
//! These are the only values that survive between invocations. They travel
//! as JSON through the invocation transport, using the field names the
//! orchestrator already stores.

use crate::{CloneError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tablestore::{Item, MAX_BATCH_SIZE};

/// Page size used when the job leaves `limit` unset
pub const DEFAULT_SCAN_LIMIT: i64 = 10_000;

pub const DEFAULT_BATCH_SIZE: i64 = MAX_BATCH_SIZE as i64;

/// Treat an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Resumable progress of one export segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportCheckpoint {
    /// Records exported so far, across all invocations
    #[serde(default)]
    pub processed: u64,

    /// Shards written so far, in scan order
    #[serde(rename = "records", default, deserialize_with = "null_as_default")]
    pub shard_ids: Vec<String>,

    /// Where the next page starts; absent before the first page and after the last
    #[serde(rename = "lastkey", default)]
    pub continuation_key: Option<Item>,

    /// Wall time spent by the invocation that produced this checkpoint
    #[serde(rename = "durationms", default)]
    pub duration_ms: u64,

    #[serde(default)]
    pub complete: bool,
}

/// Resumable progress of an import
///
/// `processed` is an index into the records of `shard_ids`, concatenated in
/// list order. The list must reach every invocation unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCheckpoint {
    #[serde(default)]
    pub processed: u64,

    #[serde(rename = "records", default, deserialize_with = "null_as_default")]
    pub shard_ids: Vec<String>,

    #[serde(rename = "durationms", default)]
    pub duration_ms: u64,

    #[serde(default)]
    pub complete: bool,
}

impl ImportCheckpoint {
    /// Fresh import of the shards an export produced
    #[must_use]
    pub fn from_export(export: &ExportCheckpoint) -> Self {
        Self {
            shard_ids: export.shard_ids.clone(),
            ..Self::default()
        }
    }
}

/// Which slice of a parallel scan one export job owns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    #[serde(rename = "totalsegments", default)]
    pub total_segments: i64,
    #[serde(default)]
    pub segment: i64,
    /// Maximum records per scanned page
    #[serde(default)]
    pub limit: i64,
}

impl SegmentDescriptor {
    #[must_use]
    pub fn new(segment: i64, total_segments: i64, limit: i64) -> Self {
        Self {
            total_segments,
            segment,
            limit,
        }
    }

    /// Fill in defaults for unset values and check the segment is in range
    pub fn normalized(self) -> Result<Self> {
        let mut out = self;
        if out.limit < 1 {
            out.limit = DEFAULT_SCAN_LIMIT;
        }
        if out.total_segments < 1 {
            out.total_segments = 1;
        }
        if out.segment < 0 || out.segment >= out.total_segments {
            return Err(CloneError::Config(format!(
                "segment {} out of range for {} segments",
                out.segment, out.total_segments
            )));
        }
        if i32::try_from(out.total_segments).is_err() || i32::try_from(out.limit).is_err() {
            return Err(CloneError::Config(format!(
                "segment descriptor out of range: {out:?}"
            )));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(rename = "batchsize", default)]
    pub batch_size: i64,
}

impl ImportConfig {
    /// Batch size to use, defaulting to the backend maximum
    pub fn batch_size(&self) -> Result<usize> {
        match self.batch_size {
            n if n < 1 => Ok(DEFAULT_BATCH_SIZE as usize),
            n if n as u64 > MAX_BATCH_SIZE as u64 => Err(CloneError::Config(format!(
                "batch size {n} exceeds the backend maximum of {MAX_BATCH_SIZE}"
            ))),
            n => Ok(n as usize),
        }
    }
}

/// Everything one invocation needs, as passed by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloneJob {
    pub region: String,
    /// Bucket holding shards and schema documents
    pub bucket: String,
    #[serde(rename = "origtable")]
    pub source_table: String,
    #[serde(rename = "newtable", default)]
    pub destination_table: String,
    #[serde(rename = "dataimporter", default, deserialize_with = "null_as_default")]
    pub import: ImportCheckpoint,
    #[serde(rename = "dataexporter", default, deserialize_with = "null_as_default")]
    pub export: ExportCheckpoint,
    #[serde(rename = "dataimporterconfig", default, deserialize_with = "null_as_default")]
    pub import_config: ImportConfig,
    #[serde(rename = "dataexporterconfig", default, deserialize_with = "null_as_default")]
    pub export_config: SegmentDescriptor,
}

impl CloneJob {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let job: CloneJob = serde_json::from_slice(data)
            .map_err(|e| CloneError::Config(format!("invalid job descriptor: {e}")))?;
        if job.source_table.is_empty() {
            return Err(CloneError::Config("origtable is required".to_string()));
        }
        Ok(job)
    }

    /// Destination table name, required for import steps
    pub fn destination(&self) -> Result<&str> {
        if self.destination_table.is_empty() {
            return Err(CloneError::Config("newtable is required".to_string()));
        }
        Ok(&self.destination_table)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaResult {
    #[serde(rename = "durationms")]
    pub duration_ms: u64,
    pub complete: bool,
}
