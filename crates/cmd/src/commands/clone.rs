// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Local driver that plays the orchestrator: re-invokes each engine with its
//! last checkpoint until it reports completion

use anyhow::{Result, bail};
use diagnostics::*;
use futures::future::try_join_all;
use serde::Serialize;
use tokio::time::Instant;
use transfer::{ExportCheckpoint, ImportCheckpoint, SchemaResult, SegmentDescriptor};

use super::{export_command, import_command, schema_export_command, schema_import_command};
use crate::common::{Invocation, Sessions};

/// Consecutive invocations without progress before the driver gives up
const MAX_IDLE_INVOCATIONS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct CloneSummary {
    #[serde(rename = "schemaexport")]
    pub schema_export: SchemaResult,
    #[serde(rename = "schemaimport")]
    pub schema_import: SchemaResult,
    #[serde(rename = "dataexporters")]
    pub segments: Vec<ExportCheckpoint>,
    #[serde(rename = "dataimporter")]
    pub import: ImportCheckpoint,
    pub invocations: usize,
    #[serde(rename = "durationms")]
    pub duration_ms: u64,
}

/// Clone schema and data of the job's source table into its destination.
///
/// Every segment of the job's segment descriptor is exported concurrently,
/// then the shard lists are imported in segment order. Each engine call gets
/// a fresh budget of `invocation.budget`.
pub async fn clone_command(sessions: &Sessions, invocation: &Invocation) -> Result<CloneSummary> {
    let started = Instant::now();
    let job = &invocation.job;
    _ = job.destination()?;

    let schema_export = schema_export_command(sessions, invocation).await?;
    let schema_import = schema_import_command(sessions, invocation).await?;

    let descriptor = job.export_config.normalized()?;
    let exports = try_join_all((0..descriptor.total_segments).map(|segment| {
        let mut step = invocation.clone();
        step.job.export_config = SegmentDescriptor {
            segment,
            ..descriptor
        };
        step.job.export = ExportCheckpoint::default();
        export_segment(sessions, step)
    }))
    .await?;

    let mut invocations = 2;
    let mut segments = Vec::with_capacity(exports.len());
    for (checkpoint, calls) in exports {
        invocations += calls;
        segments.push(checkpoint);
    }

    let shard_ids = segments
        .iter()
        .flat_map(|checkpoint| checkpoint.shard_ids.iter().cloned())
        .collect();
    let mut step = invocation.clone();
    step.job.import = ImportCheckpoint {
        shard_ids,
        ..ImportCheckpoint::default()
    };
    let (import, calls) = import_all(sessions, step).await?;
    invocations += calls;

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    log_info!(
        "cloned {records} records in {invocations} invocations",
        records: import.processed,
        invocations: invocations,
        request_id: invocation.request_id.as_str(),
        table: job.source_table.as_str()
    );
    Ok(CloneSummary {
        schema_export,
        schema_import,
        segments,
        import,
        invocations,
        duration_ms,
    })
}

async fn export_segment(sessions: &Sessions, mut step: Invocation) -> Result<(ExportCheckpoint, usize)> {
    let mut calls = 0;
    let mut idle = 0;
    loop {
        let checkpoint = export_command(sessions, &step).await?;
        calls += 1;
        if checkpoint.complete {
            return Ok((checkpoint, calls));
        }
        if checkpoint.processed == step.job.export.processed
            && checkpoint.continuation_key == step.job.export.continuation_key
        {
            idle += 1;
            if idle >= MAX_IDLE_INVOCATIONS {
                bail!(
                    "segment {} made no progress in {idle} invocations of {:?}",
                    step.job.export_config.segment,
                    step.budget
                );
            }
        } else {
            idle = 0;
        }
        step.job.export = checkpoint;
    }
}

async fn import_all(sessions: &Sessions, mut step: Invocation) -> Result<(ImportCheckpoint, usize)> {
    let mut calls = 0;
    let mut idle = 0;
    loop {
        let checkpoint = import_command(sessions, &step).await?;
        calls += 1;
        if checkpoint.complete {
            return Ok((checkpoint, calls));
        }
        if checkpoint.processed == step.job.import.processed {
            idle += 1;
            if idle >= MAX_IDLE_INVOCATIONS {
                bail!("import made no progress in {idle} invocations of {:?}", step.budget);
            }
        } else {
            idle = 0;
        }
        step.job.import = checkpoint;
    }
}
