// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use transfer::{EXPORT_SAFETY_MARGIN, ExportCheckpoint, Exporter};

use crate::common::{Invocation, Sessions};

/// Export the job's segment, resuming from the job's export checkpoint
pub async fn export_command(sessions: &Sessions, invocation: &Invocation) -> Result<ExportCheckpoint> {
    let job = &invocation.job;
    let ctx = invocation.log_context(&job.source_table);
    let budget = invocation.time_budget(EXPORT_SAFETY_MARGIN);

    let checkpoint = Exporter::new(sessions.table.as_ref(), &sessions.shards, &ctx)
        .scan_segment(&job.source_table, &job.export_config, job.export.clone(), &budget)
        .await?;
    Ok(checkpoint)
}
