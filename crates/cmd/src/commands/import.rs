// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use transfer::{IMPORT_SAFETY_MARGIN, ImportCheckpoint, Importer};

use crate::common::{Invocation, Sessions};

/// Import the job's shard list into the destination table, resuming from
/// the job's import checkpoint
pub async fn import_command(sessions: &Sessions, invocation: &Invocation) -> Result<ImportCheckpoint> {
    let job = &invocation.job;
    let destination = job.destination()?;
    let batch_size = job.import_config.batch_size()?;
    let ctx = invocation.log_context(destination);
    let budget = invocation.time_budget(IMPORT_SAFETY_MARGIN);

    let checkpoint = Importer::new(sessions.table.as_ref(), &sessions.shards, &ctx)
        .import_into(destination, &job.source_table, job.import.clone(), batch_size, &budget)
        .await?;
    Ok(checkpoint)
}
