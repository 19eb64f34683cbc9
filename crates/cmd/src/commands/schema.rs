// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use transfer::{SchemaCloner, SchemaResult};

use crate::common::{Invocation, Sessions};

pub async fn schema_export_command(sessions: &Sessions, invocation: &Invocation) -> Result<SchemaResult> {
    let job = &invocation.job;
    let ctx = invocation.log_context(&job.source_table);
    let result = SchemaCloner::new(sessions.table.as_ref(), &sessions.shards, &ctx)
        .export_schema(&job.source_table)
        .await?;
    Ok(result)
}

pub async fn schema_import_command(sessions: &Sessions, invocation: &Invocation) -> Result<SchemaResult> {
    let job = &invocation.job;
    let destination = job.destination()?;
    let ctx = invocation.log_context(destination);
    let result = SchemaCloner::new(sessions.table.as_ref(), &sessions.shards, &ctx)
        .import_schema(&job.source_table, destination)
        .await?;
    Ok(result)
}
