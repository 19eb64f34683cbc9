// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::{Result, SchemaResult};
use diagnostics::*;
use shardstore::ShardStore;
use tablestore::{BillingMode, TableBackend};
use tokio::time::Instant;

/// Copies the base table schema from the source table to the destination
/// through the shard store
pub struct SchemaCloner<'a> {
    backend: &'a dyn TableBackend,
    shards: &'a ShardStore,
    ctx: &'a LogContext,
}

impl<'a> SchemaCloner<'a> {
    #[must_use]
    pub fn new(backend: &'a dyn TableBackend, shards: &'a ShardStore, ctx: &'a LogContext) -> Self {
        Self {
            backend,
            shards,
            ctx,
        }
    }

    /// Describe `source_table` and store its schema next to its shards
    pub async fn export_schema(&self, source_table: &str) -> Result<SchemaResult> {
        let started = Instant::now();
        let schema = self.backend.describe_table(source_table).await?;
        schema.validate()?;
        self.shards.put_schema(source_table, &schema).await?;

        log_info!(
            "exported schema with {keys} key attributes",
            keys: schema.key_schema.len(),
            request_id: self.ctx.request_id.as_str(),
            table: self.ctx.table.as_str()
        );
        Ok(SchemaResult {
            duration_ms: crate::export::elapsed_ms(started),
            complete: true,
        })
    }

    /// Create `destination_table` from the schema stored for `source_table`.
    /// Returns once the new table accepts writes.
    pub async fn import_schema(
        &self,
        source_table: &str,
        destination_table: &str,
    ) -> Result<SchemaResult> {
        let started = Instant::now();
        let ctx = self.ctx.for_table(destination_table);
        let schema = self.shards.get_schema(source_table).await?;

        if let BillingMode::Provisioned {
            read_capacity_units,
            write_capacity_units,
        } = &schema.billing
        {
            log_warn!(
                "destination uses provisioned throughput ({read} read, {write} write), the restore may be slow",
                read: *read_capacity_units,
                write: *write_capacity_units,
                request_id: ctx.request_id.as_str(),
                table: ctx.table.as_str()
            );
        }

        self.backend.create_table(destination_table, &schema).await?;
        log_info!(
            "created table from schema of {source}",
            source: source_table,
            request_id: ctx.request_id.as_str(),
            table: ctx.table.as_str()
        );
        Ok(SchemaResult {
            duration_ms: crate::export::elapsed_ms(started),
            complete: true,
        })
    }
}
