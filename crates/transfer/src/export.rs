// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Segment export: scan one page, store it as a shard, advance the cursor

use crate::{BackoffPolicy, CloneError, ExportCheckpoint, Result, SegmentDescriptor, TimeBudget};
use diagnostics::*;
use shardstore::ShardStore;
use tablestore::{ScanRequest, TableBackend};
use tokio::time::{Instant, timeout_at};

/// Exports one scan segment of a source table into the shard store
pub struct Exporter<'a> {
    backend: &'a dyn TableBackend,
    shards: &'a ShardStore,
    ctx: &'a LogContext,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(backend: &'a dyn TableBackend, shards: &'a ShardStore, ctx: &'a LogContext) -> Self {
        Self {
            backend,
            shards,
            ctx,
        }
    }

    /// Continue exporting `segment` from `prior` until the segment is done or
    /// the budget's cutoff is reached.
    ///
    /// A page counts only once its shard is stored: the returned checkpoint
    /// never references a shard that does not exist, and never skips a page
    /// whose shard was not written. Throttled scans are retried after a
    /// backoff delay; any other backend failure is returned as an error and
    /// `prior` remains the valid resume point.
    pub async fn scan_segment(
        &self,
        source_table: &str,
        segment: &SegmentDescriptor,
        prior: ExportCheckpoint,
        budget: &TimeBudget,
    ) -> Result<ExportCheckpoint> {
        let request_id = self.ctx.request_id.as_str();
        let table = self.ctx.table.as_str();

        if prior.complete {
            log_info!("segment already complete", request_id: request_id, table: table);
            return Ok(prior);
        }

        let segment = segment.normalized()?;
        let (index, total, limit) = segment_bounds(&segment)?;

        log_info!(
            "scanning segment {segment} of {total} from {processed}",
            segment: index,
            total: total,
            processed: prior.processed,
            request_id: request_id,
            table: table
        );

        let mut checkpoint = prior;
        let mut backoff = BackoffPolicy::new(budget.cutoff());
        let mut reads: u64 = 0;

        loop {
            if budget.exhausted() {
                log_warn!(
                    "time budget expired after {reads} reads",
                    reads: reads,
                    processed: checkpoint.processed,
                    request_id: request_id,
                    table: table
                );
                break;
            }

            let request = ScanRequest {
                segment: index,
                total_segments: total,
                limit,
                exclusive_start_key: checkpoint.continuation_key.clone(),
            };

            let started = Instant::now();
            let page = match timeout_at(
                budget.cutoff(),
                self.backend.scan_page(source_table, request),
            )
            .await
            {
                Err(_) => {
                    log_warn!(
                        "time budget expired during scan after {reads} reads",
                        reads: reads,
                        processed: checkpoint.processed,
                        request_id: request_id,
                        table: table
                    );
                    break;
                }
                Ok(Err(e)) if e.is_throttle() => {
                    log_warn!(
                        "scan throttled at {processed} records, backing off",
                        processed: checkpoint.processed,
                        request_id: request_id,
                        table: table
                    );
                    if backoff.wait().await {
                        continue;
                    }
                    break;
                }
                Ok(Err(e)) => {
                    log_error!(
                        "scan failed: {error}",
                        error: e.to_string(),
                        request_id: request_id,
                        table: table
                    );
                    return Err(e.into());
                }
                Ok(Ok(page)) => page,
            };
            backoff.reset();
            reads += 1;

            let count = page.items.len();
            log_debug!(
                "scanned {count} items in {elapsed_ms}ms",
                count: count,
                elapsed_ms: elapsed_ms(started),
                request_id: request_id,
                table: table
            );

            if count > 0 {
                let stored = timeout_at(
                    budget.deadline(),
                    self.shards.put_records(source_table, &page.items),
                )
                .await;
                let shard_id = match stored {
                    Err(_) => {
                        log_warn!(
                            "time budget expired during shard upload, page will be rescanned",
                            processed: checkpoint.processed,
                            request_id: request_id,
                            table: table
                        );
                        break;
                    }
                    Ok(Err(e)) => {
                        log_error!(
                            "shard upload failed: {error}",
                            error: e.to_string(),
                            request_id: request_id,
                            table: table
                        );
                        return Err(e.into());
                    }
                    Ok(Ok(shard_id)) => shard_id,
                };
                log_info!(
                    "stored shard {shard} with {count} records",
                    shard: shard_id.as_str(),
                    count: count,
                    request_id: request_id,
                    table: table
                );
                checkpoint.shard_ids.push(shard_id);
                checkpoint.processed += count as u64;
            }

            checkpoint.continuation_key = page.last_evaluated_key;
            if checkpoint.continuation_key.is_none() {
                checkpoint.complete = true;
                log_info!(
                    "segment {segment} complete with {processed} records in {shards} shards",
                    segment: index,
                    processed: checkpoint.processed,
                    shards: checkpoint.shard_ids.len(),
                    request_id: request_id,
                    table: table
                );
                break;
            }
        }

        checkpoint.duration_ms = budget.elapsed_ms();
        Ok(checkpoint)
    }
}

fn segment_bounds(segment: &SegmentDescriptor) -> Result<(u32, u32, u32)> {
    let convert = |value: i64| {
        u32::try_from(value)
            .map_err(|_| CloneError::Config(format!("segment descriptor out of range: {segment:?}")))
    };
    Ok((
        convert(segment.segment)?,
        convert(segment.total_segments)?,
        convert(segment.limit)?,
    ))
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
