// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Shard import: replay stored records into the destination in batches

use crate::export::elapsed_ms;
use crate::{BackoffPolicy, CloneError, ImportCheckpoint, Result, TimeBudget};
use diagnostics::*;
use futures::{StreamExt, TryStreamExt, stream};
use shardstore::ShardStore;
use std::time::Duration;
use tablestore::{Item, MAX_BATCH_SIZE, TableBackend};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, timeout_at};

/// How often import progress is logged
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Shards fetched concurrently while resolving the record sequence
const SHARD_FETCH_CONCURRENCY: usize = 8;

/// One progress report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressTick {
    /// Total records in the import
    pub items: u64,
    /// Records confirmed since the previous tick
    pub processed: u64,
    /// Records per second since the previous tick, rounded to 2 decimals
    pub rate: f64,
}

/// Rolling write rate between progress ticks
#[derive(Debug)]
pub struct ProgressMeter {
    items: u64,
    last_processed: u64,
    last_tick: Instant,
}

impl ProgressMeter {
    #[must_use]
    pub fn new(items: u64, processed: u64) -> Self {
        Self {
            items,
            last_processed: processed,
            last_tick: Instant::now(),
        }
    }

    pub fn tick(&mut self, processed: u64) -> ProgressTick {
        let now = Instant::now();
        let seconds = now.duration_since(self.last_tick).as_secs_f64();
        let delta = processed.saturating_sub(self.last_processed);
        let rate = if seconds > 0.0 {
            (delta as f64 / seconds * 100.0).round() / 100.0
        } else {
            0.0
        };
        self.last_processed = processed;
        self.last_tick = now;
        ProgressTick {
            items: self.items,
            processed: delta,
            rate,
        }
    }
}

/// Logs progress on a fixed interval while an import step is pending
struct ProgressReporter<'a> {
    meter: ProgressMeter,
    ticker: Interval,
    ctx: &'a LogContext,
    reports: u64,
}

impl<'a> ProgressReporter<'a> {
    fn new(ctx: &'a LogContext, processed: u64) -> Self {
        let mut ticker = interval_at(Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            meter: ProgressMeter::new(0, processed),
            ticker,
            ctx,
            reports: 0,
        }
    }

    fn set_items(&mut self, items: u64) {
        self.meter.items = items;
    }

    /// Run `step` to completion, reporting on every tick that passes meanwhile.
    /// `processed` cannot change while a step is pending.
    async fn drive<F: Future>(&mut self, processed: u64, step: F) -> F::Output {
        tokio::pin!(step);
        loop {
            tokio::select! {
                output = &mut step => return output,
                _ = self.ticker.tick() => self.report(processed),
            }
        }
    }

    fn report(&mut self, processed: u64) {
        let tick = self.meter.tick(processed);
        self.reports += 1;
        log_info!(
            "progress: {processed} records at {rate} per second",
            items: tick.items,
            processed: tick.processed,
            rate: tick.rate,
            report: self.reports,
            request_id: self.ctx.request_id.as_str(),
            table: self.ctx.table.as_str()
        );
    }
}

/// Imports exported shards into a destination table
pub struct Importer<'a> {
    backend: &'a dyn TableBackend,
    shards: &'a ShardStore,
    ctx: &'a LogContext,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(backend: &'a dyn TableBackend, shards: &'a ShardStore, ctx: &'a LogContext) -> Self {
        Self {
            backend,
            shards,
            ctx,
        }
    }

    /// Continue writing the records of `prior.shard_ids` (stored under
    /// `source_table`) into `destination_table`, starting at `prior.processed`.
    ///
    /// `processed` advances by a whole batch, and only once the backend has
    /// accepted every record of it. Records the backend leaves unprocessed
    /// are retried, alone, after a backoff delay.
    pub async fn import_into(
        &self,
        destination_table: &str,
        source_table: &str,
        prior: ImportCheckpoint,
        batch_size: usize,
        budget: &TimeBudget,
    ) -> Result<ImportCheckpoint> {
        let request_id = self.ctx.request_id.as_str();
        let table = self.ctx.table.as_str();

        if prior.complete {
            log_info!("import already complete", request_id: request_id, table: table);
            return Ok(prior);
        }
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(CloneError::Config(format!(
                "batch size {batch_size} must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }

        let mut checkpoint = prior;
        if checkpoint.shard_ids.is_empty() {
            log_warn!("no shards to import", request_id: request_id, table: table);
            checkpoint.complete = true;
            checkpoint.duration_ms = budget.elapsed_ms();
            return Ok(checkpoint);
        }

        let mut progress = ProgressReporter::new(self.ctx, checkpoint.processed);
        let resolved = progress
            .drive(
                checkpoint.processed,
                self.resolve(source_table, &checkpoint.shard_ids, budget),
            )
            .await?;
        let Some(records) = resolved else {
            log_warn!(
                "time budget expired while reading shards",
                processed: checkpoint.processed,
                request_id: request_id,
                table: table
            );
            checkpoint.duration_ms = budget.elapsed_ms();
            return Ok(checkpoint);
        };

        let total = records.len() as u64;
        if checkpoint.processed > total {
            return Err(CloneError::Checkpoint(format!(
                "processed {} is beyond the {total} records of {} shards",
                checkpoint.processed,
                checkpoint.shard_ids.len()
            )));
        }

        log_info!(
            "importing {remaining} of {total} records in batches of {batch_size}",
            remaining: total - checkpoint.processed,
            total: total,
            batch_size: batch_size,
            request_id: request_id,
            table: table
        );

        let mut backoff = BackoffPolicy::new(budget.cutoff());
        progress.set_items(total);
        let mut writes: u64 = 0;

        'batches: while checkpoint.processed < total {
            let start = usize::try_from(checkpoint.processed)
                .map_err(|e| CloneError::Checkpoint(e.to_string()))?;
            let end = (start + batch_size).min(records.len());
            let mut pending: Vec<Item> = records[start..end].to_vec();

            loop {
                if budget.exhausted() {
                    log_warn!(
                        "time budget expired after {writes} writes",
                        writes: writes,
                        processed: checkpoint.processed,
                        request_id: request_id,
                        table: table
                    );
                    break 'batches;
                }

                let started = Instant::now();
                let attempt = pending.len();
                let write = timeout_at(
                    budget.deadline(),
                    self.backend.batch_write(destination_table, pending.clone()),
                );
                let outcome = progress.drive(checkpoint.processed, write).await;

                match outcome {
                    Err(_) => {
                        log_warn!(
                            "time budget expired during batch write, batch will be rewritten",
                            processed: checkpoint.processed,
                            request_id: request_id,
                            table: table
                        );
                        break 'batches;
                    }
                    Ok(Err(e)) if e.is_throttle() => {
                        log_warn!(
                            "write throttled at {processed} records, backing off",
                            processed: checkpoint.processed,
                            request_id: request_id,
                            table: table
                        );
                        if !progress.drive(checkpoint.processed, backoff.wait()).await {
                            break 'batches;
                        }
                    }
                    Ok(Err(e)) => {
                        log_error!(
                            "batch write failed: {error}",
                            error: e.to_string(),
                            processed: checkpoint.processed,
                            request_id: request_id,
                            table: table
                        );
                        return Err(e.into());
                    }
                    Ok(Ok(unprocessed)) if unprocessed.is_empty() => {
                        writes += 1;
                        log_debug!(
                            "wrote {count} records in {elapsed_ms}ms",
                            count: attempt,
                            elapsed_ms: elapsed_ms(started),
                            request_id: request_id,
                            table: table
                        );
                        backoff.reset();
                        checkpoint.processed += (end - start) as u64;
                        break;
                    }
                    Ok(Ok(unprocessed)) => {
                        writes += 1;
                        log_info!(
                            "partial write: {unprocessed} of {attempt} records unprocessed",
                            unprocessed: unprocessed.len(),
                            attempt: attempt,
                            request_id: request_id,
                            table: table
                        );
                        pending = unprocessed;
                        if !progress.drive(checkpoint.processed, backoff.wait()).await {
                            break 'batches;
                        }
                    }
                }
            }
        }

        if checkpoint.processed == total {
            checkpoint.complete = true;
            log_info!(
                "import complete with {processed} records",
                processed: checkpoint.processed,
                request_id: request_id,
                table: table
            );
        }
        checkpoint.duration_ms = budget.elapsed_ms();
        Ok(checkpoint)
    }

    /// Fetch and decode every shard, keeping list order. Returns `None` when
    /// the cutoff passes first.
    async fn resolve(
        &self,
        source_table: &str,
        shard_ids: &[String],
        budget: &TimeBudget,
    ) -> Result<Option<Vec<Item>>> {
        let fetch = stream::iter(shard_ids)
            .map(|shard_id| self.shards.get_records(source_table, shard_id))
            .buffered(SHARD_FETCH_CONCURRENCY)
            .try_collect::<Vec<Vec<Item>>>();

        match timeout_at(budget.cutoff(), fetch).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => {
                log_error!(
                    "reading shards failed: {error}",
                    error: e.to_string(),
                    request_id: self.ctx.request_id.as_str(),
                    table: self.ctx.table.as_str()
                );
                Err(e.into())
            }
            Ok(Ok(shards)) => Ok(Some(shards.into_iter().flatten().collect())),
        }
    }
}
