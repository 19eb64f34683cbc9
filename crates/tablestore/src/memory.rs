// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-process table backend
//!
//! Rows are ordered by their serialized primary key and assigned to scan
//! segments by hashing that key, so segments are disjoint and together cover
//! the table. Faults (throttling, unprocessed writes, hard errors) and
//! per-request latency can be injected to drive the engines through their
//! retry and time-budget paths.

use crate::{
    BackendError, Item, MAX_BATCH_SIZE, Result, ScanPage, ScanRequest, TableBackend, TableSchema,
};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryTable {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    tables: BTreeMap<String, TableData>,
    latency: Duration,
    throttle_scans: usize,
    throttle_writes: usize,
    unprocessed: VecDeque<usize>,
    scan_failure: Option<BackendError>,
    write_failure: Option<BackendError>,
    scan_calls: usize,
    write_log: Vec<usize>,
}

struct TableData {
    schema: TableSchema,
    rows: BTreeMap<String, Item>,
}

impl TableData {
    fn row_key(&self, item: &Item) -> Result<String> {
        let key = self.schema.key_of(item)?;
        serde_json::to_string(&key).map_err(|e| BackendError::Service(e.to_string()))
    }
}

fn segment_of(row_key: &str, total_segments: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    row_key.hash(&mut hasher);
    (hasher.finish() % u64::from(total_segments.max(1))) as u32
}

impl MemoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay every request by `latency`
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Create a table directly, outside of the backend contract
    pub fn create(&self, table: &str, schema: TableSchema) -> Result<()> {
        schema.validate()?;
        let mut state = self.lock();
        if state.tables.contains_key(table) {
            return Err(BackendError::AlreadyExists(table.to_string()));
        }
        let data = TableData {
            schema,
            rows: BTreeMap::new(),
        };
        state.tables.insert(table.to_string(), data);
        Ok(())
    }

    pub fn insert(&self, table: &str, item: Item) -> Result<()> {
        let mut state = self.lock();
        let data = state
            .tables
            .get_mut(table)
            .ok_or_else(|| BackendError::NotFound(table.to_string()))?;
        let key = data.row_key(&item)?;
        data.rows.insert(key, item);
        Ok(())
    }

    /// All rows in key order
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.lock()
            .tables
            .get(table)
            .map(|data| data.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock()
            .tables
            .get(table)
            .map_or(0, |data| data.rows.len())
    }

    /// Fail the next `count` scans with a throttling error
    pub fn throttle_scans(&self, count: usize) {
        self.lock().throttle_scans = count;
    }

    /// Fail the next `count` batch writes with a throttling error
    pub fn throttle_writes(&self, count: usize) {
        self.lock().throttle_writes = count;
    }

    /// Leave the trailing `n` items of successive batch writes unprocessed,
    /// one entry per write attempt
    pub fn leave_unprocessed(&self, counts: impl IntoIterator<Item = usize>) {
        self.lock().unprocessed.extend(counts);
    }

    pub fn fail_next_scan(&self, error: BackendError) {
        self.lock().scan_failure = Some(error);
    }

    pub fn fail_next_write(&self, error: BackendError) {
        self.lock().write_failure = Some(error);
    }

    pub fn scan_calls(&self) -> usize {
        self.lock().scan_calls
    }

    /// Size of every batch write attempt, in call order
    pub fn write_log(&self) -> Vec<usize> {
        self.lock().write_log.clone()
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TableBackend for MemoryTable {
    async fn scan_page(&self, table: &str, request: ScanRequest) -> Result<ScanPage> {
        self.delay().await;

        let mut state = self.lock();
        state.scan_calls += 1;
        if let Some(error) = state.scan_failure.take() {
            return Err(error);
        }
        if state.throttle_scans > 0 {
            state.throttle_scans -= 1;
            return Err(BackendError::Throttled(format!("scan of {table}")));
        }
        if request.total_segments == 0 || request.segment >= request.total_segments {
            return Err(BackendError::Service(format!(
                "segment {} out of range for {} segments",
                request.segment, request.total_segments
            )));
        }

        let data = state
            .tables
            .get(table)
            .ok_or_else(|| BackendError::NotFound(table.to_string()))?;

        let start = match &request.exclusive_start_key {
            Some(key) => Bound::Excluded(data.row_key(key)?),
            None => Bound::Unbounded,
        };

        let limit = request.limit.max(1) as usize;
        let mut matching = data
            .rows
            .range((start, Bound::Unbounded))
            .filter(|(key, _)| segment_of(key, request.total_segments) == request.segment);

        let items: Vec<Item> = matching
            .by_ref()
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect();

        let last_evaluated_key = match (matching.next(), items.last()) {
            (Some(_), Some(last)) => Some(data.schema.key_of(last)?),
            _ => None,
        };

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<Vec<Item>> {
        self.delay().await;

        let mut state = self.lock();
        state.write_log.push(items.len());
        if let Some(error) = state.write_failure.take() {
            return Err(error);
        }
        if state.throttle_writes > 0 {
            state.throttle_writes -= 1;
            return Err(BackendError::Throttled(format!("batch write to {table}")));
        }
        if items.len() > MAX_BATCH_SIZE {
            return Err(BackendError::Service(format!(
                "batch of {} exceeds {MAX_BATCH_SIZE} items",
                items.len()
            )));
        }

        let reject = state.unprocessed.pop_front().unwrap_or(0).min(items.len());
        let data = state
            .tables
            .get_mut(table)
            .ok_or_else(|| BackendError::NotFound(table.to_string()))?;

        let mut items = items;
        let unprocessed = items.split_off(items.len() - reject);
        for item in items {
            let key = data.row_key(&item)?;
            data.rows.insert(key, item);
        }
        Ok(unprocessed)
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        self.delay().await;
        self.lock()
            .tables
            .get(table)
            .map(|data| data.schema.clone())
            .ok_or_else(|| BackendError::NotFound(table.to_string()))
    }

    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<()> {
        self.delay().await;
        self.create(table, schema.clone())
    }
}
