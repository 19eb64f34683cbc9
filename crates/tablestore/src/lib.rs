// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Key-value table backends
//!
//! The transfer engines only ever talk to a table through [`TableBackend`]:
//! a paginated, segmented scan with cursor continuation, a batch write that
//! reports the items it could not commit, and schema describe/create.
//!
//! - [`MemoryTable`]: in-process backend with fault injection, used by tests
//! - [`DynamoTable`]: Amazon DynamoDB through the AWS SDK

mod dynamo;
mod error;
mod item;
mod memory;
mod schema;

pub use dynamo::DynamoTable;
pub use error::BackendError;
pub use item::{AttrValue, Item};
pub use memory::MemoryTable;
pub use schema::{AttributeDefinition, BillingMode, KeyElement, KeyType, ScalarType, TableSchema};

use async_trait::async_trait;

/// Largest batch the backend accepts in one write
pub const MAX_BATCH_SIZE: usize = 25;

pub type Result<T> = std::result::Result<T, BackendError>;

/// One bounded page request against one scan segment
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub segment: u32,
    pub total_segments: u32,
    pub limit: u32,
    /// Cursor returned by the previous page, absent for the first page
    pub exclusive_start_key: Option<Item>,
}

/// One page of scan results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Present when the segment has more rows to scan
    pub last_evaluated_key: Option<Item>,
}

#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Fetch one page of a segmented scan.
    async fn scan_page(&self, table: &str, request: ScanRequest) -> Result<ScanPage>;

    /// Write up to [`MAX_BATCH_SIZE`] items, returning the ones left unprocessed.
    ///
    /// Writes overwrite by primary key, so repeating a write is harmless.
    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<Vec<Item>>;

    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    /// Create a table and return once it accepts writes.
    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<()>;
}
