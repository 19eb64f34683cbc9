// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Shard storage for exported table data
//!
//! A shard is one immutable object holding one scanned page of records as
//! newline-delimited JSON. Objects live under the source table's name:
//!
//! - `<table>/<shard_id>.json` - one shard
//! - `<table>/schema.json` - the exported table schema
//!
//! Shard ids are UUIDv7 strings: unique, and sortable by creation time.

mod codec;
mod error;
mod store;

pub use codec::{decode_records, encode_records};
pub use error::ShardStoreError;
pub use store::{S3Location, ShardStore};

pub type Result<T> = std::result::Result<T, ShardStoreError>;

/// New globally unique, time-ordered shard id
#[must_use]
pub fn new_shard_id() -> String {
    uuid7::uuid7().to_string()
}
