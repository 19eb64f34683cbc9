// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShardStoreError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Shard not found: {0}")]
    MissingShard(String),

    #[error("Undecodable record in {shard} at line {line}: {source}")]
    Decode {
        shard: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid schema document for {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ShardStoreError {
    /// Shard content could not be encoded or decoded
    #[must_use]
    pub fn is_codec(&self) -> bool {
        matches!(
            self,
            ShardStoreError::Decode { .. }
                | ShardStoreError::Encode(_)
                | ShardStoreError::Schema { .. }
        )
    }
}
