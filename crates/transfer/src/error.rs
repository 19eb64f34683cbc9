// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use shardstore::ShardStoreError;
use tablestore::BackendError;
use thiserror::Error;

/// Fatal invocation failures
///
/// Throttling and time-budget exhaustion never surface here. Any of these
/// ends the invocation; the caller's last checkpoint stays valid.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Shard store error: {0}")]
    Shards(#[from] ShardStoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing table, existing table, bad schema, unexpected service failure
    Backend,
    /// Shard content that cannot be encoded or decoded
    Codec,
    /// Shard store unreachable or object missing
    Storage,
    Config,
    Checkpoint,
}

impl CloneError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloneError::Backend(_) => ErrorKind::Backend,
            CloneError::Shards(e) if e.is_codec() => ErrorKind::Codec,
            CloneError::Shards(_) => ErrorKind::Storage,
            CloneError::Config(_) => ErrorKind::Config,
            CloneError::Checkpoint(_) => ErrorKind::Checkpoint,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Backend => "backend",
            ErrorKind::Codec => "codec",
            ErrorKind::Storage => "storage",
            ErrorKind::Config => "config",
            ErrorKind::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}
