// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Rate or throughput exceeded; the request may be retried after a delay
    #[error("Throughput exceeded: {0}")]
    Throttled(String),

    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Table already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Table exists but is not ready for use yet
    #[error("Table not active: {0}")]
    Pending(String),

    #[error("Backend service error: {0}")]
    Service(String),
}

impl BackendError {
    #[must_use]
    pub fn is_throttle(&self) -> bool {
        matches!(self, BackendError::Throttled(_))
    }
}
