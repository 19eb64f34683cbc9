// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use diagnostics::*;
use serde::Serialize;
use shardstore::{S3Location, ShardStore};
use tablestore::{DynamoTable, TableBackend};
use transfer::{CloneJob, TimeBudget};

/// Endpoint override for both the table and blob store clients
pub const ENDPOINT_ENV: &str = "AWS_ENDPOINT";

/// Any non-empty value selects path-style S3 addressing
pub const PATH_STYLE_ENV: &str = "AWS_S3_FORCEPATHSTYLE";

/// Maximum run time of one invocation of the compute function
pub const DEFAULT_BUDGET: &str = "15m";

/// Environment overrides read when the sessions are built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint: Option<String>,
    pub path_style: bool,
}

impl SessionConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |name: &str| lookup(name).filter(|value| !value.is_empty());
        Self {
            endpoint: set(ENDPOINT_ENV),
            path_style: set(PATH_STYLE_ENV).is_some(),
        }
    }
}

/// Backend clients used by one invocation
pub struct Sessions {
    pub table: Arc<dyn TableBackend>,
    pub shards: ShardStore,
}

impl Sessions {
    pub fn new(table: Arc<dyn TableBackend>, shards: ShardStore) -> Self {
        Self { table, shards }
    }

    /// DynamoDB and S3 clients for the job's region and bucket
    pub async fn connect(job: &CloneJob, config: &SessionConfig) -> Result<Self> {
        if let Some(endpoint) = &config.endpoint {
            log_info!("setting endpoint to {endpoint}", endpoint: endpoint.as_str());
        }
        let table = DynamoTable::connect(&job.region, config.endpoint.as_deref()).await;
        let shards = ShardStore::s3(&S3Location {
            region: job.region.clone(),
            bucket: job.bucket.clone(),
            endpoint: config.endpoint.clone(),
            path_style: config.path_style,
        })
        .with_context(|| format!("Failed to open bucket {}", job.bucket))?;
        Ok(Self::new(Arc::new(table), shards))
    }
}

/// One engine call: the job, its correlation id, and its time budget
#[derive(Debug, Clone)]
pub struct Invocation {
    pub job: CloneJob,
    pub request_id: String,
    pub budget: Duration,
}

impl Invocation {
    pub fn new(job: CloneJob, request_id: Option<String>, budget: Duration) -> Self {
        Self {
            job,
            request_id: request_id.unwrap_or_else(|| uuid7::uuid7().to_string()),
            budget,
        }
    }

    pub fn log_context(&self, table: &str) -> LogContext {
        LogContext::new(self.request_id.clone(), table)
    }

    /// Budget starting now
    pub fn time_budget(&self, margin: Duration) -> TimeBudget {
        TimeBudget::new(self.budget, margin)
    }
}

/// Read a job descriptor from a file, or from stdin for `-`
pub fn read_job(path: &str) -> Result<CloneJob> {
    let data = if path == "-" {
        let mut data = Vec::new();
        _ = std::io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read job from stdin")?;
        data
    } else {
        std::fs::read(Path::new(path)).with_context(|| format!("Failed to read job file {path}"))?
    };
    Ok(CloneJob::from_json(&data)?)
}

pub fn parse_budget(value: &str) -> std::result::Result<Duration, String> {
    parse_duration::parse(value).map_err(|e| format!("invalid duration '{value}': {e}"))
}

/// Write one JSON document followed by a newline
pub fn write_json<W: Write, T: Serialize>(mut out: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
