// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::{Result, ShardStoreError, decode_records, encode_records, new_shard_id};
use bytes::Bytes;
use diagnostics::*;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tablestore::{Item, TableSchema};

const SCHEMA_OBJECT: &str = "schema.json";

/// Where exported shards are kept in S3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub region: String,
    pub bucket: String,
    /// Custom endpoint (localstack, minio)
    pub endpoint: Option<String>,
    pub path_style: bool,
}

/// Blob store client for shards and schema documents
#[derive(Clone)]
pub struct ShardStore {
    store: Arc<dyn ObjectStore>,
    location: String,
}

impl std::fmt::Debug for ShardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardStore")
            .field("location", &self.location)
            .finish()
    }
}

impl ShardStore {
    pub fn new(store: Arc<dyn ObjectStore>, location: impl Into<String>) -> Self {
        Self {
            store,
            location: location.into(),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://")
    }

    pub fn s3(location: &S3Location) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(&location.region)
            .with_bucket_name(&location.bucket)
            .with_virtual_hosted_style_request(!location.path_style);

        if let Some(endpoint) = &location.endpoint {
            log_info!("setting s3 endpoint to {endpoint}", endpoint: endpoint.as_str());
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        if location.path_style {
            log_info!("setting s3 to path style");
        }

        let store = builder
            .build()
            .map_err(|e| ShardStoreError::Configuration(e.to_string()))?;
        Ok(Self::new(Arc::new(store), format!("s3://{}", location.bucket)))
    }

    fn shard_path(table: &str, shard_id: &str) -> Path {
        Path::from(format!("{table}/{shard_id}.json"))
    }

    fn schema_path(table: &str) -> Path {
        Path::from(format!("{table}/{SCHEMA_OBJECT}"))
    }

    pub async fn put(&self, table: &str, shard_id: &str, data: Bytes) -> Result<()> {
        let path = Self::shard_path(table, shard_id);
        let size = data.len();
        _ = self.store.put(&path, PutPayload::from(data)).await?;
        log_debug!("uploaded {path} ({size} bytes)", path: path.to_string(), size: size);
        Ok(())
    }

    pub async fn get(&self, table: &str, shard_id: &str) -> Result<Bytes> {
        let path = Self::shard_path(table, shard_id);
        match self.store.get(&path).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(ShardStoreError::MissingShard(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Encode `items` and store them as a new shard, returning its id
    pub async fn put_records(&self, table: &str, items: &[Item]) -> Result<String> {
        let data = encode_records(items)?;
        let shard_id = new_shard_id();
        self.put(table, &shard_id, data).await?;
        Ok(shard_id)
    }

    pub async fn get_records(&self, table: &str, shard_id: &str) -> Result<Vec<Item>> {
        let data = self.get(table, shard_id).await?;
        decode_records(shard_id, &data)
    }

    pub async fn put_schema(&self, table: &str, schema: &TableSchema) -> Result<()> {
        let data = serde_json::to_vec(schema).map_err(|source| ShardStoreError::Schema {
            table: table.to_string(),
            source,
        })?;
        _ = self
            .store
            .put(&Self::schema_path(table), PutPayload::from(data))
            .await?;
        Ok(())
    }

    pub async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        let path = Self::schema_path(table);
        let data = match self.store.get(&path).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(ShardStoreError::MissingShard(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data).map_err(|source| ShardStoreError::Schema {
            table: table.to_string(),
            source,
        })
    }
}
