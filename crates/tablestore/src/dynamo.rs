// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Amazon DynamoDB backend

use crate::{
    AttrValue, AttributeDefinition, BackendError, BillingMode, Item, KeyElement, KeyType, Result,
    ScalarType, ScanPage, ScanRequest, TableBackend, TableSchema,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    self as ddb, AttributeValue, PutRequest, ProvisionedThroughput, TableStatus, WriteRequest,
};
use backon::{ExponentialBuilder, Retryable};
use diagnostics::*;
use std::collections::HashMap;
use std::time::Duration;

/// Client-side attempts per request before the SDK gives up
const SDK_MAX_ATTEMPTS: u32 = 5;

pub struct DynamoTable {
    client: Client,
}

impl DynamoTable {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for `region`, optionally against a custom endpoint
    pub async fn connect(region: &str, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(
                aws_config::retry::RetryConfig::standard().with_max_attempts(SDK_MAX_ATTEMPTS),
            );
        if let Some(endpoint) = endpoint {
            log_info!("setting dynamodb endpoint to {endpoint}", endpoint: endpoint);
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }

    async fn table_active(&self, table: &str) -> Result<()> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(classify)?;
        match output.table().and_then(|t| t.table_status()) {
            Some(TableStatus::Active) => Ok(()),
            _ => Err(BackendError::Pending(table.to_string())),
        }
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some(
            "ProvisionedThroughputExceededException"
            | "RequestLimitExceeded"
            | "ThrottlingException",
        ) => BackendError::Throttled(message),
        Some("ResourceNotFoundException") => BackendError::NotFound(message),
        Some("ResourceInUseException") => BackendError::AlreadyExists(message),
        _ => BackendError::Service(message),
    }
}

fn to_attribute(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::S(s) => AttributeValue::S(s.clone()),
        AttrValue::N(n) => AttributeValue::N(n.clone()),
        AttrValue::B(b) => AttributeValue::B(Blob::new(b.clone())),
        AttrValue::Ss(ss) => AttributeValue::Ss(ss.clone()),
        AttrValue::Ns(ns) => AttributeValue::Ns(ns.clone()),
        AttrValue::Bs(bs) => AttributeValue::Bs(bs.iter().map(|b| Blob::new(b.clone())).collect()),
        AttrValue::M(m) => AttributeValue::M(to_attribute_map(m)),
        AttrValue::L(l) => AttributeValue::L(l.iter().map(to_attribute).collect()),
        AttrValue::Null(n) => AttributeValue::Null(*n),
        AttrValue::Bool(b) => AttributeValue::Bool(*b),
    }
}

fn to_attribute_map(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}

fn from_attribute(value: &AttributeValue) -> Result<AttrValue> {
    Ok(match value {
        AttributeValue::S(s) => AttrValue::S(s.clone()),
        AttributeValue::N(n) => AttrValue::N(n.clone()),
        AttributeValue::B(b) => AttrValue::B(b.as_ref().to_vec()),
        AttributeValue::Ss(ss) => AttrValue::Ss(ss.clone()),
        AttributeValue::Ns(ns) => AttrValue::Ns(ns.clone()),
        AttributeValue::Bs(bs) => AttrValue::Bs(bs.iter().map(|b| b.as_ref().to_vec()).collect()),
        AttributeValue::M(m) => AttrValue::M(from_attribute_map(m)?),
        AttributeValue::L(l) => AttrValue::L(l.iter().map(from_attribute).collect::<Result<_>>()?),
        AttributeValue::Null(n) => AttrValue::Null(*n),
        AttributeValue::Bool(b) => AttrValue::Bool(*b),
        other => {
            return Err(BackendError::Service(format!(
                "unsupported attribute value {other:?}"
            )));
        }
    })
}

fn from_attribute_map(map: &HashMap<String, AttributeValue>) -> Result<Item> {
    map.iter()
        .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
        .collect()
}

fn to_key_type(key_type: KeyType) -> ddb::KeyType {
    match key_type {
        KeyType::Hash => ddb::KeyType::Hash,
        KeyType::Range => ddb::KeyType::Range,
    }
}

fn to_scalar_type(scalar: ScalarType) -> ddb::ScalarAttributeType {
    match scalar {
        ScalarType::S => ddb::ScalarAttributeType::S,
        ScalarType::N => ddb::ScalarAttributeType::N,
        ScalarType::B => ddb::ScalarAttributeType::B,
    }
}

fn build_error(err: aws_sdk_dynamodb::error::BuildError) -> BackendError {
    BackendError::InvalidSchema(err.to_string())
}

fn describe_schema(desc: &ddb::TableDescription) -> Result<TableSchema> {
    let key_schema = desc
        .key_schema()
        .iter()
        .map(|k| {
            let key_type = match k.key_type() {
                ddb::KeyType::Hash => KeyType::Hash,
                ddb::KeyType::Range => KeyType::Range,
                other => {
                    return Err(BackendError::InvalidSchema(format!(
                        "unsupported key type {}",
                        other.as_str()
                    )));
                }
            };
            Ok(KeyElement {
                attribute_name: k.attribute_name().to_string(),
                key_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let attribute_definitions = desc
        .attribute_definitions()
        .iter()
        .map(|a| {
            let attribute_type = match a.attribute_type() {
                ddb::ScalarAttributeType::S => ScalarType::S,
                ddb::ScalarAttributeType::N => ScalarType::N,
                ddb::ScalarAttributeType::B => ScalarType::B,
                other => {
                    return Err(BackendError::InvalidSchema(format!(
                        "unsupported attribute type {}",
                        other.as_str()
                    )));
                }
            };
            Ok(AttributeDefinition {
                attribute_name: a.attribute_name().to_string(),
                attribute_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let read = desc
        .provisioned_throughput()
        .and_then(|p| p.read_capacity_units())
        .unwrap_or(0);
    let write = desc
        .provisioned_throughput()
        .and_then(|p| p.write_capacity_units())
        .unwrap_or(0);

    // Tables created before billing summaries existed report none and are provisioned.
    let billing = match desc.billing_mode_summary().and_then(|s| s.billing_mode()) {
        Some(ddb::BillingMode::PayPerRequest) => BillingMode::PayPerRequest,
        None if read == 0 && write == 0 => BillingMode::PayPerRequest,
        _ => BillingMode::Provisioned {
            read_capacity_units: read,
            write_capacity_units: write,
        },
    };

    // Only the key attributes are needed to recreate the base table
    let attribute_definitions = attribute_definitions
        .into_iter()
        .filter(|def| {
            key_schema
                .iter()
                .any(|k| k.attribute_name == def.attribute_name)
        })
        .collect();

    Ok(TableSchema {
        key_schema,
        attribute_definitions,
        billing,
    })
}

#[async_trait]
impl TableBackend for DynamoTable {
    async fn scan_page(&self, table: &str, request: ScanRequest) -> Result<ScanPage> {
        let bound = |value: u32| {
            i32::try_from(value).map_err(|_| {
                BackendError::Service(format!("scan request out of range: {request:?}"))
            })
        };
        let output = self
            .client
            .scan()
            .table_name(table)
            .segment(bound(request.segment)?)
            .total_segments(bound(request.total_segments)?)
            .limit(bound(request.limit)?)
            .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(to_attribute_map))
            .send()
            .await
            .map_err(classify)?;

        let items = output
            .items()
            .iter()
            .map(from_attribute_map)
            .collect::<Result<Vec<_>>>()?;
        let last_evaluated_key = output
            .last_evaluated_key()
            .map(from_attribute_map)
            .transpose()?;

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<Vec<Item>> {
        let requests = items
            .iter()
            .map(|item| {
                let put = PutRequest::builder()
                    .set_item(Some(to_attribute_map(item)))
                    .build()
                    .map_err(build_error)?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(classify)?;

        let Some(pending) = output.unprocessed_items().and_then(|m| m.get(table)) else {
            return Ok(Vec::new());
        };
        pending
            .iter()
            .filter_map(|request| request.put_request())
            .map(|put| from_attribute_map(put.item()))
            .collect()
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(classify)?;
        let desc = output
            .table()
            .ok_or_else(|| BackendError::NotFound(table.to_string()))?;
        describe_schema(desc)
    }

    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<()> {
        schema.validate()?;

        let key_schema = schema
            .key_schema
            .iter()
            .map(|k| {
                ddb::KeySchemaElement::builder()
                    .attribute_name(&k.attribute_name)
                    .key_type(to_key_type(k.key_type))
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;
        let attribute_definitions = schema
            .attribute_definitions
            .iter()
            .map(|a| {
                ddb::AttributeDefinition::builder()
                    .attribute_name(&a.attribute_name)
                    .attribute_type(to_scalar_type(a.attribute_type))
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut request = self
            .client
            .create_table()
            .table_name(table)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(attribute_definitions));
        request = match &schema.billing {
            BillingMode::PayPerRequest => request.billing_mode(ddb::BillingMode::PayPerRequest),
            BillingMode::Provisioned {
                read_capacity_units,
                write_capacity_units,
            } => request.billing_mode(ddb::BillingMode::Provisioned).provisioned_throughput(
                ProvisionedThroughput::builder()
                    .read_capacity_units(*read_capacity_units)
                    .write_capacity_units(*write_capacity_units)
                    .build()
                    .map_err(build_error)?,
            ),
        };
        request.send().await.map_err(classify)?;

        let wait = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(60);
        (|| async { self.table_active(table).await })
            .retry(wait)
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, BackendError::Pending(_)))
            .await
    }
}
