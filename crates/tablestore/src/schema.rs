// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Table schema description
//!
//! Only the base table is described: primary key, the attribute definitions
//! the key needs, and the billing mode.

use crate::{BackendError, Item, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub key_schema: Vec<KeyElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub billing: BillingMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: ScalarType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    S,
    N,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum BillingMode {
    #[serde(rename = "PAY_PER_REQUEST")]
    PayPerRequest,
    #[serde(rename = "PROVISIONED")]
    Provisioned {
        read_capacity_units: i64,
        write_capacity_units: i64,
    },
}

impl TableSchema {
    /// Schema with a hash key and optional range key, billed per request
    pub fn with_key(
        hash: (&str, ScalarType),
        range: Option<(&str, ScalarType)>,
    ) -> Self {
        let mut key_schema = vec![KeyElement {
            attribute_name: hash.0.to_string(),
            key_type: KeyType::Hash,
        }];
        let mut attribute_definitions = vec![AttributeDefinition {
            attribute_name: hash.0.to_string(),
            attribute_type: hash.1,
        }];
        if let Some((name, ty)) = range {
            key_schema.push(KeyElement {
                attribute_name: name.to_string(),
                key_type: KeyType::Range,
            });
            attribute_definitions.push(AttributeDefinition {
                attribute_name: name.to_string(),
                attribute_type: ty,
            });
        }
        Self {
            key_schema,
            attribute_definitions,
            billing: BillingMode::PayPerRequest,
        }
    }

    /// Check the key shape: one hash key first, at most one range key, and
    /// every key attribute defined.
    pub fn validate(&self) -> Result<()> {
        match self.key_schema.as_slice() {
            [hash] | [hash, _] if hash.key_type != KeyType::Hash => {
                return Err(BackendError::InvalidSchema(
                    "first key element must be the hash key".to_string(),
                ));
            }
            [_] => {}
            [_, range] if range.key_type == KeyType::Range => {}
            [_, _] => {
                return Err(BackendError::InvalidSchema(
                    "second key element must be the range key".to_string(),
                ));
            }
            _ => {
                return Err(BackendError::InvalidSchema(format!(
                    "expected one or two key elements, found {}",
                    self.key_schema.len()
                )));
            }
        }

        for key in &self.key_schema {
            if !self
                .attribute_definitions
                .iter()
                .any(|def| def.attribute_name == key.attribute_name)
            {
                return Err(BackendError::InvalidSchema(format!(
                    "key attribute {} has no definition",
                    key.attribute_name
                )));
            }
        }
        Ok(())
    }

    /// Project an item onto its primary key attributes
    pub fn key_of(&self, item: &Item) -> Result<Item> {
        let mut key = Item::new();
        for element in &self.key_schema {
            let value = item.get(&element.attribute_name).ok_or_else(|| {
                BackendError::Service(format!(
                    "item is missing key attribute {}",
                    element.attribute_name
                ))
            })?;
            key.insert(element.attribute_name.clone(), value.clone());
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrValue;

    #[test]
    fn test_validate_accepts_hash_and_range() {
        let schema = TableSchema::with_key(("pk", ScalarType::S), Some(("sk", ScalarType::N)));
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_undefined_key() {
        let mut schema = TableSchema::with_key(("pk", ScalarType::S), None);
        schema.attribute_definitions.clear();
        assert!(matches!(schema.validate(), Err(BackendError::InvalidSchema(_))));
    }

    #[test]
    fn test_validate_rejects_range_first() {
        let mut schema = TableSchema::with_key(("pk", ScalarType::S), Some(("sk", ScalarType::S)));
        schema.key_schema.reverse();
        assert!(matches!(schema.validate(), Err(BackendError::InvalidSchema(_))));
    }

    #[test]
    fn test_key_of_projects_key_attributes() {
        let schema = TableSchema::with_key(("pk", ScalarType::S), None);
        let mut item = Item::new();
        item.insert("pk".into(), AttrValue::s("a"));
        item.insert("payload".into(), AttrValue::s("x"));

        let key = schema.key_of(&item).expect("key");
        assert_eq!(key.len(), 1);
        assert_eq!(key["pk"], AttrValue::s("a"));

        item.remove("pk");
        assert!(schema.key_of(&item).is_err());
    }

    #[test]
    fn test_billing_wire_form() {
        let billing = BillingMode::Provisioned {
            read_capacity_units: 5,
            write_capacity_units: 10,
        };
        let json = serde_json::to_value(&billing).expect("serialize");
        assert_eq!(json["mode"], "PROVISIONED");
        assert_eq!(json["write_capacity_units"], 10);
    }
}
