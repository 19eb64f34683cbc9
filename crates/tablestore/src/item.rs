// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Typed table items
//!
//! Items serialize in the typed attribute form, e.g.
//! `{"pk":{"S":"a"},"count":{"N":"12"}}`, so every attribute type survives a
//! trip through a shard unchanged. Binary values are base64 strings, as in
//! DynamoDB JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One table row, attribute name to value
pub type Item = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    S(String),
    /// Numbers keep their decimal string form
    N(String),
    #[serde(with = "base64_bytes")]
    B(Vec<u8>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS", with = "base64_set")]
    Bs(Vec<Vec<u8>>),
    M(BTreeMap<String, AttrValue>),
    L(Vec<AttrValue>),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "BOOL")]
    Bool(bool),
}

impl AttrValue {
    pub fn s(value: impl Into<String>) -> Self {
        AttrValue::S(value.into())
    }

    pub fn n(value: impl ToString) -> Self {
        AttrValue::N(value.to_string())
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| de::Error::custom(format!("invalid base64: {e}")))
    }
}

mod base64_set {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(set: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(set.len()))?;
        for bytes in set {
            seq.serialize_element(&STANDARD.encode(bytes))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|encoded| {
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| de::Error::custom(format!("invalid base64: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_wire_form() {
        let mut item = Item::new();
        item.insert("pk".to_string(), AttrValue::s("a"));
        item.insert("n".to_string(), AttrValue::n(12));
        item.insert("tags".to_string(), AttrValue::Ss(vec!["x".into(), "y".into()]));
        item.insert("gone".to_string(), AttrValue::Null(true));

        let json = serde_json::to_string(&item).expect("serialize");
        assert_eq!(
            json,
            r#"{"gone":{"NULL":true},"n":{"N":"12"},"pk":{"S":"a"},"tags":{"SS":["x","y"]}}"#
        );
    }

    #[test]
    fn test_nested_values_parse() {
        let json = r#"{"doc":{"M":{"list":{"L":[{"N":"1.5"},{"BOOL":false}]}}}}"#;
        let item: Item = serde_json::from_str(json).expect("parse");
        let AttrValue::M(doc) = &item["doc"] else {
            panic!("expected map");
        };
        assert_eq!(
            doc["list"],
            AttrValue::L(vec![AttrValue::N("1.5".into()), AttrValue::Bool(false)])
        );
    }

    #[test]
    fn test_binary_values_are_base64() {
        let mut item = Item::new();
        item.insert("blob".to_string(), AttrValue::B(b"hi!".to_vec()));
        item.insert("blobs".to_string(), AttrValue::Bs(vec![vec![0xff], vec![]]));

        let json = serde_json::to_string(&item).expect("serialize");
        assert_eq!(json, r#"{"blob":{"B":"aGkh"},"blobs":{"BS":["/w==",""]}}"#);
        let back: Item = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, item);

        assert!(serde_json::from_str::<Item>(r#"{"blob":{"B":"@@"}}"#).is_err());
    }
}
