// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited JSON record codec

use crate::{Result, ShardStoreError};
use bytes::Bytes;
use tablestore::Item;

/// One JSON object per line, each line terminated by `\n`
pub fn encode_records(items: &[Item]) -> Result<Bytes> {
    let mut out = Vec::new();
    for item in items {
        serde_json::to_writer(&mut out, item).map_err(ShardStoreError::Encode)?;
        out.push(b'\n');
    }
    Ok(Bytes::from(out))
}

/// Decode every line in order. Blank lines are skipped; any other line that
/// does not parse fails the whole shard.
pub fn decode_records(shard: &str, data: &[u8]) -> Result<Vec<Item>> {
    data.split(|b| *b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
        .map(|(index, line)| {
            serde_json::from_slice(line).map_err(|source| ShardStoreError::Decode {
                shard: shard.to_string(),
                line: index + 1,
                source,
            })
        })
        .collect()
}
