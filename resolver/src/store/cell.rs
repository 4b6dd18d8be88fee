// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ResolverError, ResolverResult};
use serde::Deserialize;

/// Ordered envelope recorded at one store path. `values` holds the
/// encoded records written at `block_height`, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCell {
    pub values: Vec<String>,
    pub block_height: u64,
}

// Wire shape: block height arrives as a JSON string.
#[derive(Deserialize)]
struct RawStreamCell {
    values: Vec<String>,
    #[serde(rename = "blockHeight")]
    block_height: String,
}

/// Parses the stream-cell envelope itself. Element decoding is separate
/// ([`StreamCell::decoded_values`]) so one bad element cannot poison the
/// rest of the cell.
pub fn parse_stream_cell(raw: &str) -> ResolverResult<StreamCell> {
    let cell: RawStreamCell = serde_json::from_str(raw)
        .map_err(|e| ResolverError::InvalidStreamCell(e.to_string()))?;
    let block_height = cell.block_height.parse::<u64>().map_err(|_| {
        ResolverError::InvalidStreamCell(format!(
            "blockHeight is not a u64: {:?}",
            cell.block_height
        ))
    })?;
    Ok(StreamCell {
        values: cell.values,
        block_height,
    })
}

impl StreamCell {
    /// Decodes each element independently, in order. Failures carry the
    /// element index so callers can skip and log at that granularity.
    pub fn decoded_values(
        &self,
    ) -> impl Iterator<Item = (usize, ResolverResult<serde_json::Value>)> + '_ {
        self.values.iter().enumerate().map(|(index, raw)| {
            let decoded = serde_json::from_str(raw).map_err(|e| ResolverError::InvalidRecord {
                index,
                reason: e.to_string(),
            });
            (index, decoded)
        })
    }

    /// The most recent record in the cell, if any element decodes.
    pub fn latest(&self) -> Option<ResolverResult<serde_json::Value>> {
        self.decoded_values().last().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stream_cell() {
        let raw = r#"{"values":["{\"a\":1}","{\"b\":2}"],"blockHeight":"12345"}"#;
        let cell = parse_stream_cell(raw).unwrap();
        assert_eq!(cell.block_height, 12345);
        assert_eq!(cell.values.len(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        let err = parse_stream_cell("not json").unwrap_err();
        assert_eq!(err.error_type(), "invalid_stream_cell");
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let err = parse_stream_cell(r#"{"values":["x"]}"#).unwrap_err();
        assert_eq!(err.error_type(), "invalid_stream_cell");

        let err = parse_stream_cell(r#"{"blockHeight":"7"}"#).unwrap_err();
        assert_eq!(err.error_type(), "invalid_stream_cell");

        let err = parse_stream_cell(r#"{"values":[],"blockHeight":"tall"}"#).unwrap_err();
        assert_eq!(err.error_type(), "invalid_stream_cell");
    }

    #[test]
    fn test_values_decode_in_order() {
        let cell = StreamCell {
            values: vec![
                r#""a""#.to_string(),
                r#""b""#.to_string(),
                r#""c""#.to_string(),
            ],
            block_height: 1,
        };
        let decoded: Vec<_> = cell
            .decoded_values()
            .map(|(_, v)| v.unwrap())
            .collect();
        assert_eq!(decoded, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_one_malformed_element_is_scoped() {
        let cell = StreamCell {
            values: vec![
                r#"{"ok":1}"#.to_string(),
                "{broken".to_string(),
                r#"{"ok":3}"#.to_string(),
            ],
            block_height: 9,
        };
        let results: Vec<_> = cell.decoded_values().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        match &results[1].1 {
            Err(ResolverError::InvalidRecord { index, .. }) => assert_eq!(*index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(results[2].1.is_ok());
    }
}
