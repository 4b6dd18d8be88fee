// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

/// Errors raised by the resolver.
///
/// The first block of variants is scoped: each one is caught at the
/// granularity of a single event, portfolio, or stream-cell element and
/// never aborts the coordinator loop. The transport variants at the end
/// are fatal when they come from the top-level subscriptions or the
/// bootstrap listing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    // Store key bytes carry no component separator
    #[error("malformed store key: {0}")]
    MalformedKey(String),
    // Store value is not a parseable stream cell envelope
    #[error("invalid stream cell: {0}")]
    InvalidStreamCell(String),
    // One element of a stream cell failed to decode
    #[error("invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
    // One portfolio's published value does not match the expected shape
    #[error("schema violation for portfolio {portfolio}: {reason}")]
    SchemaViolation { portfolio: String, reason: String },
    // Chain name has no entry in the per-chain bridge contract config
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    // Dispatch target (chain or pool) is outside the configured set
    #[error("unknown dispatch target: {0}")]
    UnknownTarget(String),
    // Network or parse failure while confirming a transfer. Not a timeout.
    #[error("bridge i/o failure: {0}")]
    BridgeIo(String),
    // Signing or broadcast failure while dispatching a message
    #[error("dispatch failure: {0}")]
    Dispatch(String),
    // Chain RPC transport failure
    #[error("rpc failure: {0}")]
    Rpc(String),
    // Internal channel closed unexpectedly
    #[error("event channel closed")]
    ChannelClosed,
}

impl ResolverError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            ResolverError::MalformedKey(_) => "malformed_key",
            ResolverError::InvalidStreamCell(_) => "invalid_stream_cell",
            ResolverError::InvalidRecord { .. } => "invalid_record",
            ResolverError::SchemaViolation { .. } => "schema_violation",
            ResolverError::UnsupportedChain(_) => "unsupported_chain",
            ResolverError::UnknownTarget(_) => "unknown_target",
            ResolverError::BridgeIo(_) => "bridge_io",
            ResolverError::Dispatch(_) => "dispatch",
            ResolverError::Rpc(_) => "rpc",
            ResolverError::ChannelClosed => "channel_closed",
        }
    }
}

pub type ResolverResult<T> = Result<T, ResolverError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_error_type_labels() {
        let errors = vec![
            (
                ResolverError::MalformedKey("6162".to_string()),
                "malformed_key",
            ),
            (
                ResolverError::InvalidStreamCell("not json".to_string()),
                "invalid_stream_cell",
            ),
            (
                ResolverError::InvalidRecord {
                    index: 2,
                    reason: "trailing garbage".to_string(),
                },
                "invalid_record",
            ),
            (
                ResolverError::SchemaViolation {
                    portfolio: "portfolio7".to_string(),
                    reason: "missing flowCount".to_string(),
                },
                "schema_violation",
            ),
            (
                ResolverError::UnsupportedChain("Base".to_string()),
                "unsupported_chain",
            ),
            (
                ResolverError::UnknownTarget("Osmosis".to_string()),
                "unknown_target",
            ),
            (
                ResolverError::BridgeIo("connection reset".to_string()),
                "bridge_io",
            ),
            (
                ResolverError::Dispatch("broadcast rejected".to_string()),
                "dispatch",
            ),
            (ResolverError::Rpc("timeout".to_string()), "rpc"),
            (ResolverError::ChannelClosed, "channel_closed"),
        ];
        for (error, expected) in &errors {
            assert_eq!(error.error_type(), *expected);
        }
        // Labels must be unique so metric series stay distinguishable
        let labels: HashSet<_> = errors.iter().map(|(e, _)| e.error_type()).collect();
        assert_eq!(labels.len(), errors.len());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ResolverError::InvalidRecord {
            index: 1,
            reason: "expected object".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("index 1"));
        assert!(msg.contains("expected object"));

        let err = ResolverError::SchemaViolation {
            portfolio: "portfolio3".to_string(),
            reason: "flowCount".to_string(),
        };
        assert!(format!("{err}").contains("portfolio3"));
    }
}
