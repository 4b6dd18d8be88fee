// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ResolverError, ResolverResult};

/// Segment separator used by the store's binary key encoding.
const ENCODED_KEY_SEPARATOR: char = '\x00';
const PATH_SEPARATOR: char = '.';

/// Decodes a store key into its dot-separated logical path.
///
/// The encoding reserves `\x00` as the segment delimiter and prefixes
/// every key with a version/type tag, which is discarded. A key with no
/// delimiter at all is malformed.
pub fn decode_key(raw_key: &str) -> ResolverResult<String> {
    let mut segments = raw_key.split(ENCODED_KEY_SEPARATOR);
    let _tag = segments.next();
    let mut path = String::with_capacity(raw_key.len());
    let mut any = false;
    for segment in segments {
        if any {
            path.push(PATH_SEPARATOR);
        }
        path.push_str(segment);
        any = true;
    }
    if !any {
        return Err(ResolverError::MalformedKey(format!(
            "no segment separator in {raw_key:?}"
        )));
    }
    Ok(path)
}

/// True when `path` equals `prefix` or sits strictly under it.
/// A plain string prefix check is not enough: `published.ymax0x` must
/// not match the prefix `published.ymax0`.
pub fn path_starts_with(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with(PATH_SEPARATOR),
        None => false,
    }
}
