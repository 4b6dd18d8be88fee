// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Read-only consumer of the chain's key-value store.
//!
//! Keys arrive as reserved-byte-delimited segments ([`path`]), values as
//! ordered stream-cell envelopes ([`cell`]). Point reads and prefix
//! listings go through [`client`].

pub mod cell;
pub mod client;
pub mod path;

pub use cell::{parse_stream_cell, StreamCell};
pub use client::{StoreReader, VstorageClient};
pub use path::{decode_key, path_starts_with};
