// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! RFC 2397 data URLs as used for Ignition file contents.

use base64::{engine::general_purpose::STANDARD, Engine};

const PREFIX: &str = "data:";
const MEDIA_TYPE: &str = "text/plain;charset=utf-8";

/// Encode a file body as a base64 data URL.
pub fn encode(body: &[u8]) -> String {
    format!("{}{};base64,{}", PREFIX, MEDIA_TYPE, STANDARD.encode(body))
}

/// Decode a data URL produced by us or by a hand-written fragment.
///
/// Plain payloads are percent-decoded. Returns `None` for anything that is
/// not a data URL.
pub fn decode(source: &str) -> Option<Vec<u8>> {
    let rest = source.strip_prefix(PREFIX)?;
    let (meta, data) = rest.split_once(',')?;

    if meta.split(';').any(|p| p == "base64") {
        return STANDARD.decode(data).ok();
    }
    Some(urlencoding::decode_binary(data.as_bytes()).into_owned())
}
