// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Build version reporting.

use crate::constants::PROGRAM_NAME;

/// Commit the binary was built from, injected through `BUILD_HASH` at compile time
pub const BUILD_HASH: &str = match option_env!("BUILD_HASH") {
    Some(hash) => hash,
    None => "was-not-built-properly",
};

/// `v<semver>-<build hash>`
pub fn version() -> String {
    format!("v{}-{}", env!("CARGO_PKG_VERSION"), BUILD_HASH)
}

/// Line printed by the `version` command
pub fn version_line() -> String {
    format!("{} {}", PROGRAM_NAME, version())
}
