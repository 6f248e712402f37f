// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Strongly-typed first-boot configuration schemas.
//!
//! Each runtime format version lives in its own module (`v1_0`, `v1_1`) with
//! the serde types, their shape descriptors, element keys and the merger
//! configured with the version's merge hooks. `fbc` is the human-authored
//! YAML format, translated into the newest runtime version. [`parse`] reads
//! a raw runtime config of any supported version and upgrades it.

pub mod document;
pub mod fbc;
pub mod v1_0;
pub mod v1_1;

pub use document::{parse, version, ParseError, TAG_DOCUMENT};

use schemars::schema::RootSchema;
use schemars::JsonSchema;

/// JSON schema of `T` with subschemas inlined
pub(crate) fn root_schema<T: JsonSchema>() -> RootSchema {
    let settings =
        schemars::r#gen::SchemaSettings::draft2019_09().with(|s| s.inline_subschemas = true);
    settings.into_generator().into_root_schema_for::<T>()
}
