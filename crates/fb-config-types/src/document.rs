// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Raw runtime configs: version detection and upgrade to the newest format.
//!
//! [`parse`] reads `ignition.version` from the document, decodes it with the
//! matching types and chains the adjacent-version translators until it
//! reaches [`v1_1::MAX_VERSION`]. The returned ledger maps every output path
//! back into the raw document, whose paths carry the [`TAG_DOCUMENT`] tag.

use crate::{v1_0, v1_1};
use config_core::loader::{parse_document, Format};
use config_core::visit::encode;
use config_core::{DefinitionError, LoadError, Path, Report, Shaped, TranslationSet};
use serde::Deserialize;
use thiserror::Error;

/// Tag of paths into the raw document
pub const TAG_DOCUMENT: &str = "document";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not a config (empty)")]
    Empty,

    #[error("config is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Invalid(#[from] LoadError),

    #[error("unable to determine config version")]
    VersionIndeterminable,

    #[error("unsupported config version {0:?}")]
    UnknownVersion(String),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct Versioned {
    ignition: VersionedIgnition,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct VersionedIgnition {
    version: Option<String>,
}

fn text(raw: &[u8]) -> Result<&str, ParseError> {
    let text = std::str::from_utf8(raw)?;
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(text)
}

/// Version a raw config declares in `ignition.version`
pub fn version(raw: &[u8]) -> Result<String, ParseError> {
    let versioned: Versioned = parse_document(text(raw)?, Format::Json)?;
    versioned.ignition.version.ok_or(ParseError::VersionIndeterminable)
}

/// Ledger of a config decoded as-is: every path maps to itself in the document
fn as_parsed<T: Shaped>(config: &T, version: &str) -> Result<TranslationSet, ParseError> {
    let mut set = TranslationSet::new(TAG_DOCUMENT, version);
    let value = encode(config)?;
    set.add_from_common_object(&Path::new(TAG_DOCUMENT), &Path::new(version), &T::shape(), &value);
    Ok(set)
}

/// Parse a raw runtime config of any supported version into the newest one.
///
/// Diagnostics raised while upgrading are returned in document coordinates.
pub fn parse(raw: &[u8]) -> Result<(v1_1::Config, TranslationSet, Report), ParseError> {
    let version = version(raw)?;
    let text = text(raw)?;
    match version.as_str() {
        v1_1::MAX_VERSION => {
            let config: v1_1::Config = parse_document(text, Format::Json)?;
            let set = as_parsed(&config, v1_1::MAX_VERSION)?;
            Ok((config, set, Report::default()))
        }
        v1_0::VERSION => {
            let config: v1_0::Config = parse_document(text, Format::Json)?;
            let parsed = as_parsed(&config, v1_0::VERSION)?;
            tracing::debug!(from = v1_0::VERSION, to = v1_1::MAX_VERSION, "Upgrading config");
            let (config, upgrade, report) = v1_1::translate(&config)?;
            let set = parsed.compose(&upgrade)?;
            Ok((config, set, parsed.translate_report(&report)))
        }
        _ => Err(ParseError::UnknownVersion(version)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_detection() {
        let raw = br#"{"ignition": {"version": "1.0.0"}, "storage": {}}"#;
        assert_eq!(version(raw).unwrap(), "1.0.0");
        assert!(matches!(version(b"{}"), Err(ParseError::VersionIndeterminable)));
        assert!(matches!(version(b"  \n"), Err(ParseError::Empty)));
        assert!(matches!(version(b"{\"ignition\": "), Err(ParseError::Invalid(_))));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = parse(br#"{"ignition": {"version": "0.9.0"}}"#).unwrap_err();
        assert!(matches!(&err, ParseError::UnknownVersion(v) if v == "0.9.0"));
        assert_eq!(err.to_string(), "unsupported config version \"0.9.0\"");
    }

    #[test]
    fn test_newest_version_maps_to_itself() {
        let raw = br#"{
            "ignition": {"version": "1.1.0"},
            "systemd": {"units": [{"name": "a.service"}]}
        }"#;
        let (config, set, report) = parse(raw).unwrap();
        assert!(report.is_empty());
        assert_eq!(config.systemd.units[0].name, "a.service");
        assert_eq!(set.from_tag, TAG_DOCUMENT);
        assert_eq!(set.to_tag, v1_1::MAX_VERSION);
        let name = Path::with(v1_1::MAX_VERSION, ["systemd", "units"]).join(0usize).join("name");
        assert_eq!(set.get(&name).unwrap().from.to_string(), "$.systemd.units.0.name");
    }
}
