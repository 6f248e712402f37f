// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Document loading for JSON, YAML and TOML configs

use crate::error::LoadError;
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match ext.to_ascii_lowercase().as_str() {
            "json" | "ign" => Ok(Format::Json),
            "yaml" | "yml" | "bu" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            _ => Err(LoadError::UnknownFormat(path.display().to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "JSON"),
            Format::Yaml => write!(f, "YAML"),
            Format::Toml => write!(f, "TOML"),
        }
    }
}

/// Parse `text` as a `T`; failures name the offending field path
pub fn parse_document<T: DeserializeOwned>(text: &str, format: Format) -> Result<T, LoadError> {
    let invalid = |path: String, message: String| LoadError::Invalid { format, path, message };
    match format {
        Format::Json => {
            let de = &mut serde_json::Deserializer::from_str(text);
            serde_path_to_error::deserialize(de)
                .map_err(|e| invalid(e.path().to_string(), e.inner().to_string()))
        }
        Format::Yaml => {
            let de = serde_yaml::Deserializer::from_str(text);
            serde_path_to_error::deserialize(de)
                .map_err(|e| invalid(e.path().to_string(), e.inner().to_string()))
        }
        Format::Toml => {
            let de = toml::Deserializer::new(text);
            serde_path_to_error::deserialize(de)
                .map_err(|e| invalid(e.path().to_string(), e.inner().to_string()))
        }
    }
}

/// Read and parse a config file, choosing the format by extension
pub fn read_document_from_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let format = Format::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {:?}", path))?;
    let document = parse_document(&content, format)
        .with_context(|| format!("parsing config file {:?}", path))?;
    Ok(document)
}
