// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the merge and translation engines.
//!
//! [`DefinitionError`] means the schema or translator definitions themselves
//! are broken: no user document can trigger one. Problems with a document's
//! contents are reported through [`crate::report::Report`] instead.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, DefinitionError>;

/// A defect in the schema, shape or translator definitions
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("shapes {from} and {to} are not congruent")]
    Incongruent { from: String, to: String },

    #[error("translator not defined for {from} to {to}")]
    NoTranslator { from: String, to: String },

    #[error("failed to encode {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("mismatched translation tags: {left} != {right}")]
    TagMismatch { left: String, right: String },

    #[error("missing paths in translation set:\n{}", .0.join("\n"))]
    MissingCoverage(Vec<String>),

    #[error("unexpected transcript tag {0}")]
    UnexpectedTag(String),
}

/// Errors raised while parsing a configuration document
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid {format} document at {path}: {message}")]
    Invalid {
        format: crate::loader::Format,
        path: String,
        message: String,
    },

    #[error("unsupported document extension: {0}")]
    UnknownFormat(String),
}
