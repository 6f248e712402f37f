// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Generic configuration engine with type-directed merging, version
//! translation and provenance tracking.
//!
//! Configs are plain serde types that also describe their [`Shape`]. The
//! [`Merger`] folds a child config over a parent config of the same version
//! and returns a [`Transcript`] of where each result location came from. The
//! [`Translator`] copies a config into the shape of another version and
//! returns a [`TranslationSet`] mapping output locations back to input
//! locations. Both ledgers let diagnostics about a produced config point at
//! the document the user actually wrote.
//!
//! Everything works on `serde_json::Value` internally, so the engines never
//! need to know the concrete schema types.

pub mod error;
pub mod loader;
pub mod merge;
pub mod path;
pub mod provenance;
pub mod report;
pub mod resolve;
pub mod set;
pub mod shape;
pub mod transcript;
pub mod translate;
pub mod visit;

pub use error::{DefinitionError, LoadError, Result};
pub use merge::{MergeHook, Merged, Merger, Merging, Sides};
pub use path::{Component, Path};
pub use provenance::Provenance;
pub use report::Report;
pub use resolve::{merge_translated, Fetch, References, Rendered, Renderer, MAX_REFERENCE_DEPTH};
pub use set::{Translation, TranslationSet};
pub use shape::{Keyed, Naming, Shape, Shaped};
pub use transcript::{Mapping, Transcript, TAG_CHILD, TAG_PARENT, TAG_RESULT};
pub use translate::Translator;
pub use visit::{Category, Node};
