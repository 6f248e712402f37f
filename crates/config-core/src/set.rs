// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Deduplicated ledger produced by a translation.
//!
//! A [`TranslationSet`] maps destination paths back to the source paths that
//! produced them. It is keyed by the string form of the destination path, so
//! a later entry for the same destination replaces the earlier one.

use crate::error::{DefinitionError, Result};
use crate::path::{Component, Path};
use crate::report::Report;
use crate::shape::Shape;
use crate::visit::paths;
use serde::{Deserialize, Serialize};
use serde_json::Value as J;
use std::collections::BTreeMap;
use std::fmt;

/// The value at `from` produced the value at `to`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub from: Path,
    pub to: Path,
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from, self.to)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationSet {
    pub from_tag: String,
    pub to_tag: String,
    set: BTreeMap<String, Translation>,
}

impl TranslationSet {
    pub fn new(from_tag: impl Into<String>, to_tag: impl Into<String>) -> Self {
        Self {
            from_tag: from_tag.into(),
            to_tag: to_tag.into(),
            set: BTreeMap::new(),
        }
    }

    fn empty_like(&self) -> Self {
        Self::new(self.from_tag.clone(), self.to_tag.clone())
    }

    pub fn add(&mut self, from: &Path, to: &Path) {
        self.set.insert(
            to.to_string(),
            Translation {
                from: from.clone(),
                to: to.clone(),
            },
        );
    }

    pub fn merge(&mut self, other: &TranslationSet) {
        for t in other.set.values() {
            self.add(&t.from, &t.to);
        }
    }

    /// Both sides prefixed by the same components
    pub fn prefix(&self, prefix: &[Component]) -> Self {
        self.prefix_paths(
            &Path::with(self.from_tag.clone(), prefix.iter().cloned()),
            &Path::with(self.to_tag.clone(), prefix.iter().cloned()),
        )
    }

    /// Each side re-rooted under its own prefix; tags come from the prefixes
    pub fn prefix_paths(&self, from_prefix: &Path, to_prefix: &Path) -> Self {
        let mut ret = self.empty_like();
        for t in self.set.values() {
            ret.add(
                &from_prefix.append(t.from.components()),
                &to_prefix.append(t.to.components()),
            );
        }
        ret
    }

    pub fn merge_prefixed(&mut self, prefix: &[Component], other: &TranslationSet) {
        self.merge(&other.prefix(prefix));
    }

    pub fn merge_prefixed2(
        &mut self,
        from_prefix: &[Component],
        to_prefix: &[Component],
        other: &TranslationSet,
    ) {
        self.merge(&other.prefix_paths(
            &Path::with(other.from_tag.clone(), from_prefix.iter().cloned()),
            &Path::with(other.to_tag.clone(), to_prefix.iter().cloned()),
        ));
    }

    /// Entries under destination `to`, with destinations made relative to it.
    /// Source paths are left as they are.
    pub fn descend(&self, to: &Path) -> Self {
        let mut ret = self.empty_like();
        for t in self.set.values() {
            if let Some(rel) = t.to.strip_prefix(to.components()) {
                ret.add(&t.from, &rel);
            }
        }
        ret
    }

    /// Re-target destinations through `mappings`, whose tags must both equal
    /// this set's destination tag. Unmapped entries are kept.
    pub fn map(&self, mappings: &TranslationSet) -> Result<Self> {
        if mappings.from_tag != self.to_tag || mappings.to_tag != self.to_tag {
            return Err(DefinitionError::TagMismatch {
                left: format!("{} → {}", mappings.from_tag, mappings.to_tag),
                right: format!("{0} → {0}", self.to_tag),
            });
        }
        let mut ret = self.clone();
        let mut moved = Vec::new();
        for m in mappings.set.values() {
            let key = m.from.to_string();
            if let Some(t) = self.set.get(&key) {
                ret.set.remove(&key);
                moved.push((t.from.clone(), m.to.clone()));
            }
        }
        for (from, to) in moved {
            ret.add(&from, &to);
        }
        Ok(ret)
    }

    /// Chain `A → B` (self) with `B → C` (next) into `A → C`.
    ///
    /// Destinations of `next` whose source has no entry here are dropped.
    pub fn compose(&self, next: &TranslationSet) -> Result<Self> {
        if next.from_tag != self.to_tag {
            return Err(DefinitionError::TagMismatch {
                left: self.to_tag.clone(),
                right: next.from_tag.clone(),
            });
        }
        let mut ret = Self::new(self.from_tag.clone(), next.to_tag.clone());
        for t in next.set.values() {
            if let Some(origin) = self.set.get(&t.from.to_string()) {
                ret.add(&origin.from, &t.to);
            }
        }
        Ok(ret)
    }

    /// Map every path of `value` (defaults included) under `to_prefix` to `common`
    pub fn add_from_common_source(
        &mut self,
        common: &Path,
        to_prefix: &Path,
        shape: &Shape,
        value: &J,
    ) {
        for p in paths(shape, value, true) {
            self.add(common, &to_prefix.append(&p));
        }
        self.add(common, to_prefix);
    }

    /// Map each path of `value` (defaults included) to the same relative
    /// path under `from_prefix`
    pub fn add_from_common_object(
        &mut self,
        from_prefix: &Path,
        to_prefix: &Path,
        shape: &Shape,
        value: &J,
    ) {
        for p in paths(shape, value, true) {
            self.add(&from_prefix.append(&p), &to_prefix.append(&p));
        }
        self.add(from_prefix, to_prefix);
    }

    pub fn get(&self, to: &Path) -> Option<&Translation> {
        self.set.get(&to.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Translation> {
        self.set.values()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Destinations of non-default paths in `value` that have no entry
    pub fn missing_coverage(&self, shape: &Shape, value: &J) -> Vec<String> {
        paths(shape, value, false)
            .into_iter()
            .map(|p| Path::with(self.to_tag.clone(), p).to_string())
            .filter(|k| !self.set.contains_key(k))
            .collect()
    }

    /// Fails when some non-default path in `value` has no entry
    pub fn verify_coverage(&self, shape: &Shape, value: &J) -> Result<()> {
        let missing = self.missing_coverage(shape, value);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DefinitionError::MissingCoverage(missing))
        }
    }

    /// Rewrite destination-space diagnostics into source coordinates.
    ///
    /// Without an entry for a context, its names are snake_cased instead,
    /// which is right whenever both hierarchies line up.
    pub fn translate_report(&self, report: &Report) -> Report {
        let mut ret = report.clone();
        for entry in &mut ret.entries {
            if entry.context.tag() == self.from_tag {
                continue;
            }
            entry.context = match self.set.get(&entry.context.to_string()) {
                Some(t) => t.from.clone(),
                None => entry.context.snake_cased(),
            };
        }
        ret
    }
}

impl fmt::Display for TranslationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TranslationSet: {} → {}", self.from_tag, self.to_tag)?;
        for (key, t) in &self.set {
            if *key == t.to.to_string() {
                writeln!(f, "{t}")?;
            } else {
                writeln!(f, "{t} (key: {key})")?;
            }
        }
        Ok(())
    }
}
