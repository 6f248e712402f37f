// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Provenance tracking for resolved configs.
//!
//! A [`Provenance`] remembers, for every set location of a config, which
//! document and which location in it the value came from. It composes across
//! merges through the merge transcript, so a config assembled from a chain of
//! referenced documents can still point each diagnostic at its origin.

use crate::error::{DefinitionError, Result};
use crate::path::Path;
use crate::report::Report;
use crate::shape::Shape;
use crate::transcript::{Transcript, TAG_CHILD, TAG_PARENT};
use crate::visit::paths;
use serde::Serialize;
use serde_json::Value as J;
use std::collections::BTreeMap;

/// Maps locations of a config (by path string) to their origin
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Provenance {
    origins: BTreeMap<String, Path>,
}

impl Provenance {
    /// Every set location of `value` comes from the same location of the
    /// document labelled `label`
    pub fn of(label: &str, shape: &Shape, value: &J) -> Self {
        let mut origins = BTreeMap::new();
        for p in paths(shape, value, false) {
            let origin = Path::with(label, p);
            origins.insert(origin.to_string(), origin);
        }
        origins.insert("$".to_string(), Path::new(label));
        Self { origins }
    }

    /// Provenance of a merge result, from the provenance of both inputs.
    ///
    /// Where both sides contributed to a location the child is preferred.
    pub fn after_merge(
        parent: &Provenance,
        child: &Provenance,
        transcript: &Transcript,
    ) -> Result<Self> {
        let mut origins: BTreeMap<String, Path> = BTreeMap::new();
        for m in transcript {
            let side = match m.from.tag() {
                TAG_PARENT => parent,
                TAG_CHILD => child,
                other => return Err(DefinitionError::UnexpectedTag(other.to_string())),
            };
            let Some(origin) = side.origins.get(&m.from.to_string()) else {
                continue;
            };
            let key = m.to.to_string();
            if origins.contains_key(&key) && m.from.tag() != TAG_CHILD {
                continue;
            }
            origins.insert(key, origin.clone());
        }
        Ok(Self { origins })
    }

    /// Origin of `path`, or of its nearest ancestor with a known origin
    pub fn locate(&self, path: &Path) -> Option<&Path> {
        let components = path.components();
        (0..=components.len()).rev().find_map(|n| {
            let ancestor = Path::with(path.tag(), components[..n].iter().cloned());
            self.origins.get(&ancestor.to_string())
        })
    }

    pub fn get(&self, path: &Path) -> Option<&Path> {
        self.origins.get(&path.to_string())
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Rewrite diagnostic contexts into origin coordinates
    pub fn attribute(&self, report: &Report) -> Report {
        let mut ret = report.clone();
        for entry in &mut ret.entries {
            if let Some(origin) = self.locate(&entry.context) {
                entry.context = origin.clone();
            }
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::Merger;
    use crate::shape::tests::Drive;
    use crate::shape::Shaped;
    use crate::transcript::TAG_RESULT;
    use crate::visit::encode;
    use serde_json::json;

    #[test]
    fn test_of_labels_every_set_path() {
        let value = json!({"device": "/dev/sda", "tags": ["a"]});
        let prov = Provenance::of("base.ign", &Drive::shape(), &value);
        let origin = prov.get(&Path::with(TAG_RESULT, ["tags"])).unwrap();
        assert_eq!(origin.tag(), "base.ign");
        assert_eq!(origin.to_string(), "$.tags");
        assert!(prov.get(&Path::with(TAG_RESULT, ["wipeTable"])).is_none());
    }

    #[test]
    fn test_after_merge_prefers_child() {
        let parent = Drive {
            device: "/dev/sda".into(),
            tags: vec!["a".into()],
            ..Default::default()
        };
        let child = Drive {
            device: "/dev/sdb".into(),
            ..Default::default()
        };
        let (merged, transcript) = Merger::new().merge(&parent, &child).unwrap();
        let shape = Drive::shape();
        let prov = Provenance::after_merge(
            &Provenance::of("parent.ign", &shape, &encode(&parent).unwrap()),
            &Provenance::of("child.ign", &shape, &encode(&child).unwrap()),
            &transcript,
        )
        .unwrap();
        assert_eq!(merged.device, "/dev/sdb");
        assert_eq!(prov.get(&Path::with(TAG_RESULT, ["device"])).unwrap().tag(), "child.ign");
        assert_eq!(prov.get(&Path::with(TAG_RESULT, ["tags"])).unwrap().tag(), "parent.ign");
        assert_eq!(prov.get(&Path::new(TAG_RESULT)).unwrap().tag(), "child.ign");
    }

    #[test]
    fn test_attribute_uses_nearest_ancestor() {
        let value = json!({"device": "/dev/sda", "parts": [{"number": 1}]});
        let prov = Provenance::of("disk.ign", &Drive::shape(), &value);
        let mut report = Report::default();
        report.add_error(
            Path::with(TAG_RESULT, ["parts"]).join(0usize).join("label"),
            "label required",
        );
        let out = prov.attribute(&report);
        assert_eq!(out.entries[0].context.tag(), "disk.ign");
        assert_eq!(out.entries[0].context.to_string(), "$.parts.0");
    }

    #[test]
    fn test_unexpected_tag() {
        let mut t = Transcript::default();
        t.push(&Path::new("elsewhere"), &Path::new(TAG_RESULT));
        let empty = Provenance::default();
        assert!(matches!(
            Provenance::after_merge(&empty, &empty, &t),
            Err(DefinitionError::UnexpectedTag(_))
        ));
    }
}
