// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pipelines built on the engines: merging translated configs, and rendering
//! a config together with the parent configs it references.

use crate::error::{DefinitionError, Result};
use crate::merge::Merger;
use crate::provenance::Provenance;
use crate::set::TranslationSet;
use crate::shape::Shaped;
use crate::transcript::{TAG_CHILD, TAG_PARENT};
use crate::visit::encode;
use anyhow::Context;
use std::fmt;

/// Deepest chain of `replace`/`merge` references a render follows
pub const MAX_REFERENCE_DEPTH: usize = 10;

/// Merge a parent and child config that were each produced by translation,
/// mapping both ledgers through the merge transcript.
///
/// Where both sides contributed to a location the child's source is kept,
/// since the parent is usually a generated config unrelated to the text the
/// user wrote.
pub fn merge_translated<T: Shaped>(
    merger: &Merger,
    parent: &T,
    parent_translations: &TranslationSet,
    child: &T,
    child_translations: &TranslationSet,
) -> Result<(T, TranslationSet)> {
    if parent_translations.from_tag != child_translations.from_tag
        || parent_translations.to_tag != child_translations.to_tag
    {
        return Err(DefinitionError::TagMismatch {
            left: format!("{} → {}", parent_translations.from_tag, parent_translations.to_tag),
            right: format!("{} → {}", child_translations.from_tag, child_translations.to_tag),
        });
    }
    let (result, transcript) = merger.merge(parent, child)?;

    let mut ts = TranslationSet::new(
        parent_translations.from_tag.clone(),
        parent_translations.to_tag.clone(),
    );
    for m in &transcript {
        let side = match m.from.tag() {
            TAG_PARENT => parent_translations,
            TAG_CHILD => child_translations,
            other => return Err(DefinitionError::UnexpectedTag(other.to_string())),
        };
        let Some(origin) = side.get(&m.from) else {
            continue;
        };
        if m.from.tag() != TAG_CHILD && ts.get(&m.to).is_some() {
            continue;
        }
        ts.add(&origin.from, &m.to.retag(origin.to.tag()));
    }
    Ok((result, ts))
}

/// Where a config points at other configs
pub trait References {
    type Reference: fmt::Display;

    /// Config to use instead of this one
    fn replace(&self) -> Option<Self::Reference>;

    /// Configs to merge over this one, in order
    fn merges(&self) -> Vec<Self::Reference>;
}

/// Retrieves referenced configs; all I/O belongs to the implementor
pub trait Fetch<C: References> {
    fn fetch(&self, reference: &C::Reference) -> anyhow::Result<C>;
}

/// A config with every reference resolved
#[derive(Debug)]
pub struct Rendered<C> {
    pub config: C,
    pub provenance: Provenance,
}

pub struct Renderer<'a, F> {
    merger: &'a Merger,
    fetcher: &'a F,
}

impl<'a, F> Renderer<'a, F> {
    pub fn new(merger: &'a Merger, fetcher: &'a F) -> Self {
        Self { merger, fetcher }
    }

    /// Resolve the references of `config`, the document labelled `label`.
    ///
    /// A `replace` reference wins outright: the referenced config is
    /// rendered in its place. Otherwise each `merge` reference is fetched,
    /// rendered and merged over the config accumulated so far.
    pub fn render<C>(&self, config: C, label: &str) -> anyhow::Result<Rendered<C>>
    where
        C: Shaped + References,
        F: Fetch<C>,
    {
        self.render_at(config, label, 0)
    }

    fn render_at<C>(&self, config: C, label: &str, depth: usize) -> anyhow::Result<Rendered<C>>
    where
        C: Shaped + References,
        F: Fetch<C>,
    {
        if depth > MAX_REFERENCE_DEPTH {
            anyhow::bail!(
                "config references nested deeper than {MAX_REFERENCE_DEPTH} levels at {label}"
            );
        }
        let shape = C::shape();

        if let Some(reference) = config.replace() {
            let name = reference.to_string();
            tracing::debug!(reference = %name, depth, "Fetching replacement config");
            let replacement = self
                .fetcher
                .fetch(&reference)
                .with_context(|| format!("fetching replacement config {name}"))?;
            return self.render_at(replacement, &name, depth + 1);
        }

        let provenance = Provenance::of(label, &shape, &encode(&config)?);
        let mut rendered = Rendered { config, provenance };
        for reference in rendered.config.merges() {
            let name = reference.to_string();
            tracing::debug!(reference = %name, depth, "Fetching config to merge");
            let fetched = self
                .fetcher
                .fetch(&reference)
                .with_context(|| format!("fetching config {name} to merge"))?;
            let fetched = self.render_at(fetched, &name, depth + 1)?;
            let (config, transcript) = self
                .merger
                .merge(&rendered.config, &fetched.config)
                .with_context(|| format!("merging config {name}"))?;
            tracing::debug!(
                reference = %name,
                mappings = transcript.len(),
                "Merged referenced config"
            );
            let provenance =
                Provenance::after_merge(&rendered.provenance, &fetched.provenance, &transcript)?;
            rendered = Rendered { config, provenance };
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use crate::shape::tests::Drive;
    use crate::transcript::TAG_RESULT;
    use std::collections::HashMap;

    #[test]
    fn test_merge_translated_prefers_child() {
        let parent = Drive {
            device: "/dev/sda".into(),
            tags: vec!["a".into()],
            ..Default::default()
        };
        let child = Drive {
            device: "/dev/sdb".into(),
            ..Default::default()
        };
        let mut parent_ts = TranslationSet::new("yaml", "json");
        parent_ts.add(&Path::with("yaml", ["disk"]), &Path::with("json", ["device"]));
        parent_ts.add(&Path::with("yaml", ["labels"]), &Path::with("json", ["tags"]));
        parent_ts.add(&Path::new("yaml"), &Path::new("json"));
        let mut child_ts = TranslationSet::new("yaml", "json");
        child_ts.add(&Path::with("yaml", ["dev"]), &Path::with("json", ["device"]));
        child_ts.add(&Path::with("yaml", ["top"]), &Path::new("json"));

        let (merged, ts) =
            merge_translated(&Merger::new(), &parent, &parent_ts, &child, &child_ts).unwrap();
        assert_eq!(merged.device, "/dev/sdb");
        let device = ts.get(&Path::with("json", ["device"])).unwrap();
        assert_eq!(device.from, Path::with("yaml", ["dev"]));
        assert_eq!(device.to.tag(), "json");
        assert_eq!(
            ts.get(&Path::with("json", ["tags"])).unwrap().from,
            Path::with("yaml", ["labels"])
        );
        assert_eq!(ts.get(&Path::new("json")).unwrap().from, Path::with("yaml", ["top"]));
        assert_eq!(ts.get(&Path::with(TAG_RESULT, ["device"])).unwrap().to.tag(), "json");

        let other = TranslationSet::new("toml", "json");
        assert!(matches!(
            merge_translated(&Merger::new(), &parent, &parent_ts, &child, &other),
            Err(DefinitionError::TagMismatch { .. })
        ));
    }

    #[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    #[serde(default)]
    struct Doc {
        replace: Option<String>,
        merge: Vec<String>,
        items: Vec<String>,
    }

    impl Shaped for Doc {
        fn shape() -> crate::shape::Shape {
            crate::shape::Shape::record::<Self>("Doc")
                .field("replace", |d| &d.replace)
                .field("merge", |d| &d.merge)
                .field("items", |d| &d.items)
                .build()
        }
    }

    impl References for Doc {
        type Reference = String;

        fn replace(&self) -> Option<String> {
            self.replace.clone()
        }

        fn merges(&self) -> Vec<String> {
            self.merge.clone()
        }
    }

    struct Store(HashMap<String, Doc>);

    impl Fetch<Doc> for Store {
        fn fetch(&self, reference: &String) -> anyhow::Result<Doc> {
            self.0
                .get(reference)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such document: {reference}"))
        }
    }

    fn doc(merge: &[&str], items: &[&str]) -> Doc {
        Doc {
            replace: None,
            merge: merge.iter().map(|s| s.to_string()).collect(),
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_render_merges_in_order() {
        let store = Store(HashMap::from([
            ("a".to_string(), doc(&["b"], &["from-a"])),
            ("b".to_string(), doc(&[], &["from-b"])),
            ("c".to_string(), doc(&[], &["from-c"])),
        ]));
        let merger = Merger::new();
        let rendered = Renderer::new(&merger, &store)
            .render(doc(&["a", "c"], &["base"]), "root")
            .unwrap();
        assert_eq!(rendered.config.items, ["base", "from-a", "from-b", "from-c"]);
        let origin = |i: usize| {
            rendered
                .provenance
                .get(&Path::with(TAG_RESULT, [crate::path::Component::from("items"), i.into()]))
                .unwrap()
                .tag()
                .to_string()
        };
        assert_eq!(origin(0), "root");
        assert_eq!(origin(1), "a");
        assert_eq!(origin(2), "b");
        assert_eq!(origin(3), "c");
    }

    #[test]
    fn test_render_replace_and_errors() {
        let store = Store(HashMap::from([
            ("new".to_string(), doc(&[], &["replacement"])),
            ("loop".to_string(), doc(&["loop"], &[])),
        ]));
        let merger = Merger::new();
        let renderer = Renderer::new(&merger, &store);
        let rendered = renderer
            .render(
                Doc {
                    replace: Some("new".into()),
                    ..doc(&[], &["ignored"])
                },
                "root",
            )
            .unwrap();
        assert_eq!(rendered.config.items, ["replacement"]);

        let missing = renderer.render(doc(&["absent"], &[]), "root").unwrap_err();
        assert!(format!("{missing:#}").contains("no such document: absent"));

        let deep = renderer.render(doc(&["loop"], &[]), "root").unwrap_err();
        assert!(format!("{deep:#}").contains("nested deeper"));
    }
}
