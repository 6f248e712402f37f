// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Type-directed merging of a parent config with a child config.
//!
//! Both configs share one shape. Scalars take the child's value when it is
//! set, optionals take the child's reference when present, plain sequences
//! form an order-preserving union and keyed sequences overlay child elements
//! onto parent elements with the same key. Every contribution is recorded in
//! a [`Transcript`] so diagnostics about the result can be traced back to the
//! document that caused them.
//!
//! Type-specific behaviour is layered on with [`MergeHook`]s, registered by
//! the type they apply to.

use crate::error::{DefinitionError, Result};
use crate::path::Path;
use crate::shape::{Kind, Record, Shape, Shaped};
use crate::transcript::{Transcript, TAG_CHILD, TAG_PARENT, TAG_RESULT};
use crate::visit::{
    decode, default_value, dispatch, encode, is_set, visit, Intercept, Node, Visitor,
};
use serde_json::Value as J;
use std::any::TypeId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::marker::PhantomData;

/// Override for one type; replaces default merging of every node of it
pub type MergeHook =
    for<'s, 'm, 'v> fn(&mut Merging<'m, 'v>, Node<'s>, Sides<'v>) -> Result<Merged>;

/// Merge engine. Holds only its hook registry, so one instance can serve
/// any number of concurrent merges.
#[derive(Clone, Default)]
pub struct Merger {
    hooks: HashMap<TypeId, MergeHook>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hook<T: 'static>(&mut self, hook: MergeHook) {
        self.hooks.insert(TypeId::of::<T>(), hook);
    }

    pub fn with_hook<T: 'static>(mut self, hook: MergeHook) -> Self {
        self.add_hook::<T>(hook);
        self
    }

    /// Merge `child` over `parent`
    pub fn merge<T: Shaped>(&self, parent: &T, child: &T) -> Result<(T, Transcript)> {
        let parent = encode(parent)?;
        let child = encode(child)?;
        let (value, transcript) = self.merge_values(&T::shape(), &parent, &child)?;
        Ok((decode(value)?, transcript))
    }

    /// Merge two encoded values of `shape`
    pub fn merge_values(&self, shape: &Shape, parent: &J, child: &J) -> Result<(J, Transcript)> {
        let mut state = Merging {
            merger: self,
            transcript: Transcript::default(),
            excluded: HashSet::new(),
            _values: PhantomData,
        };
        let merged = visit(&mut state, Node::same(shape), Sides::root(parent, child))?;
        Ok((merged.value, state.transcript))
    }
}

/// The two inputs at one node, with their paths and the result path
#[derive(Clone, Debug)]
pub struct Sides<'v> {
    pub parent: Option<&'v J>,
    pub child: Option<&'v J>,
    pub parent_path: Path,
    pub child_path: Path,
    pub result_path: Path,
}

impl<'v> Sides<'v> {
    fn root(parent: &'v J, child: &'v J) -> Self {
        Self {
            parent: Some(parent),
            child: Some(child),
            parent_path: Path::new(TAG_PARENT),
            child_path: Path::new(TAG_CHILD),
            result_path: Path::new(TAG_RESULT),
        }
    }

    /// Sides of a record field, by wire name
    pub fn field(&self, wire: &str) -> Sides<'v> {
        Sides {
            parent: self.parent.and_then(|p| p.get(wire)),
            child: self.child.and_then(|c| c.get(wire)),
            parent_path: self.parent_path.join(wire),
            child_path: self.child_path.join(wire),
            result_path: self.result_path.join(wire),
        }
    }

    pub fn parent_items(&self) -> &'v [J] {
        items(self.parent)
    }

    pub fn child_items(&self) -> &'v [J] {
        items(self.child)
    }
}

fn items(value: Option<&J>) -> &[J] {
    value.and_then(J::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn present(value: Option<&J>) -> Option<&J> {
    value.filter(|v| !v.is_null())
}

/// Result of merging one node
#[derive(Clone, Debug, PartialEq)]
pub struct Merged {
    pub value: J,
    /// The parent contributed to `value`
    pub parent: bool,
    /// The child contributed to `value`
    pub child: bool,
}

/// State of one merge call
pub struct Merging<'m, 'v> {
    merger: &'m Merger,
    transcript: Transcript,
    excluded: HashSet<Path>,
    _values: PhantomData<&'v J>,
}

impl<'m, 'v> Merging<'m, 'v> {
    pub fn record(&mut self, from: &Path, to: &Path) {
        self.transcript.push(from, to);
    }

    /// Drop the parent element at `parent_element` from the result
    pub fn exclude(&mut self, parent_element: Path) {
        self.excluded.insert(parent_element);
    }

    pub fn is_excluded(&self, parent_element: &Path) -> bool {
        self.excluded.contains(parent_element)
    }

    /// Merge a node, consulting hooks
    pub fn merge_node(&mut self, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        visit(self, node, sides)
    }

    /// Merge a node with the generic rules, bypassing hooks for this node
    pub fn merge_default(&mut self, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        dispatch(self, node, sides)
    }

    /// Record every set location of `value` (children first), mapping `from`
    /// onto `to`. Returns whether an entry was recorded at `to` itself.
    pub fn transcribe(&mut self, shape: &Shape, value: &J, from: &Path, to: &Path) -> bool {
        match shape.kind() {
            Kind::Primitive(_) => {
                if !is_set(shape, value) {
                    return false;
                }
            }
            Kind::Optional(inner) => {
                if value.is_null() {
                    return false;
                }
                if self.transcribe(inner, value, from, to) {
                    return true;
                }
            }
            Kind::Sequence(element) => {
                let elements = items(Some(value));
                if elements.is_empty() {
                    return false;
                }
                for (i, v) in elements.iter().enumerate() {
                    self.keep(element, v, &from.join(i), &to.join(i));
                }
            }
            Kind::Record(r) => {
                let mut any = false;
                for field in r.fields() {
                    if let Some(v) = value.get(field.wire()) {
                        let (from, to) = (from.join(field.wire()), to.join(field.wire()));
                        any |= self.transcribe(field.shape(), v, &from, &to);
                    }
                }
                if !any {
                    return false;
                }
            }
        }
        self.record(from, to);
        true
    }

    /// Transcribe a kept sequence element, making sure the element itself
    /// gets an entry
    pub fn keep(&mut self, element: &Shape, value: &J, from: &Path, to: &Path) {
        if !self.transcribe(element, value, from, to) {
            self.record(from, to);
        }
    }

    /// Record sequence-level entries and wrap the merged elements
    pub fn finish_sequence(
        &mut self,
        sides: &Sides<'v>,
        elements: Vec<J>,
        parent: bool,
        child: bool,
    ) -> Merged {
        self.finish(sides, parent, child);
        Merged {
            value: J::Array(elements),
            parent,
            child,
        }
    }

    fn finish(&mut self, sides: &Sides<'v>, parent: bool, child: bool) {
        if parent {
            self.record(&sides.parent_path, &sides.result_path);
        }
        if child {
            self.record(&sides.child_path, &sides.result_path);
        }
    }

    /// Exclude parent elements superseded by a child element with the same
    /// key in a sibling field of the same identity group
    fn exclude_shared(&mut self, record: &Record, sides: &Sides<'v>) {
        for group in record.shared_identity() {
            let mut child_keys: Vec<(&str, HashSet<String>)> = Vec::new();
            for wire in &group.fields {
                let Some(element) = record.field_by_wire(wire).and_then(|f| f.shape().inner())
                else {
                    continue;
                };
                let keys = sides
                    .field(wire)
                    .child_items()
                    .iter()
                    .filter_map(|c| element.key_of(c))
                    .collect();
                child_keys.push((wire.as_str(), keys));
            }
            for wire in &group.fields {
                let Some(element) = record.field_by_wire(wire).and_then(|f| f.shape().inner())
                else {
                    continue;
                };
                let field = sides.field(wire);
                for (i, p) in field.parent_items().iter().enumerate() {
                    let Some(key) = element.key_of(p) else { continue };
                    let superseded = child_keys
                        .iter()
                        .any(|(other, keys)| *other != wire.as_str() && keys.contains(&key));
                    if superseded {
                        self.exclude(field.parent_path.join(i));
                    }
                }
            }
        }
    }
}

impl<'m, 'v> Visitor for Merging<'m, 'v> {
    type Input = Sides<'v>;
    type Output = Merged;
    type Error = DefinitionError;

    fn intercept(
        &mut self,
        node: Node<'_>,
        sides: Sides<'v>,
    ) -> Intercept<Sides<'v>, Result<Merged>> {
        let merger = self.merger;
        match merger.hooks.get(&node.to.id()) {
            Some(hook) => Intercept::Handled(hook(self, node, sides)),
            None => Intercept::Continue(sides),
        }
    }

    fn primitive(&mut self, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        if let Some(child) = sides.child.filter(|c| is_set(node.to, c)) {
            self.record(&sides.child_path, &sides.result_path);
            return Ok(Merged {
                value: child.clone(),
                parent: false,
                child: true,
            });
        }
        if let Some(parent) = sides.parent.filter(|p| is_set(node.to, p)) {
            self.record(&sides.parent_path, &sides.result_path);
            return Ok(Merged {
                value: parent.clone(),
                parent: true,
                child: false,
            });
        }
        Ok(Merged {
            value: present(sides.parent).cloned().unwrap_or_else(|| default_value(node.to)),
            parent: false,
            child: false,
        })
    }

    fn optional(&mut self, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        let inner = node.inner()?.to;
        if let Some(child) = present(sides.child) {
            self.keep(inner, child, &sides.child_path, &sides.result_path);
            return Ok(Merged {
                value: child.clone(),
                parent: false,
                child: true,
            });
        }
        if let Some(parent) = present(sides.parent) {
            self.keep(inner, parent, &sides.parent_path, &sides.result_path);
            return Ok(Merged {
                value: parent.clone(),
                parent: true,
                child: false,
            });
        }
        Ok(Merged {
            value: J::Null,
            parent: false,
            child: false,
        })
    }

    fn sequence(&mut self, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        let element = node.inner()?.to;
        let mut out: Vec<J> = Vec::new();
        let (mut from_parent, mut from_child) = (false, false);
        for (i, p) in sides.parent_items().iter().enumerate() {
            let at = sides.parent_path.join(i);
            if self.is_excluded(&at) {
                continue;
            }
            self.keep(element, p, &at, &sides.result_path.join(out.len()));
            out.push(p.clone());
            from_parent = true;
        }
        for (j, c) in sides.child_items().iter().enumerate() {
            if out.contains(c) {
                continue;
            }
            self.keep(element, c, &sides.child_path.join(j), &sides.result_path.join(out.len()));
            out.push(c.clone());
            from_child = true;
        }
        Ok(self.finish_sequence(&sides, out, from_parent, from_child))
    }

    fn keyed_sequence(&mut self, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        let element_node = node.inner()?;
        let element = element_node.to;
        let parents = sides.parent_items();
        let children = sides.child_items();

        // Duplicate keys pair up in order of occurrence
        let mut by_key: HashMap<String, VecDeque<usize>> = HashMap::new();
        for (j, c) in children.iter().enumerate() {
            if let Some(key) = element.key_of(c) {
                by_key.entry(key).or_default().push_back(j);
            }
        }
        let mut used = vec![false; children.len()];

        let mut out: Vec<J> = Vec::new();
        let (mut from_parent, mut from_child) = (false, false);
        for (i, p) in parents.iter().enumerate() {
            let at = sides.parent_path.join(i);
            if self.is_excluded(&at) {
                continue;
            }
            let to = sides.result_path.join(out.len());
            let matched = match element.key_of(p) {
                Some(key) => by_key.get_mut(&key).and_then(VecDeque::pop_front),
                None => None,
            };
            match matched {
                Some(j) => {
                    used[j] = true;
                    let pair = Sides {
                        parent: Some(p),
                        child: Some(&children[j]),
                        parent_path: at,
                        child_path: sides.child_path.join(j),
                        result_path: to,
                    };
                    let merged = visit(self, element_node, pair)?;
                    from_parent |= merged.parent;
                    from_child |= merged.child;
                    out.push(merged.value);
                }
                None => {
                    self.keep(element, p, &at, &to);
                    out.push(p.clone());
                    from_parent = true;
                }
            }
        }
        for (j, c) in children.iter().enumerate() {
            if used[j] {
                continue;
            }
            self.keep(element, c, &sides.child_path.join(j), &sides.result_path.join(out.len()));
            out.push(c.clone());
            from_child = true;
        }
        Ok(self.finish_sequence(&sides, out, from_parent, from_child))
    }

    fn aggregate(&mut self, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        let record = node.to.as_record().ok_or_else(|| node.incongruent())?;
        self.exclude_shared(record, &sides);

        let mut out = serde_json::Map::new();
        let (mut from_parent, mut from_child) = (false, false);
        for field in record.fields() {
            let merged = visit(self, Node::same(field.shape()), sides.field(field.wire()))?;
            from_parent |= merged.parent;
            from_child |= merged.child;
            out.insert(field.wire().to_string(), merged.value);
        }
        self.finish(&sides, from_parent, from_child);
        Ok(Merged {
            value: J::Object(out),
            parent: from_parent,
            child: from_child,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::tests::{Drive, Part};
    use crate::shape::{Keyed, Naming};
    use crate::transcript::Mapping;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    fn drive(device: &str) -> Drive {
        Drive {
            device: device.into(),
            ..Default::default()
        }
    }

    fn part(number: i64, label: &str) -> Part {
        Part {
            number,
            label: Some(label.into()),
            start_mib: None,
        }
    }

    fn entries(t: &Transcript) -> Vec<String> {
        t.iter().map(Mapping::to_string).collect()
    }

    #[test]
    fn test_empty_merge() {
        let (merged, transcript) =
            Merger::new().merge(&Drive::default(), &Drive::default()).unwrap();
        assert_eq!(merged, Drive::default());
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_child_only_field() {
        let parent = drive("/dev/sda");
        let child = Drive {
            wipe_table: Some(false),
            ..drive("/dev/sda")
        };
        let (merged, transcript) = Merger::new().merge(&parent, &child).unwrap();
        assert_eq!(merged.wipe_table, Some(false));
        assert_eq!(
            entries(&transcript),
            [
                "source-B:$.device → result:$.device",
                "source-B:$.wipeTable → result:$.wipeTable",
                "source-B:$ → result:$",
            ]
        );
    }

    #[test]
    fn test_parent_fallback() {
        let parent = Drive {
            tags: vec!["boot".into()],
            ..drive("/dev/sda")
        };
        let (merged, transcript) = Merger::new().merge(&parent, &Drive::default()).unwrap();
        assert_eq!(merged, parent);
        assert!(transcript.iter().all(|m| m.from.tag() == TAG_PARENT));
        assert_eq!(
            entries(&transcript),
            [
                "source-A:$.device → result:$.device",
                "source-A:$.tags.0 → result:$.tags.0",
                "source-A:$.tags → result:$.tags",
                "source-A:$ → result:$",
            ]
        );
    }

    #[test]
    fn test_aggregate_entries_parent_before_child() {
        let parent = Drive {
            tags: vec!["a".into()],
            ..Default::default()
        };
        let child = drive("/dev/sdb");
        let (_, transcript) = Merger::new().merge(&parent, &child).unwrap();
        let root: Vec<_> = transcript
            .iter()
            .filter(|m| m.to.is_root())
            .map(|m| m.from.tag())
            .collect();
        assert_eq!(root, [TAG_PARENT, TAG_CHILD]);
    }

    #[test]
    fn test_keyed_sequence_overlay() {
        let parent = vec![
            Drive {
                wipe_table: Some(true),
                parts: vec![Part {
                    start_mib: Some(4),
                    ..part(1, "label")
                }],
                ..drive("foo")
            },
            Drive {
                wipe_table: Some(true),
                ..drive("bar")
            },
        ];
        let child = vec![
            Drive {
                wipe_table: Some(false),
                parts: vec![part(1, "labelchanged"), part(2, "label2")],
                ..drive("foo")
            },
            drive("bar"),
            Drive {
                wipe_table: Some(true),
                ..drive("baz")
            },
        ];
        let (merged, transcript) = Merger::new().merge(&parent, &child).unwrap();
        assert_eq!(
            merged,
            vec![
                Drive {
                    wipe_table: Some(false),
                    parts: vec![
                        Part {
                            start_mib: Some(4),
                            ..part(1, "labelchanged")
                        },
                        part(2, "label2"),
                    ],
                    ..drive("foo")
                },
                Drive {
                    wipe_table: Some(true),
                    ..drive("bar")
                },
                Drive {
                    wipe_table: Some(true),
                    ..drive("baz")
                },
            ]
        );
        let start = transcript
            .iter()
            .find(|m| m.to.to_string() == "$.0.parts.0.startMiB")
            .unwrap();
        assert_eq!(start.from.tag(), TAG_PARENT);
        let appended = transcript.iter().find(|m| m.to.to_string() == "$.2").unwrap();
        assert_eq!(appended.from, Path::with(TAG_CHILD, [2usize]));
    }

    #[test]
    fn test_unset_keys_never_match() {
        let parent = vec![Part::default(), Part::default()];
        let child = vec![Part::default()];
        let (merged, _) = Merger::new().merge(&parent, &child).unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_plain_union() {
        let parent = vec!["one".to_string(), "two".into()];
        let child = vec!["three".to_string(), "two".into()];
        let (merged, transcript) = Merger::new().merge(&parent, &child).unwrap();
        assert_eq!(merged, ["one", "two", "three"]);
        assert_eq!(
            entries(&transcript),
            [
                "source-A:$.0 → result:$.0",
                "source-A:$.1 → result:$.1",
                "source-B:$.0 → result:$.2",
                "source-A:$ → result:$",
                "source-B:$ → result:$",
            ]
        );
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Entry {
        path: String,
        mode: Option<i64>,
    }

    impl Keyed for Entry {
        fn key(&self) -> String {
            self.path.clone()
        }
    }

    impl Shaped for Entry {
        fn shape() -> Shape {
            Shape::record::<Self>("Entry")
                .field("path", |e| &e.path)
                .field("mode", |e| &e.mode)
                .keyed()
                .build()
        }
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Tree {
        files: Vec<Entry>,
        dirs: Vec<Entry>,
    }

    impl Shaped for Tree {
        fn shape() -> Shape {
            Shape::record::<Self>("Tree")
                .rename_all(Naming::Camel)
                .field("files", |t| &t.files)
                .field("dirs", |t| &t.dirs)
                .shared_identity("node", &["files", "dirs"])
                .build()
        }
    }

    fn entry(path: &str, mode: Option<i64>) -> Entry {
        Entry { path: path.into(), mode }
    }

    #[test]
    fn test_shared_identity_supersedes() {
        let parent = Tree {
            files: vec![entry("/foo", None), entry("/bar", Some(0o644))],
            dirs: vec![],
        };
        let child = Tree {
            files: vec![entry("/foo", Some(0o600))],
            dirs: vec![entry("/bar", None)],
        };
        let (merged, transcript) = Merger::new().merge(&parent, &child).unwrap();
        assert_eq!(
            merged,
            Tree {
                files: vec![entry("/foo", Some(0o600))],
                dirs: vec![entry("/bar", None)],
            }
        );
        assert!(transcript.iter().all(|m| m.from.to_string() != "$.files.1"));
    }

    fn child_wins<'v>(m: &mut Merging<'_, 'v>, node: Node<'_>, sides: Sides<'v>) -> Result<Merged> {
        let element = node.inner()?.to;
        if sides.child_items().is_empty() {
            return m.merge_default(node, sides);
        }
        let mut out = Vec::new();
        for (j, c) in sides.child_items().iter().enumerate() {
            m.keep(element, c, &sides.child_path.join(j), &sides.result_path.join(j));
            out.push(c.clone());
        }
        Ok(m.finish_sequence(&sides, out, false, true))
    }

    #[test]
    fn test_hook_replaces_default() {
        let merger = Merger::new().with_hook::<Vec<String>>(child_wins);
        let parent = Drive {
            tags: vec!["a".into(), "b".into()],
            ..drive("x")
        };
        let child = Drive {
            tags: vec!["c".into()],
            ..Default::default()
        };
        let (merged, _) = merger.merge(&parent, &child).unwrap();
        assert_eq!(merged.tags, ["c"]);
        assert_eq!(merged.device, "x");

        let (kept, _) = merger.merge(&parent, &Drive::default()).unwrap();
        assert_eq!(kept.tags, ["a", "b"]);
    }

    fn arb_part() -> impl Strategy<Value = Part> {
        (
            1i64..4,
            proptest::option::of("[a-z]{1,2}"),
            proptest::option::of(0i64..8),
        )
            .prop_map(|(number, label, start_mib)| Part {
                number,
                label,
                start_mib,
            })
    }

    fn arb_drive() -> impl Strategy<Value = Drive> {
        (
            "[a-z]{0,3}",
            proptest::option::of(any::<bool>()),
            prop::collection::vec(arb_part(), 0..3),
            prop::collection::vec("[a-z]{1,2}", 0..3),
        )
            .prop_map(|(device, wipe_table, parts, tags)| Drive {
                device,
                wipe_table,
                parts,
                tags,
            })
    }

    proptest! {
        #[test]
        fn prop_default_child_keeps_parent(parent in arb_drive()) {
            let (merged, transcript) = Merger::new().merge(&parent, &Drive::default()).unwrap();
            prop_assert_eq!(merged, parent);
            prop_assert!(transcript
                .iter()
                .all(|m| m.from.tag() == TAG_PARENT && m.to.tag() == TAG_RESULT));
        }

        #[test]
        fn prop_self_merge_is_stable(value in arb_drive()) {
            let merger = Merger::new();
            let (once, _) = merger.merge(&Drive::default(), &value).unwrap();
            let (twice, _) = merger.merge(&once, &once).unwrap();
            prop_assert_eq!(twice, once);
        }
    }
}
