// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tagged paths into configuration trees.
//!
//! A [`Path`] names one node of one document: the tag says which document
//! space (`source-A`, `result`, `yaml`, ...) and the components walk from the
//! root through record fields and sequence indices. Paths never change once
//! built; every extending operation returns a copy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step into a configuration tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Component {
    /// Position inside a sequence
    Index(usize),
    /// Field of a record, by wire name
    Name(String),
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Index(i) => write!(f, "{i}"),
            Component::Name(n) => f.write_str(n),
        }
    }
}

impl From<usize> for Component {
    fn from(i: usize) -> Self {
        Component::Index(i)
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Component::Name(s.to_string())
    }
}

impl From<String> for Component {
    fn from(s: String) -> Self {
        Component::Name(s)
    }
}

/// A location inside one tagged document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    tag: String,
    components: Vec<Component>,
}

impl Path {
    /// Root of the document space `tag`
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            components: Vec::new(),
        }
    }

    pub fn with<I, C>(tag: impl Into<String>, components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Component>,
    {
        Self {
            tag: tag.into(),
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Copy of this path extended by one component
    pub fn join(&self, component: impl Into<Component>) -> Self {
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.extend_from_slice(&self.components);
        components.push(component.into());
        Self {
            tag: self.tag.clone(),
            components,
        }
    }

    /// Copy of this path extended by several components
    pub fn append(&self, tail: &[Component]) -> Self {
        let mut components = Vec::with_capacity(self.components.len() + tail.len());
        components.extend_from_slice(&self.components);
        components.extend_from_slice(tail);
        Self {
            tag: self.tag.clone(),
            components,
        }
    }

    /// Same components, different document space
    pub fn retag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            components: self.components.clone(),
        }
    }

    pub fn starts_with(&self, prefix: &[Component]) -> bool {
        self.components.len() >= prefix.len() && self.components[..prefix.len()] == *prefix
    }

    /// Path relative to `prefix`, keeping the tag, or `None` outside that subtree
    pub fn strip_prefix(&self, prefix: &[Component]) -> Option<Self> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            tag: self.tag.clone(),
            components: self.components[prefix.len()..].to_vec(),
        })
    }

    /// Name components converted from camelCase to snake_case.
    pub fn snake_cased(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            components: self
                .components
                .iter()
                .map(|c| match c {
                    Component::Name(n) => Component::Name(snake_case(n)),
                    Component::Index(i) => Component::Index(*i),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for c in &self.components {
            write!(f, ".{c}")?;
        }
        Ok(())
    }
}

/// `startMiB` -> `start_mib`, `httpHeaders` -> `http_headers`
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut rest = name;
    while let Some(c) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix("MiB") {
            out.push_str("_mib");
            rest = tail;
            continue;
        }
        if c.is_uppercase() {
            out.push('_');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// `wipe_table` -> `wipeTable`, the serde `camelCase` rule
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_omits_tag() {
        let p = Path::with("result", ["storage".into(), Component::from("disks"), 0usize.into()]);
        assert_eq!(p.to_string(), "$.storage.disks.0");
        assert_eq!(p.tag(), "result");
        assert_eq!(Path::new("yaml").to_string(), "$");
    }

    #[test]
    fn test_join_copies() {
        let base = Path::with("json", ["storage"]);
        let files = base.join("files");
        let first = files.join(0usize);
        assert_eq!(base.len(), 1);
        assert_eq!(files.len(), 2);
        assert_eq!(first.to_string(), "$.storage.files.0");
    }

    #[test]
    fn test_strip_prefix() {
        let p = Path::with("json", ["storage".into(), Component::from("files"), 3usize.into()]);
        let prefix = [Component::from("storage")];
        let rel = p.strip_prefix(&prefix).unwrap();
        assert_eq!(rel.to_string(), "$.files.3");
        assert_eq!(rel.tag(), "json");
        assert!(p.strip_prefix(&[Component::from("systemd")]).is_none());
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(snake_case("startMiB"), "start_mib");
        assert_eq!(snake_case("httpHeaders"), "http_headers");
        assert_eq!(snake_case("shouldNotExist"), "should_not_exist");
        assert_eq!(snake_case("device"), "device");
        assert_eq!(camel_case("wipe_table"), "wipeTable");
        assert_eq!(camel_case("should_not_exist"), "shouldNotExist");
        assert_eq!(camel_case("path"), "path");
    }

    #[test]
    fn test_snake_cased_path() {
        let p = Path::with("json", ["kernelArguments", "shouldExist"]).join(1usize);
        assert_eq!(p.snake_cased().to_string(), "$.kernel_arguments.should_exist.1");
    }
}
