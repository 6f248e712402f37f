// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Runtime format 1.1.0, adding HTTP headers to resources.
//!
//! Types that did not change are shared with [`crate::v1_0`].

use crate::v1_0;
use config_core::merge::{Merged, Merger, Merging, Sides};
use config_core::resolve::References;
use config_core::{
    Component, Keyed, Naming, Node, Path, Report, Result, Shape, Shaped, TranslationSet, Translator,
};
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as J;
use std::fmt;

pub use crate::v1_0::{Directory, Disk, KernelArguments, Link, Partition, Systemd, Unit};

/// Newest format version this crate produces
pub const MAX_VERSION: &str = "1.1.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub ignition: Ignition,
    pub storage: Storage,
    pub systemd: Systemd,
    pub kernel_arguments: KernelArguments,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Ignition {
    pub version: String,
    pub config: IgnitionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct IgnitionConfig {
    pub merge: Vec<Resource>,
    pub replace: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Resource {
    pub source: Option<String>,
    pub compression: Option<String>,
    /// Extra headers sent when fetching `source` over HTTP(S)
    pub http_headers: Vec<HttpHeader>,
}

/// A header with no value removes a header of the same name inherited from
/// a parent config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpHeader {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Storage {
    pub disks: Vec<Disk>,
    pub files: Vec<File>,
    pub directories: Vec<Directory>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct File {
    pub path: String,
    pub overwrite: Option<bool>,
    pub mode: Option<i64>,
    pub contents: Resource,
    pub append: Vec<Resource>,
}

impl Keyed for Resource {
    fn key(&self) -> String {
        self.source.clone().unwrap_or_default()
    }
}

impl Keyed for HttpHeader {
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Keyed for File {
    fn key(&self) -> String {
        self.path.clone()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source.as_deref().unwrap_or("<no source>"))
    }
}

impl Shaped for Config {
    fn shape() -> Shape {
        Shape::record::<Self>("Config")
            .rename_all(Naming::Camel)
            .field("ignition", |c| &c.ignition)
            .field("storage", |c| &c.storage)
            .field("systemd", |c| &c.systemd)
            .field("kernel_arguments", |c| &c.kernel_arguments)
            .build()
    }
}

impl Shaped for Ignition {
    fn shape() -> Shape {
        Shape::record::<Self>("Ignition")
            .rename_all(Naming::Camel)
            .field("version", |i| &i.version)
            .field("config", |i| &i.config)
            .build()
    }
}

impl Shaped for IgnitionConfig {
    fn shape() -> Shape {
        Shape::record::<Self>("IgnitionConfig")
            .rename_all(Naming::Camel)
            .field("merge", |c| &c.merge)
            .field("replace", |c| &c.replace)
            .build()
    }
}

impl Shaped for Resource {
    fn shape() -> Shape {
        Shape::record::<Self>("Resource")
            .rename_all(Naming::Camel)
            .field("source", |r| &r.source)
            .field("compression", |r| &r.compression)
            .field("http_headers", |r| &r.http_headers)
            .keyed()
            .build()
    }
}

impl Shaped for HttpHeader {
    fn shape() -> Shape {
        Shape::record::<Self>("HttpHeader")
            .rename_all(Naming::Camel)
            .field("name", |h| &h.name)
            .field("value", |h| &h.value)
            .keyed()
            .build()
    }
}

impl Shaped for Storage {
    fn shape() -> Shape {
        Shape::record::<Self>("Storage")
            .rename_all(Naming::Camel)
            .field("disks", |s| &s.disks)
            .field("files", |s| &s.files)
            .field("directories", |s| &s.directories)
            .field("links", |s| &s.links)
            .shared_identity("node", &["files", "directories", "links"])
            .build()
    }
}

impl Shaped for File {
    fn shape() -> Shape {
        Shape::record::<Self>("File")
            .rename_all(Naming::Camel)
            .field("path", |f| &f.path)
            .field("overwrite", |f| &f.overwrite)
            .field("mode", |f| &f.mode)
            .field("contents", |f| &f.contents)
            .field("append", |f| &f.append)
            .keyed()
            .build()
    }
}

impl References for Config {
    type Reference = Resource;

    fn replace(&self) -> Option<Resource> {
        let replace = &self.ignition.config.replace;
        replace.source.is_some().then(|| replace.clone())
    }

    fn merges(&self) -> Vec<Resource> {
        self.ignition
            .config
            .merge
            .iter()
            .filter(|r| r.source.is_some())
            .cloned()
            .collect()
    }
}

fn has_value(header: &J) -> bool {
    header.get("value").is_some_and(|v| !v.is_null())
}

/// Headers merge by name. A child header with a value replaces the parent's
/// header of that name or is appended; one without a value deletes it.
pub fn merge_http_headers<'v>(
    m: &mut Merging<'_, 'v>,
    node: Node<'_>,
    sides: Sides<'v>,
) -> Result<Merged> {
    let element = node.inner()?.to;
    let children = sides.child_items();
    let mut used = vec![false; children.len()];

    let mut out = Vec::new();
    let (mut from_parent, mut from_child) = (false, false);
    for (i, p) in sides.parent_items().iter().enumerate() {
        let at = sides.parent_path.join(i);
        if m.is_excluded(&at) {
            continue;
        }
        let to = sides.result_path.join(out.len());
        let matched = element.key_of(p).and_then(|key| {
            (0..children.len())
                .find(|&j| !used[j] && element.key_of(&children[j]).as_ref() == Some(&key))
        });
        match matched {
            Some(j) => {
                used[j] = true;
                if has_value(&children[j]) {
                    m.keep(element, &children[j], &sides.child_path.join(j), &to);
                    out.push(children[j].clone());
                    from_child = true;
                }
            }
            None => {
                m.keep(element, p, &at, &to);
                out.push(p.clone());
                from_parent = true;
            }
        }
    }
    for (j, c) in children.iter().enumerate() {
        if used[j] || !has_value(c) {
            continue;
        }
        m.keep(element, c, &sides.child_path.join(j), &sides.result_path.join(out.len()));
        out.push(c.clone());
        from_child = true;
    }
    Ok(m.finish_sequence(&sides, out, from_parent, from_child))
}

/// Merger for 1.1.0 configs
pub fn merger() -> Merger {
    Merger::new()
        .with_hook::<KernelArguments>(v1_0::merge_kernel_arguments)
        .with_hook::<Vec<HttpHeader>>(merge_http_headers)
}

pub fn schema() -> RootSchema {
    crate::root_schema::<Config>()
}

fn translate_ignition(
    t: &Translator<()>,
    from: v1_0::Ignition,
    _: &(),
) -> Result<(Ignition, TranslationSet, Report)> {
    let mut set = t.empty_set();
    let mut report = Report::default();
    let mut to = Ignition {
        version: MAX_VERSION.to_string(),
        ..Default::default()
    };
    set.add(&Path::with(t.from_tag(), ["version"]), &Path::with(t.to_tag(), ["version"]));
    let config = [Component::from("config")];
    t.translate_into(&mut set, &mut report, &config, &from.config, &config, &mut to.config)?;
    Ok((to, set, report))
}

fn translate_resource(
    t: &Translator<()>,
    from: v1_0::Resource,
    _: &(),
) -> Result<(Resource, TranslationSet, Report)> {
    let mut set = t.empty_set();
    let mut report = Report::default();
    let mut to = Resource::default();
    let source = [Component::from("source")];
    t.translate_into(&mut set, &mut report, &source, &from.source, &source, &mut to.source)?;
    t.translate_into(
        &mut set,
        &mut report,
        &["compression".into()],
        &from.compression,
        &["compression".into()],
        &mut to.compression,
    )?;
    Ok((to, set, report))
}

/// Translator from 1.0.0 configs
pub fn translator() -> Translator<()> {
    let mut translator = Translator::new(v1_0::VERSION, MAX_VERSION, ());
    translator.add_custom(translate_ignition);
    translator.add_custom(translate_resource);
    translator
}

/// Upgrade a 1.0.0 config
pub fn translate(from: &v1_0::Config) -> Result<(Config, TranslationSet, Report)> {
    let mut to = Config::default();
    let (set, report) = translator().translate(from, &mut to)?;
    Ok((to, set, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_core::visit::encode;
    use config_core::{Component, TAG_CHILD, TAG_PARENT, TAG_RESULT};
    use pretty_assertions::assert_eq;

    fn header(name: &str, value: Option<&str>) -> HttpHeader {
        HttpHeader {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_header_tombstones() {
        let parent = vec![
            header("old", Some("oldval")),
            header("same", Some("oldval")),
            header("toRemove", Some("someval")),
        ];
        let child = vec![
            header("toRemove", None),
            header("new", Some("newval")),
            header("same", Some("newval")),
        ];
        let (merged, transcript) = merger().merge(&parent, &child).unwrap();
        assert_eq!(
            merged,
            vec![
                header("old", Some("oldval")),
                header("same", Some("newval")),
                header("new", Some("newval")),
            ]
        );
        let origin = |i: usize| {
            transcript
                .iter()
                .find(|m| m.to == Path::with(TAG_RESULT, [i]))
                .map(|m| m.from.clone())
                .unwrap()
        };
        assert_eq!(origin(0), Path::with(TAG_PARENT, [0usize]));
        assert_eq!(origin(1), Path::with(TAG_CHILD, [2usize]));
        assert_eq!(origin(2), Path::with(TAG_CHILD, [1usize]));
        assert!(transcript.iter().all(|m| m.from != Path::with(TAG_PARENT, [2usize])));
    }

    #[test]
    fn test_unmatched_tombstone_is_dropped() {
        let (merged, _) = merger()
            .merge(&vec![header("a", Some("1"))], &vec![header("b", None)])
            .unwrap();
        assert_eq!(merged, vec![header("a", Some("1"))]);
    }

    #[test]
    fn test_headers_inside_config() {
        let resource = |headers: Vec<HttpHeader>| Resource {
            source: Some("https://example.com/app".into()),
            http_headers: headers,
            ..Default::default()
        };
        let file = |headers| File {
            path: "/opt/app".into(),
            contents: resource(headers),
            ..Default::default()
        };
        let config = |headers| Config {
            storage: Storage {
                files: vec![file(headers)],
                ..Default::default()
            },
            ..Default::default()
        };
        let parent = config(vec![
            header("Authorization", Some("Basic abc")),
            header("X-Trace", Some("1")),
        ]);
        let child = config(vec![header("Authorization", None)]);
        let (merged, _) = merger().merge(&parent, &child).unwrap();
        let headers = &merged.storage.files[0].contents.http_headers;
        assert_eq!(headers, &vec![header("X-Trace", Some("1"))]);
    }

    #[test]
    fn test_translate_from_1_0() {
        let from = v1_0::Config {
            ignition: v1_0::Ignition {
                version: v1_0::VERSION.into(),
                config: v1_0::IgnitionConfig {
                    merge: vec![v1_0::Resource {
                        source: Some("https://example.com/base.ign".into()),
                        compression: None,
                    }],
                    ..Default::default()
                },
            },
            storage: v1_0::Storage {
                disks: vec![Disk {
                    device: "/dev/vda".into(),
                    wipe_table: Some(true),
                    partitions: vec![Partition {
                        number: 1,
                        label: Some("root".into()),
                        size_mib: Some(1024),
                        ..Default::default()
                    }],
                }],
                files: vec![v1_0::File {
                    path: "/etc/motd".into(),
                    mode: Some(0o644),
                    contents: v1_0::Resource {
                        source: Some("data:,hello".into()),
                        compression: Some("gzip".into()),
                    },
                    ..Default::default()
                }],
                ..Default::default()
            },
            kernel_arguments: KernelArguments {
                should_exist: vec!["quiet".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let (config, set, report) = translate(&from).unwrap();
        assert!(report.is_empty());
        assert_eq!(config.ignition.version, MAX_VERSION);
        assert_eq!(
            config.ignition.config.merge[0].source.as_deref(),
            Some("https://example.com/base.ign")
        );
        assert_eq!(config.storage.disks, from.storage.disks);
        assert_eq!(config.storage.files[0].contents.compression.as_deref(), Some("gzip"));
        assert!(config.storage.files[0].contents.http_headers.is_empty());

        let source = Path::with(
            MAX_VERSION,
            [
                Component::from("storage"),
                "files".into(),
                0usize.into(),
                "contents".into(),
                "source".into(),
            ],
        );
        let t = set.get(&source).unwrap();
        assert_eq!(t.from.tag(), v1_0::VERSION);
        assert_eq!(t.from.to_string(), "$.storage.files.0.contents.source");
        set.verify_coverage(&Config::shape(), &encode(&config).unwrap()).unwrap();
    }
}
