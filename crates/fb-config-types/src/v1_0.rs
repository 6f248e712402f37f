// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Runtime format 1.0.0

use config_core::merge::{Merged, Merger, Merging, Sides};
use config_core::resolve::References;
use config_core::{Keyed, Naming, Node, Shape, Shaped};
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const VERSION: &str = "1.0.0";

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
    /// Format version the document is written against
    pub version: String,
    pub config: IgnitionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct IgnitionConfig {
    /// Configs merged over this one, in order
    pub merge: Vec<Resource>,
    /// Config used instead of this one
    pub replace: Resource,
}

/// A remote or inline (`data:` URL) resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Resource {
    pub source: Option<String>,
    pub compression: Option<String>,
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
pub struct Disk {
    /// Absolute path of the block device
    pub device: String,
    /// Discard the existing partition table
    pub wipe_table: Option<bool>,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Partition {
    /// Partition number; 0 means "next free"
    pub number: i64,
    pub label: Option<String>,
    #[serde(rename = "startMiB")]
    pub start_mib: Option<i64>,
    #[serde(rename = "sizeMiB")]
    pub size_mib: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct File {
    pub path: String,
    pub overwrite: Option<bool>,
    pub mode: Option<i64>,
    pub contents: Resource,
    /// Fragments appended to the file after `contents`
    pub append: Vec<Resource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Directory {
    pub path: String,
    pub mode: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Link {
    pub path: String,
    pub target: Option<String>,
    pub hard: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Systemd {
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Unit {
    pub name: String,
    pub enabled: Option<bool>,
    pub mask: Option<bool>,
    pub contents: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct KernelArguments {
    pub should_exist: Vec<String>,
    pub should_not_exist: Vec<String>,
}

impl Keyed for Resource {
    fn key(&self) -> String {
        self.source.clone().unwrap_or_default()
    }
}

impl Keyed for Disk {
    fn key(&self) -> String {
        self.device.clone()
    }
}

impl Keyed for Partition {
    fn key(&self) -> String {
        if self.number != 0 {
            format!("number:{}", self.number)
        } else {
            self.label.as_ref().map(|l| format!("label:{l}")).unwrap_or_default()
        }
    }
}

impl Keyed for File {
    fn key(&self) -> String {
        self.path.clone()
    }
}

impl Keyed for Directory {
    fn key(&self) -> String {
        self.path.clone()
    }
}

impl Keyed for Link {
    fn key(&self) -> String {
        self.path.clone()
    }
}

impl Keyed for Unit {
    fn key(&self) -> String {
        self.name.clone()
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

impl Shaped for Disk {
    fn shape() -> Shape {
        Shape::record::<Self>("Disk")
            .rename_all(Naming::Camel)
            .field("device", |d| &d.device)
            .field("wipe_table", |d| &d.wipe_table)
            .field("partitions", |d| &d.partitions)
            .keyed()
            .build()
    }
}

impl Shaped for Partition {
    fn shape() -> Shape {
        Shape::record::<Self>("Partition")
            .rename_all(Naming::Camel)
            .field("number", |p| &p.number)
            .field("label", |p| &p.label)
            .renamed("start_mib", "startMiB", |p| &p.start_mib)
            .renamed("size_mib", "sizeMiB", |p| &p.size_mib)
            .keyed()
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

impl Shaped for Directory {
    fn shape() -> Shape {
        Shape::record::<Self>("Directory")
            .rename_all(Naming::Camel)
            .field("path", |d| &d.path)
            .field("mode", |d| &d.mode)
            .keyed()
            .build()
    }
}

impl Shaped for Link {
    fn shape() -> Shape {
        Shape::record::<Self>("Link")
            .rename_all(Naming::Camel)
            .field("path", |l| &l.path)
            .field("target", |l| &l.target)
            .field("hard", |l| &l.hard)
            .keyed()
            .build()
    }
}

impl Shaped for Systemd {
    fn shape() -> Shape {
        Shape::record::<Self>("Systemd")
            .rename_all(Naming::Camel)
            .field("units", |s| &s.units)
            .build()
    }
}

impl Shaped for Unit {
    fn shape() -> Shape {
        Shape::record::<Self>("Unit")
            .rename_all(Naming::Camel)
            .field("name", |u| &u.name)
            .field("enabled", |u| &u.enabled)
            .field("mask", |u| &u.mask)
            .field("contents", |u| &u.contents)
            .keyed()
            .build()
    }
}

impl Shaped for KernelArguments {
    fn shape() -> Shape {
        Shape::record::<Self>("KernelArguments")
            .rename_all(Naming::Camel)
            .field("should_exist", |k| &k.should_exist)
            .field("should_not_exist", |k| &k.should_not_exist)
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

/// Kernel arguments a child asks for remove the same argument from the
/// parent's opposite list
pub fn merge_kernel_arguments<'v>(
    m: &mut Merging<'_, 'v>,
    node: Node<'_>,
    sides: Sides<'v>,
) -> config_core::Result<Merged> {
    const OPPOSITES: [(&str, &str); 2] =
        [("shouldExist", "shouldNotExist"), ("shouldNotExist", "shouldExist")];
    for (wanted, opposite) in OPPOSITES {
        let requested = sides.field(wanted).child_items();
        let opposite = sides.field(opposite);
        for (i, arg) in opposite.parent_items().iter().enumerate() {
            if requested.contains(arg) {
                m.exclude(opposite.parent_path.join(i));
            }
        }
    }
    m.merge_default(node, sides)
}

/// Merger for 1.0.0 configs
pub fn merger() -> Merger {
    Merger::new().with_hook::<KernelArguments>(merge_kernel_arguments)
}

pub fn schema() -> RootSchema {
    crate::root_schema::<Config>()
}
