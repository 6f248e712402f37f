// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The human-authored config format.
//!
//! Documents are snake_case YAML declaring a `variant` and `version`, and may
//! embed file contents inline. [`translate`] turns them into the newest
//! runtime config, along with the ledger needed to report problems in
//! the produced config against the YAML the user wrote.

use crate::v1_1;
use base64::Engine;
use config_core::visit::encode;
use config_core::{Component, Path, Report, Result, Shape, Shaped, TranslationSet, Translator};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const VARIANT: &str = "fb";
pub const VERSION: &str = "1.0.0";

/// Document space of authored configs
pub const TAG_YAML: &str = "yaml";
/// Document space of produced runtime configs
pub const TAG_JSON: &str = "json";

/// Options for [`translate`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TranslateOptions {
    /// Treat warnings as errors
    pub strict: bool,
    /// Log the translation ledger and check that it covers the output
    pub debug_print_translations: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub variant: String,
    pub version: String,
    pub ignition: Ignition,
    pub storage: Storage,
    pub systemd: Systemd,
    pub kernel_arguments: KernelArguments,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Ignition {
    pub config: IgnitionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct IgnitionConfig {
    pub merge: Vec<Resource>,
    pub replace: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Resource {
    pub source: Option<String>,
    pub compression: Option<String>,
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct HttpHeader {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Storage {
    pub disks: Vec<Disk>,
    pub files: Vec<File>,
    pub directories: Vec<Directory>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Disk {
    pub device: String,
    pub wipe_table: Option<bool>,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Partition {
    pub number: i64,
    pub label: Option<String>,
    pub start_mib: Option<i64>,
    pub size_mib: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct File {
    pub path: String,
    pub overwrite: Option<bool>,
    pub mode: Option<i64>,
    pub contents: FileContents,
    pub append: Vec<FileContents>,
}

/// File contents, fetched from `source` or given `inline`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct FileContents {
    pub source: Option<String>,
    pub inline: Option<String>,
    pub compression: Option<String>,
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Directory {
    pub path: String,
    pub mode: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Link {
    pub path: String,
    pub target: Option<String>,
    pub hard: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Systemd {
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Unit {
    pub name: String,
    pub enabled: Option<bool>,
    pub mask: Option<bool>,
    pub contents: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct KernelArguments {
    pub should_exist: Vec<String>,
    pub should_not_exist: Vec<String>,
}

impl Shaped for Config {
    fn shape() -> Shape {
        Shape::record::<Self>("Config")
            .auto_skip("variant", |c| &c.variant)
            .auto_skip("version", |c| &c.version)
            .field("ignition", |c| &c.ignition)
            .field("storage", |c| &c.storage)
            .field("systemd", |c| &c.systemd)
            .field("kernel_arguments", |c| &c.kernel_arguments)
            .build()
    }
}

impl Shaped for Ignition {
    fn shape() -> Shape {
        Shape::record::<Self>("Ignition").field("config", |i| &i.config).build()
    }
}

impl Shaped for IgnitionConfig {
    fn shape() -> Shape {
        Shape::record::<Self>("IgnitionConfig")
            .field("merge", |c| &c.merge)
            .field("replace", |c| &c.replace)
            .build()
    }
}

impl Shaped for Resource {
    fn shape() -> Shape {
        Shape::record::<Self>("Resource")
            .field("source", |r| &r.source)
            .field("compression", |r| &r.compression)
            .field("http_headers", |r| &r.http_headers)
            .build()
    }
}

impl Shaped for HttpHeader {
    fn shape() -> Shape {
        Shape::record::<Self>("HttpHeader")
            .field("name", |h| &h.name)
            .field("value", |h| &h.value)
            .build()
    }
}

impl Shaped for Storage {
    fn shape() -> Shape {
        Shape::record::<Self>("Storage")
            .field("disks", |s| &s.disks)
            .field("files", |s| &s.files)
            .field("directories", |s| &s.directories)
            .field("links", |s| &s.links)
            .build()
    }
}

impl Shaped for Disk {
    fn shape() -> Shape {
        Shape::record::<Self>("Disk")
            .field("device", |d| &d.device)
            .field("wipe_table", |d| &d.wipe_table)
            .field("partitions", |d| &d.partitions)
            .build()
    }
}

impl Shaped for Partition {
    fn shape() -> Shape {
        Shape::record::<Self>("Partition")
            .field("number", |p| &p.number)
            .field("label", |p| &p.label)
            .field("start_mib", |p| &p.start_mib)
            .field("size_mib", |p| &p.size_mib)
            .build()
    }
}

impl Shaped for File {
    fn shape() -> Shape {
        Shape::record::<Self>("File")
            .field("path", |f| &f.path)
            .field("overwrite", |f| &f.overwrite)
            .field("mode", |f| &f.mode)
            .field("contents", |f| &f.contents)
            .field("append", |f| &f.append)
            .build()
    }
}

impl Shaped for FileContents {
    fn shape() -> Shape {
        Shape::record::<Self>("FileContents")
            .field("source", |c| &c.source)
            .field("inline", |c| &c.inline)
            .field("compression", |c| &c.compression)
            .field("http_headers", |c| &c.http_headers)
            .build()
    }
}

impl Shaped for Directory {
    fn shape() -> Shape {
        Shape::record::<Self>("Directory")
            .field("path", |d| &d.path)
            .field("mode", |d| &d.mode)
            .build()
    }
}

impl Shaped for Link {
    fn shape() -> Shape {
        Shape::record::<Self>("Link")
            .field("path", |l| &l.path)
            .field("target", |l| &l.target)
            .field("hard", |l| &l.hard)
            .build()
    }
}

impl Shaped for Systemd {
    fn shape() -> Shape {
        Shape::record::<Self>("Systemd").field("units", |s| &s.units).build()
    }
}

impl Shaped for Unit {
    fn shape() -> Shape {
        Shape::record::<Self>("Unit")
            .field("name", |u| &u.name)
            .field("enabled", |u| &u.enabled)
            .field("mask", |u| &u.mask)
            .field("contents", |u| &u.contents)
            .build()
    }
}

impl Shaped for KernelArguments {
    fn shape() -> Shape {
        Shape::record::<Self>("KernelArguments")
            .field("should_exist", |k| &k.should_exist)
            .field("should_not_exist", |k| &k.should_not_exist)
            .build()
    }
}

/// Inline contents as a base64 `data:` URL
pub fn data_url(contents: &str) -> String {
    format!("data:;base64,{}", base64::engine::general_purpose::STANDARD.encode(contents))
}

fn translate_ignition(
    t: &Translator<TranslateOptions>,
    from: Ignition,
    _: &TranslateOptions,
) -> Result<(v1_1::Ignition, TranslationSet, Report)> {
    let mut set = t.empty_set();
    let mut report = Report::default();
    let mut to = v1_1::Ignition {
        version: v1_1::MAX_VERSION.to_string(),
        ..Default::default()
    };
    // the version is implied by the whole section
    set.add(&Path::new(t.from_tag()), &Path::with(t.to_tag(), ["version"]));
    let config = [Component::from("config")];
    t.translate_into(&mut set, &mut report, &config, &from.config, &config, &mut to.config)?;
    Ok((to, set, report))
}

fn translate_file_contents(
    t: &Translator<TranslateOptions>,
    from: FileContents,
    _: &TranslateOptions,
) -> Result<(v1_1::Resource, TranslationSet, Report)> {
    let mut set = t.empty_set();
    let mut report = Report::default();
    let mut to = v1_1::Resource::default();
    let at = |name: &str| Path::with(t.from_tag(), [name]);

    // inline contents are only emitted when no source is given
    let inline = from.inline.as_deref().filter(|_| from.source.is_none());
    match inline {
        Some(inline) => {
            to.source = Some(data_url(inline));
            set.add(&at("inline"), &Path::with(t.to_tag(), ["source"]));
        }
        None => {
            if from.inline.is_some() {
                report.add_error(at("inline"), "inline and source are mutually exclusive");
            }
            let source = [Component::from("source")];
            t.translate_into(
                &mut set,
                &mut report,
                &source,
                &from.source,
                &source,
                &mut to.source,
            )?;
        }
    }
    if inline.is_some() && from.compression.is_some() {
        report.add_warn(at("compression"), "compression is ignored for inline contents");
    } else {
        t.translate_into(
            &mut set,
            &mut report,
            &["compression".into()],
            &from.compression,
            &["compression".into()],
            &mut to.compression,
        )?;
    }
    t.translate_into(
        &mut set,
        &mut report,
        &["http_headers".into()],
        &from.http_headers,
        &["httpHeaders".into()],
        &mut to.http_headers,
    )?;
    Ok((to, set, report))
}

/// Translator from authored configs to the newest runtime format
pub fn translator(options: TranslateOptions) -> Translator<TranslateOptions> {
    let mut translator = Translator::new(TAG_YAML, TAG_JSON, options);
    translator.add_custom(translate_ignition);
    translator.add_custom(translate_file_contents);
    translator
}

/// Translate an authored config into a runtime config.
///
/// Problems with the document are returned in the report, in authored
/// (`yaml`) coordinates.
pub fn translate(
    config: &Config,
    options: &TranslateOptions,
) -> Result<(v1_1::Config, TranslationSet, Report)> {
    let mut report = Report::default();
    if config.variant != VARIANT {
        report.add_error(
            Path::with(TAG_YAML, ["variant"]),
            format!("unsupported variant {:?}, expected {VARIANT:?}", config.variant),
        );
    }
    if config.version != VERSION {
        report.add_error(
            Path::with(TAG_YAML, ["version"]),
            format!("unsupported version {:?}, expected {VERSION:?}", config.version),
        );
    }

    let mut out = v1_1::Config::default();
    let (set, translate_report) = translator(options.clone()).translate(config, &mut out)?;
    report.merge(translate_report);

    if options.debug_print_translations {
        tracing::debug!(translations = %set, "Translation set");
        set.verify_coverage(&v1_1::Config::shape(), &encode(&out)?)?;
    }
    if options.strict {
        report = report.strict();
    }
    Ok((out, set, report))
}
