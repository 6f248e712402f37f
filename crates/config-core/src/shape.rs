// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Runtime descriptors of configuration types.
//!
//! The engines walk encoded values (`serde_json::Value`) and consult a
//! [`Shape`] at every node to learn what the value is supposed to be: a
//! primitive, an optional reference, a sequence or a record with named
//! fields. Records additionally carry the wire naming of their fields, an
//! optional element key ([`Keyed`]) and shared identity groups.
//!
//! Shapes are assembled by hand next to the serde definitions of each schema
//! type; the schema crates test that both agree.

use crate::path::camel_case;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as J;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Primitive value kinds
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Integer,
    Float,
    String,
}

/// Extracts the identity key of an encoded sequence element
pub type KeyFn = fn(&J) -> Option<String>;

/// Identity of list members, e.g. a disk's device path.
///
/// An empty key means "unset": such elements never share identity with
/// anything, not even with each other.
pub trait Keyed {
    fn key(&self) -> String;
}

/// A type that can describe its own shape
pub trait Shaped: Serialize + DeserializeOwned + 'static {
    fn shape() -> Shape;
}

/// Wire naming convention of a record, like serde's `rename_all`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Naming {
    /// Identifier used as-is (Rust `snake_case`)
    #[default]
    Snake,
    /// serde `camelCase`
    Camel,
}

impl Naming {
    fn apply(self, ident: &str) -> String {
        match self {
            Naming::Snake => ident.to_string(),
            Naming::Camel => camel_case(ident),
        }
    }
}

#[derive(Clone)]
pub struct Shape {
    id: TypeId,
    name: &'static str,
    kind: Kind,
}

#[derive(Clone)]
pub enum Kind {
    Primitive(Primitive),
    Optional(Box<Shape>),
    Sequence(Box<Shape>),
    Record(Arc<Record>),
}

pub struct Record {
    naming: Naming,
    fields: Vec<Field>,
    key: Option<KeyFn>,
    shared: Vec<SharedIdentity>,
}

pub struct Field {
    ident: &'static str,
    wire: String,
    renamed: bool,
    auto_skip: bool,
    shape: Shape,
}

/// Sibling sequence fields whose element keys live in one namespace
#[derive(Clone, Debug)]
pub struct SharedIdentity {
    pub namespace: &'static str,
    pub fields: Vec<String>,
}

impl Shape {
    pub fn primitive<T: 'static>(name: &'static str, primitive: Primitive) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name,
            kind: Kind::Primitive(primitive),
        }
    }

    pub fn optional<T: 'static>(inner: Shape) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: "Option",
            kind: Kind::Optional(Box::new(inner)),
        }
    }

    pub fn sequence<T: 'static>(element: Shape) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: "Vec",
            kind: Kind::Sequence(Box::new(element)),
        }
    }

    /// Start describing the record type `T`
    pub fn record<T: 'static>(name: &'static str) -> RecordBuilder<T> {
        RecordBuilder {
            name,
            naming: Naming::default(),
            fields: Vec::new(),
            key: None,
            shared: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn as_record(&self) -> Option<&Record> {
        match &self.kind {
            Kind::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Element shape of a sequence, inner shape of an optional
    pub fn inner(&self) -> Option<&Shape> {
        match &self.kind {
            Kind::Optional(s) | Kind::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// True for sequences whose element record declares a key
    pub fn is_keyed_sequence(&self) -> bool {
        match &self.kind {
            Kind::Sequence(e) => e.as_record().is_some_and(|r| r.key.is_some()),
            _ => false,
        }
    }

    /// Identity key of an encoded value of this shape; `None` when unset
    pub fn key_of(&self, value: &J) -> Option<String> {
        let key = self.as_record()?.key?;
        key(value).filter(|k| !k.is_empty())
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Primitive(p) => write!(f, "{}({p:?})", self.name),
            Kind::Optional(s) => write!(f, "Option<{s:?}>"),
            Kind::Sequence(s) => write!(f, "Vec<{s:?}>"),
            Kind::Record(_) => f.write_str(self.name),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Record {
    pub fn naming(&self) -> Naming {
        self.naming
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field whose normalized wire name equals `identity`
    pub fn field_by_identity(&self, identity: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.identity() == identity)
    }

    pub fn field_by_wire(&self, wire: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.wire == wire)
    }

    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }

    pub fn shared_identity(&self) -> &[SharedIdentity] {
        &self.shared
    }
}

impl Field {
    /// In-memory identifier
    pub fn ident(&self) -> &'static str {
        self.ident
    }

    /// Name used on the wire
    pub fn wire(&self) -> &str {
        &self.wire
    }

    /// True when the wire name came from an explicit rename
    pub fn is_renamed(&self) -> bool {
        self.renamed
    }

    pub fn is_auto_skip(&self) -> bool {
        self.auto_skip
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Wire name with case and separators folded, so `wipe_table` and
    /// `wipeTable` name the same field
    pub fn identity(&self) -> String {
        normalize(&self.wire)
    }
}

pub(crate) fn normalize(wire: &str) -> String {
    wire.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

struct PendingField {
    ident: &'static str,
    rename: Option<&'static str>,
    auto_skip: bool,
    shape: Shape,
}

/// Builder returned by [`Shape::record`]
pub struct RecordBuilder<T> {
    name: &'static str,
    naming: Naming,
    fields: Vec<PendingField>,
    key: Option<KeyFn>,
    shared: Vec<(&'static str, Vec<&'static str>)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> RecordBuilder<T> {
    pub fn rename_all(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    /// Declare a field; the accessor only pins the field's type
    pub fn field<F, G>(self, ident: &'static str, get: G) -> Self
    where
        F: Shaped,
        G: Fn(&T) -> &F,
    {
        self.push::<F, G>(ident, None, false, get)
    }

    /// Declare a field with an explicit wire name
    pub fn renamed<F, G>(self, ident: &'static str, wire: &'static str, get: G) -> Self
    where
        F: Shaped,
        G: Fn(&T) -> &F,
    {
        self.push::<F, G>(ident, Some(wire), false, get)
    }

    /// Declare a field that translation ignores
    pub fn auto_skip<F, G>(self, ident: &'static str, get: G) -> Self
    where
        F: Shaped,
        G: Fn(&T) -> &F,
    {
        self.push::<F, G>(ident, None, true, get)
    }

    fn push<F, G>(
        mut self,
        ident: &'static str,
        rename: Option<&'static str>,
        auto_skip: bool,
        _get: G,
    ) -> Self
    where
        F: Shaped,
        G: Fn(&T) -> &F,
    {
        self.fields.push(PendingField {
            ident,
            rename,
            auto_skip,
            shape: F::shape(),
        });
        self
    }

    /// Group sibling sequence fields (by identifier) into one key namespace
    pub fn shared_identity(mut self, namespace: &'static str, fields: &[&'static str]) -> Self {
        self.shared.push((namespace, fields.to_vec()));
        self
    }

    pub fn build(self) -> Shape {
        let naming = self.naming;
        let fields: Vec<Field> = self
            .fields
            .into_iter()
            .map(|p| Field {
                ident: p.ident,
                wire: p.rename.map(str::to_string).unwrap_or_else(|| naming.apply(p.ident)),
                renamed: p.rename.is_some(),
                auto_skip: p.auto_skip,
                shape: p.shape,
            })
            .collect();
        let shared = self
            .shared
            .into_iter()
            .map(|(namespace, idents)| SharedIdentity {
                namespace,
                fields: idents
                    .iter()
                    .filter_map(|i| fields.iter().find(|f| f.ident == *i))
                    .map(|f| f.wire.clone())
                    .collect(),
            })
            .collect();
        Shape {
            id: TypeId::of::<T>(),
            name: self.name,
            kind: Kind::Record(Arc::new(Record {
                naming,
                fields,
                key: self.key,
                shared,
            })),
        }
    }
}

impl<T: Keyed + DeserializeOwned + 'static> RecordBuilder<T> {
    /// Mark elements of this record as identified by [`Keyed::key`]
    pub fn keyed(mut self) -> Self {
        self.key = Some(key_of::<T> as KeyFn);
        self
    }
}

fn key_of<T: Keyed + DeserializeOwned>(value: &J) -> Option<String> {
    serde_json::from_value::<T>(value.clone()).ok().map(|t| t.key())
}

macro_rules! primitive_shape {
    ($($ty:ty => $name:literal, $kind:ident;)*) => {
        $(
            impl Shaped for $ty {
                fn shape() -> Shape {
                    Shape::primitive::<$ty>($name, Primitive::$kind)
                }
            }
        )*
    };
}

primitive_shape! {
    bool => "bool", Bool;
    i32 => "i32", Integer;
    i64 => "i64", Integer;
    u32 => "u32", Integer;
    u64 => "u64", Integer;
    f64 => "f64", Float;
    String => "String", String;
}

impl<T: Shaped> Shaped for Option<T> {
    fn shape() -> Shape {
        Shape::optional::<Self>(T::shape())
    }
}

impl<T: Shaped> Shaped for Vec<T> {
    fn shape() -> Shape {
        Shape::sequence::<Self>(T::shape())
    }
}

/// Field identities of a record, for drift checks against other descriptions
pub fn wire_names(shape: &Shape) -> BTreeMap<String, String> {
    shape
        .as_record()
        .map(|r| r.fields.iter().map(|f| (f.identity(), f.wire.clone())).collect())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct Part {
        pub number: i64,
        pub label: Option<String>,
        #[serde(rename = "startMiB")]
        pub start_mib: Option<i64>,
    }

    impl Keyed for Part {
        fn key(&self) -> String {
            if self.number != 0 {
                format!("number:{}", self.number)
            } else {
                self.label.as_ref().map(|l| format!("label:{l}")).unwrap_or_default()
            }
        }
    }

    impl Shaped for Part {
        fn shape() -> Shape {
            Shape::record::<Self>("Part")
                .rename_all(Naming::Camel)
                .field("number", |p| &p.number)
                .field("label", |p| &p.label)
                .renamed("start_mib", "startMiB", |p| &p.start_mib)
                .keyed()
                .build()
        }
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    pub struct Drive {
        pub device: String,
        pub wipe_table: Option<bool>,
        pub parts: Vec<Part>,
        pub tags: Vec<String>,
    }

    impl Keyed for Drive {
        fn key(&self) -> String {
            self.device.clone()
        }
    }

    impl Shaped for Drive {
        fn shape() -> Shape {
            Shape::record::<Self>("Drive")
                .rename_all(Naming::Camel)
                .field("device", |d| &d.device)
                .field("wipe_table", |d| &d.wipe_table)
                .field("parts", |d| &d.parts)
                .field("tags", |d| &d.tags)
                .keyed()
                .build()
        }
    }

    #[test]
    fn test_wire_names_follow_naming() {
        let shape = Drive::shape();
        let record = shape.as_record().unwrap();
        let wires: Vec<_> = record.fields().iter().map(Field::wire).collect();
        assert_eq!(wires, ["device", "wipeTable", "parts", "tags"]);
        assert_eq!(record.field_by_identity("wipetable").unwrap().ident(), "wipe_table");

        let part = Part::shape();
        let start = part.as_record().unwrap().field_by_wire("startMiB").unwrap();
        assert!(start.is_renamed());
        assert_eq!(start.identity(), "startmib");
    }

    #[test]
    fn test_keys() {
        let shape = Part::shape();
        assert_eq!(shape.key_of(&serde_json::json!({"number": 2})).as_deref(), Some("number:2"));
        assert_eq!(
            shape.key_of(&serde_json::json!({"label": "root"})).as_deref(),
            Some("label:root")
        );
        assert_eq!(shape.key_of(&serde_json::json!({})), None);
        assert!(<Vec<Drive>>::shape().is_keyed_sequence());
        assert!(!<Vec<String>>::shape().is_keyed_sequence());
    }

    #[test]
    fn test_type_identity() {
        assert!(<Option<bool>>::shape().is::<Option<bool>>());
        assert!(!<Option<bool>>::shape().is::<bool>());
        assert_eq!(<Vec<Part>>::shape().to_string(), "Vec<Part>");
    }
}
