// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Category dispatch shared by the merge and translate engines.
//!
//! A [`Visitor`] sees one [`Node`] at a time: the pair of shapes the engine
//! is walking (merge passes the same shape on both sides). Before default
//! dispatch, [`Visitor::intercept`] may take over the node entirely; this is
//! where merge hooks and custom translators plug in.

use crate::error::{DefinitionError, Result};
use crate::path::Component;
use crate::shape::{Kind, Primitive, Shape};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as J;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Category {
    Primitive,
    Optional,
    Sequence,
    KeyedSequence,
    Aggregate,
}

impl Category {
    pub fn of(shape: &Shape) -> Category {
        match shape.kind() {
            Kind::Primitive(_) => Category::Primitive,
            Kind::Optional(_) => Category::Optional,
            Kind::Sequence(_) if shape.is_keyed_sequence() => Category::KeyedSequence,
            Kind::Sequence(_) => Category::Sequence,
            Kind::Record(_) => Category::Aggregate,
        }
    }
}

/// A pair of shapes being walked together
#[derive(Copy, Clone, Debug)]
pub struct Node<'s> {
    pub from: &'s Shape,
    pub to: &'s Shape,
}

impl<'s> Node<'s> {
    pub fn new(from: &'s Shape, to: &'s Shape) -> Self {
        Self { from, to }
    }

    /// Node of a same-shape walk
    pub fn same(shape: &'s Shape) -> Self {
        Self { from: shape, to: shape }
    }

    /// Category shared by both sides.
    ///
    /// A keyed sequence paired with a plain one walks as a plain sequence.
    pub fn category(&self) -> Result<Category> {
        let (a, b) = (Category::of(self.from), Category::of(self.to));
        match (a, b) {
            _ if a == b => Ok(a),
            (Category::Sequence, Category::KeyedSequence)
            | (Category::KeyedSequence, Category::Sequence) => Ok(Category::Sequence),
            _ => Err(self.incongruent()),
        }
    }

    /// Element or inner shapes of both sides
    pub fn inner(&self) -> Result<Node<'s>> {
        match (self.from.inner(), self.to.inner()) {
            (Some(from), Some(to)) => Ok(Node { from, to }),
            _ => Err(self.incongruent()),
        }
    }

    pub fn incongruent(&self) -> DefinitionError {
        DefinitionError::Incongruent {
            from: self.from.to_string(),
            to: self.to.to_string(),
        }
    }
}

/// Outcome of [`Visitor::intercept`]
pub enum Intercept<I, O> {
    /// The override produced the node's result
    Handled(O),
    /// No override; default dispatch continues with the input
    Continue(I),
}

pub trait Visitor {
    type Input;
    type Output;
    type Error: From<DefinitionError>;

    fn intercept(
        &mut self,
        _node: Node<'_>,
        input: Self::Input,
    ) -> Intercept<Self::Input, std::result::Result<Self::Output, Self::Error>> {
        Intercept::Continue(input)
    }

    fn primitive(&mut self, node: Node<'_>, input: Self::Input)
        -> std::result::Result<Self::Output, Self::Error>;

    fn optional(&mut self, node: Node<'_>, input: Self::Input)
        -> std::result::Result<Self::Output, Self::Error>;

    fn sequence(&mut self, node: Node<'_>, input: Self::Input)
        -> std::result::Result<Self::Output, Self::Error>;

    fn keyed_sequence(
        &mut self,
        node: Node<'_>,
        input: Self::Input,
    ) -> std::result::Result<Self::Output, Self::Error> {
        self.sequence(node, input)
    }

    fn aggregate(&mut self, node: Node<'_>, input: Self::Input)
        -> std::result::Result<Self::Output, Self::Error>;
}

/// Visit one node: overrides first, then default dispatch
pub fn visit<V: Visitor>(
    visitor: &mut V,
    node: Node<'_>,
    input: V::Input,
) -> std::result::Result<V::Output, V::Error> {
    match visitor.intercept(node, input) {
        Intercept::Handled(result) => result,
        Intercept::Continue(input) => dispatch(visitor, node, input),
    }
}

/// Default dispatch without consulting overrides; lets an override fall
/// back to the generic behaviour for its own node
pub fn dispatch<V: Visitor>(
    visitor: &mut V,
    node: Node<'_>,
    input: V::Input,
) -> std::result::Result<V::Output, V::Error> {
    match node.category()? {
        Category::Primitive => visitor.primitive(node, input),
        Category::Optional => visitor.optional(node, input),
        Category::Sequence => visitor.sequence(node, input),
        Category::KeyedSequence => visitor.keyed_sequence(node, input),
        Category::Aggregate => visitor.aggregate(node, input),
    }
}

/// Encode a typed value into the value model the engines walk
pub fn encode<T: Serialize>(value: &T) -> Result<J> {
    serde_json::to_value(value).map_err(|source| DefinitionError::Encode {
        type_name: std::any::type_name::<T>(),
        source,
    })
}

pub fn decode<T: DeserializeOwned>(value: J) -> Result<T> {
    serde_json::from_value(value).map_err(|source| DefinitionError::Decode {
        type_name: std::any::type_name::<T>(),
        source,
    })
}

/// Encoded default of a shape
pub fn default_value(shape: &Shape) -> J {
    match shape.kind() {
        Kind::Primitive(Primitive::Bool) => J::Bool(false),
        Kind::Primitive(Primitive::Integer) => J::from(0),
        Kind::Primitive(Primitive::Float) => J::from(0.0),
        Kind::Primitive(Primitive::String) => J::String(String::new()),
        Kind::Optional(_) => J::Null,
        Kind::Sequence(_) => J::Array(Vec::new()),
        Kind::Record(r) => J::Object(
            r.fields()
                .iter()
                .map(|f| (f.wire().to_string(), default_value(f.shape())))
                .collect(),
        ),
    }
}

/// Whether `value` differs from the shape's default.
///
/// Present optionals count as set even when they wrap a default.
pub fn is_set(shape: &Shape, value: &J) -> bool {
    match shape.kind() {
        Kind::Primitive(_) => match value {
            J::Null => false,
            J::Bool(b) => *b,
            J::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            J::String(s) => !s.is_empty(),
            _ => true,
        },
        Kind::Optional(_) => !value.is_null(),
        Kind::Sequence(_) => value.as_array().is_some_and(|a| !a.is_empty()),
        Kind::Record(r) => r
            .fields()
            .iter()
            .any(|f| value.get(f.wire()).is_some_and(|v| is_set(f.shape(), v))),
    }
}

/// Every field and element path reachable in `value`, relative to it.
///
/// Children come before their parent. Unset fields are skipped unless
/// `include_defaults` is true; elements are always listed.
pub fn paths(shape: &Shape, value: &J, include_defaults: bool) -> Vec<Vec<Component>> {
    let mut out = Vec::new();
    collect_paths(shape, value, include_defaults, &mut Vec::new(), &mut out);
    out
}

fn collect_paths(
    shape: &Shape,
    value: &J,
    include_defaults: bool,
    prefix: &mut Vec<Component>,
    out: &mut Vec<Vec<Component>>,
) {
    match shape.kind() {
        Kind::Primitive(_) => {}
        Kind::Optional(inner) => {
            if !value.is_null() {
                collect_paths(inner, value, include_defaults, prefix, out);
            }
        }
        Kind::Sequence(element) => {
            for (i, v) in value.as_array().into_iter().flatten().enumerate() {
                prefix.push(Component::Index(i));
                collect_paths(element, v, include_defaults, prefix, out);
                out.push(prefix.clone());
                prefix.pop();
            }
        }
        Kind::Record(r) => {
            for field in r.fields() {
                let default;
                let v = match value.get(field.wire()) {
                    Some(v) => v,
                    None => {
                        default = default_value(field.shape());
                        &default
                    }
                };
                if !include_defaults && !is_set(field.shape(), v) {
                    continue;
                }
                prefix.push(Component::Name(field.wire().to_string()));
                collect_paths(field.shape(), v, include_defaults, prefix, out);
                out.push(prefix.clone());
                prefix.pop();
            }
        }
    }
}

/// Object keys present in `value` that `shape` does not declare, as paths.
///
/// Used to catch drift between a hand-written shape and the serde
/// definition it describes.
pub fn undeclared_fields(shape: &Shape, value: &J) -> Vec<String> {
    let mut out = Vec::new();
    collect_undeclared(shape, value, "$", &mut out);
    out.sort();
    out
}

fn collect_undeclared(shape: &Shape, value: &J, at: &str, out: &mut Vec<String>) {
    match (shape.kind(), value) {
        (Kind::Optional(inner), v) if !v.is_null() => collect_undeclared(inner, v, at, out),
        (Kind::Sequence(element), J::Array(items)) => {
            for (i, v) in items.iter().enumerate() {
                collect_undeclared(element, v, &format!("{at}.{i}"), out);
            }
        }
        (Kind::Record(r), J::Object(map)) => {
            for (k, v) in map {
                let here = format!("{at}.{k}");
                match r.field_by_wire(k) {
                    Some(field) => collect_undeclared(field.shape(), v, &here, out),
                    None => out.push(here),
                }
            }
        }
        _ => {}
    }
}
