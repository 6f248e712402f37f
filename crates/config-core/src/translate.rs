// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Version-to-version translation of configs.
//!
//! A [`Translator`] copies a value of one shape into a related shape. Nodes
//! whose shapes are congruent are copied field by field; nodes whose shape
//! changed need a custom translator registered for the exact type pair.
//! Everything copied is recorded in a [`TranslationSet`] so diagnostics on the
//! output can be reported against the input.
//!
//! The per-call ledger and report are threaded through the walk, so a single
//! translator can serve concurrent calls and custom translators can call back
//! into the translator that invoked them.

use crate::error::{DefinitionError, Result};
use crate::path::{Component, Path};
use crate::report::Report;
use crate::set::TranslationSet;
use crate::shape::{Kind, Record, Shape, Shaped};
use crate::visit::{decode, default_value, encode, is_set, visit, Intercept, Node, Visitor};
use serde_json::Value as J;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

type Custom<O> =
    Box<dyn Fn(&Translator<O>, &J, &O) -> Result<(J, TranslationSet, Report)> + Send + Sync>;

pub struct Translator<O> {
    from_tag: String,
    to_tag: String,
    options: O,
    customs: HashMap<(TypeId, TypeId), Custom<O>>,
}

impl<O: 'static> Translator<O> {
    /// Translator from documents tagged `from_tag` to documents tagged `to_tag`
    pub fn new(from_tag: impl Into<String>, to_tag: impl Into<String>, options: O) -> Self {
        Self {
            from_tag: from_tag.into(),
            to_tag: to_tag.into(),
            options,
            customs: HashMap::new(),
        }
    }

    pub fn from_tag(&self) -> &str {
        &self.from_tag
    }

    pub fn to_tag(&self) -> &str {
        &self.to_tag
    }

    pub fn options(&self) -> &O {
        &self.options
    }

    /// An empty ledger with this translator's tags
    pub fn empty_set(&self) -> TranslationSet {
        TranslationSet::new(self.from_tag.clone(), self.to_tag.clone())
    }

    /// Register `f` for translating `S` into `D`.
    ///
    /// `f` returns the ledger of what it produced relative to the node it was
    /// called on; report contexts are relative to the source node. A second
    /// registration for the same pair replaces the first.
    pub fn add_custom<S, D, F>(&mut self, f: F)
    where
        S: Shaped,
        D: Shaped,
        F: Fn(&Translator<O>, S, &O) -> Result<(D, TranslationSet, Report)> + Send + Sync + 'static,
    {
        let erased: Custom<O> = Box::new(move |translator, value, options| {
            let source: S = decode(value.clone())?;
            let (dest, set, report) = f(translator, source, options)?;
            Ok((encode(&dest)?, set, report))
        });
        if self.customs.insert((TypeId::of::<S>(), TypeId::of::<D>()), erased).is_some() {
            tracing::warn!(
                from = type_name::<S>(),
                to = type_name::<D>(),
                "Replacing custom translator"
            );
        }
    }

    pub fn has_custom(&self, from: &Shape, to: &Shape) -> bool {
        self.customs.contains_key(&(from.id(), to.id()))
    }

    /// Whether the default copy can handle `from` into `to`: same category
    /// at every level, same field identities on records (source `auto_skip`
    /// fields aside), and inner shapes translatable or custom-translated
    pub fn translatable(&self, from: &Shape, to: &Shape) -> bool {
        match (from.kind(), to.kind()) {
            (Kind::Primitive(a), Kind::Primitive(b)) => a == b,
            (Kind::Optional(a), Kind::Optional(b)) | (Kind::Sequence(a), Kind::Sequence(b)) => {
                self.reachable(a, b)
            }
            (Kind::Record(a), Kind::Record(b)) => {
                from.name() == to.name() && self.translatable_record(a, b)
            }
            _ => false,
        }
    }

    fn reachable(&self, from: &Shape, to: &Shape) -> bool {
        self.has_custom(from, to) || self.translatable(from, to)
    }

    fn translatable_record(&self, from: &Record, to: &Record) -> bool {
        let sources: Vec<_> = from.fields().iter().filter(|f| !f.is_auto_skip()).collect();
        let targets = to.fields().iter().filter(|f| !f.is_auto_skip()).count();
        sources.len() == targets
            && sources.iter().all(|f| {
                to.field_by_identity(&f.identity())
                    .is_some_and(|t| !t.is_auto_skip() && self.reachable(f.shape(), t.shape()))
            })
    }

    /// Translate `from` into `to`
    pub fn translate<S: Shaped, D: Shaped>(
        &self,
        from: &S,
        to: &mut D,
    ) -> Result<(TranslationSet, Report)> {
        let value = encode(from)?;
        let (out, set, report) = self.translate_values(&S::shape(), &D::shape(), &value)?;
        *to = decode(out)?;
        tracing::debug!(
            from = type_name::<S>(),
            to = type_name::<D>(),
            translations = set.len(),
            diagnostics = report.entries.len(),
            "Translated config"
        );
        Ok((set, report))
    }

    /// Translate an encoded value of shape `from` into shape `to`
    pub fn translate_values(
        &self,
        from: &Shape,
        to: &Shape,
        value: &J,
    ) -> Result<(J, TranslationSet, Report)> {
        let mut state = Translating {
            translator: self,
            set: self.empty_set(),
            report: Report::default(),
            _values: PhantomData,
        };
        let step = Step {
            value: Some(value),
            from: Path::new(self.from_tag.clone()),
            to: Path::new(self.to_tag.clone()),
        };
        let out = visit(&mut state, Node::new(from, to), step)?;
        Ok((out, state.set, state.report))
    }

    /// Translate a sub-value and merge its ledger and report into the
    /// caller's, re-rooted at the given prefixes
    pub fn translate_into<S: Shaped, D: Shaped>(
        &self,
        set: &mut TranslationSet,
        report: &mut Report,
        from_prefix: &[Component],
        from: &S,
        to_prefix: &[Component],
        to: &mut D,
    ) -> Result<()> {
        let (translations, translation_report) = self.translate(from, to)?;
        set.merge_prefixed2(from_prefix, to_prefix, &translations);
        // report contexts are on the source side
        let at = Path::with(self.from_tag.clone(), from_prefix.iter().cloned());
        report.merge(translation_report.prefixed(&at));
        Ok(())
    }
}

struct Step<'v> {
    value: Option<&'v J>,
    from: Path,
    to: Path,
}

struct Translating<'t, 'v, O> {
    translator: &'t Translator<O>,
    set: TranslationSet,
    report: Report,
    _values: PhantomData<&'v J>,
}

impl<'t, 'v, O: 'static> Translating<'t, 'v, O> {
    fn custom(&mut self, custom: &Custom<O>, node: Node<'_>, step: Step<'v>) -> Result<J> {
        tracing::trace!(
            from = %node.from,
            to = %node.to,
            path = %step.from,
            "Dispatching custom translator"
        );
        let value = match step.value {
            Some(v) => v.clone(),
            None => default_value(node.from),
        };
        let (out, set, report) = custom(self.translator, &value, &self.translator.options)?;
        self.set.merge(&set.prefix_paths(&step.from, &step.to));
        if !set.is_empty() {
            self.set.add(&step.from, &step.to);
        }
        self.report.merge(report.prefixed(&step.from));
        Ok(out)
    }
}

impl<'t, 'v, O: 'static> Visitor for Translating<'t, 'v, O> {
    type Input = Step<'v>;
    type Output = J;
    type Error = DefinitionError;

    fn intercept(&mut self, node: Node<'_>, step: Step<'v>) -> Intercept<Step<'v>, Result<J>> {
        let translator = self.translator;
        if let Some(custom) = translator.customs.get(&(node.from.id(), node.to.id())) {
            return Intercept::Handled(self.custom(custom, node, step));
        }
        if !translator.translatable(node.from, node.to) {
            return Intercept::Handled(Err(DefinitionError::NoTranslator {
                from: node.from.to_string(),
                to: node.to.to_string(),
            }));
        }
        Intercept::Continue(step)
    }

    fn primitive(&mut self, node: Node<'_>, step: Step<'v>) -> Result<J> {
        self.set.add(&step.from, &step.to);
        Ok(match step.value.filter(|v| !v.is_null()) {
            Some(v) => v.clone(),
            None => default_value(node.to),
        })
    }

    fn optional(&mut self, node: Node<'_>, step: Step<'v>) -> Result<J> {
        let Some(v) = step.value.filter(|v| !v.is_null()) else {
            return Ok(J::Null);
        };
        let out = visit(
            self,
            node.inner()?,
            Step {
                value: Some(v),
                from: step.from.clone(),
                to: step.to.clone(),
            },
        )?;
        // a present optional is set even when it wraps a default
        self.set.add(&step.from, &step.to);
        Ok(out)
    }

    fn sequence(&mut self, node: Node<'_>, step: Step<'v>) -> Result<J> {
        let items = step.value.and_then(J::as_array).map(Vec::as_slice).unwrap_or(&[]);
        if items.is_empty() {
            return Ok(J::Array(Vec::new()));
        }
        let inner = node.inner()?;
        let mut out = Vec::with_capacity(items.len());
        for (i, v) in items.iter().enumerate() {
            out.push(visit(
                self,
                inner,
                Step {
                    value: Some(v),
                    from: step.from.join(i),
                    to: step.to.join(i),
                },
            )?);
        }
        self.set.add(&step.from, &step.to);
        Ok(J::Array(out))
    }

    fn aggregate(&mut self, node: Node<'_>, step: Step<'v>) -> Result<J> {
        let (Some(from), Some(to)) = (node.from.as_record(), node.to.as_record()) else {
            return Err(node.incongruent());
        };
        let mut out = serde_json::Map::new();
        for field in from.fields().iter().filter(|f| !f.is_auto_skip()) {
            let target = to.field_by_identity(&field.identity()).ok_or_else(|| node.incongruent())?;
            let value = visit(
                self,
                Node::new(field.shape(), target.shape()),
                Step {
                    value: step.value.and_then(|v| v.get(field.wire())),
                    from: step.from.join(field.wire()),
                    to: step.to.join(target.wire()),
                },
            )?;
            out.insert(target.wire().to_string(), value);
        }
        for field in to.fields() {
            out.entry(field.wire().to_string())
                .or_insert_with(|| default_value(field.shape()));
        }
        if step.value.is_some_and(|v| is_set(node.from, v)) {
            self.set.add(&step.from, &step.to);
        }
        Ok(J::Object(out))
    }
}
