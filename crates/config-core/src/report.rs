// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path-tagged diagnostics accumulated while transforming documents

use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Error,
    Warn,
    Info,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Error => write!(f, "error"),
            Kind::Warn => write!(f, "warning"),
            Kind::Info => write!(f, "info"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub kind: Kind,
    pub message: String,
    pub context: Path,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.context, self.message)
    }
}

/// Ordered list of diagnostics; merging never short-circuits
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub entries: Vec<Entry>,
}

impl Report {
    pub fn add(&mut self, kind: Kind, context: Path, message: impl Into<String>) {
        self.entries.push(Entry {
            kind,
            message: message.into(),
            context,
        });
    }

    pub fn add_error(&mut self, context: Path, message: impl Into<String>) {
        self.add(Kind::Error, context, message);
    }

    pub fn add_warn(&mut self, context: Path, message: impl Into<String>) {
        self.add(Kind::Warn, context, message);
    }

    pub fn add_info(&mut self, context: Path, message: impl Into<String>) {
        self.add(Kind::Info, context, message);
    }

    /// Record `result`'s error, if any, as an error entry
    pub fn add_on_error<E: fmt::Display>(&mut self, context: Path, result: Result<(), E>) {
        if let Err(e) = result {
            self.add_error(context, e.to_string());
        }
    }

    pub fn merge(&mut self, other: Report) {
        self.entries.extend(other.entries);
    }

    /// Copy with every context re-rooted under `prefix` (tag taken from `prefix`)
    pub fn prefixed(&self, prefix: &Path) -> Report {
        Report {
            entries: self
                .entries
                .iter()
                .map(|e| Entry {
                    kind: e.kind,
                    message: e.message.clone(),
                    context: prefix.append(e.context.components()),
                })
                .collect(),
        }
    }

    /// Copy with warnings escalated to errors
    pub fn strict(&self) -> Report {
        Report {
            entries: self
                .entries
                .iter()
                .map(|e| Entry {
                    kind: if e.kind == Kind::Warn { Kind::Error } else { e.kind },
                    ..e.clone()
                })
                .collect(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.entries.iter().any(|e| e.kind == Kind::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_reroots_contexts() {
        let mut r = Report::default();
        r.add_error(Path::with("yaml", ["inline"]), "too many sources");
        let prefixed = r.prefixed(&Path::with("yaml", ["storage", "files"]).join(2usize));
        assert_eq!(prefixed.entries[0].context.to_string(), "$.storage.files.2.inline");
        assert_eq!(prefixed.entries[0].message, "too many sources");
    }

    #[test]
    fn test_fatal_and_strict() {
        let mut r = Report::default();
        r.add_warn(Path::new("json"), "deprecated");
        r.add_info(Path::new("json"), "fyi");
        assert!(!r.is_fatal());
        assert!(r.strict().is_fatal());
        assert_eq!(r.strict().entries[1].kind, Kind::Info);
    }

    #[test]
    fn test_add_on_error() {
        let mut r = Report::default();
        r.add_on_error::<String>(Path::new("json"), Ok(()));
        assert!(r.is_empty());
        r.add_on_error(Path::new("json"), Err("bad device"));
        assert_eq!(r.to_string(), "error at $: bad device\n");
    }
}
