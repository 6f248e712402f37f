// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Ordered ledger produced by a merge

use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document space of the parent config in a merge
pub const TAG_PARENT: &str = "source-A";
/// Document space of the child config in a merge
pub const TAG_CHILD: &str = "source-B";
/// Document space of the merged config
pub const TAG_RESULT: &str = "result";

/// The value at `from` contributed to the value at `to`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub from: Path,
    pub to: Path,
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} → {}:{}", self.from.tag(), self.from, self.to.tag(), self.to)
    }
}

/// Mappings in the order the merge produced them; destinations may repeat
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub mappings: Vec<Mapping>,
}

impl Transcript {
    pub fn push(&mut self, from: &Path, to: &Path) {
        self.mappings.push(Mapping {
            from: from.clone(),
            to: to.clone(),
        });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Mapping;
    type IntoIter = std::slice::Iter<'a, Mapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.mappings {
            writeln!(f, "{m}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut t = Transcript::default();
        t.push(&Path::with(TAG_PARENT, ["storage"]), &Path::with(TAG_RESULT, ["storage"]));
        t.push(&Path::with(TAG_CHILD, ["storage"]), &Path::with(TAG_RESULT, ["storage"]));
        assert_eq!(
            t.to_string(),
            "source-A:$.storage → result:$.storage\nsource-B:$.storage → result:$.storage\n"
        );
        assert_eq!(t.len(), 2);
    }
}
