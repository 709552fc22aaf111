//! Internal-author classification.
//!
//! Actions written by the support team itself are not news to anyone and
//! are never announced. Portal authors often carry titles or team suffixes
//! ("Carlos Lima - Suporte N2"), so a roster entry matches when it is
//! contained in the author name. Matching is case-sensitive.

use serde::{Deserialize, Serialize};

/// Set of internal team member names, built once per run from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct InternalRoster {
    names: Vec<String>,
}

impl InternalRoster {
    /// Build a roster, dropping blank entries and duplicates.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let trimmed = name.as_ref().trim();
            if trimmed.is_empty() || out.iter().any(|existing| existing == trimmed) {
                continue;
            }
            out.push(trimmed.to_string());
        }
        Self { names: out }
    }

    /// Parse a comma-separated list, as found in environment variables.
    pub fn from_csv_list(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the author belongs to the internal team.
    pub fn contains_author(&self, author: Option<&str>) -> bool {
        is_internal(author, self)
    }
}

impl From<Vec<String>> for InternalRoster {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<InternalRoster> for Vec<String> {
    fn from(roster: InternalRoster) -> Self {
        roster.names
    }
}

/// Decide whether an action author is an internal team member.
///
/// A missing or blank author is never internal, so unattributed actions are
/// always announced.
pub fn is_internal(author: Option<&str>, roster: &InternalRoster) -> bool {
    let Some(author) = author.map(str::trim).filter(|a| !a.is_empty()) else {
        return false;
    };
    roster.names.iter().any(|name| author.contains(name.as_str()))
}
