use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::services::labels::normalize_label;

/// Deduplicated set of normalized ingredient names
///
/// Every member has gone through [`normalize_label`], so two entries never
/// differ only by case, surrounding whitespace, underscores or a trailing
/// ` -local name-` suffix. Iteration is lexicographic but callers should not
/// depend on any particular order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IngredientSet(BTreeSet<String>);

impl IngredientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `label` and inserts it. Returns false for labels that
    /// normalize to nothing or are already present.
    pub fn insert(&mut self, label: &str) -> bool {
        match normalize_label(label) {
            Some(name) => self.0.insert(name),
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma-separated list as expected by the recipe search endpoint
    pub fn to_query(&self) -> String {
        self.iter().collect::<Vec<_>>().join(",")
    }
}

impl<S: AsRef<str>> FromIterator<S> for IngredientSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for label in iter {
            set.insert(label.as_ref());
        }
        set
    }
}

impl<'de> Deserialize<'de> for IngredientSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let labels = Vec::<String>::deserialize(deserializer)?;
        Ok(labels.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a IngredientSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
