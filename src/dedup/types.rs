//! Data model for the deduplication pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One input line: a choice type and the policies that justify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRecord {
    pub choice_type: String,
    pub policies: Vec<String>,
}

impl ChoiceRecord {
    pub fn new(choice_type: impl Into<String>, policies: Vec<String>) -> Self {
        Self {
            choice_type: choice_type.into(),
            policies,
        }
    }
}

/// One output line, produced per policy cluster of a canonical choice type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupOutputRecord {
    /// Representative of the synonym group.
    pub deduplicated_choice_type: String,
    /// Every choice type the representative stands for.
    pub choice_types: Vec<String>,
    /// Policy list chosen to represent the cluster (its first member).
    pub deduplicated_value: Vec<String>,
    /// All policy lists in the cluster, in cluster order.
    pub values: Vec<Vec<String>>,
}

/// A non-empty list of equivalent terms.
///
/// The representative is the last term, in the order the model returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynonymGroup {
    terms: Vec<String>,
}

impl SynonymGroup {
    /// Returns `None` for an empty list.
    pub fn new(terms: Vec<String>) -> Option<Self> {
        if terms.is_empty() {
            None
        } else {
            Some(Self { terms })
        }
    }

    pub fn singleton(term: impl Into<String>) -> Self {
        Self {
            terms: vec![term.into()],
        }
    }

    pub fn representative(&self) -> &str {
        // Non-empty by construction.
        self.terms.last().map(String::as_str).unwrap_or_default()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Insertion-ordered map from representative to synonym group.
///
/// Inserting a group whose representative is already present replaces the
/// old group in place.
#[derive(Debug, Clone, Default)]
pub struct DeduplicatedChoiceTypes {
    groups: Vec<SynonymGroup>,
    by_representative: HashMap<String, usize>,
    members: HashMap<String, usize>,
}

impl DeduplicatedChoiceTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: SynonymGroup) {
        let representative = group.representative().to_string();
        let slot = match self.by_representative.get(&representative) {
            Some(&slot) => {
                for term in self.groups[slot].terms() {
                    self.members.remove(term);
                }
                self.groups[slot] = group;
                slot
            }
            None => {
                self.groups.push(group);
                self.by_representative
                    .insert(representative, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        for term in self.groups[slot].terms() {
            self.members.insert(term.clone(), slot);
        }
    }

    /// Inserts a singleton group for every term not covered by any group.
    ///
    /// Returns the number of groups added.
    pub fn ensure_covered(&mut self, terms: &[String]) -> usize {
        let mut added = 0;
        for term in terms {
            if !self.members.contains_key(term) {
                self.insert(SynonymGroup::singleton(term.clone()));
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, representative: &str) -> Option<&SynonymGroup> {
        self.by_representative
            .get(representative)
            .map(|&slot| &self.groups[slot])
    }

    /// The group a term belongs to.
    pub fn group_of(&self, term: &str) -> Option<&SynonymGroup> {
        self.members.get(term).map(|&slot| &self.groups[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SynonymGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupSummary {
    pub records_in: usize,
    pub unique_choice_types: usize,
    pub density_clusters: usize,
    pub synonym_groups: usize,
    pub records_out: usize,
    pub policy_fallbacks: usize,
}
