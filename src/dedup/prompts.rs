//! Prompts and reply shapes for the two model-mediated stages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::StructuredOutput;

/// System prompt for merging a density cluster into synonym groups.
pub const MERGE_CHOICE_TYPES_PROMPT: &str = r#"You are given a list of short labels. Each label describes a kind of choice a person can face.

## TASK

Partition the labels into synonym groups. Two labels belong in the same group only if they describe the same kind of choice, so that either label could replace the other without changing what is being decided. Labels that merely relate to each other, or where one is a special case of the other, belong in different groups.

## RULES

1. Every label in the input must appear in exactly one group.
2. Copy labels exactly as written. Do not rephrase, correct or invent labels.
3. A label without synonyms forms a group on its own.
4. Inside each group, put the label that best names the whole group LAST."#;

/// System prompt for clustering the policy lists of one choice type.
pub const DEDUPLICATE_POLICIES_PROMPT: &str = r#"You are given a choice type and a numbered list of policies. Each entry in the list is itself a list of statements describing what a wise person pays attention to when facing that kind of choice. Entries are numbered from 0 in the order they are listed.

## TASK

Cluster the entries that express a shared source of meaning: entries whose statements, taken together, describe the same underlying thing someone cares about, even if worded differently. Entries that attend to different things belong in different clusters.

## RULES

1. Refer to entries only by their 0-based index.
2. Every index must appear in exactly one cluster.
3. An entry with no duplicate forms a cluster on its own."#;

/// Reply of the merge stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymGroupsReply {
    #[serde(rename = "synonymGroups")]
    pub synonym_groups: Vec<Vec<String>>,
}

impl StructuredOutput for SynonymGroupsReply {
    const NAME: &'static str = "synonym_groups";
}

/// Reply of the policy stage.
///
/// Indices are signed so negative values survive parsing and can be
/// rejected by [`check_policy_partition`](super::policies::check_policy_partition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyClustersReply {
    #[serde(rename = "policyClusters")]
    pub policy_clusters: Vec<Vec<i64>>,
}

impl StructuredOutput for PolicyClustersReply {
    const NAME: &'static str = "policy_clusters";
}

pub fn synonym_groups_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "synonymGroups": {
                "type": "array",
                "description": "A list of synonym groups, where each term in the group is a synonym of every other term. Combined, the terms in all the groups should contain all terms that were provided.",
                "items": {
                    "type": "array",
                    "items": {"type": "string"}
                }
            }
        },
        "required": ["synonymGroups"],
        "additionalProperties": false
    })
}

/// Schema for `n` policy lists; indices are bounded to `0..=n-1`.
pub fn policy_clusters_schema(n: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "policyClusters": {
                "type": "array",
                "description": "A list of policy clusters, where each cluster is a list of indices referring to similar policies in the original listOfPolicies that all describe a shared source of meaning.",
                "items": {
                    "type": "array",
                    "items": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": n.saturating_sub(1)
                    }
                }
            }
        },
        "required": ["policyClusters"],
        "additionalProperties": false
    })
}
