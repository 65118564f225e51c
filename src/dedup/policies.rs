//! Clustering of the policy lists gathered under one canonical choice type.
//!
//! The model answers with index clusters. Its reply is untrusted: indices
//! are bounds- and duplicate-checked before use, and any failure falls back
//! to a single cluster holding every index.

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use super::prompts::{policy_clusters_schema, PolicyClustersReply, DEDUPLICATE_POLICIES_PROMPT};
use crate::error::{CacheError, LlmError};
use crate::llm::{CachedGenerator, PromptData};

/// Why a policy reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionViolation {
    #[error("negative index {0}")]
    Negative(i64),

    #[error("index {index} out of range for {n} policy lists")]
    OutOfRange { index: i64, n: usize },

    #[error("index {0} appears more than once")]
    Duplicate(usize),
}

/// Result of validating a policy reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionCheck {
    /// An exact partition of `0..n`.
    Valid(Vec<Vec<usize>>),
    Invalid(PartitionViolation),
}

/// Validates index clusters against `n` policy lists.
///
/// Negative, out-of-range and repeated indices make the reply invalid.
/// Empty clusters are dropped and indices the reply left out are appended
/// as singletons in ascending order.
pub fn check_policy_partition(n: usize, clusters: &[Vec<i64>]) -> PartitionCheck {
    let mut seen = vec![false; n];
    let mut partition: Vec<Vec<usize>> = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let mut members = Vec::with_capacity(cluster.len());
        for &raw in cluster {
            if raw < 0 {
                return PartitionCheck::Invalid(PartitionViolation::Negative(raw));
            }
            let index = match usize::try_from(raw) {
                Ok(index) if index < n => index,
                _ => return PartitionCheck::Invalid(PartitionViolation::OutOfRange { index: raw, n }),
            };
            if seen[index] {
                return PartitionCheck::Invalid(PartitionViolation::Duplicate(index));
            }
            seen[index] = true;
            members.push(index);
        }
        if !members.is_empty() {
            partition.push(members);
        }
    }

    partition.extend((0..n).filter(|&i| !seen[i]).map(|i| vec![i]));
    PartitionCheck::Valid(partition)
}

/// One cluster holding every index.
pub fn fallback_partition(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        Vec::new()
    } else {
        vec![(0..n).collect()]
    }
}

/// Index clusters for one choice type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyClustering {
    pub clusters: Vec<Vec<usize>>,
    /// True when the model failed and [`fallback_partition`] was used.
    pub fell_back: bool,
}

/// Asks the model which policy lists share a source of meaning.
#[derive(Debug, Clone)]
pub struct PolicyDeduplicator {
    generator: Arc<CachedGenerator>,
}

impl PolicyDeduplicator {
    pub fn new(generator: Arc<CachedGenerator>) -> Self {
        Self { generator }
    }

    /// Clusters `policies` by index.
    ///
    /// Never fails on provider or reply errors; those fall back to a single
    /// cluster. A corrupt cache entry is still fatal.
    pub async fn cluster(
        &self,
        choice_type: &str,
        policies: &[Vec<String>],
    ) -> Result<PolicyClustering, CacheError> {
        let n = policies.len();
        if n <= 1 {
            if n == 1 {
                tracing::debug!(choice_type, "Single policy list, skipping model");
            }
            return Ok(PolicyClustering {
                clusters: fallback_partition(n),
                fell_back: false,
            });
        }

        let data = PromptData::new()
            .with("choiceType", json!(choice_type))
            .with("listOfPolicies", json!(policies));

        let reply = self
            .generator
            .generate_object::<PolicyClustersReply>(
                DEDUPLICATE_POLICIES_PROMPT,
                &data,
                &policy_clusters_schema(n),
            )
            .await;

        let fallback = |reason: String| {
            tracing::warn!(
                choice_type,
                policy_lists = n,
                reason = %reason,
                "Policy deduplication failed, merging all policy lists"
            );
            PolicyClustering {
                clusters: fallback_partition(n),
                fell_back: true,
            }
        };

        match reply {
            Ok(reply) => match check_policy_partition(n, &reply.policy_clusters) {
                PartitionCheck::Valid(clusters) => {
                    tracing::debug!(choice_type, clusters = clusters.len(), "Clustered policies");
                    Ok(PolicyClustering {
                        clusters,
                        fell_back: false,
                    })
                }
                PartitionCheck::Invalid(violation) => Ok(fallback(violation.to_string())),
            },
            Err(LlmError::Cache(e)) => Err(e),
            Err(e) => Ok(fallback(e.to_string())),
        }
    }
}
