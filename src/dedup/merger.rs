//! Model-mediated merge of a density cluster into synonym groups.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::prompts::{synonym_groups_schema, SynonymGroupsReply, MERGE_CHOICE_TYPES_PROMPT};
use super::types::SynonymGroup;
use crate::error::LlmError;
use crate::llm::{CachedGenerator, PromptData};

/// What [`repair_synonym_groups`] had to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Terms the model returned that are not in the cluster.
    pub unknown: usize,
    /// Repeats of a term already placed in an earlier position.
    pub duplicates: usize,
    /// Groups left empty after filtering.
    pub empty_groups: usize,
    /// Cluster terms the model left out, appended as singletons.
    pub missing: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Turns a model reply into an exact partition of `cluster`.
///
/// Unknown terms and repeats are dropped, empty groups removed, and every
/// cluster term left out is appended as its own group in cluster order.
pub fn repair_synonym_groups(
    cluster: &[String],
    groups: Vec<Vec<String>>,
) -> (Vec<SynonymGroup>, RepairReport) {
    let allowed: HashSet<&str> = cluster.iter().map(String::as_str).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut report = RepairReport::default();
    let mut repaired = Vec::with_capacity(groups.len());

    for group in groups {
        let mut kept = Vec::with_capacity(group.len());
        for term in group {
            if !allowed.contains(term.as_str()) {
                report.unknown += 1;
            } else if !placed.insert(term.clone()) {
                report.duplicates += 1;
            } else {
                kept.push(term);
            }
        }
        match SynonymGroup::new(kept) {
            Some(group) => repaired.push(group),
            None => report.empty_groups += 1,
        }
    }

    for term in cluster {
        if placed.insert(term.clone()) {
            report.missing += 1;
            repaired.push(SynonymGroup::singleton(term.clone()));
        }
    }

    (repaired, report)
}

/// Asks the model which terms of a cluster are synonyms.
#[derive(Debug, Clone)]
pub struct SemanticMerger {
    generator: Arc<CachedGenerator>,
}

impl SemanticMerger {
    pub fn new(generator: Arc<CachedGenerator>) -> Self {
        Self { generator }
    }

    /// Splits one density cluster into synonym groups.
    ///
    /// The result always covers every cluster term exactly once. Clusters
    /// of fewer than two terms never reach the model.
    ///
    /// # Errors
    ///
    /// Provider and reply-shape errors propagate.
    pub async fn merge(&self, cluster: &[String]) -> Result<Vec<SynonymGroup>, LlmError> {
        if cluster.len() < 2 {
            return Ok(cluster.iter().cloned().map(SynonymGroup::singleton).collect());
        }

        let data = PromptData::new().with("terms", json!(cluster));
        let reply: SynonymGroupsReply = self
            .generator
            .generate_object(MERGE_CHOICE_TYPES_PROMPT, &data, &synonym_groups_schema())
            .await?;

        let (groups, report) = repair_synonym_groups(cluster, reply.synonym_groups);
        if !report.is_clean() {
            tracing::warn!(
                cluster_size = cluster.len(),
                unknown = report.unknown,
                duplicates = report.duplicates,
                empty_groups = report.empty_groups,
                missing = report.missing,
                "Repaired synonym groups returned by model"
            );
        }
        tracing::debug!(
            cluster_size = cluster.len(),
            groups = groups.len(),
            "Merged density cluster"
        );
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn group_terms(groups: &[SynonymGroup]) -> Vec<Vec<String>> {
        groups.iter().map(|g| g.terms().to_vec()).collect()
    }

    /// Mock LLM provider that replies with a fixed body.
    struct MockLlmProvider {
        reply: String,
        calls: AtomicUsize,
    }

    impl MockLlmProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reply.is_empty() {
                return Err(LlmError::RateLimited("slow down".to_string()));
            }
            Ok(GenerationResponse {
                id: "mock".to_string(),
                model: "mock".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.reply.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    fn merger(provider: Arc<MockLlmProvider>) -> SemanticMerger {
        let generator =
            CachedGenerator::new(provider, Arc::new(MemoryCacheStore::new()), "mock", 0.0);
        SemanticMerger::new(Arc::new(generator))
    }

    #[test]
    fn test_repair_clean_reply_untouched() {
        let cluster = terms(&["a", "b", "c"]);
        let (groups, report) =
            repair_synonym_groups(&cluster, vec![terms(&["c", "a"]), terms(&["b"])]);
        assert!(report.is_clean());
        assert_eq!(group_terms(&groups), vec![terms(&["c", "a"]), terms(&["b"])]);
        assert_eq!(groups[0].representative(), "a");
    }

    #[test]
    fn test_repair_appends_missing_as_singletons() {
        let cluster = terms(&["a", "b", "c", "d"]);
        let (groups, report) = repair_synonym_groups(&cluster, vec![terms(&["b", "a"])]);
        assert_eq!(report.missing, 2);
        assert_eq!(
            group_terms(&groups),
            vec![terms(&["b", "a"]), terms(&["c"]), terms(&["d"])]
        );
    }

    #[test]
    fn test_repair_drops_unknown_duplicate_and_empty() {
        let cluster = terms(&["a", "b"]);
        let (groups, report) = repair_synonym_groups(
            &cluster,
            vec![terms(&["a", "invented"]), terms(&["a", "b"]), terms(&["ghost"]), vec![]],
        );
        assert_eq!(
            report,
            RepairReport {
                unknown: 2,
                duplicates: 1,
                empty_groups: 2,
                missing: 0
            }
        );
        assert_eq!(group_terms(&groups), vec![terms(&["a"]), terms(&["b"])]);
    }

    #[tokio::test]
    async fn test_merge_uses_model_groups() {
        let provider = Arc::new(MockLlmProvider::new(
            r#"{"synonymGroups": [["a great present", "a thoughtful gift"]]}"#,
        ));
        let groups = merger(provider.clone())
            .merge(&terms(&["a thoughtful gift", "a great present"]))
            .await
            .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].representative(), "a thoughtful gift");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_merge_repairs_incomplete_reply() {
        let provider = Arc::new(MockLlmProvider::new(r#"{"synonymGroups": [["x"]]}"#));
        let groups = merger(provider)
            .merge(&terms(&["x", "y", "z"]))
            .await
            .unwrap();
        assert_eq!(
            group_terms(&groups),
            vec![terms(&["x"]), terms(&["y"]), terms(&["z"])]
        );
    }

    #[tokio::test]
    async fn test_single_term_cluster_skips_model() {
        let provider = Arc::new(MockLlmProvider::new("unused"));
        let groups = merger(provider.clone()).merge(&terms(&["alone"])).await.unwrap();
        assert_eq!(group_terms(&groups), vec![terms(&["alone"])]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(MockLlmProvider::new(""));
        let err = merger(provider).merge(&terms(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited(_)));
    }
}
