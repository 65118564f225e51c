//! Orchestration of the full deduplication run.
//!
//! ```text
//! records -> unique choice types -> embeddings -> density clusters
//!         -> synonym groups -> per-group policy clusters -> output lines
//! ```

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::cluster::DensityClusterer;
use super::config::DedupConfig;
use super::io::{read_records, JsonlWriter};
use super::merger::SemanticMerger;
use super::policies::PolicyDeduplicator;
use super::types::{
    ChoiceRecord, DedupOutputRecord, DedupSummary, DeduplicatedChoiceTypes, SynonymGroup,
};
use crate::cache::CacheStore;
use crate::embeddings::{CachedEmbedder, EmbeddingProvider};
use crate::error::DedupResult;
use crate::llm::{AdapterStats, CachedGenerator, LlmProvider};

/// Choice types in first-seen order, without repeats.
pub fn unique_choice_types(records: &[ChoiceRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.choice_type.as_str()))
        .map(|r| r.choice_type.clone())
        .collect()
}

/// Output lines for one synonym group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutput {
    pub records: Vec<DedupOutputRecord>,
    /// The policy stage fell back to a single cluster.
    pub fell_back: bool,
}

/// Drives embedding, clustering, merging and policy deduplication.
#[derive(Debug)]
pub struct DedupPipeline {
    embedder: CachedEmbedder,
    generator: Arc<CachedGenerator>,
    clusterer: DensityClusterer,
    merger: SemanticMerger,
    policies: PolicyDeduplicator,
    concurrency: usize,
}

impl DedupPipeline {
    /// Wires both providers to one shared cache.
    pub fn new(
        config: &DedupConfig,
        llm: Arc<dyn LlmProvider>,
        embeddings: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let generator = Arc::new(
            CachedGenerator::new(llm, cache.clone(), config.model.clone(), config.temperature)
                .with_max_tokens(config.max_tokens),
        );

        Self {
            embedder: CachedEmbedder::new(embeddings, cache),
            merger: SemanticMerger::new(generator.clone()),
            policies: PolicyDeduplicator::new(generator.clone()),
            generator,
            clusterer: DensityClusterer::new(
                config.epsilon,
                config.min_points,
                config.noise_strategy,
            ),
            concurrency: config.concurrency.max(1),
        }
    }

    pub fn generation_stats(&self) -> AdapterStats {
        self.generator.stats()
    }

    pub fn embedding_stats(&self) -> AdapterStats {
        self.embedder.stats()
    }

    /// Embeds the vocabulary in one batch and clusters it by density.
    pub async fn cluster_choice_types(&self, unique: &[String]) -> DedupResult<Vec<Vec<String>>> {
        let embeddings = self.embedder.embed(unique).await?;
        self.clusterer.cluster(unique, &embeddings)
    }

    /// Merges every density cluster into synonym groups.
    ///
    /// Any term of `unique` that no group covers afterwards is added as a
    /// singleton group.
    pub async fn merge_clusters(
        &self,
        clusters: &[Vec<String>],
        unique: &[String],
    ) -> DedupResult<DeduplicatedChoiceTypes> {
        let total = clusters.len();
        let merged: Vec<Vec<SynonymGroup>> = stream::iter(clusters.iter().enumerate())
            .map(|(index, cluster)| async move {
                tracing::info!(
                    cluster = index + 1,
                    total,
                    size = cluster.len(),
                    "Merging density cluster"
                );
                self.merger.merge(cluster).await
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut choice_types = DeduplicatedChoiceTypes::new();
        for group in merged.into_iter().flatten() {
            choice_types.insert(group);
        }

        let added = choice_types.ensure_covered(unique);
        if added > 0 {
            tracing::warn!(added, "Choice types missing from every synonym group");
        }
        Ok(choice_types)
    }

    /// Collapses the choice types of `records` into synonym groups.
    pub async fn deduplicate_choice_types(
        &self,
        records: &[ChoiceRecord],
    ) -> DedupResult<DeduplicatedChoiceTypes> {
        let unique = unique_choice_types(records);
        let clusters = self.cluster_choice_types(&unique).await?;
        self.merge_clusters(&clusters, &unique).await
    }

    /// Clusters the policies of every record in `group` and builds one
    /// output record per policy cluster.
    pub async fn deduplicate_policies(
        &self,
        group: &SynonymGroup,
        records: &[ChoiceRecord],
    ) -> DedupResult<GroupOutput> {
        let members: HashSet<&str> = group.terms().iter().map(String::as_str).collect();
        let policies: Vec<Vec<String>> = records
            .iter()
            .filter(|r| members.contains(r.choice_type.as_str()))
            .map(|r| r.policies.clone())
            .collect();

        let clustering = self
            .policies
            .cluster(group.representative(), &policies)
            .await?;

        let records = clustering
            .clusters
            .iter()
            .map(|cluster| DedupOutputRecord {
                deduplicated_choice_type: group.representative().to_string(),
                choice_types: group.terms().to_vec(),
                deduplicated_value: cluster
                    .first()
                    .map(|&i| policies[i].clone())
                    .unwrap_or_default(),
                values: cluster.iter().map(|&i| policies[i].clone()).collect(),
            })
            .collect();

        Ok(GroupOutput {
            records,
            fell_back: clustering.fell_back,
        })
    }

    /// Deduplicates `records` and streams the result to `output`.
    ///
    /// The file is flushed after every synonym group, so an aborted run
    /// keeps all groups finished before the failure.
    pub async fn deduplicate_to(
        &self,
        records: &[ChoiceRecord],
        output: &Path,
    ) -> DedupResult<DedupSummary> {
        let mut summary = DedupSummary {
            records_in: records.len(),
            ..DedupSummary::default()
        };

        let unique = unique_choice_types(records);
        summary.unique_choice_types = unique.len();

        let clusters = self.cluster_choice_types(&unique).await?;
        summary.density_clusters = clusters.len();

        let choice_types = self.merge_clusters(&clusters, &unique).await?;
        summary.synonym_groups = choice_types.len();
        tracing::info!(
            before = unique.len(),
            after = choice_types.len(),
            "Deduplicated choice types"
        );

        let mut writer = JsonlWriter::create(output).await?;
        let total = choice_types.len();
        let mut outputs = stream::iter(choice_types.iter().enumerate())
            .map(|(index, group)| async move {
                tracing::info!(
                    group = index + 1,
                    total,
                    representative = group.representative(),
                    "Deduplicating policies"
                );
                self.deduplicate_policies(group, records).await
            })
            .buffered(self.concurrency);

        while let Some(result) = outputs.next().await {
            let group_output = result?;
            for record in &group_output.records {
                writer.write(record).await?;
            }
            writer.flush().await?;
            summary.records_out += group_output.records.len();
            if group_output.fell_back {
                summary.policy_fallbacks += 1;
            }
        }

        tracing::info!(
            before = summary.records_in,
            after = summary.records_out,
            fallbacks = summary.policy_fallbacks,
            path = %writer.path().display(),
            "Deduplication results written"
        );
        let generation = self.generation_stats();
        let embedding = self.embedding_stats();
        tracing::info!(
            generation_hits = generation.hits,
            generation_misses = generation.misses,
            embedding_hits = embedding.hits,
            embedding_misses = embedding.misses,
            "Cache usage"
        );

        Ok(summary)
    }

    /// Reads `input` (keeping at most `limit` records) and writes the
    /// deduplicated records to `output`.
    pub async fn run(
        &self,
        input: &Path,
        limit: Option<usize>,
        output: &Path,
    ) -> DedupResult<DedupSummary> {
        let records = read_records(input, limit).await?;
        self.deduplicate_to(&records, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::error::{EmbeddingError, LlmError};
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, Message, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock embedding provider: every text maps onto the same direction.
    struct MockEmbeddingProvider;

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn model(&self) -> &str {
            "mock-embed"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    /// Mock LLM provider replying with one body to every request.
    struct MockLlmProvider {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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

    fn pipeline(reply: &str) -> (DedupPipeline, Arc<MockLlmProvider>) {
        let llm = Arc::new(MockLlmProvider {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        });
        let pipeline = DedupPipeline::new(
            &DedupConfig::default().with_min_points(2),
            llm.clone(),
            Arc::new(MockEmbeddingProvider),
            Arc::new(MemoryCacheStore::new()),
        );
        (pipeline, llm)
    }

    fn record(choice_type: &str, policies: &[&str]) -> ChoiceRecord {
        ChoiceRecord::new(choice_type, policies.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_unique_choice_types_first_seen_order() {
        let records = vec![record("b", &[]), record("a", &[]), record("b", &[]), record("c", &[])];
        assert_eq!(unique_choice_types(&records), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_deduplicate_policies_builds_records() {
        let (pipeline, _) = pipeline(r#"{"policyClusters": [[1, 0]]}"#);
        let group = SynonymGroup::new(vec!["x".to_string(), "y".to_string()]).unwrap();
        let records = vec![
            record("x", &["p0"]),
            record("other", &["unrelated"]),
            record("y", &["p1", "p1b"]),
            record("x", &["p2"]),
        ];

        let output = pipeline.deduplicate_policies(&group, &records).await.unwrap();
        assert!(!output.fell_back);
        assert_eq!(output.records.len(), 2);

        let first = &output.records[0];
        assert_eq!(first.deduplicated_choice_type, "y");
        assert_eq!(first.choice_types, vec!["x", "y"]);
        assert_eq!(first.deduplicated_value, vec!["p1", "p1b"]);
        assert_eq!(
            first.values,
            vec![vec!["p1".to_string(), "p1b".to_string()], vec!["p0".to_string()]]
        );
        assert_eq!(output.records[1].values, vec![vec!["p2".to_string()]]);
    }

    #[tokio::test]
    async fn test_merge_clusters_covers_unclaimed_terms() {
        let (pipeline, llm) = pipeline(r#"{"synonymGroups": [["a", "b"]]}"#);
        let unique = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let clusters = vec![vec!["a".to_string(), "b".to_string()]];

        let groups = pipeline.merge_clusters(&clusters, &unique).await.unwrap();
        let reps: Vec<&str> = groups.iter().map(|g| g.representative()).collect();
        assert_eq!(reps, vec!["b", "c"]);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_merge_clusters_concurrent_keeps_order() {
        let llm = Arc::new(MockLlmProvider {
            reply: r#"{"synonymGroups": []}"#.to_string(),
            calls: AtomicUsize::new(0),
        });
        let pipeline = DedupPipeline::new(
            &DedupConfig::default().with_concurrency(4),
            llm,
            Arc::new(MockEmbeddingProvider),
            Arc::new(MemoryCacheStore::new()),
        );
        let clusters: Vec<Vec<String>> = (0..6)
            .map(|i| vec![format!("t{}a", i), format!("t{}b", i)])
            .collect();
        let unique: Vec<String> = clusters.iter().flatten().cloned().collect();

        let groups = pipeline.merge_clusters(&clusters, &unique).await.unwrap();
        let reps: Vec<&str> = groups.iter().map(|g| g.representative()).collect();
        assert_eq!(reps, unique.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
