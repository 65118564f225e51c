//! Choice-type and policy deduplication.
//!
//! Choice types are embedded and grouped by density first, then each
//! density cluster is split by the model into synonym groups. The policy
//! lists of every synonym group are clustered by the model in a second
//! pass, and each policy cluster becomes one output record.
//!
//! Model replies are treated as untrusted: synonym groups are repaired to
//! cover their cluster exactly, and policy index clusters are checked
//! before use, falling back to a single cluster when they are unusable.
//!
//! ```ignore
//! use dedup_forge::dedup::{DedupConfig, DedupPipeline};
//!
//! let config = DedupConfig::from_env()?;
//! let pipeline = DedupPipeline::new(&config, llm, embeddings, cache);
//! let summary = pipeline.run(Path::new("input.jsonl"), None, &output).await?;
//! ```

pub mod cluster;
pub mod config;
pub mod io;
pub mod merger;
pub mod pipeline;
pub mod policies;
pub mod prompts;
pub mod types;

pub use cluster::{
    cosine_distance, pairwise_cosine_distance, Dbscan, DbscanOutcome, DensityClusterer,
    NoiseStrategy,
};
pub use config::DedupConfig;
pub use io::{default_output_path, read_records, JsonlWriter};
pub use merger::{repair_synonym_groups, RepairReport, SemanticMerger};
pub use pipeline::{unique_choice_types, DedupPipeline, GroupOutput};
pub use policies::{
    check_policy_partition, fallback_partition, PartitionCheck, PartitionViolation,
    PolicyClustering, PolicyDeduplicator,
};
pub use prompts::{PolicyClustersReply, SynonymGroupsReply};
pub use types::{
    ChoiceRecord, DedupOutputRecord, DedupSummary, DeduplicatedChoiceTypes, SynonymGroup,
};
