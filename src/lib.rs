//! Lookalike: customer profiling, lookalike ranking and segmentation
//!
//! Transaction records are turned into fixed-width behavioral profiles, which
//! are standardized and then either ranked by cosine similarity against a
//! query customer or partitioned with K-Means and scored with the
//! Davies-Bouldin index.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod normalize;
pub mod records;
pub mod report;
pub mod segment;
pub mod similarity;

// Re-export public items for easier access
pub use cli::Args;
pub use config::AnalysisConfig;
pub use data::load_records;
pub use error::{AnalysisError, AnalysisResult};
pub use features::{build_profiles, CustomerProfiles, ProfileSchema};
pub use normalize::{normalize, NormalizedMatrix, StandardScaler, ZeroVariancePolicy};
pub use records::{Customer, Product, RecordSet, Transaction};
pub use segment::{
    davies_bouldin, segment, summarize_clusters, ClusterAssignment, KMeansParams, SeedPolicy,
};
pub use similarity::{cosine_similarity, rank_many, rank_similar, SimilarityResult};

/// Result type of the I/O and command-line layers
pub type Result<T> = anyhow::Result<T>;
