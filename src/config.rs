//! Analysis configuration loaded from an optional TOML file

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::ZeroVariancePolicy;
use crate::segment::{KMeansParams, SeedPolicy};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub lookalikes: LookalikeConfig,
    pub segmentation: SegmentationConfig,
    pub normalization: NormalizationConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LookalikeConfig {
    /// Neighbors reported per queried customer
    pub top_k: usize,
}

impl Default for LookalikeConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationConfig {
    pub n_clusters: usize,
    pub max_iterations: usize,
    pub seed: SeedPolicy,
    /// Extra seeded trials; the lowest-inertia partition wins
    pub trials: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            max_iterations: 300,
            seed: SeedPolicy::default(),
            trials: 1,
        }
    }
}

impl SegmentationConfig {
    pub fn params(&self) -> KMeansParams {
        KMeansParams::new(self.n_clusters)
            .with_max_iterations(self.max_iterations)
            .with_seed(self.seed)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizationConfig {
    pub zero_variance: ZeroVariancePolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl AnalysisConfig {
    /// Defaults, or the contents of `path` when given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookalikes.top_k == 0 {
            return Err(ConfigError::Validation("lookalikes.top_k must be positive".into()));
        }
        if self.segmentation.n_clusters < 2 {
            return Err(ConfigError::Validation(
                "segmentation.n_clusters must be at least 2".into(),
            ));
        }
        if self.segmentation.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "segmentation.max_iterations must be positive".into(),
            ));
        }
        if self.segmentation.trials == 0 {
            return Err(ConfigError::Validation("segmentation.trials must be positive".into()));
        }
        Ok(())
    }
}
