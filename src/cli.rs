//! Command-line interface definitions and argument parsing

use std::ops::RangeInclusive;
use std::path::PathBuf;

use clap::Parser;

use crate::config::AnalysisConfig;
use crate::segment::SeedPolicy;

/// Customer lookalike ranking and segmentation from transaction data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the customers CSV file
    #[arg(long, default_value = "Customers.csv")]
    pub customers: PathBuf,

    /// Path to the products CSV file
    #[arg(long, default_value = "Products.csv")]
    pub products: PathBuf,

    /// Path to the transactions CSV file
    #[arg(long, default_value = "Transactions.csv")]
    pub transactions: PathBuf,

    /// Optional TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long)]
    pub max_iters: Option<usize>,

    /// Centroid initialization seed: a number, or "random"
    #[arg(long)]
    pub seed: Option<String>,

    /// Number of lookalikes per queried customer
    #[arg(long)]
    pub top: Option<usize>,

    /// Customers to find lookalikes for: comma-separated ids or a range
    /// Example: --query "C0001..C0020" or --query "C0001,C0007"
    #[arg(short, long)]
    pub query: Option<String>,

    /// Output path for the lookalike table
    #[arg(long, default_value = "lookalikes.csv")]
    pub lookalike_out: PathBuf,

    /// Output path for the clustered profile table
    #[arg(long, default_value = "segments.csv")]
    pub segments_out: PathBuf,

    /// Evaluate a range of cluster counts, e.g. "2..10"
    #[arg(long)]
    pub sweep: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Load the configuration file (if any) and apply command-line overrides
    pub fn resolve_config(&self) -> crate::Result<AnalysisConfig> {
        let mut config = AnalysisConfig::load(self.config.as_deref())?;

        if let Some(clusters) = self.clusters {
            config.segmentation.n_clusters = clusters;
        }
        if let Some(max_iters) = self.max_iters {
            config.segmentation.max_iterations = max_iters;
        }
        if let Some(seed) = &self.seed {
            config.segmentation.seed = parse_seed(seed)?;
        }
        if let Some(top) = self.top {
            config.lookalikes.top_k = top;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse the query list; `None` when no query was given
    pub fn parse_queries(&self) -> crate::Result<Option<Vec<String>>> {
        self.query.as_deref().map(parse_id_list).transpose()
    }

    pub fn parse_sweep(&self) -> crate::Result<Option<RangeInclusive<usize>>> {
        let Some(sweep) = &self.sweep else {
            return Ok(None);
        };

        let (start, end) = sweep
            .split_once("..")
            .ok_or_else(|| anyhow::anyhow!("Sweep must be in format 'min..max'"))?;
        let start: usize = start
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid sweep start: {}", start))?;
        let end: usize = end
            .trim()
            .trim_start_matches('=')
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid sweep end: {}", end))?;
        if start < 2 || end < start {
            anyhow::bail!("Sweep range must satisfy 2 <= min <= max");
        }
        Ok(Some(start..=end))
    }
}

pub fn parse_seed(value: &str) -> crate::Result<SeedPolicy> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("random") {
        return Ok(SeedPolicy::Random);
    }
    value
        .parse()
        .map(SeedPolicy::Fixed)
        .map_err(|_| anyhow::anyhow!("Invalid seed value: {}", value))
}

/// Expand "C0001,C0005" or "C0001..C0020" into customer identities.
///
/// A range keeps the shared prefix and the zero padding of its start.
pub fn parse_id_list(value: &str) -> crate::Result<Vec<String>> {
    let mut ids = Vec::new();

    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once("..") {
            Some((start, end)) => ids.extend(expand_range(start.trim(), end.trim())?),
            None => ids.push(part.to_string()),
        }
    }

    if ids.is_empty() {
        anyhow::bail!("Query must name at least one customer");
    }
    Ok(ids)
}

fn expand_range(start: &str, end: &str) -> crate::Result<Vec<String>> {
    let (prefix, first) = split_numeric_suffix(start)?;
    let (end_prefix, last) = split_numeric_suffix(end)?;
    if prefix != end_prefix {
        anyhow::bail!("Range bounds must share a prefix: {}..{}", start, end);
    }

    let width = start.len() - prefix.len();
    let first: u64 = first.parse()?;
    let last: u64 = last.parse()?;
    if last < first {
        anyhow::bail!("Range end precedes start: {}..{}", start, end);
    }

    Ok((first..=last)
        .map(|n| format!("{prefix}{n:0width$}"))
        .collect())
}

fn split_numeric_suffix(id: &str) -> crate::Result<(&str, &str)> {
    let digits = id.len() - id.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        anyhow::bail!("Range bound has no numeric suffix: {}", id);
    }
    Ok(id.split_at(id.len() - digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::parse_from(["lookalike"])
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("C0001, C0007").unwrap(), vec!["C0001", "C0007"]);

        let ids = parse_id_list("C0008..C0011").unwrap();
        assert_eq!(ids, vec!["C0008", "C0009", "C0010", "C0011"]);

        let ids = parse_id_list("C0001..C0020").unwrap();
        assert_eq!(ids.len(), 20);
        assert_eq!(ids[19], "C0020");

        assert!(parse_id_list("").is_err());
        assert!(parse_id_list("C0005..C0001").is_err());
        assert!(parse_id_list("C0001..P0003").is_err());
        assert!(parse_id_list("abc..abd").is_err());
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("7").unwrap(), SeedPolicy::Fixed(7));
        assert_eq!(parse_seed("Random").unwrap(), SeedPolicy::Random);
        assert!(parse_seed("seven").is_err());
    }

    #[test]
    fn test_parse_sweep() {
        let mut args = args();
        assert_eq!(args.parse_sweep().unwrap(), None);

        args.sweep = Some("2..10".to_string());
        assert_eq!(args.parse_sweep().unwrap(), Some(2..=10));

        args.sweep = Some("2..=5".to_string());
        assert_eq!(args.parse_sweep().unwrap(), Some(2..=5));

        args.sweep = Some("1..4".to_string());
        assert!(args.parse_sweep().is_err());

        args.sweep = Some("invalid".to_string());
        assert!(args.parse_sweep().is_err());
    }

    #[test]
    fn test_resolve_config_overrides() {
        let mut args = args();
        args.clusters = Some(5);
        args.seed = Some("random".to_string());
        args.top = Some(2);

        let config = args.resolve_config().unwrap();
        assert_eq!(config.segmentation.n_clusters, 5);
        assert_eq!(config.segmentation.seed, SeedPolicy::Random);
        assert_eq!(config.lookalikes.top_k, 2);

        args.clusters = Some(1);
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_default_paths() {
        let args = args();
        assert_eq!(args.customers, PathBuf::from("Customers.csv"));
        assert_eq!(args.parse_queries().unwrap(), None);
    }
}
