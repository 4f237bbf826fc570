//! Lookalike: customer lookalike ranking and segmentation CLI
//!
//! This is the main entrypoint that orchestrates data loading, profile
//! building, lookalike ranking, segmentation and report output.

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use lookalike::segment::{best_of_seeds, feasible_cluster_counts, sweep_cluster_counts};
use lookalike::{
    build_profiles, load_records, normalize, rank_many, report, segment, summarize_clusters,
    AnalysisConfig, Args, CustomerProfiles, NormalizedMatrix, SeedPolicy,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Customers queried when no `--query` is given
const DEFAULT_QUERY_COUNT: usize = 20;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .init();
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.resolve_config()?;
    let start_time = Instant::now();

    // Step 1: Load records and build profiles
    let records = load_records(&args.customers, &args.products, &args.transactions)?;
    let mut profiles = build_profiles(&records)?;
    let matrix = normalize(&profiles, config.normalization.zero_variance)?;

    println!(
        "✓ Profiles built: {} customers x {} features",
        profiles.len(),
        profiles.schema.width()
    );

    if let Some(range) = args.parse_sweep()? {
        run_sweep(&matrix, &config, range)?;
    }

    // Step 2: Lookalikes
    let queries = match args.parse_queries()? {
        Some(queries) => queries,
        None => profiles
            .customer_ids
            .iter()
            .take(DEFAULT_QUERY_COUNT)
            .cloned()
            .collect(),
    };
    run_lookalikes(&matrix, &config, &queries, &args)?;

    // Step 3: Segmentation
    run_segmentation(&mut profiles, &matrix, &config, &args)?;

    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn run_lookalikes(
    matrix: &NormalizedMatrix,
    config: &AnalysisConfig,
    queries: &[String],
    args: &Args,
) -> Result<()> {
    let top = config.lookalikes.top_k;
    info!(queries = queries.len(), top, "ranking lookalikes");

    let rows = report::lookalike_rows(rank_many(matrix, queries, top));
    report::print_lookalikes(&rows);

    let mut df = report::lookalike_frame(&rows, top)?;
    report::write_csv(&mut df, &args.lookalike_out)?;
    println!("Lookalikes saved to: {}", args.lookalike_out.display());
    Ok(())
}

fn run_segmentation(
    profiles: &mut CustomerProfiles,
    matrix: &NormalizedMatrix,
    config: &AnalysisConfig,
    args: &Args,
) -> Result<()> {
    let params = config.segmentation.params();
    info!(
        n_clusters = params.n_clusters,
        max_iterations = params.max_iterations,
        seed = ?params.seed,
        trials = config.segmentation.trials,
        "segmenting customers"
    );

    let assignment = if config.segmentation.trials > 1 {
        let base = match params.seed {
            SeedPolicy::Fixed(seed) => seed,
            SeedPolicy::Random => rand::random(),
        };
        let seeds: Vec<u64> = (0..config.segmentation.trials as u64)
            .map(|i| base.wrapping_add(i))
            .collect();
        best_of_seeds(matrix, &params, &seeds)?
    } else {
        segment(matrix, &params)?
    };

    profiles.attach_clusters(&assignment)?;
    let summaries = summarize_clusters(profiles, &assignment)?;
    report::print_cluster_statistics(profiles, matrix, &assignment, &summaries);

    let mut df = report::profile_frame(profiles)?;
    report::write_csv(&mut df, &args.segments_out)?;
    println!("\nSegments saved to: {}", args.segments_out.display());
    Ok(())
}

fn run_sweep(
    matrix: &NormalizedMatrix,
    config: &AnalysisConfig,
    range: std::ops::RangeInclusive<usize>,
) -> Result<()> {
    let Some(counts) = feasible_cluster_counts(range.clone(), matrix.nrows()) else {
        warn!(?range, customers = matrix.nrows(), "no feasible cluster count to sweep, skipping");
        return Ok(());
    };
    if counts != range {
        warn!(?range, ?counts, "cluster count sweep clamped to the customer count");
    }

    let sweep = sweep_cluster_counts(matrix, counts, &config.segmentation.params())?;

    println!("\n=== Cluster Count Sweep ===");
    for (k, score) in &sweep.scores {
        println!("  k = {:2}: Davies-Bouldin {:.4}", k, score);
    }
    if let Some((k, score)) = sweep.best() {
        println!("Best cluster count: {} (Davies-Bouldin {:.4})", k, score);
    }
    Ok(())
}
