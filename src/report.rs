//! Output tables for external consumers and console statistics

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use polars::prelude::*;
use tracing::{info, warn};

use crate::error::AnalysisResult;
use crate::features::CustomerProfiles;
use crate::normalize::NormalizedMatrix;
use crate::segment::{silhouette_score, ClusterAssignment, ClusterSummary};
use crate::similarity::SimilarityResult;

/// One row of the lookalike table: the queried customer and its ranked matches
#[derive(Debug, Clone, PartialEq)]
pub struct LookalikeRow {
    pub customer_id: String,
    pub matches: Vec<(String, f64)>,
}

/// Keep the successful queries, logging and dropping the failed ones
pub fn lookalike_rows(results: Vec<AnalysisResult<SimilarityResult>>) -> Vec<LookalikeRow> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(found) => Some(LookalikeRow {
                customer_id: found.query,
                matches: found
                    .neighbors
                    .into_iter()
                    .map(|n| (n.customer_id, n.score))
                    .collect(),
            }),
            Err(err) => {
                warn!(error = %err, "lookalike query failed");
                None
            }
        })
        .collect()
}

/// Columns: CustomerID, Similar1, Score1, ..., Similar{top}, Score{top}
pub fn lookalike_frame(rows: &[LookalikeRow], top: usize) -> crate::Result<DataFrame> {
    let ids: Vec<&str> = rows.iter().map(|r| r.customer_id.as_str()).collect();
    let mut columns = vec![Series::new("CustomerID", ids)];

    for rank in 0..top {
        let similar: Vec<Option<&str>> = rows
            .iter()
            .map(|r| r.matches.get(rank).map(|(id, _)| id.as_str()))
            .collect();
        let scores: Vec<Option<f64>> = rows
            .iter()
            .map(|r| r.matches.get(rank).map(|(_, score)| *score))
            .collect();
        columns.push(Series::new(&format!("Similar{}", rank + 1), similar));
        columns.push(Series::new(&format!("Score{}", rank + 1), scores));
    }

    Ok(DataFrame::new(columns)?)
}

/// Profile table with a trailing `Cluster` column when labels are attached
pub fn profile_frame(profiles: &CustomerProfiles) -> crate::Result<DataFrame> {
    let mut columns = vec![Series::new("CustomerID", profiles.customer_ids.clone())];

    for (name, column) in profiles
        .column_names()
        .iter()
        .zip(profiles.values.columns())
    {
        columns.push(Series::new(name, column.to_vec()));
    }

    if let Some(clusters) = &profiles.clusters {
        let labels: Vec<u32> = clusters.iter().map(|&c| c as u32).collect();
        columns.push(Series::new("Cluster", labels));
    }

    Ok(DataFrame::new(columns)?)
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> crate::Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!(path = %path.display(), rows = df.height(), "wrote table");
    Ok(())
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(
    profiles: &CustomerProfiles,
    matrix: &NormalizedMatrix,
    assignment: &ClusterAssignment,
    summaries: &[ClusterSummary],
) {
    let total = profiles.len();

    println!("\n=== Cluster Statistics ===");
    println!("Number of clusters: {}", assignment.n_clusters);
    println!("Total customers: {}", total);
    println!("Davies-Bouldin index: {:.4}", assignment.davies_bouldin);
    println!(
        "Silhouette score: {:.3}",
        silhouette_score(&matrix.values, &assignment.labels)
    );
    println!("Within-cluster sum of squares: {:.2}", assignment.inertia);
    println!(
        "Iterations: {}{}",
        assignment.iterations,
        if assignment.converged { "" } else { " (not converged)" }
    );

    println!("\nCluster sizes:");
    for summary in summaries {
        let percentage = (summary.size as f64 / total as f64) * 100.0;
        println!(
            "  Cluster {}: {} customers ({:.1}%)",
            summary.cluster, summary.size, percentage
        );
    }

    println!("\nCluster profiles (mean, original units):");
    let names = profiles.column_names();
    for summary in summaries {
        let Some(mean) = &summary.mean_profile else {
            println!("  Cluster {}: empty", summary.cluster);
            continue;
        };
        println!("  Cluster {}:", summary.cluster);
        for (name, value) in names.iter().zip(mean.iter()) {
            println!("    {:<24} {:>12.2}", name, value);
        }
    }
}

pub fn print_lookalikes(rows: &[LookalikeRow]) {
    println!("\n=== Lookalikes ===");
    for row in rows {
        let matches: Vec<String> = row
            .matches
            .iter()
            .map(|(id, score)| format!("{id} ({score:.3})"))
            .collect();
        println!("  {}: {}", row.customer_id, matches.join(", "));
    }
}
