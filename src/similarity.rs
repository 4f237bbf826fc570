//! Lookalike ranking by cosine similarity over normalized profiles

use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{AnalysisError, AnalysisResult};
use crate::normalize::NormalizedMatrix;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub customer_id: String,
    pub score: f64,
}

/// Top-K lookalikes of one customer, best first, never containing the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub query: String,
    pub neighbors: Vec<Neighbor>,
}

/// Cosine of the angle between two rows, clamped to [-1, 1].
///
/// A zero-norm row has no direction and scores 0 against everything.
pub fn cosine_similarity(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let dot = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Return the `k` customers most similar to `target`, excluding `target`.
///
/// Scores are sorted descending with a stable sort, so exactly equal scores
/// keep the row order of the matrix.
pub fn rank_similar(
    matrix: &NormalizedMatrix,
    target: &str,
    k: usize,
) -> AnalysisResult<SimilarityResult> {
    let target_idx = matrix
        .index_of(target)
        .ok_or_else(|| AnalysisError::not_found("customer", target))?;

    let others = matrix.nrows() - 1;
    if k == 0 || k >= others {
        return Err(AnalysisError::invalid(format!(
            "k must be in 1..{others} for {others} other customers, got {k}"
        )));
    }

    let query = matrix.values.row(target_idx);
    let mut scored: Vec<(usize, f64)> = matrix
        .values
        .outer_iter()
        .enumerate()
        .filter(|(i, _)| *i != target_idx)
        .map(|(i, row)| (i, cosine_similarity(query, row)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let neighbors = scored
        .into_iter()
        .take(k)
        .map(|(i, score)| Neighbor {
            customer_id: matrix.customer_ids[i].clone(),
            score,
        })
        .collect();

    Ok(SimilarityResult {
        query: target.to_string(),
        neighbors,
    })
}

/// Run independent lookalike queries in parallel; results follow `targets` order
pub fn rank_many<S>(
    matrix: &NormalizedMatrix,
    targets: &[S],
    k: usize,
) -> Vec<AnalysisResult<SimilarityResult>>
where
    S: AsRef<str> + Sync,
{
    targets
        .par_iter()
        .map(|target| rank_similar(matrix, target.as_ref(), k))
        .collect()
}
