//! Retrieval quality metrics
//!
//! All distances here are Euclidean in the embedding's native
//! dimensionality, never in the reduced 2D space: retrieval quality must
//! reflect the real index geometry, not the visualization approximation.

use ndarray::{ArrayView1, ArrayView2};

use crate::error::{Result, VscopeError};

/// Euclidean distance from `query` to every corpus row.
fn distances_to_query(query: ArrayView1<'_, f32>, corpus: ArrayView2<'_, f32>) -> Vec<f64> {
    corpus
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(query.iter())
                .map(|(&a, &b)| {
                    let d = f64::from(a) - f64::from(b);
                    d * d
                })
                .sum::<f64>()
                .sqrt()
        })
        .collect()
}

fn check_dims(query: ArrayView1<'_, f32>, corpus: ArrayView2<'_, f32>) -> Result<()> {
    if query.len() != corpus.ncols() {
        return Err(VscopeError::InvalidArgument(format!(
            "query dimension {} does not match corpus dimension {}",
            query.len(),
            corpus.ncols()
        )));
    }
    Ok(())
}

/// Score how much closer a retrieved set is to the query than the corpus
/// average: `1 / (1 + mean_dist(retrieved) / mean_dist(corpus))`, in (0, 1].
///
/// A degenerate corpus whose mean distance is exactly zero (every point
/// coincides with the query) scores 1.0 by convention.
pub fn retrieval_quality_score(
    query: ArrayView1<'_, f32>,
    retrieved_indices: &[usize],
    corpus: ArrayView2<'_, f32>,
) -> Result<f64> {
    check_dims(query, corpus)?;
    if retrieved_indices.is_empty() {
        return Err(VscopeError::InvalidArgument(
            "retrieved set is empty".to_string(),
        ));
    }
    if let Some(&bad) = retrieved_indices.iter().find(|&&i| i >= corpus.nrows()) {
        return Err(VscopeError::InvalidArgument(format!(
            "retrieved index {} out of range ({} corpus items)",
            bad,
            corpus.nrows()
        )));
    }

    let distances = distances_to_query(query, corpus);
    let mean_all = distances.iter().sum::<f64>() / distances.len() as f64;
    if mean_all == 0.0 {
        return Ok(1.0);
    }

    let mean_retrieved = retrieved_indices
        .iter()
        .map(|&i| distances[i])
        .sum::<f64>()
        / retrieved_indices.len() as f64;

    Ok(1.0 / (1.0 + mean_retrieved / mean_all))
}

/// The `top_k` corpus indices nearest to `query`, ties broken by ascending
/// index. Returns all indices when `top_k >= corpus size`.
pub fn nearest_neighbors(
    query: ArrayView1<'_, f32>,
    corpus: ArrayView2<'_, f32>,
    top_k: usize,
) -> Result<Vec<usize>> {
    check_dims(query, corpus)?;
    if top_k == 0 {
        return Err(VscopeError::InvalidArgument(
            "top_k must be positive".to_string(),
        ));
    }

    let distances = distances_to_query(query, corpus);
    let mut order: Vec<usize> = (0..distances.len()).collect();
    // Stable sort keeps equal distances in ascending index order
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    order.truncate(top_k);
    Ok(order)
}

/// Corpus items closer to the query than the `threshold_percentile` of the
/// corpus distance distribution that were NOT retrieved.
///
/// The percentile threshold uses linear interpolation between order
/// statistics (numpy's default rule) so results are reproducible. Returned
/// indices are sorted ascending. `threshold_percentile` must lie in
/// [0, 100].
pub fn find_missed_opportunities(
    query: ArrayView1<'_, f32>,
    retrieved_indices: &[usize],
    corpus: ArrayView2<'_, f32>,
    threshold_percentile: f64,
) -> Result<Vec<usize>> {
    check_dims(query, corpus)?;
    if !(0.0..=100.0).contains(&threshold_percentile) {
        return Err(VscopeError::InvalidArgument(format!(
            "threshold_percentile must be in [0, 100], got {}",
            threshold_percentile
        )));
    }
    if corpus.nrows() == 0 {
        return Ok(Vec::new());
    }

    let distances = distances_to_query(query, corpus);
    let threshold = percentile(&distances, threshold_percentile);

    Ok(distances
        .iter()
        .enumerate()
        .filter(|&(i, &d)| d <= threshold && !retrieved_indices.contains(&i))
        .map(|(i, _)| i)
        .collect())
}

/// Percentile of `values` by linear interpolation between order statistics:
/// rank `p/100 * (n - 1)` split into integer and fractional parts.
fn percentile(values: &[f64], p: f64) -> f64 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1, Array2};

    fn line_corpus(n: usize) -> Array2<f32> {
        // Points at x = 1, 2, ..., n on the x axis
        Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { (i + 1) as f32 } else { 0.0 })
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(percentile(&values, 0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(percentile(&values, 100.0), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(percentile(&values, 50.0), 2.5, epsilon = 1e-12);
        // rank = 0.1 * 3 = 0.3 -> 1.0 + 0.3 * (2.0 - 1.0)
        assert_abs_diff_eq!(percentile(&values, 10.0), 1.3, epsilon = 1e-12);
    }

    #[test]
    fn test_quality_score_in_unit_interval() {
        let corpus = line_corpus(10);
        let query: Array1<f32> = array![0.0, 0.0];
        let score = retrieval_quality_score(query.view(), &[0, 1], corpus.view()).unwrap();
        assert!(score > 0.0 && score <= 1.0);
        // Retrieved set is closer than average, so better than 0.5
        assert!(score > 0.5);
    }

    #[test]
    fn test_quality_score_degenerate_corpus() {
        let corpus = Array2::zeros((5, 3));
        let query: Array1<f32> = Array1::zeros(3);
        let score = retrieval_quality_score(query.view(), &[0], corpus.view()).unwrap();
        assert_abs_diff_eq!(score, 1.0);
    }

    #[test]
    fn test_quality_score_monotone_in_retrieved_distance() {
        let corpus = line_corpus(10);
        let query: Array1<f32> = array![0.0, 0.0];
        let near = retrieval_quality_score(query.view(), &[0, 1], corpus.view()).unwrap();
        let far = retrieval_quality_score(query.view(), &[8, 9], corpus.view()).unwrap();
        assert!(near > far);
    }

    #[test]
    fn test_quality_score_dimension_mismatch() {
        let corpus = line_corpus(3);
        let query: Array1<f32> = array![0.0, 0.0, 0.0];
        assert!(matches!(
            retrieval_quality_score(query.view(), &[0], corpus.view()).unwrap_err(),
            VscopeError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_nearest_neighbors_orders_by_distance() {
        let corpus = line_corpus(5);
        let query: Array1<f32> = array![0.0, 0.0];
        let neighbors = nearest_neighbors(query.view(), corpus.view(), 3).unwrap();
        assert_eq!(neighbors, vec![0, 1, 2]);
    }

    #[test]
    fn test_nearest_neighbors_ties_break_by_index() {
        // Two points equidistant from the query
        let corpus = array![[1.0f32, 0.0], [-1.0, 0.0], [0.5, 0.0]];
        let query: Array1<f32> = array![0.0, 0.0];
        let neighbors = nearest_neighbors(query.view(), corpus.view(), 3).unwrap();
        assert_eq!(neighbors, vec![2, 0, 1]);
    }

    #[test]
    fn test_nearest_neighbors_top_k_larger_than_corpus() {
        let corpus = line_corpus(3);
        let query: Array1<f32> = array![0.0, 0.0];
        let neighbors = nearest_neighbors(query.view(), corpus.view(), 10).unwrap();
        assert_eq!(neighbors.len(), 3);
    }

    #[test]
    fn test_missed_excludes_retrieved() {
        let corpus = line_corpus(20);
        let query: Array1<f32> = array![0.0, 0.0];
        // Retrieve the 2 nearest; with a 20th-percentile band more items
        // qualify as close
        let missed =
            find_missed_opportunities(query.view(), &[0, 1], corpus.view(), 20.0).unwrap();
        assert!(!missed.is_empty());
        assert!(!missed.contains(&0));
        assert!(!missed.contains(&1));

        // Every missed index is actually within the threshold band
        let distances: Vec<f64> = (0..20).map(|i| (i + 1) as f64).collect();
        let threshold = percentile(&distances, 20.0);
        for &i in &missed {
            assert!(distances[i] <= threshold);
        }
    }

    #[test]
    fn test_missed_empty_when_retrieval_covers_band() {
        let corpus = line_corpus(20);
        let query: Array1<f32> = array![0.0, 0.0];
        // 10th percentile of 20 line points admits roughly the nearest
        // 2-3 items; retrieving the nearest 5 covers the band entirely
        let missed =
            find_missed_opportunities(query.view(), &[0, 1, 2, 3, 4], corpus.view(), 10.0)
                .unwrap();
        assert!(missed.is_empty());
    }

    #[test]
    fn test_missed_percentile_validation() {
        let corpus = line_corpus(5);
        let query: Array1<f32> = array![0.0, 0.0];
        for bad in [-1.0, 100.1, f64::NAN] {
            assert!(matches!(
                find_missed_opportunities(query.view(), &[], corpus.view(), bad).unwrap_err(),
                VscopeError::InvalidArgument(_)
            ));
        }
    }
}
