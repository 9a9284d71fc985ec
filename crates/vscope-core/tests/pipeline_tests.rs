//! End-to-end pipeline tests: ingest -> project -> cluster -> trace

use ndarray::{array, Array2};
use pretty_assertions::assert_eq;
use vscope_core::{
    ClusterAnalyzer, ClusterConfig, MemoryConnector, ProjectionMethod, Projector,
    ProjectorConfig, Session, VscopeError,
};

/// 12 three-dimensional vectors in three well-separated groups.
fn three_group_embeddings() -> Array2<f32> {
    Array2::from_shape_fn((12, 3), |(i, j)| {
        if i / 4 == j {
            1.0 + (i % 4) as f32 * 0.01
        } else {
            0.0
        }
    })
}

/// 100 vectors spread over a 10 x 10 grid (third dimension constant).
fn grid_embeddings() -> Array2<f32> {
    Array2::from_shape_fn((100, 3), |(i, j)| match j {
        0 => (i % 10) as f32,
        1 => (i / 10) as f32,
        _ => 0.5,
    })
}

fn session_with(
    embeddings: Array2<f32>,
    n_clusters: usize,
) -> Session<MemoryConnector> {
    Session::new(
        MemoryConnector::new(embeddings),
        Projector::new(ProjectorConfig::with_method(ProjectionMethod::Pca)),
        ClusterAnalyzer::new(ClusterConfig {
            n_clusters,
            ..ClusterConfig::default()
        }),
    )
}

#[test]
fn scenario_a_twelve_vectors_three_clusters() {
    let mut session = session_with(three_group_embeddings(), 3);
    let snapshot = session.ingest(12).unwrap();

    assert_eq!(snapshot.labels.len(), 12);
    assert!(snapshot.labels.iter().all(|&l| (0..3).contains(&l)));

    // Each group of four lands in one cluster
    for group in 0..3 {
        let first = snapshot.labels[group * 4];
        assert!(snapshot.labels[group * 4..group * 4 + 4]
            .iter()
            .all(|&l| l == first));
    }
}

#[test]
fn scenario_b_centroid_query_finds_missed_band() {
    let mut session = session_with(grid_embeddings(), 4);
    session.ingest(100).unwrap();

    // Query at the grid centroid
    let query = array![4.5f32, 4.5, 0.5];
    let (result, _scene) = session.trace("centroid", query.view(), 5, None).unwrap();

    assert_eq!(result.retrieved.len(), 5);
    // The 10th-percentile band around the centroid holds ~10 of 100 grid
    // points, more than the 5 retrieved, so some are necessarily missed.
    assert!(!result.missed.is_empty());
    for i in &result.missed {
        assert!(!result.retrieved.contains(i));
    }
}

#[test]
fn scenario_c_visualize_empty_session_fails() {
    let session = session_with(three_group_embeddings(), 3);
    let err = session.visualize("nothing yet").unwrap_err();
    assert!(matches!(err, VscopeError::NotIngested));
}

#[test]
fn reingest_replaces_snapshot_and_refits() {
    let mut session = session_with(three_group_embeddings(), 3);
    session.ingest(8).unwrap();
    assert_eq!(session.snapshot().unwrap().len(), 8);

    // Re-ingest with a different limit replaces the whole snapshot
    session.ingest(12).unwrap();
    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.len(), 12);
    assert_eq!(snapshot.projection.len(), 12);
    assert_eq!(snapshot.labels.len(), 12);
}

#[test]
fn trace_query_lands_near_its_group() {
    let mut session = session_with(three_group_embeddings(), 3);
    session.ingest(12).unwrap();
    let snapshot = session.snapshot().unwrap();

    // A query inside the first group should be placed closer to that
    // group's projected points than to the last group's.
    let query = array![1.02f32, 0.0, 0.0];
    let (result, _) = session.trace("group one", query.view(), 3, None).unwrap();

    let dist = |a: [f32; 2], b: [f32; 2]| {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    };
    let to_first = dist(result.query_point, snapshot.projection[0]);
    let to_last = dist(result.query_point, snapshot.projection[11]);
    assert!(to_first < to_last);
}

#[test]
fn limit_larger_than_source_ingests_everything() {
    let mut session = session_with(three_group_embeddings(), 3);
    let snapshot = session.ingest(1000).unwrap();
    assert_eq!(snapshot.len(), 12);
}
