//! Session orchestrator
//!
//! Owns the fitted projector, the cluster analyzer, and the ingested
//! snapshot, and is the single source of truth for "what space are we in".
//! `ingest` pulls from the connector, fits the projector once, clusters the
//! 2D projection, and stores the snapshot; `trace` reuses the already-fitted
//! projector so query points land in the same space as the corpus.
//!
//! `ingest` takes `&mut self` while `visualize`/`trace` take `&self`, so the
//! borrow checker enforces the single-writer/multi-reader discipline: a
//! trace can never observe a snapshot mid-replacement.

use ndarray::{Array2, ArrayView1, Axis};
use tracing::info;

use crate::cluster::{ClusterAnalyzer, NOISE_LABEL};
use crate::connector::{Metadata, VectorConnector};
use crate::error::{Result, VscopeError};
use crate::metrics;
use crate::projector::{Point2, Projector};
use crate::scene::{GroupRole, PointGroup, Scene};

/// Percentile band used by `trace` for missed-opportunity detection.
const MISSED_THRESHOLD_PERCENTILE: f64 = 10.0;

/// Hover text document preview length.
const HOVER_DOC_CHARS: usize = 100;

/// Everything one `ingest` call produced. Index-aligned across all five
/// collections; immutable until the next `ingest` replaces it whole.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub embeddings: Array2<f32>,
    pub documents: Vec<String>,
    pub metadata: Vec<Metadata>,
    pub projection: Vec<Point2>,
    pub labels: Vec<i32>,
}

impl Snapshot {
    /// Number of items in the snapshot.
    pub fn len(&self) -> usize {
        self.embeddings.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.nrows() == 0
    }

    /// Native embedding dimensionality.
    pub fn dims(&self) -> usize {
        self.embeddings.ncols()
    }
}

/// Result of one query trace. Derived from the snapshot, not persisted.
#[derive(Debug, Clone)]
pub struct TraceResult {
    /// The query placed in the learned 2D space
    pub query_point: Point2,
    /// Indices the retrieval returned (supplied or computed)
    pub retrieved: Vec<usize>,
    /// Close-to-query indices the retrieval missed, sorted ascending
    pub missed: Vec<usize>,
    /// Retrieval quality score in (0, 1]
    pub quality_score: f64,
}

/// Ingest -> project -> cluster -> trace pipeline over one data source.
pub struct Session<C: VectorConnector> {
    connector: C,
    projector: Projector,
    analyzer: ClusterAnalyzer,
    snapshot: Option<Snapshot>,
}

impl<C: VectorConnector> Session<C> {
    pub fn new(connector: C, projector: Projector, analyzer: ClusterAnalyzer) -> Self {
        Self {
            connector,
            projector,
            analyzer,
            snapshot: None,
        }
    }

    /// Whether a snapshot has been ingested.
    pub fn is_ingested(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The current snapshot, if any.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// The session projector (fitted after the first successful `ingest`).
    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Pull up to `limit` items from the connector, fit the projector on
    /// their embeddings, cluster the 2D projection, and store the snapshot.
    ///
    /// Re-entrant: calling again replaces the snapshot and re-fits both
    /// models, invalidating previously returned projections and labels. A
    /// failed re-ingest leaves the session empty: fitting the projector
    /// consumes the old model, so keeping the previous snapshot would pair
    /// it with a projector it did not come from.
    pub fn ingest(&mut self, limit: usize) -> Result<&Snapshot> {
        if limit == 0 {
            return Err(VscopeError::InvalidArgument(
                "limit must be positive".to_string(),
            ));
        }

        let embeddings = self.connector.fetch_embeddings(limit)?;
        let n = embeddings.nrows();
        if n == 0 {
            return Err(VscopeError::DataSource(
                "data source returned no embeddings".to_string(),
            ));
        }

        let metadata = self.connector.fetch_metadata(limit)?;
        let doc_ids: Vec<usize> = (0..n).collect();
        let documents = self.connector.fetch_documents(&doc_ids)?;

        // Index-alignment invariant across the parallel collections
        if metadata.len() != n || documents.len() != n {
            return Err(VscopeError::DataSource(format!(
                "misaligned fetch: {} embeddings, {} metadata entries, {} documents",
                n,
                metadata.len(),
                documents.len()
            )));
        }

        // Drop the old snapshot before re-fitting: from here on the previous
        // projection no longer matches the projector's model.
        self.snapshot = None;

        let projection = self.projector.fit_transform(embeddings.view())?;
        let labels = self.analyzer.fit(&projection)?;

        info!(
            n_items = n,
            dims = embeddings.ncols(),
            method = %self.projector.effective_method(),
            "snapshot ingested"
        );

        Ok(self.snapshot.insert(Snapshot {
            embeddings,
            documents,
            metadata,
            projection,
            labels,
        }))
    }

    /// Build the galaxy view: one point group per cluster with hover text.
    ///
    /// Fails with `NotIngested` before the first `ingest`.
    pub fn visualize(&self, title: &str) -> Result<Scene> {
        let snapshot = self.snapshot.as_ref().ok_or(VscopeError::NotIngested)?;

        let mut cluster_ids: Vec<i32> = snapshot.labels.clone();
        cluster_ids.sort_unstable();
        cluster_ids.dedup();

        let mut scene = Scene::new(title);
        for cluster_id in cluster_ids {
            let indices: Vec<usize> = snapshot
                .labels
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l == cluster_id)
                .map(|(i, _)| i)
                .collect();

            let name = if cluster_id == NOISE_LABEL {
                "Noise".to_string()
            } else {
                format!("Cluster {}", cluster_id)
            };
            let hover = indices
                .iter()
                .map(|&i| format!("{}<br>{}...", name, doc_preview(&snapshot.documents[i])))
                .collect();
            scene.groups.push(PointGroup {
                name,
                role: GroupRole::Cluster(cluster_id),
                points: indices.iter().map(|&i| snapshot.projection[i]).collect(),
                hover,
            });
        }
        Ok(scene)
    }

    /// Place a query in the learned space and evaluate its retrieval.
    ///
    /// `query_embedding` must be precomputed by the caller's embedding model
    /// and match the ingested dimensionality. When `retrieved_indices` is
    /// `None` the `top_k` nearest corpus items (native-space Euclidean, ties
    /// by ascending index) stand in for the retrieval result. Never re-fits
    /// the projector.
    pub fn trace(
        &self,
        query_text: &str,
        query_embedding: ArrayView1<'_, f32>,
        top_k: usize,
        retrieved_indices: Option<Vec<usize>>,
    ) -> Result<(TraceResult, Scene)> {
        let snapshot = self.snapshot.as_ref().ok_or(VscopeError::NotIngested)?;

        if query_embedding.is_empty() {
            return Err(VscopeError::InvalidArgument(
                "query_embedding must be provided (generate it from your embedding model)"
                    .to_string(),
            ));
        }
        if query_embedding.len() != snapshot.dims() {
            return Err(VscopeError::InvalidArgument(format!(
                "query dimension {} does not match ingested dimension {}",
                query_embedding.len(),
                snapshot.dims()
            )));
        }

        let query_point = self
            .projector
            .transform(query_embedding.insert_axis(Axis(0)))?[0];

        let retrieved = match retrieved_indices {
            Some(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= snapshot.len()) {
                    return Err(VscopeError::InvalidArgument(format!(
                        "retrieved index {} out of range ({} items)",
                        bad,
                        snapshot.len()
                    )));
                }
                indices
            }
            None => metrics::nearest_neighbors(query_embedding, snapshot.embeddings.view(), top_k)?,
        };

        let missed = metrics::find_missed_opportunities(
            query_embedding,
            &retrieved,
            snapshot.embeddings.view(),
            MISSED_THRESHOLD_PERCENTILE,
        )?;
        let quality_score = metrics::retrieval_quality_score(
            query_embedding,
            &retrieved,
            snapshot.embeddings.view(),
        )?;

        info!(
            query = query_text,
            n_retrieved = retrieved.len(),
            n_missed = missed.len(),
            quality_score,
            "query traced"
        );

        let scene = query_scene(snapshot, query_text, query_point, &retrieved, &missed);
        let result = TraceResult {
            query_point,
            retrieved,
            missed,
            quality_score,
        };
        Ok((result, scene))
    }
}

fn doc_preview(doc: &str) -> String {
    doc.chars().take(HOVER_DOC_CHARS).collect()
}

/// Background / retrieved / missed / query point groups for a trace.
fn query_scene(
    snapshot: &Snapshot,
    query_text: &str,
    query_point: Point2,
    retrieved: &[usize],
    missed: &[usize],
) -> Scene {
    let mut scene = Scene::new(format!("Query Analysis: '{}'", query_text));

    let background: Vec<usize> = (0..snapshot.len())
        .filter(|i| !retrieved.contains(i) && !missed.contains(i))
        .collect();

    let group = |name: &str, role, indices: &[usize]| PointGroup {
        name: name.to_string(),
        role,
        points: indices.iter().map(|&i| snapshot.projection[i]).collect(),
        hover: indices
            .iter()
            .map(|&i| doc_preview(&snapshot.documents[i]))
            .collect(),
    };

    scene.groups.push(group(
        "Corpus",
        GroupRole::Background,
        &background,
    ));
    scene
        .groups
        .push(group("Retrieved", GroupRole::Retrieved, retrieved));
    scene
        .groups
        .push(group("Missed opportunities", GroupRole::Missed, missed));
    scene.groups.push(PointGroup {
        name: "Query".to_string(),
        role: GroupRole::Query,
        points: vec![query_point],
        hover: vec![query_text.to_string()],
    });
    scene
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterConfig;
    use crate::connector::MemoryConnector;
    use crate::projector::{ProjectionMethod, ProjectorConfig};
    use ndarray::{array, Array2};

    fn three_blob_embeddings() -> Array2<f32> {
        let mut rows = Vec::new();
        for i in 0..4 {
            rows.push([1.0 + i as f32 * 0.01, 0.0, 0.0]);
        }
        for i in 0..4 {
            rows.push([0.0, 1.0 + i as f32 * 0.01, 0.0]);
        }
        for i in 0..4 {
            rows.push([0.0, 0.0, 1.0 + i as f32 * 0.01]);
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((12, 3), flat).unwrap()
    }

    fn pca_session(embeddings: Array2<f32>, n_clusters: usize) -> Session<MemoryConnector> {
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
    fn test_visualize_before_ingest_fails() {
        let session = pca_session(three_blob_embeddings(), 3);
        assert!(matches!(
            session.visualize("map").unwrap_err(),
            VscopeError::NotIngested
        ));
    }

    #[test]
    fn test_trace_before_ingest_fails() {
        let session = pca_session(three_blob_embeddings(), 3);
        let query = array![1.0f32, 0.0, 0.0];
        let err = session.trace("q", query.view(), 3, None).unwrap_err();
        assert!(matches!(err, VscopeError::NotIngested));
    }

    #[test]
    fn test_ingest_rejects_zero_limit() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        assert!(matches!(
            session.ingest(0).unwrap_err(),
            VscopeError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_ingest_builds_aligned_snapshot() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        let snapshot = session.ingest(12).unwrap();
        assert_eq!(snapshot.len(), 12);
        assert_eq!(snapshot.documents.len(), 12);
        assert_eq!(snapshot.metadata.len(), 12);
        assert_eq!(snapshot.projection.len(), 12);
        assert_eq!(snapshot.labels.len(), 12);
        assert!(snapshot.labels.iter().all(|&l| (0..3).contains(&l)));
    }

    #[test]
    fn test_ingest_is_structurally_idempotent() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        let first_docs = session.ingest(5).unwrap().documents.clone();
        let second_docs = session.ingest(5).unwrap().documents.clone();
        assert_eq!(first_docs, second_docs);
    }

    #[test]
    fn test_failed_reingest_leaves_session_empty() {
        // 5 clusters fit 12 points but not 4, so the second ingest fails
        // after the projector has already been re-fitted.
        let mut session = pca_session(three_blob_embeddings(), 5);
        session.ingest(12).unwrap();

        let err = session.ingest(4).unwrap_err();
        assert!(matches!(err, VscopeError::InvalidArgument(_)));

        // The stale snapshot would no longer match the projector's model,
        // so it must be gone rather than half-replaced.
        assert!(!session.is_ingested());
        assert!(matches!(
            session.visualize("stale").unwrap_err(),
            VscopeError::NotIngested
        ));
    }

    #[test]
    fn test_noise_hover_uses_group_name() {
        // A far outlier with tight dbscan parameters lands in the noise group
        let mut rows: Vec<[f32; 3]> = Vec::new();
        for i in 0..6 {
            rows.push([1.0 + i as f32 * 0.001, 0.0, 0.0]);
        }
        for i in 0..6 {
            rows.push([0.0, 1.0 + i as f32 * 0.001, 0.0]);
        }
        rows.push([50.0, -50.0, 50.0]);
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let embeddings = Array2::from_shape_vec((13, 3), flat).unwrap();

        let mut session = Session::new(
            MemoryConnector::new(embeddings),
            Projector::new(ProjectorConfig::with_method(ProjectionMethod::Pca)),
            ClusterAnalyzer::new(ClusterConfig {
                method: crate::cluster::ClusterMethod::Dbscan,
                eps: 0.5,
                min_samples: 3,
                ..ClusterConfig::default()
            }),
        );
        session.ingest(13).unwrap();

        let scene = session.visualize("with outlier").unwrap();
        let noise = scene
            .groups
            .iter()
            .find(|g| g.name == "Noise")
            .expect("outlier forms a noise group");
        assert!(noise.hover.iter().all(|h| h.starts_with("Noise<br>")));
    }

    #[test]
    fn test_trace_rejects_dimension_mismatch() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        session.ingest(12).unwrap();
        let query = array![1.0f32, 0.0];
        assert!(matches!(
            session.trace("q", query.view(), 3, None).unwrap_err(),
            VscopeError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_trace_does_not_perturb_projection() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        let before = session.ingest(12).unwrap().projection.clone();

        let query = array![1.0f32, 0.05, 0.0];
        session.trace("nearby", query.view(), 3, None).unwrap();

        assert_eq!(session.snapshot().unwrap().projection, before);
    }

    #[test]
    fn test_trace_computes_neighbors_and_scene() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        session.ingest(12).unwrap();

        let query = array![1.0f32, 0.0, 0.0];
        let (result, scene) = session.trace("blob one", query.view(), 3, None).unwrap();

        assert_eq!(result.retrieved.len(), 3);
        // Nearest neighbors all come from the first blob
        assert!(result.retrieved.iter().all(|&i| i < 4));
        assert!(result.quality_score > 0.0 && result.quality_score <= 1.0);
        for i in &result.missed {
            assert!(!result.retrieved.contains(i));
        }

        // Background + retrieved + missed + query groups
        assert_eq!(scene.groups.len(), 4);
        assert_eq!(scene.n_points(), 13);
        assert_eq!(scene.title, "Query Analysis: 'blob one'");
    }

    #[test]
    fn test_trace_accepts_supplied_indices() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        session.ingest(12).unwrap();

        let query = array![1.0f32, 0.0, 0.0];
        let (result, _) = session
            .trace("supplied", query.view(), 5, Some(vec![10, 11]))
            .unwrap();
        assert_eq!(result.retrieved, vec![10, 11]);

        let err = session
            .trace("bad", query.view(), 5, Some(vec![99]))
            .unwrap_err();
        assert!(matches!(err, VscopeError::InvalidArgument(_)));
    }

    #[test]
    fn test_visualize_groups_per_cluster() {
        let mut session = pca_session(three_blob_embeddings(), 3);
        session.ingest(12).unwrap();
        let scene = session.visualize("Vector Space Map").unwrap();
        assert_eq!(scene.groups.len(), 3);
        assert_eq!(scene.n_points(), 12);
        for g in &scene.groups {
            assert_eq!(g.points.len(), g.hover.len());
        }
    }
}
