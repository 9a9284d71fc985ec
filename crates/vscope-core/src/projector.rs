//! Dimensionality reduction for visualization
//!
//! The projector fits a 2D reduction model once on an ingested batch, then
//! reuses the fitted model to place additional points (typically one query
//! vector) in the same learned space. Three methods are supported:
//!
//! - `pca` — linear variance-maximizing projection (linfa-reduction). Fully
//!   deterministic, supports true inductive `transform` of unseen points.
//! - `tsne` — stochastic neighbor embedding (linfa-tsne). Fit-only: the
//!   method has no out-of-sample extension, so `transform` is rejected with
//!   `Unsupported` and callers must re-fit with all points instead.
//! - `umap` — neighborhood-graph embedding (annembed, behind the `umap`
//!   cargo feature). `transform` of unseen points is approximated by the
//!   embedded coordinate of the nearest fitted training point (Euclidean,
//!   ties broken by ascending index). When the feature is not compiled in,
//!   fitting falls back to `pca` and emits a warning.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use linfa::traits::{Fit, Predict, Transformer};
use linfa::DatasetBase;
use linfa_reduction::Pca;
use linfa_tsne::TSneParams;
use ndarray::{Array2, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VscopeError};

/// A point in the learned 2D space.
pub type Point2 = [f32; 2];

/// Whether the neighborhood-graph method was compiled into this build.
///
/// Resolved once from the `umap` cargo feature; callers pass the result into
/// [`ProjectorConfig::umap_available`] rather than probing at fit time.
pub fn umap_supported() -> bool {
    cfg!(feature = "umap")
}

/// Projection method, selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMethod {
    /// Neighborhood-graph embedding (requires the `umap` feature)
    Umap,
    /// Linear variance-maximizing projection
    Pca,
    /// Stochastic neighbor embedding (fit-only)
    Tsne,
}

impl FromStr for ProjectionMethod {
    type Err = VscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "umap" => Ok(Self::Umap),
            "pca" => Ok(Self::Pca),
            "tsne" => Ok(Self::Tsne),
            other => Err(VscopeError::Configuration(format!(
                "unknown projection method '{}', expected one of: umap, pca, tsne",
                other
            ))),
        }
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Umap => write!(f, "umap"),
            Self::Pca => write!(f, "pca"),
            Self::Tsne => write!(f, "tsne"),
        }
    }
}

/// Projector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectorConfig {
    /// Projection method
    pub method: ProjectionMethod,
    /// Seed for stochastic methods. PCA is deterministic regardless; t-SNE
    /// is seeded from this value; the umap backend exposes no seed, so its
    /// output is only stable within one process run.
    pub seed: u64,
    /// Neighbor count for the graph-based method, clamped to `n - 1` at fit
    /// time so small inputs stay valid.
    pub n_neighbors: usize,
    /// t-SNE perplexity, clamped to `(n - 1) / 3` at fit time.
    pub perplexity: f64,
    /// Whether the neighborhood-graph backend is available in this build.
    pub umap_available: bool,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            method: ProjectionMethod::Umap,
            seed: 51,
            n_neighbors: 15,
            perplexity: 30.0,
            umap_available: umap_supported(),
        }
    }
}

impl ProjectorConfig {
    /// Config with an explicit method and defaults elsewhere.
    pub fn with_method(method: ProjectionMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }
}

/// Fitted model state, one variant per effective method.
#[derive(Serialize, Deserialize)]
enum FittedModel {
    Pca(Pca<f64>),
    /// t-SNE keeps only the fused fit output; it cannot transform.
    Tsne { embedded: Vec<Point2> },
    #[cfg(feature = "umap")]
    Umap {
        train: Vec<Vec<f32>>,
        embedded: Vec<Point2>,
    },
}

impl fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pca(_) => write!(f, "FittedModel::Pca"),
            Self::Tsne { embedded } => write!(f, "FittedModel::Tsne({} points)", embedded.len()),
            #[cfg(feature = "umap")]
            Self::Umap { embedded, .. } => {
                write!(f, "FittedModel::Umap({} points)", embedded.len())
            }
        }
    }
}

/// Serialized form of a fitted projector (see [`Projector::save`]).
#[derive(Deserialize)]
struct SavedProjector {
    config: ProjectorConfig,
    effective: ProjectionMethod,
    input_dims: usize,
    model: FittedModel,
}

/// Borrowed counterpart of [`SavedProjector`] used on the write path.
#[derive(Serialize)]
struct SavedProjectorRef<'a> {
    config: &'a ProjectorConfig,
    effective: ProjectionMethod,
    input_dims: usize,
    model: &'a FittedModel,
}

/// Fits a 2D reduction model once, then transforms additional points into
/// the same learned space.
#[derive(Debug)]
pub struct Projector {
    config: ProjectorConfig,
    /// Method actually in effect after any availability fallback.
    effective: ProjectionMethod,
    input_dims: usize,
    model: Option<FittedModel>,
}

impl Projector {
    /// Create an unfitted projector.
    pub fn new(config: ProjectorConfig) -> Self {
        let effective = config.method;
        Self {
            config,
            effective,
            input_dims: 0,
            model: None,
        }
    }

    /// Whether `fit` has completed.
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// The method actually in effect (differs from the configured method
    /// only after the umap-unavailable fallback).
    pub fn effective_method(&self) -> ProjectionMethod {
        self.effective
    }

    /// Fit the configured reduction model on `data` (N x D, N >= 2, D >= 2).
    ///
    /// Re-fitting replaces the previous model; any projection produced by it
    /// is no longer comparable with new `transform` output.
    pub fn fit(&mut self, data: ArrayView2<'_, f32>) -> Result<()> {
        self.fit_impl(data)?;
        Ok(())
    }

    /// Project `data` using the already-fitted model.
    ///
    /// Fails with `NotFitted` before `fit`, `Unsupported` for t-SNE, and
    /// `InvalidArgument` on dimension mismatch.
    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Result<Vec<Point2>> {
        let model = self.model.as_ref().ok_or(VscopeError::NotFitted)?;

        if data.ncols() != self.input_dims {
            return Err(VscopeError::InvalidArgument(format!(
                "dimension mismatch: model fitted on {}-dimensional vectors, got {}",
                self.input_dims,
                data.ncols()
            )));
        }

        match model {
            FittedModel::Pca(pca) => {
                let records = data.mapv(f64::from);
                let projected = pca.predict(&records);
                Ok(to_points(&projected))
            }
            FittedModel::Tsne { .. } => Err(VscopeError::Unsupported(
                "tsne does not support transform of unseen points - re-fit with all points instead"
                    .to_string(),
            )),
            #[cfg(feature = "umap")]
            FittedModel::Umap { train, embedded } => {
                Ok(nearest_fitted_points(train, embedded, data))
            }
        }
    }

    /// Fit on `data` and return its 2D projection.
    ///
    /// Equivalent to `fit` then `transform` for PCA; for t-SNE and UMAP the
    /// fused fit output is returned directly, since that is the only mode
    /// those methods support.
    pub fn fit_transform(&mut self, data: ArrayView2<'_, f32>) -> Result<Vec<Point2>> {
        self.fit_impl(data)
    }

    fn fit_impl(&mut self, data: ArrayView2<'_, f32>) -> Result<Vec<Point2>> {
        let n = data.nrows();
        let d = data.ncols();
        if n < 2 {
            return Err(VscopeError::InvalidArgument(format!(
                "need at least 2 points to fit, got {}",
                n
            )));
        }
        if d < 2 {
            return Err(VscopeError::InvalidArgument(format!(
                "need at least 2 input dimensions, got {}",
                d
            )));
        }

        // Resolve the availability fallback on every fit so a re-configured
        // projector stays honest about what it ran.
        self.effective = match self.config.method {
            ProjectionMethod::Umap if !self.config.umap_available => {
                warn!("umap backend not available in this build, falling back to pca");
                ProjectionMethod::Pca
            }
            m => m,
        };

        let embedded = match self.effective {
            ProjectionMethod::Pca => self.fit_pca(data)?,
            ProjectionMethod::Tsne => self.fit_tsne(data)?,
            ProjectionMethod::Umap => self.fit_umap(data)?,
        };

        self.input_dims = d;
        debug!(
            method = %self.effective,
            n_points = n,
            input_dims = d,
            "projector fitted"
        );
        Ok(embedded)
    }

    fn fit_pca(&mut self, data: ArrayView2<'_, f32>) -> Result<Vec<Point2>> {
        let records = data.mapv(f64::from);
        let dataset = DatasetBase::from(records.clone());
        let pca = Pca::params(2)
            .fit(&dataset)
            .map_err(|e| VscopeError::Backend(format!("pca fit failed: {}", e)))?;
        let projected = pca.predict(&records);
        self.model = Some(FittedModel::Pca(pca));
        Ok(to_points(&projected))
    }

    fn fit_tsne(&mut self, data: ArrayView2<'_, f32>) -> Result<Vec<Point2>> {
        let n = data.nrows();
        if n < 5 {
            return Err(VscopeError::InvalidArgument(format!(
                "tsne needs at least 5 points, got {}",
                n
            )));
        }
        // bhtsne requires perplexity * 3 < n - 1
        let perplexity = self
            .config
            .perplexity
            .min(((n - 1) as f64 / 3.0) - 1e-3)
            .max(1.0);
        let rng = Xoshiro256Plus::seed_from_u64(self.config.seed);

        let records = data.mapv(f64::from);
        let embedded = TSneParams::embedding_size_with_rng(2, rng)
            .perplexity(perplexity)
            .approx_threshold(0.5)
            .transform(records)
            .map_err(|e| VscopeError::Backend(format!("tsne fit failed: {}", e)))?;

        let points = to_points(&embedded);
        self.model = Some(FittedModel::Tsne {
            embedded: points.clone(),
        });
        Ok(points)
    }

    #[cfg(feature = "umap")]
    fn fit_umap(&mut self, data: ArrayView2<'_, f32>) -> Result<Vec<Point2>> {
        use annembed::fromhnsw::kgraph::kgraph_from_hnsw_all;
        use annembed::prelude::*;
        use hnsw_rs::prelude::*;

        let n = data.nrows();
        let n_neighbors = self.config.n_neighbors.min(n - 1).max(1);

        let train: Vec<Vec<f32>> = data.rows().into_iter().map(|r| r.to_vec()).collect();
        let with_ids: Vec<(&Vec<f32>, usize)> =
            train.iter().enumerate().map(|(i, v)| (v, i)).collect();

        let max_nb_connection = n_neighbors.max(8);
        let nb_layer = 16.min((n as f32).ln().trunc() as usize + 1);
        let ef_construction = 200;
        let hnsw = Hnsw::<f32, DistL2>::new(max_nb_connection, n, nb_layer, ef_construction, DistL2 {});
        hnsw.parallel_insert(&with_ids);

        let kgraph = kgraph_from_hnsw_all::<f32, DistL2, f32>(&hnsw, n_neighbors)
            .map_err(|e| VscopeError::Backend(format!("umap graph construction failed: {:?}", e)))?;

        let mut params = EmbedderParams::default();
        params.asked_dim = 2;
        let mut embedder = Embedder::new(&kgraph, params);
        embedder
            .embed()
            .map_err(|e| VscopeError::Backend(format!("umap embedding failed: {:?}", e)))?;

        let coords = embedder.get_embedded_reindexed();
        let points: Vec<Point2> = coords
            .rows()
            .into_iter()
            .map(|r| [r[0], r[1]])
            .collect();

        self.model = Some(FittedModel::Umap {
            train,
            embedded: points.clone(),
        });
        Ok(points)
    }

    #[cfg(not(feature = "umap"))]
    fn fit_umap(&mut self, _data: ArrayView2<'_, f32>) -> Result<Vec<Point2>> {
        // Unreachable: fit_impl falls back to pca before dispatching here
        // whenever umap_available is false, and umap_available can only be
        // true when the feature is compiled in.
        Err(VscopeError::Configuration(
            "umap requested but the umap feature is not compiled in".to_string(),
        ))
    }

    /// Persist the fitted model to `path` as JSON.
    ///
    /// The restored projector transforms identically to the pre-save model.
    /// t-SNE models cannot be persisted since they have no `transform`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let model = self.model.as_ref().ok_or(VscopeError::NotFitted)?;
        if matches!(model, FittedModel::Tsne { .. }) {
            return Err(VscopeError::Unsupported(
                "tsne models cannot be persisted (no transform to round-trip)".to_string(),
            ));
        }

        let saved = SavedProjectorRef {
            config: &self.config,
            effective: self.effective,
            input_dims: self.input_dims,
            model,
        };
        let file = std::fs::File::create(path)
            .map_err(|e| VscopeError::Persistence(format!("create failed: {}", e)))?;
        serde_json::to_writer(file, &saved)
            .map_err(|e| VscopeError::Persistence(format!("serialize failed: {}", e)))?;
        Ok(())
    }

    /// Restore a fitted projector previously written by [`Projector::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| VscopeError::Persistence(format!("open failed: {}", e)))?;
        let saved: SavedProjector = serde_json::from_reader(file)
            .map_err(|e| VscopeError::Persistence(format!("deserialize failed: {}", e)))?;
        Ok(Self {
            config: saved.config,
            effective: saved.effective,
            input_dims: saved.input_dims,
            model: Some(saved.model),
        })
    }
}

/// Convert an (N x <=2) f64 matrix into projection points.
///
/// PCA yields fewer than 2 components on rank-deficient input (collinear or
/// duplicate vectors); missing components are padded with 0.0 so such
/// corpora still project to a valid, if flat, 2D space.
fn to_points(coords: &Array2<f64>) -> Vec<Point2> {
    coords
        .rows()
        .into_iter()
        .map(|r| {
            [
                r.get(0).copied().unwrap_or(0.0) as f32,
                r.get(1).copied().unwrap_or(0.0) as f32,
            ]
        })
        .collect()
}

/// Nearest-fitted-point lookup used by the umap transform approximation.
/// Ties are broken by ascending training index.
#[cfg(feature = "umap")]
fn nearest_fitted_points(
    train: &[Vec<f32>],
    embedded: &[Point2],
    data: ArrayView2<'_, f32>,
) -> Vec<Point2> {
    data.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0usize;
            let mut best_dist = f32::INFINITY;
            for (i, t) in train.iter().enumerate() {
                let dist: f32 = row
                    .iter()
                    .zip(t.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                if dist < best_dist {
                    best_dist = dist;
                    best = i;
                }
            }
            embedded[best]
        })
        .collect()
}
