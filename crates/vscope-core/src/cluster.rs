//! Clustering of projected points
//!
//! Partitions the 2D projection of an ingested snapshot into cluster labels.
//! Two methods: centroid-based fixed-k partitioning (k-means) and
//! density-based partitioning (DBSCAN) where unassigned points get the noise
//! label `-1`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use linfa::traits::{Fit, Predict, Transformer};
use linfa::DatasetBase;
use linfa_clustering::{Dbscan, KMeans};
use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VscopeError};
use crate::projector::Point2;

/// Label assigned to points no density-based cluster claims.
pub const NOISE_LABEL: i32 = -1;

/// Clustering method, selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMethod {
    /// Centroid-based fixed-k partitioning
    KMeans,
    /// Density-based partitioning with a noise sentinel
    Dbscan,
}

impl FromStr for ClusterMethod {
    type Err = VscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kmeans" => Ok(Self::KMeans),
            "dbscan" => Ok(Self::Dbscan),
            other => Err(VscopeError::Configuration(format!(
                "unknown clustering method '{}', expected one of: kmeans, dbscan",
                other
            ))),
        }
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KMeans => write!(f, "kmeans"),
            Self::Dbscan => write!(f, "dbscan"),
        }
    }
}

/// Cluster analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Clustering method
    pub method: ClusterMethod,
    /// Cluster count for k-means; must satisfy `0 < n_clusters <= n_points`
    pub n_clusters: usize,
    /// DBSCAN neighborhood radius
    pub eps: f64,
    /// DBSCAN minimum neighborhood size
    pub min_samples: usize,
    /// Seed for k-means centroid initialization
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            method: ClusterMethod::KMeans,
            n_clusters: 5,
            eps: 0.5,
            min_samples: 5,
            seed: 51,
        }
    }
}

/// Per-cluster density statistics (see [`ClusterAnalyzer::density`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDensity {
    /// Mean member distance to the cluster centroid
    pub mean_distance: f64,
    /// Population standard deviation of those distances
    pub std_distance: f64,
    /// Member count
    pub size: usize,
}

/// Partitions 2D points into cluster labels.
#[derive(Debug, Clone)]
pub struct ClusterAnalyzer {
    config: ClusterConfig,
}

impl ClusterAnalyzer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// Cluster `points` and return one label per point.
    ///
    /// K-means labels are `0..n_clusters`; DBSCAN labels are `0..k` with
    /// `-1` for noise. Fails with `InvalidArgument` when k-means is asked
    /// for more clusters than there are points (or zero clusters).
    pub fn fit(&self, points: &[Point2]) -> Result<Vec<i32>> {
        if points.is_empty() {
            return Err(VscopeError::InvalidArgument(
                "cannot cluster an empty point set".to_string(),
            ));
        }

        // linfa expects f64 observations
        let records = points_to_records(points);

        let labels = match self.config.method {
            ClusterMethod::KMeans => {
                let k = self.config.n_clusters;
                if k == 0 || k > points.len() {
                    return Err(VscopeError::InvalidArgument(format!(
                        "n_clusters must be in 1..={}, got {}",
                        points.len(),
                        k
                    )));
                }
                let rng = Xoshiro256Plus::seed_from_u64(self.config.seed);
                let dataset = DatasetBase::from(records.clone());
                let model = KMeans::params_with_rng(k, rng)
                    .fit(&dataset)
                    .map_err(|e| VscopeError::Backend(format!("kmeans fit failed: {}", e)))?;
                model
                    .predict(&records)
                    .into_iter()
                    .map(|l| l as i32)
                    .collect::<Vec<i32>>()
            }
            ClusterMethod::Dbscan => {
                let assignments = Dbscan::params(self.config.min_samples)
                    .tolerance(self.config.eps)
                    .transform(&records)
                    .map_err(|e| VscopeError::Backend(format!("dbscan fit failed: {}", e)))?;
                assignments
                    .into_iter()
                    .map(|l| l.map_or(NOISE_LABEL, |c| c as i32))
                    .collect::<Vec<i32>>()
            }
        };

        debug!(
            method = %self.config.method,
            n_points = points.len(),
            n_clusters = labels
                .iter()
                .filter(|&&l| l >= 0)
                .collect::<std::collections::HashSet<_>>()
                .len(),
            "clustering complete"
        );
        Ok(labels)
    }

    /// Density statistics per cluster: mean and standard deviation of member
    /// distances to the cluster's own centroid, plus member count.
    ///
    /// Noise points and clusters with fewer than 2 members contribute no
    /// entry (a singleton has no meaningful spread, not zero spread).
    pub fn density(
        &self,
        points: &[Point2],
        labels: &[i32],
    ) -> Result<BTreeMap<i32, ClusterDensity>> {
        if points.len() != labels.len() {
            return Err(VscopeError::InvalidArgument(format!(
                "labeling length {} does not match point count {}",
                labels.len(),
                points.len()
            )));
        }

        let mut members: BTreeMap<i32, Vec<&Point2>> = BTreeMap::new();
        for (point, &label) in points.iter().zip(labels.iter()) {
            if label == NOISE_LABEL {
                continue;
            }
            members.entry(label).or_default().push(point);
        }

        let mut densities = BTreeMap::new();
        for (label, cluster_points) in members {
            if cluster_points.len() < 2 {
                continue;
            }
            let n = cluster_points.len() as f64;
            let mut centroid = [0.0f64; 2];
            for p in &cluster_points {
                centroid[0] += f64::from(p[0]);
                centroid[1] += f64::from(p[1]);
            }
            centroid[0] /= n;
            centroid[1] /= n;

            let distances: Vec<f64> = cluster_points
                .iter()
                .map(|p| {
                    let dx = f64::from(p[0]) - centroid[0];
                    let dy = f64::from(p[1]) - centroid[1];
                    (dx * dx + dy * dy).sqrt()
                })
                .collect();
            let mean = distances.iter().sum::<f64>() / n;
            let variance = distances.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n;

            densities.insert(
                label,
                ClusterDensity {
                    mean_distance: mean,
                    std_distance: variance.sqrt(),
                    size: cluster_points.len(),
                },
            );
        }
        Ok(densities)
    }
}

fn points_to_records(points: &[Point2]) -> Array2<f64> {
    let mut records = Array2::zeros((points.len(), 2));
    for (i, p) in points.iter().enumerate() {
        records[[i, 0]] = f64::from(p[0]);
        records[[i, 1]] = f64::from(p[1]);
    }
    records
}
