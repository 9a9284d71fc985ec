//! Renderable view requests
//!
//! A `Scene` is the pure-data description of a figure: labeled point groups
//! with hover text. Building actual figures from it is the render sink's
//! job (see the `vscope-render` crate); no plotting logic lives here.

use serde::{Deserialize, Serialize};

use crate::projector::Point2;

/// Role of a point group within a scene, used by render sinks for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    /// One cluster of the galaxy view (noise clusters carry id -1)
    Cluster(i32),
    /// Non-retrieved, non-missed corpus points in a query analysis
    Background,
    /// Points the retrieval returned
    Retrieved,
    /// Missed opportunities
    Missed,
    /// The query point itself
    Query,
}

/// A named group of 2D points with per-point hover text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointGroup {
    pub name: String,
    pub role: GroupRole,
    pub points: Vec<Point2>,
    pub hover: Vec<String>,
}

/// A renderable scene: a title plus point groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub title: String,
    pub groups: Vec<PointGroup>,
}

impl Scene {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            groups: Vec::new(),
        }
    }

    /// Total point count across all groups.
    pub fn n_points(&self) -> usize {
        self.groups.iter().map(|g| g.points.len()).sum()
    }
}
