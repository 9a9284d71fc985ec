//! vscope core engine
//!
//! Ingests embeddings from a vector store, projects them into a 2D visual
//! space, clusters them, and evaluates how well a query's retrieval result
//! covers the relevant neighborhood of that space. A diagnostic lens for
//! retrieval-augmented systems: what does the index actually look like, and
//! did retrieval miss obviously-close documents?
//!
//! # Pipeline
//!
//! ```rust
//! use ndarray::Array2;
//! use vscope_core::{
//!     ClusterAnalyzer, ClusterConfig, MemoryConnector, ProjectionMethod, Projector,
//!     ProjectorConfig, Session,
//! };
//!
//! # fn main() -> vscope_core::Result<()> {
//! // 12 three-dimensional vectors in three groups
//! let embeddings = Array2::from_shape_fn((12, 3), |(i, j)| {
//!     if i / 4 == j { 1.0 + (i % 4) as f32 * 0.01 } else { 0.0 }
//! });
//!
//! let mut session = Session::new(
//!     MemoryConnector::new(embeddings),
//!     Projector::new(ProjectorConfig::with_method(ProjectionMethod::Pca)),
//!     ClusterAnalyzer::new(ClusterConfig { n_clusters: 3, ..ClusterConfig::default() }),
//! );
//!
//! session.ingest(12)?;
//! let galaxy = session.visualize("Vector Space Map")?;
//! assert_eq!(galaxy.n_points(), 12);
//!
//! let query = ndarray::array![1.0f32, 0.0, 0.0];
//! let (trace, _scene) = session.trace("first group", query.view(), 3, None)?;
//! assert!(trace.quality_score > 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! Rendering scenes to interactive figures lives in `vscope-render`; the
//! persistent sqlite-backed connector lives in `vscope-sqlite`.

pub mod cluster;
pub mod connector;
pub mod error;
pub mod metrics;
pub mod projector;
pub mod scene;
pub mod session;

pub use cluster::{ClusterAnalyzer, ClusterConfig, ClusterDensity, ClusterMethod, NOISE_LABEL};
pub use connector::{ConnectorError, ConnectorResult, MemoryConnector, Metadata, VectorConnector};
pub use error::{Result, VscopeError};
pub use projector::{umap_supported, Point2, ProjectionMethod, Projector, ProjectorConfig};
pub use scene::{GroupRole, PointGroup, Scene};
pub use session::{Session, Snapshot, TraceResult};
