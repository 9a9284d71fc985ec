//! End-to-end demo: synthetic corpus -> ingest -> galaxy + query reports
//!
//! Run with `cargo run --example galaxy_demo`; writes galaxy.html and
//! query_analysis.html to the current directory.

use ndarray::Array2;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vscope_core::{
    ClusterAnalyzer, ClusterConfig, MemoryConnector, ProjectionMethod, Projector,
    ProjectorConfig, Session,
};
use vscope_render::HtmlReport;

const N_PER_GROUP: usize = 40;
const DIMS: usize = 8;

/// Three noisy groups of unit-ish vectors in 8 dimensions.
fn synthetic_corpus() -> Array2<f32> {
    let mut rng = Xoshiro256Plus::seed_from_u64(7);
    let jitter = Uniform::new(-0.05f32, 0.05);

    Array2::from_shape_fn((3 * N_PER_GROUP, DIMS), |(i, j)| {
        let group = i / N_PER_GROUP;
        let base = if j == group * 2 { 1.0 } else { 0.0 };
        base + jitter.sample(&mut rng)
    })
}

fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let mut session = Session::new(
        MemoryConnector::new(synthetic_corpus()),
        Projector::new(ProjectorConfig::with_method(ProjectionMethod::Pca)),
        ClusterAnalyzer::new(ClusterConfig {
            n_clusters: 3,
            ..ClusterConfig::default()
        }),
    );

    session.ingest(3 * N_PER_GROUP)?;

    let galaxy = session.visualize("Vector Space Map")?;
    HtmlReport::new(&galaxy).save("galaxy.html")?;

    // A query sitting inside the first group
    let mut query = vec![0.0f32; DIMS];
    query[0] = 0.95;
    let query = ndarray::Array1::from(query);

    let (trace, scene) = session.trace("first topic", query.view(), 5, None)?;
    info!(
        quality_score = trace.quality_score,
        n_missed = trace.missed.len(),
        "trace complete"
    );
    HtmlReport::new(&scene).save("query_analysis.html")?;

    Ok(())
}
