//! Render sink for vscope scenes
//!
//! Turns the pure-data `Scene` a session produces into an interactive
//! plotly figure, and wraps it in a thin report that persists to a file or
//! yields the HTML string. No pipeline logic lives here.

use plotly::common::{HoverInfo, Marker, MarkerSymbol, Mode, Title};
use plotly::layout::{Axis, Layout};
use plotly::{Plot, Scatter};
use tracing::info;
use vscope_core::{GroupRole, PointGroup, Scene};

/// Default qualitative palette, cycled by cluster id.
const PALETTE: [&str; 10] = [
    "#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a", "#19d3f3", "#ff6692", "#b6e880",
    "#ff97ff", "#fecb52",
];

const NOISE_COLOR: &str = "#aaaaaa";
const BACKGROUND_COLOR: &str = "#c8c8c8";
const RETRIEVED_COLOR: &str = "#00cc96";
const MISSED_COLOR: &str = "#ef553b";
const QUERY_COLOR: &str = "#222222";

/// Build an interactive figure from a scene.
pub fn render(scene: &Scene) -> Plot {
    let mut plot = Plot::new();
    for group in &scene.groups {
        plot.add_trace(trace_for(group));
    }
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(scene.title.clone()))
            .x_axis(Axis::new().title(Title::with_text("Dimension 1")))
            .y_axis(Axis::new().title(Title::with_text("Dimension 2")))
            .width(1000)
            .height(700),
    );
    plot
}

fn trace_for(group: &PointGroup) -> Box<Scatter<f32, f32>> {
    let xs: Vec<f32> = group.points.iter().map(|p| p[0]).collect();
    let ys: Vec<f32> = group.points.iter().map(|p| p[1]).collect();

    let marker = match group.role {
        GroupRole::Cluster(id) => {
            let color = if id < 0 {
                NOISE_COLOR
            } else {
                PALETTE[id as usize % PALETTE.len()]
            };
            Marker::new().size(8).opacity(0.7).color(color)
        }
        GroupRole::Background => Marker::new().size(5).opacity(0.3).color(BACKGROUND_COLOR),
        GroupRole::Retrieved => Marker::new().size(10).opacity(0.9).color(RETRIEVED_COLOR),
        GroupRole::Missed => Marker::new().size(10).opacity(0.9).color(MISSED_COLOR),
        GroupRole::Query => Marker::new()
            .size(15)
            .opacity(1.0)
            .color(QUERY_COLOR)
            .symbol(MarkerSymbol::Star),
    };

    Scatter::new(xs, ys)
        .mode(Mode::Markers)
        .name(&group.name)
        .text_array(group.hover.clone())
        .hover_info(HoverInfo::Text)
        .marker(marker)
}

/// A rendered figure ready to persist or embed.
pub struct HtmlReport {
    plot: Plot,
    title: String,
}

impl HtmlReport {
    /// Render a scene into a report.
    pub fn new(scene: &Scene) -> Self {
        Self {
            plot: render(scene),
            title: scene.title.clone(),
        }
    }

    /// The report title (the scene title).
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Self-contained HTML for the figure.
    pub fn to_html(&self) -> String {
        self.plot.to_html()
    }

    /// Write the figure to an HTML file.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        std::fs::write(path.as_ref(), self.to_html())?;
        info!(path = %path.as_ref().display(), title = %self.title, "report saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscope_core::{PointGroup, Scene};

    fn sample_scene() -> Scene {
        let mut scene = Scene::new("Vector Space Map");
        scene.groups.push(PointGroup {
            name: "Cluster 0".to_string(),
            role: GroupRole::Cluster(0),
            points: vec![[0.0, 0.0], [1.0, 1.0]],
            hover: vec!["first".to_string(), "second".to_string()],
        });
        scene.groups.push(PointGroup {
            name: "Query".to_string(),
            role: GroupRole::Query,
            points: vec![[0.5, 0.5]],
            hover: vec!["the query".to_string()],
        });
        scene
    }

    #[test]
    fn test_html_contains_title_and_groups() {
        let report = HtmlReport::new(&sample_scene());
        let html = report.to_html();
        assert!(html.contains("Vector Space Map"));
        assert!(html.contains("Cluster 0"));
        assert!(html.contains("the query"));
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        HtmlReport::new(&sample_scene()).save(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Vector Space Map"));
    }

    #[test]
    fn test_noise_cluster_renders() {
        let mut scene = Scene::new("with noise");
        scene.groups.push(PointGroup {
            name: "Noise".to_string(),
            role: GroupRole::Cluster(-1),
            points: vec![[9.0, 9.0]],
            hover: vec!["outlier".to_string()],
        });
        let html = HtmlReport::new(&scene).to_html();
        assert!(html.contains("Noise"));
    }
}
