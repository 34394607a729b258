mod png_report;

pub use png_report::{clustering_panels, contour_overlay, contour_panels, PngReportSink};

use crate::segmentation::{ClusteringOutcome, ContourSet, RunParams};
use crate::tile::Tile;
use anyhow::Result;
use std::path::PathBuf;

/// Trait for report destinations
/// Reports are for visual inspection; nothing downstream parses the images.
pub trait ReportSink {
    /// Write the clustering view (original, label map, mask) for one tile
    fn write_clustering(
        &mut self,
        tile: &Tile,
        outcome: &ClusteringOutcome,
    ) -> Result<Vec<PathBuf>>;

    /// Write the contour overlay and exported polygons for one tile
    fn write_contours(&mut self, tile: &Tile, contours: &ContourSet) -> Result<Vec<PathBuf>>;

    /// Record the parameters the tile was segmented with
    fn write_params(&mut self, tile: &Tile, params: &RunParams) -> Result<PathBuf>;
}
