mod borders;
pub mod clustering;
pub mod contours;
mod edges;
mod preprocess;
pub mod types;

pub use clustering::{
    cluster_tile, segment_by_clustering, ClusteringOutcome, ClusteringParams, ClusteringSegmenter,
    RiverPolicy,
};
pub use contours::{detect_edges, segment_by_contour, ContourParams, ContourSegmenter};
pub use preprocess::Preprocessor;
pub use types::{Contour, ContourSet, EdgeMap, Point, RiverMask, SegmentError, Segmenter};

use serde::{Deserialize, Serialize};

/// Which segmenter a batch or CLI run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Cluster,
    Contour,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cluster" | "kmeans" => Ok(Strategy::Cluster),
            "contour" | "canny" => Ok(Strategy::Contour),
            other => Err(format!("unknown strategy '{}' (expected cluster or contour)", other)),
        }
    }
}

/// Parameters of one run, recorded next to its reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "params", rename_all = "lowercase")]
pub enum RunParams {
    Cluster(ClusteringParams),
    Contour(ContourParams),
}

impl RunParams {
    pub fn strategy(&self) -> Strategy {
        match self {
            RunParams::Cluster(_) => Strategy::Cluster,
            RunParams::Contour(_) => Strategy::Contour,
        }
    }
}
