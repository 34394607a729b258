//! River segmentation for satellite / map imagery tiles.
//!
//! Two independent strategies run over one RGB tile: colour clustering
//! yields a binary river mask, edge detection yields outer contour rings.

pub mod batch;
pub mod output;
pub mod segmentation;
pub mod tile;

pub use segmentation::{
    segment_by_clustering, segment_by_contour, ClusteringParams, ContourParams, ContourSet,
    RiverMask, SegmentError,
};
pub use tile::{Tile, TileId, TileRequest, TileSource};
