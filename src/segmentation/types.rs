use crate::tile::Tile;
use image::{GrayImage, Luma};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure conditions raised synchronously by the segmenters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    /// Malformed, empty, too small, or wrong-channel tile
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Bad cluster count, kernel size, or threshold ordering
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Clustering hit its iteration cap while strict convergence was requested
    #[error("clustering did not converge within {iterations} iterations")]
    ConvergenceFailure { iterations: usize },
}

/// Trait for tile segmentation strategies
/// Allows swapping between clustering and edge/contour heuristics
///
/// Implementations are stateless: every call owns its intermediate buffers,
/// so one segmenter can be shared across a worker pool.
pub trait Segmenter {
    /// What a successful call produces (mask, contours, ...)
    type Output: Send;

    /// Segment one tile
    fn segment(&self, tile: &Tile) -> Result<Self::Output, SegmentError>;

    /// Short strategy name used in logs and report file names
    fn name(&self) -> &'static str;
}

/// Binary raster flagging river pixels: 255 = river, 0 = not river
/// Dimensions match the input tile
#[derive(Debug, Clone, PartialEq)]
pub struct RiverMask {
    image: GrayImage,
}

impl RiverMask {
    pub const RIVER: u8 = 255;

    /// Build a mask from row-major cluster labels
    pub(crate) fn from_labels(width: u32, height: u32, labels: &[usize], river: usize) -> Self {
        let image = GrayImage::from_fn(width, height, |x, y| {
            let idx = (y * width + x) as usize;
            if labels[idx] == river {
                Luma([Self::RIVER])
            } else {
                Luma([0])
            }
        });
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y)[0]
    }

    pub fn is_river(&self, x: u32, y: u32) -> bool {
        self.get(x, y) == Self::RIVER
    }

    pub fn river_pixel_count(&self) -> usize {
        self.image.pixels().filter(|p| p[0] == Self::RIVER).count()
    }

    /// Raw values, row-major
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}

/// Integer pixel coordinate, serialised as `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// One outer boundary ring; the closing edge from last to first point is implicit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Enclosed area in square pixels (shoelace formula over the ring)
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
            })
            .sum();
        twice.abs() as f64 / 2.0
    }
}

/// Ordered outer boundaries in edge-map discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
}

impl ContourSet {
    pub fn len(&self) -> usize {
        self.contours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Contour> {
        self.contours.iter()
    }

    /// Ordering carries no size information; callers after the most
    /// river-like polygon pick it here.
    pub fn largest_by_area(&self) -> Option<&Contour> {
        self.contours
            .iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
    }
}

impl<'a> IntoIterator for &'a ContourSet {
    type Item = &'a Contour;
    type IntoIter = std::slice::Iter<'a, Contour>;

    fn into_iter(self) -> Self::IntoIter {
        self.contours.iter()
    }
}

/// Binary edge map produced by the Canny stage, indexed `[row, col]`
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap {
    pub(crate) edges: Array2<bool>,
}

impl EdgeMap {
    pub fn width(&self) -> u32 {
        self.edges.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.edges.nrows() as u32
    }

    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        self.edges[[y as usize, x as usize]]
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|&&e| e).count()
    }

    /// Edge pixels as 255 on black
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([if self.is_edge(x, y) { 255 } else { 0 }])
        })
    }
}
