mod file_source;
mod http;
pub mod metadata;
mod route;
mod static_maps;

pub use file_source::{load_tile, png_files_in, save_tile, FileTileSource};
pub use http::{HttpClient, ReqwestClient};
pub use metadata::ImageryMetadata;
pub use route::{fetch_route, load_coordinates, read_coordinates, RouteFetch};
pub use static_maps::{crop_attribution, StaticMapsSource};

use crate::segmentation::SegmentError;
use anyhow::Result;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default tile edge length in pixels
pub const DEFAULT_TILE_SIZE: u32 = 640;

/// Geographic centre of a tile, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Request for one north-up tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRequest {
    pub center: LatLon,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
}

impl TileRequest {
    pub fn new(lat: f64, lon: f64, zoom: u8) -> Self {
        Self {
            center: LatLon { lat, lon },
            zoom,
            width: DEFAULT_TILE_SIZE,
            height: DEFAULT_TILE_SIZE,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn id(&self) -> TileId {
        TileId::Coordinates {
            lat: self.center.lat,
            lon: self.center.lon,
            zoom: self.zoom,
        }
    }

    pub fn metadata(&self) -> ImageryMetadata {
        ImageryMetadata::calculate(self.center.lat, self.zoom, (self.width, self.height))
    }
}

/// Identity threaded through logs, errors, and report names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TileId {
    Coordinates { lat: f64, lon: f64, zoom: u8 },
    Label(String),
}

impl TileId {
    /// Name safe for use as a file stem
    pub fn file_stem(&self) -> String {
        match self {
            TileId::Coordinates { lat, lon, zoom } => format!("{:.6}_{:.6}_z{}", lat, lon, zoom),
            TileId::Label(label) => label
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileId::Coordinates { lat, lon, zoom } => write!(f, "{:.6},{:.6}@z{}", lat, lon, zoom),
            TileId::Label(label) => f.write_str(label),
        }
    }
}

/// One RGB raster handed to the segmenters
///
/// Always non-empty and three-channel; construction rejects anything else.
#[derive(Debug, Clone)]
pub struct Tile {
    id: Option<TileId>,
    image: RgbImage,
}

impl Tile {
    pub fn new(image: RgbImage) -> Result<Self, SegmentError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SegmentError::InvalidInput(format!(
                "empty tile ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { id: None, image })
    }

    /// Build from interleaved RGB bytes, row-major
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, SegmentError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(SegmentError::InvalidInput(format!(
                "buffer holds {} bytes, {}x{} RGB needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| SegmentError::InvalidInput("buffer does not fit dimensions".into()))?;
        Self::new(image)
    }

    /// Accepts any colour raster; alpha is dropped, grey inputs are rejected
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, SegmentError> {
        let color = image.color();
        if !color.has_color() {
            return Err(SegmentError::InvalidInput(format!(
                "expected 3 colour channels, got {:?} ({} channel(s))",
                color,
                color.channel_count()
            )));
        }
        Self::new(image.into_rgb8())
    }

    pub fn with_id(mut self, id: TileId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<&TileId> {
        self.id.as_ref()
    }

    /// Display name, falling back to "tile" for anonymous rasters
    pub fn label(&self) -> String {
        self.id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "tile".to_string())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> usize {
        self.image.width() as usize * self.image.height() as usize
    }
}

/// Trait for imagery providers
/// Each provider owns its clients; nothing is held in globals.
pub trait TileSource {
    /// Fetch a single tile for the request's centre, zoom, and size
    fn fetch_tile(&self, request: &TileRequest) -> Result<Tile>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbaImage};

    #[test]
    fn empty_tile_is_rejected() {
        let err = Tile::new(RgbImage::new(0, 4)).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidInput(_)));
    }

    #[test]
    fn raw_buffer_length_is_checked() {
        assert!(Tile::from_raw(2, 2, vec![0; 12]).is_ok());
        let err = Tile::from_raw(2, 2, vec![0; 11]).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidInput(_)));
    }

    #[test]
    fn grey_rasters_are_rejected() {
        let grey = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let err = Tile::from_dynamic(grey).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidInput(_)));
    }

    #[test]
    fn rgba_drops_alpha() {
        let rgba = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 0]));
        let tile = Tile::from_dynamic(DynamicImage::ImageRgba8(rgba)).unwrap();
        assert_eq!(tile.dimensions(), (3, 2));
        assert_eq!(tile.image().get_pixel(2, 1).0, [10, 20, 30]);
    }

    #[test]
    fn coordinate_ids_format_for_display_and_files() {
        let id = TileRequest::new(51.378516, -2.328945, 18).id();
        assert_eq!(id.to_string(), "51.378516,-2.328945@z18");
        assert_eq!(id.file_stem(), "51.378516_-2.328945_z18");
        assert_eq!(TileId::Label("a b/c".into()).file_stem(), "a_b_c");
    }
}
