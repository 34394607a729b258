//! Ground footprint of a Web-Mercator tile.
//!
//! Single implementation shared by every imagery provider and the CLI.

use serde::Serialize;

/// Metres per pixel at zoom 0 on the equator
const EQUATOR_METERS_PER_PIXEL: f64 = 156_543.033_92;
const R_MAJOR: f64 = 6_378_137.0;
const R_MINOR: f64 = 6_356_752.314_2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageryMetadata {
    pub meters_per_pixel: f64,
    pub width_meters: f64,
    pub height_meters: f64,
    pub area_square_meters: f64,
}

impl ImageryMetadata {
    /// Footprint of a `size` (width, height) tile centred at `latitude`.
    ///
    /// The Mercator scale `cos(lat) / 2^zoom` is corrected by the ellipsoid
    /// factor `sqrt(1 - (b/a · sin(lat))²)`.
    pub fn calculate(latitude: f64, zoom: u8, size: (u32, u32)) -> Self {
        let ratio = R_MINOR / R_MAJOR;
        let lat = latitude.to_radians();

        let mut meters_per_pixel = EQUATOR_METERS_PER_PIXEL * lat.cos() / 2f64.powi(zoom as i32);
        meters_per_pixel *= (1.0 - (ratio * lat.sin()).powi(2)).sqrt();

        let width_meters = meters_per_pixel * size.0 as f64;
        let height_meters = meters_per_pixel * size.1 as f64;

        Self {
            meters_per_pixel,
            width_meters,
            height_meters,
            area_square_meters: width_meters * height_meters,
        }
    }
}
