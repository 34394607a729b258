use super::{HttpClient, Tile, TileRequest, TileSource};
use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

const BASE_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";

/// Rows of attribution text appended below the map at scale 1
pub const ATTRIBUTION_ROWS: u32 = 40;

pub const MAX_ZOOM: u8 = 21;

/// Satellite tiles from a Static Maps endpoint
///
/// The HTTP client and key are supplied by the caller; the source holds no
/// process-wide state.
pub struct StaticMapsSource<C> {
    client: C,
    api_key: String,
    base_url: String,
    scale: u32,
}

impl<C: HttpClient> StaticMapsSource<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("Static Maps API key is empty");
        }
        Ok(Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
            scale: 2,
        })
    }

    /// Pixel density multiplier requested from the service (1 or 2)
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale.clamp(1, 2);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request URL; the size is padded so the attribution strip can be cut off
    pub fn request_url(&self, request: &TileRequest) -> String {
        let zoom = request.zoom.min(MAX_ZOOM);
        format!(
            "{}?center={},{}&zoom={}&size={}x{}&maptype=satellite&scale={}&key={}",
            self.base_url,
            request.center.lat,
            request.center.lon,
            zoom,
            request.width,
            request.height + ATTRIBUTION_ROWS,
            self.scale,
            self.api_key
        )
    }
}

impl<C: HttpClient> TileSource for StaticMapsSource<C> {
    fn fetch_tile(&self, request: &TileRequest) -> Result<Tile> {
        let id = request.id();
        tracing::info!("Fetching satellite tile {} ({}x{})", id, request.width, request.height);

        let body = self
            .client
            .get(&self.request_url(request))
            .with_context(|| format!("Failed to fetch tile {}", id))?;

        let decoded = image::load_from_memory(&body)
            .with_context(|| format!("Failed to decode tile {}", id))?;
        let tile = Tile::from_dynamic(decoded)?;

        let cropped = crop_attribution(
            tile.image(),
            ATTRIBUTION_ROWS * self.scale,
            request.width,
            request.height,
        )?;

        let meta = request.metadata();
        tracing::debug!(
            "Tile {}: {:.2} m/px, {:.1}x{:.1} m",
            id,
            meta.meters_per_pixel,
            meta.width_meters,
            meta.height_meters
        );

        Ok(Tile::new(cropped)?.with_id(id))
    }

    fn name(&self) -> &str {
        "static-maps"
    }
}

/// Cut `rows` off the bottom and resize to the target tile size
pub fn crop_attribution(image: &RgbImage, rows: u32, width: u32, height: u32) -> Result<RgbImage> {
    let (w, h) = image.dimensions();
    if h <= rows {
        bail!("Image of height {} is too small to drop {} attribution rows", h, rows);
    }

    let cropped = imageops::crop_imm(image, 0, 0, w, h - rows).to_image();
    if cropped.dimensions() == (width, height) {
        return Ok(cropped);
    }
    Ok(imageops::resize(&cropped, width, height, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct FakeClient {
        body: Vec<u8>,
        seen: Mutex<Vec<String>>,
    }

    impl HttpClient for FakeClient {
        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.seen.lock().unwrap().push(url.to_string());
            Ok(self.body.clone())
        }
    }

    /// Blue map area with a red attribution strip at the bottom
    fn service_png(width: u32, height: u32, scale: u32) -> Vec<u8> {
        let strip = ATTRIBUTION_ROWS * scale;
        let total = height * scale + strip;
        let img = RgbImage::from_fn(width * scale, total, |_, y| {
            if y >= total - strip {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn url_clamps_zoom_and_pads_height() {
        let client = FakeClient {
            body: Vec::new(),
            seen: Mutex::new(Vec::new()),
        };
        let source = StaticMapsSource::new(client, "KEY").unwrap();
        let url = source.request_url(&TileRequest::new(51.5, -2.5, 25));
        assert!(url.contains("center=51.5,-2.5"));
        assert!(url.contains("zoom=21"));
        assert!(url.contains("size=640x680"));
        assert!(url.contains("maptype=satellite"));
        assert!(url.ends_with("key=KEY"));
    }

    #[test]
    fn empty_key_is_a_configuration_error() {
        let client = FakeClient {
            body: Vec::new(),
            seen: Mutex::new(Vec::new()),
        };
        assert!(StaticMapsSource::new(client, "  ").is_err());
    }

    #[test]
    fn fetch_crops_attribution_and_resizes() {
        let client = FakeClient {
            body: service_png(32, 32, 2),
            seen: Mutex::new(Vec::new()),
        };
        let source = StaticMapsSource::new(client, "KEY").unwrap().with_scale(2);
        let request = TileRequest::new(51.38, -2.33, 18).with_size(32, 32);

        let tile = source.fetch_tile(&request).unwrap();
        assert_eq!(tile.dimensions(), (32, 32));
        assert_eq!(tile.id(), Some(&request.id()));
        assert!(tile.image().pixels().all(|p| p.0 == [0, 0, 255]));
        assert_eq!(source.client.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn undecodable_body_fails() {
        let client = FakeClient {
            body: b"not an image".to_vec(),
            seen: Mutex::new(Vec::new()),
        };
        let source = StaticMapsSource::new(client, "KEY").unwrap();
        assert!(source.fetch_tile(&TileRequest::new(0.0, 0.0, 10)).is_err());
    }

    #[test]
    fn crop_rejects_images_smaller_than_strip() {
        let img = RgbImage::new(10, 40);
        assert!(crop_attribution(&img, 40, 10, 10).is_err());
    }
}
