use super::borders::trace_external;
use super::edges::canny;
use super::preprocess::Preprocessor;
use super::types::{ContourSet, EdgeMap, SegmentError, Segmenter};
use crate::tile::Tile;
use serde::{Deserialize, Serialize};

/// Smallest tile the 3x3 Sobel stencil can run over
pub const MIN_CONTOUR_SIDE: u32 = 3;

/// Largest accepted blur kernel; wider kernels only flatten a 640px tile
pub const MAX_BLUR_KERNEL: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    /// Gaussian kernel size; odd, between 1 and [`MAX_BLUR_KERNEL`]
    pub blur_kernel: usize,
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            low_threshold: 50.0,
            high_threshold: 150.0,
        }
    }
}

impl ContourParams {
    fn validate(&self) -> Result<(), SegmentError> {
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(SegmentError::InvalidParameter(format!(
                "blur kernel must be odd and at least 1, got {}",
                self.blur_kernel
            )));
        }
        if self.blur_kernel > MAX_BLUR_KERNEL {
            return Err(SegmentError::InvalidParameter(format!(
                "blur kernel {} exceeds the maximum of {}",
                self.blur_kernel, MAX_BLUR_KERNEL
            )));
        }
        let (low, high) = (self.low_threshold, self.high_threshold);
        if !low.is_finite() || !high.is_finite() || low < 0.0 {
            return Err(SegmentError::InvalidParameter(format!(
                "thresholds must be finite and non-negative, got {}/{}",
                low, high
            )));
        }
        if low >= high {
            return Err(SegmentError::InvalidParameter(format!(
                "low threshold {} must be below high threshold {}",
                low, high
            )));
        }
        Ok(())
    }
}

/// Edge/contour strategy producing a [`ContourSet`]
///
/// Purely morphological: colour is discarded and texture (waves, shadows)
/// over-segments. Complements the clustering mask rather than replacing it.
#[derive(Debug, Clone, Default)]
pub struct ContourSegmenter {
    pub params: ContourParams,
}

impl ContourSegmenter {
    pub fn new(params: ContourParams) -> Self {
        Self { params }
    }
}

impl Segmenter for ContourSegmenter {
    type Output = ContourSet;

    fn segment(&self, tile: &Tile) -> Result<ContourSet, SegmentError> {
        segment_by_contour(tile, &self.params)
    }

    fn name(&self) -> &'static str {
        "contour"
    }
}

/// Canny edge map of the tile after luma conversion and blurring
pub fn detect_edges(tile: &Tile, params: &ContourParams) -> Result<EdgeMap, SegmentError> {
    params.validate()?;
    if tile.width() < MIN_CONTOUR_SIDE || tile.height() < MIN_CONTOUR_SIDE {
        return Err(SegmentError::InvalidInput(format!(
            "{}x{} tile is smaller than the {}x{} gradient stencil",
            tile.width(),
            tile.height(),
            MIN_CONTOUR_SIDE,
            MIN_CONTOUR_SIDE
        )));
    }

    let intensity = Preprocessor::new(params.blur_kernel).preprocess(tile.image());
    Ok(canny(&intensity, params.low_threshold, params.high_threshold))
}

/// Outermost boundaries of the tile's edge map, in discovery order
pub fn segment_by_contour(tile: &Tile, params: &ContourParams) -> Result<ContourSet, SegmentError> {
    let _span = tracing::debug_span!("contour", tile = %tile.label()).entered();

    let edges = detect_edges(tile, params)?;
    let contours = trace_external(&edges);

    tracing::debug!(
        "{} edge pixel(s), {} contour(s)",
        edges.edge_count(),
        contours.len()
    );
    Ok(contours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Point;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn textured_tile(w: u32, h: u32, seed: u64) -> Tile {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut img = RgbImage::new(w, h);
        for (x, y, px) in img.enumerate_pixels_mut() {
            // Blocky shapes plus noise so several thresholds bite differently
            let block = ((x / 6) + (y / 5)) % 3;
            let base = [40u8, 120, 210][block as usize];
            let noise: i16 = rng.gen_range(-25..=25);
            let v = (base as i16 + noise).clamp(0, 255) as u8;
            *px = Rgb([v, v.saturating_sub(10), v / 2]);
        }
        Tile::new(img).unwrap()
    }

    #[test]
    fn black_tile_has_no_contours() {
        let tile = Tile::new(RgbImage::new(8, 8)).unwrap();
        let set = segment_by_contour(&tile, &ContourParams::default()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn bright_square_is_outlined() {
        let img = RgbImage::from_fn(32, 32, |x, y| {
            if (10..22).contains(&x) && (10..22).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let tile = Tile::new(img).unwrap();
        let set = segment_by_contour(&tile, &ContourParams::default()).unwrap();

        assert!(!set.is_empty());
        for p in set.iter().flat_map(|c| c.points.iter()) {
            assert!((6..26).contains(&p.x) && (6..26).contains(&p.y), "{:?}", p);
        }

        // The outline spans the square in both directions.
        let all: Vec<_> = set.iter().flat_map(|c| c.points.iter()).collect();
        let span = |coord: fn(&Point) -> i32| {
            let max = all.iter().map(|p| coord(p)).max().unwrap();
            let min = all.iter().map(|p| coord(p)).min().unwrap();
            max - min
        };
        let (span_x, span_y) = (span(|p| p.x), span(|p| p.y));
        assert!(span_x >= 10 && span_y >= 10, "spans {}x{}", span_x, span_y);
    }

    #[test]
    fn rings_are_well_formed_for_valid_parameters() {
        let tile = textured_tile(48, 40, 17);
        for blur_kernel in [1, 3, 5, 7, 9] {
            for (low, high) in [(0.0, 1.0), (20.0, 60.0), (50.0, 150.0), (100.0, 400.0)] {
                let params = ContourParams {
                    blur_kernel,
                    low_threshold: low,
                    high_threshold: high,
                };
                let set = segment_by_contour(&tile, &params).unwrap();
                for ring in &set {
                    assert!(ring.len() >= 3, "kernel {} thresholds {}/{}", blur_kernel, low, high);
                    for p in &ring.points {
                        assert!(p.x >= 0 && p.y >= 0 && p.x < 48 && p.y < 40);
                    }
                }
            }
        }
    }

    #[test]
    fn raising_high_threshold_never_adds_edges() {
        let tile = textured_tile(40, 40, 23);
        let mut previous = usize::MAX;
        for high in [60.0, 90.0, 150.0, 250.0, 400.0, 800.0] {
            let params = ContourParams {
                blur_kernel: 3,
                low_threshold: 40.0,
                high_threshold: high,
            };
            let count = detect_edges(&tile, &params).unwrap().edge_count();
            assert!(count <= previous, "high {} gave {} > {}", high, count, previous);
            previous = count;
        }
    }

    #[test]
    fn single_pixel_tile_is_invalid() {
        let tile = Tile::new(RgbImage::new(1, 1)).unwrap();
        let err = segment_by_contour(&tile, &ContourParams::default()).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidInput(_)));
    }

    #[test]
    fn bad_parameters_are_rejected() {
        let tile = Tile::new(RgbImage::new(8, 8)).unwrap();
        let cases = [
            ContourParams {
                blur_kernel: 4,
                ..ContourParams::default()
            },
            ContourParams {
                blur_kernel: 0,
                ..ContourParams::default()
            },
            ContourParams {
                low_threshold: 150.0,
                high_threshold: 150.0,
                ..ContourParams::default()
            },
            ContourParams {
                low_threshold: 200.0,
                high_threshold: 100.0,
                ..ContourParams::default()
            },
            ContourParams {
                low_threshold: -1.0,
                ..ContourParams::default()
            },
        ];
        for params in cases {
            let err = segment_by_contour(&tile, &params).unwrap_err();
            assert!(matches!(err, SegmentError::InvalidParameter(_)), "{:?}", params);
        }
    }

    #[test]
    fn oversized_blur_kernel_is_rejected() {
        let tile = Tile::new(RgbImage::new(8, 8)).unwrap();
        for blur_kernel in [MAX_BLUR_KERNEL + 2, usize::MAX] {
            let params = ContourParams {
                blur_kernel,
                ..ContourParams::default()
            };
            let err = segment_by_contour(&tile, &params).unwrap_err();
            assert!(matches!(err, SegmentError::InvalidParameter(_)), "{}", blur_kernel);
        }

        // The largest accepted kernel still runs on a tile far smaller than it
        let params = ContourParams {
            blur_kernel: MAX_BLUR_KERNEL,
            ..ContourParams::default()
        };
        assert!(segment_by_contour(&tile, &params).unwrap().is_empty());
    }
}
