use super::ReportSink;
use crate::segmentation::{ClusteringOutcome, ContourSet, RunParams};
use crate::tile::Tile;
use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Writes PNG panels and JSON contour exports into one directory
pub struct PngReportSink {
    out_dir: PathBuf,
}

impl PngReportSink {
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create report directory {}", out_dir.display()))?;
        tracing::info!("Writing reports to {}", out_dir.display());
        Ok(Self { out_dir })
    }

    fn path(&self, tile: &Tile, suffix: &str) -> PathBuf {
        let stem = tile
            .id()
            .map(|id| id.file_stem())
            .unwrap_or_else(|| "tile".to_string());
        self.out_dir.join(format!("{}_{}", stem, suffix))
    }
}

impl ReportSink for PngReportSink {
    fn write_clustering(
        &mut self,
        tile: &Tile,
        outcome: &ClusteringOutcome,
    ) -> Result<Vec<PathBuf>> {
        let panels_path = self.path(tile, "cluster.png");
        clustering_panels(tile, outcome)
            .save(&panels_path)
            .with_context(|| format!("Failed to write {}", panels_path.display()))?;

        let mask_path = self.path(tile, "mask.png");
        outcome
            .mask
            .as_image()
            .save(&mask_path)
            .with_context(|| format!("Failed to write {}", mask_path.display()))?;

        tracing::info!("Wrote {} and {}", panels_path.display(), mask_path.display());
        Ok(vec![panels_path, mask_path])
    }

    fn write_contours(&mut self, tile: &Tile, contours: &ContourSet) -> Result<Vec<PathBuf>> {
        let panels_path = self.path(tile, "contours.png");
        contour_panels(tile, contours)
            .save(&panels_path)
            .with_context(|| format!("Failed to write {}", panels_path.display()))?;

        let json_path = self.path(tile, "contours.json");
        write_json(&json_path, contours)?;

        tracing::info!("Wrote {} and {}", panels_path.display(), json_path.display());
        Ok(vec![panels_path, json_path])
    }

    fn write_params(&mut self, tile: &Tile, params: &RunParams) -> Result<PathBuf> {
        let path = self.path(tile, "params.json");
        write_json(&path, params)?;
        tracing::debug!("Recorded {:?} parameters in {}", params.strategy(), path.display());
        Ok(path)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Original | label map | river mask, side by side
pub fn clustering_panels(tile: &Tile, outcome: &ClusteringOutcome) -> RgbImage {
    let (width, height) = tile.dimensions();
    let k = outcome.centroids.len().max(2) - 1;

    let labels = RgbImage::from_fn(width, height, |x, y| {
        let label = outcome.labels[(y * width + x) as usize];
        let v = (label * 255 / k) as u8;
        Rgb([v, v, v])
    });
    let mask = RgbImage::from_fn(width, height, |x, y| {
        let v = outcome.mask.get(x, y);
        Rgb([v, v, v])
    });

    side_by_side(&[tile.image(), &labels, &mask])
}

/// Tile with every contour ring drawn in green, two pixels wide
pub fn contour_overlay(tile: &Tile, contours: &ContourSet) -> RgbImage {
    let mut canvas = tile.image().clone();
    for contour in contours {
        let n = contour.points.len();
        for i in 0..n {
            let a = contour.points[i];
            let b = contour.points[(i + 1) % n];
            for (ox, oy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
                draw_line_segment_mut(
                    &mut canvas,
                    (a.x as f32 + ox, a.y as f32 + oy),
                    (b.x as f32 + ox, b.y as f32 + oy),
                    CONTOUR_COLOR,
                );
            }
        }
    }
    canvas
}

/// Original | contour overlay
pub fn contour_panels(tile: &Tile, contours: &ContourSet) -> RgbImage {
    let overlay = contour_overlay(tile, contours);
    side_by_side(&[tile.image(), &overlay])
}

fn side_by_side(panels: &[&RgbImage]) -> RgbImage {
    let width = panels.iter().map(|p| p.width()).sum();
    let height = panels.iter().map(|p| p.height()).max().unwrap_or(0);
    let mut out = RgbImage::new(width, height);

    let mut x: i64 = 0;
    for panel in panels {
        imageops::replace(&mut out, *panel, x, 0);
        x += panel.width() as i64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::{cluster_tile, ClusteringParams, Contour, ContourParams, Point};
    use crate::tile::TileId;

    fn split_tile() -> Tile {
        let img = RgbImage::from_fn(4, 4, |x, _| {
            if x < 2 {
                Rgb([0, 0, 255])
            } else {
                Rgb([0, 255, 0])
            }
        });
        Tile::new(img).unwrap().with_id(TileId::Label("split".into()))
    }

    #[test]
    fn clustering_panels_are_three_tiles_wide() {
        let tile = split_tile();
        let outcome = cluster_tile(&tile, &ClusteringParams::seeded(0)).unwrap();
        let panels = clustering_panels(&tile, &outcome);

        assert_eq!(panels.dimensions(), (12, 4));
        assert_eq!(panels.get_pixel(0, 0).0, [0, 0, 255]);
        // Mask panel starts at x = 8; left half is river.
        assert_eq!(panels.get_pixel(8, 0).0, [255, 255, 255]);
        assert_eq!(panels.get_pixel(11, 0).0, [0, 0, 0]);
    }

    #[test]
    fn overlay_draws_ring_in_green() {
        let tile = Tile::new(RgbImage::new(10, 10)).unwrap();
        let set = ContourSet {
            contours: vec![Contour::new(vec![
                Point::new(2, 2),
                Point::new(2, 6),
                Point::new(6, 6),
                Point::new(6, 2),
            ])],
        };
        let overlay = contour_overlay(&tile, &set);
        assert_eq!(overlay.get_pixel(2, 4).0, [0, 255, 0]);
        assert_eq!(overlay.get_pixel(4, 6).0, [0, 255, 0]);
        assert_eq!(overlay.get_pixel(4, 4).0, [0, 0, 0]);
        assert_eq!(contour_panels(&tile, &set).dimensions(), (20, 10));
    }

    #[test]
    fn sink_writes_panels_mask_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngReportSink::new(dir.path().join("reports")).unwrap();
        let tile = split_tile();

        let outcome = cluster_tile(&tile, &ClusteringParams::seeded(0)).unwrap();
        let written = sink.write_clustering(&tile, &outcome).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));

        let mask = image::open(&written[1]).unwrap().to_luma8();
        assert_eq!(mask.as_raw(), outcome.mask.as_raw());

        let set = ContourSet {
            contours: vec![Contour::new(vec![
                Point::new(0, 0),
                Point::new(0, 3),
                Point::new(3, 3),
            ])],
        };
        let written = sink.write_contours(&tile, &set).unwrap();
        let json = fs::read_to_string(&written[1]).unwrap();
        assert_eq!(json, "[[[0,0],[0,3],[3,3]]]");
        assert!(written[0].ends_with("split_contours.png"));
    }

    #[test]
    fn sink_records_run_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngReportSink::new(dir.path()).unwrap();
        let tile = split_tile();

        let params = RunParams::Cluster(ClusteringParams {
            k: 3,
            attempts: 2,
            ..ClusteringParams::seeded(42)
        });
        let path = sink.write_params(&tile, &params).unwrap();
        assert!(path.ends_with("split_params.json"));

        let json = fs::read_to_string(&path).unwrap();
        assert!(json.starts_with(r#"{"strategy":"cluster","params":{"k":3,"seed":42"#));
        let back: RunParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);

        let contour = RunParams::Contour(ContourParams::default());
        let path = sink.write_params(&tile, &contour).unwrap();
        let back: RunParams = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.strategy(), crate::segmentation::Strategy::Contour);
    }
}
