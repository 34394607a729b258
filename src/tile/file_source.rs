use super::{Tile, TileId, TileRequest, TileSource};
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use std::fs;
use std::path::{Path, PathBuf};

/// Tiles stored on disk as PNG, named `<lat>_<lon>_z<zoom>.png`
pub struct FileTileSource {
    root: PathBuf,
}

impl FileTileSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        tracing::info!("Using tile directory {}", root.display());
        Self { root }
    }

    pub fn path_for(&self, request: &TileRequest) -> PathBuf {
        self.root.join(format!("{}.png", request.id().file_stem()))
    }
}

impl TileSource for FileTileSource {
    fn fetch_tile(&self, request: &TileRequest) -> Result<Tile> {
        let path = self.path_for(request);
        let tile = load_tile(&path)?;

        let tile = if tile.dimensions() != (request.width, request.height) {
            tracing::debug!(
                "Resizing {} from {}x{} to {}x{}",
                path.display(),
                tile.width(),
                tile.height(),
                request.width,
                request.height
            );
            let resized = imageops::resize(
                tile.image(),
                request.width,
                request.height,
                FilterType::Triangle,
            );
            Tile::new(resized)?
        } else {
            tile
        };

        Ok(tile.with_id(request.id()))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Load a tile from disk; its id is the file stem
pub fn load_tile<P: AsRef<Path>>(path: P) -> Result<Tile> {
    let path = path.as_ref();
    let image =
        image::open(path).with_context(|| format!("Failed to read tile {}", path.display()))?;
    let label = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let tile = Tile::from_dynamic(image)
        .with_context(|| format!("Unusable tile {}", path.display()))?;
    Ok(tile.with_id(TileId::Label(label)))
}

/// Save losslessly; PNG keeps colours intact for clustering
pub fn save_tile<P: AsRef<Path>>(tile: &Tile, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tile.image()
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write tile {}", path.display()))?;
    Ok(())
}

/// PNG files directly inside `dir`, sorted by name
pub fn png_files_in<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if path.is_file() && is_png {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn fetch_resolves_coordinate_file_name_and_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileTileSource::new(dir.path());
        let request = TileRequest::new(51.38305, -2.357887, 18).with_size(8, 8);

        let stored = Tile::new(RgbImage::from_pixel(16, 16, Rgb([0, 0, 200]))).unwrap();
        save_tile(&stored, source.path_for(&request)).unwrap();

        let tile = source.fetch_tile(&request).unwrap();
        assert_eq!(tile.dimensions(), (8, 8));
        assert_eq!(tile.id(), Some(&request.id()));
        assert_eq!(tile.image().get_pixel(4, 4).0, [0, 0, 200]);
    }

    #[test]
    fn missing_tile_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileTileSource::new(dir.path());
        let err = source.fetch_tile(&TileRequest::new(0.0, 0.0, 1)).unwrap_err();
        assert!(format!("{:#}", err).contains("0.000000_0.000000_z1.png"));
    }

    #[test]
    fn lists_only_png_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tile = Tile::new(RgbImage::new(2, 2)).unwrap();
        save_tile(&tile, dir.path().join("b.png")).unwrap();
        save_tile(&tile, dir.path().join("a.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = png_files_in(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.png", "b.png"]);

        let loaded = load_tile(&files[0]).unwrap();
        assert_eq!(loaded.id(), Some(&TileId::Label("a".into())));
    }
}
