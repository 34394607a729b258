//! Points along a river, read from a coordinate table, and the tiles
//! fetched around each of them.

use super::{LatLon, Tile, TileId, TileRequest, TileSource};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One row of a coordinate table
///
/// Accepts `Latitude,Longitude` headers as written by the vector extraction
/// step, as well as the short `lat,lon` forms. Other columns are ignored.
#[derive(Debug, Deserialize)]
struct CoordinateRow {
    #[serde(alias = "Latitude", alias = "lat")]
    latitude: f64,
    #[serde(alias = "Longitude", alias = "lon", alias = "lng")]
    longitude: f64,
}

/// Read WGS84 coordinates from CSV with a header row
pub fn read_coordinates<R: Read>(reader: R) -> Result<Vec<LatLon>> {
    let mut table = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut points = Vec::new();
    for (i, row) in table.deserialize::<CoordinateRow>().enumerate() {
        // Line numbers count the header
        let line = i + 2;
        let row = row.with_context(|| format!("Bad coordinate row on line {}", line))?;
        let in_range = (-90.0..=90.0).contains(&row.latitude)
            && (-180.0..=180.0).contains(&row.longitude);
        if !in_range {
            bail!(
                "Coordinate on line {} is out of range: {}, {}",
                line,
                row.latitude,
                row.longitude
            );
        }
        points.push(LatLon {
            lat: row.latitude,
            lon: row.longitude,
        });
    }
    Ok(points)
}

pub fn load_coordinates<P: AsRef<Path>>(path: P) -> Result<Vec<LatLon>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open coordinate file {}", path.display()))?;
    let points = read_coordinates(file)
        .with_context(|| format!("Failed to read coordinates from {}", path.display()))?;
    tracing::info!("Loaded {} coordinate(s) from {}", points.len(), path.display());
    Ok(points)
}

/// Tiles fetched along a route; a failed point never stops the rest
pub struct RouteFetch {
    pub tiles: Vec<Tile>,
    pub failures: Vec<(TileId, anyhow::Error)>,
}

/// Fetch one tile centred on each point, in order
///
/// Requests run one after another so a provider's rate limit sees a single
/// client.
pub fn fetch_route<S: TileSource + ?Sized>(
    source: &S,
    points: &[LatLon],
    zoom: u8,
    size: (u32, u32),
) -> RouteFetch {
    let mut fetched = RouteFetch {
        tiles: Vec::with_capacity(points.len()),
        failures: Vec::new(),
    };

    for point in points {
        let request = TileRequest::new(point.lat, point.lon, zoom).with_size(size.0, size.1);
        match source.fetch_tile(&request) {
            Ok(tile) => fetched.tiles.push(tile),
            Err(e) => {
                let id = request.id();
                tracing::warn!("Failed to fetch {} from {}: {:#}", id, source.name(), e);
                fetched.failures.push((id, e));
            }
        }
    }

    tracing::info!(
        "Fetched {} of {} tile(s) from {}",
        fetched.tiles.len(),
        points.len(),
        source.name()
    );
    fetched
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn reads_exported_river_table() {
        // Leading unnamed index column, as a DataFrame export writes it
        let csv = ",Latitude,Longitude\n\
                   0,51.38304985779056,-2.357886640213137\n\
                   1, 51.3792112971465 , -2.3655278199062546\n";
        let points = read_coordinates(csv.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].lat, 51.38304985779056);
        assert_eq!(points[1].lon, -2.3655278199062546);
    }

    #[test]
    fn reads_short_headers() {
        let points = read_coordinates("lat,lon\n10.5,20.25\n".as_bytes()).unwrap();
        assert_eq!(
            points,
            vec![LatLon {
                lat: 10.5,
                lon: 20.25
            }]
        );
    }

    #[test]
    fn rejects_bad_rows() {
        let err = read_coordinates("lat,lon\n91.0,0.0\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);

        assert!(read_coordinates("lat,lon\n1.0,east\n".as_bytes()).is_err());
        assert!(read_coordinates("name,value\nAvon,1\n".as_bytes()).is_err());
    }

    #[test]
    fn load_coordinates_names_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_coordinates(dir.path().join("none.csv")).unwrap_err();
        assert!(format!("{:#}", err).contains("none.csv"));
    }

    /// Paints every tile blue and refuses points north of 60 degrees
    struct SouthOnly;

    impl TileSource for SouthOnly {
        fn fetch_tile(&self, request: &TileRequest) -> Result<Tile> {
            if request.center.lat > 60.0 {
                bail!("no imagery");
            }
            let image = RgbImage::from_pixel(request.width, request.height, Rgb([0, 0, 200]));
            Ok(Tile::new(image)?.with_id(request.id()))
        }

        fn name(&self) -> &str {
            "south-only"
        }
    }

    #[test]
    fn failed_points_are_skipped_in_order() {
        let points = [
            LatLon {
                lat: 51.38,
                lon: -2.35,
            },
            LatLon {
                lat: 70.0,
                lon: 20.0,
            },
            LatLon {
                lat: 51.37,
                lon: -2.36,
            },
        ];
        let fetched = fetch_route(&SouthOnly, &points, 18, (32, 16));

        assert_eq!(fetched.tiles.len(), 2);
        assert_eq!(fetched.tiles[0].dimensions(), (32, 16));
        assert_eq!(
            fetched.tiles[1].id(),
            Some(&TileId::Coordinates {
                lat: 51.37,
                lon: -2.36,
                zoom: 18
            })
        );
        assert_eq!(fetched.failures.len(), 1);
        assert_eq!(
            fetched.failures[0].0,
            TileId::Coordinates {
                lat: 70.0,
                lon: 20.0,
                zoom: 18
            }
        );
    }
}
