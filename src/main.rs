use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use riverseg::batch::run_batch;
use riverseg::output::{PngReportSink, ReportSink};
use riverseg::segmentation::{
    cluster_tile, segment_by_contour, ClusteringParams, ClusteringSegmenter, ContourParams,
    ContourSegmenter, RunParams, Strategy,
};
use riverseg::tile::{
    fetch_route, load_coordinates, load_tile, png_files_in, save_tile, ImageryMetadata,
    ReqwestClient, StaticMapsSource, Tile, TileRequest, TileSource, DEFAULT_TILE_SIZE,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory for reports and fetched tiles
    #[arg(short, long, default_value = "output", global = true)]
    out_dir: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment one tile by colour clustering
    Cluster {
        /// Tile image (PNG or any format the image crate reads)
        tile: PathBuf,

        /// Number of colour clusters
        #[arg(long, default_value_t = 2)]
        k: usize,

        /// Random seed; omit for a nondeterministic run
        #[arg(long)]
        seed: Option<u64>,

        /// Iteration cap per clustering attempt
        #[arg(long, default_value_t = 300)]
        max_iterations: usize,

        /// Independent seedings; the lowest-inertia one wins
        #[arg(long, default_value_t = 1)]
        attempts: usize,
    },

    /// Segment one tile by edge detection and outer contours
    Contour {
        /// Tile image
        tile: PathBuf,

        /// Gaussian blur kernel size (odd)
        #[arg(long, default_value_t = 5)]
        blur_kernel: usize,

        /// Hysteresis low threshold
        #[arg(long, default_value_t = 50.0)]
        low: f32,

        /// Hysteresis high threshold
        #[arg(long, default_value_t = 150.0)]
        high: f32,
    },

    /// Segment every PNG in a directory
    Batch {
        /// Directory of tile images
        dir: PathBuf,

        /// cluster or contour
        #[arg(long, default_value = "cluster")]
        strategy: Strategy,

        /// Random seed for clustering
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Download a satellite tile centred on a coordinate
    Fetch {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, default_value_t = 18)]
        zoom: u8,

        #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
        width: u32,

        #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
        height: u32,

        /// Static Maps API key
        #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Fetch a tile at every point of a river coordinate table, then segment them
    Route {
        /// CSV with Latitude/Longitude (or lat/lon) columns
        coordinates: PathBuf,

        #[arg(long, default_value_t = 18)]
        zoom: u8,

        #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
        width: u32,

        #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
        height: u32,

        /// cluster or contour
        #[arg(long, default_value = "cluster")]
        strategy: Strategy,

        /// Random seed for clustering
        #[arg(long)]
        seed: Option<u64>,

        /// Static Maps API key
        #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Print ground resolution and coverage for a tile
    Metadata {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long)]
        zoom: u8,

        #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
        width: u32,

        #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
        height: u32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("riverseg {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Cluster {
            tile,
            k,
            seed,
            max_iterations,
            attempts,
        } => {
            let params = ClusteringParams {
                k,
                seed,
                max_iterations,
                attempts,
                ..ClusteringParams::default()
            };
            run_cluster(&tile, &params, &args.out_dir)
        }
        Command::Contour {
            tile,
            blur_kernel,
            low,
            high,
        } => {
            let params = ContourParams {
                blur_kernel,
                low_threshold: low,
                high_threshold: high,
            };
            run_contour(&tile, &params, &args.out_dir)
        }
        Command::Batch {
            dir,
            strategy,
            seed,
        } => run_directory(&dir, strategy, seed, &args.out_dir),
        Command::Fetch {
            lat,
            lon,
            zoom,
            width,
            height,
            api_key,
        } => {
            let request = TileRequest::new(lat, lon, zoom).with_size(width, height);
            run_fetch(&request, api_key, &args.out_dir)
        }
        Command::Route {
            coordinates,
            zoom,
            width,
            height,
            strategy,
            seed,
            api_key,
        } => run_route(
            &coordinates,
            zoom,
            (width, height),
            strategy,
            seed,
            api_key,
            &args.out_dir,
        ),
        Command::Metadata {
            lat,
            zoom,
            width,
            height,
        } => {
            let metadata = ImageryMetadata::calculate(lat, zoom, (width, height));
            println!("{}", serde_json::to_string_pretty(&metadata)?);
            Ok(())
        }
    }
}

fn run_cluster(path: &Path, params: &ClusteringParams, out_dir: &Path) -> Result<()> {
    let tile = load_tile(path)?;
    tracing::info!(
        "Clustering {} ({}x{}), k={}",
        tile.label(),
        tile.width(),
        tile.height(),
        params.k
    );

    let start = Instant::now();
    let outcome = cluster_tile(&tile, params)
        .with_context(|| format!("Failed to cluster {}", tile.label()))?;
    tracing::info!(
        "river cluster {} of {}, {} river pixels, {} iterations, {:.1}ms",
        outcome.river_cluster,
        outcome.centroids.len(),
        outcome.mask.river_pixel_count(),
        outcome.iterations,
        start.elapsed().as_secs_f64() * 1000.0
    );

    let mut sink = PngReportSink::new(out_dir)?;
    sink.write_clustering(&tile, &outcome)?;
    sink.write_params(&tile, &RunParams::Cluster(params.clone()))?;
    Ok(())
}

fn run_contour(path: &Path, params: &ContourParams, out_dir: &Path) -> Result<()> {
    let tile = load_tile(path)?;
    tracing::info!(
        "Tracing contours on {} ({}x{})",
        tile.label(),
        tile.width(),
        tile.height()
    );

    let start = Instant::now();
    let contours = segment_by_contour(&tile, params)
        .with_context(|| format!("Failed to trace contours on {}", tile.label()))?;
    tracing::info!(
        "{} contour(s) in {:.1}ms",
        contours.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let mut sink = PngReportSink::new(out_dir)?;
    sink.write_contours(&tile, &contours)?;
    sink.write_params(&tile, &RunParams::Contour(params.clone()))?;
    Ok(())
}

fn run_directory(dir: &Path, strategy: Strategy, seed: Option<u64>, out_dir: &Path) -> Result<()> {
    let mut tiles: Vec<Tile> = Vec::new();
    for path in png_files_in(dir)? {
        match load_tile(&path) {
            Ok(tile) => tiles.push(tile),
            Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    if tiles.is_empty() {
        tracing::warn!("No readable tiles in {}", dir.display());
        return Ok(());
    }

    segment_and_report(tiles, strategy, seed, out_dir)
}

fn run_route(
    coordinates: &Path,
    zoom: u8,
    size: (u32, u32),
    strategy: Strategy,
    seed: Option<u64>,
    api_key: String,
    out_dir: &Path,
) -> Result<()> {
    let points = load_coordinates(coordinates)?;
    let source = StaticMapsSource::new(ReqwestClient::new()?, api_key)?;

    let fetched = fetch_route(&source, &points, zoom, size);
    let tile_dir = out_dir.join("tiles");
    for tile in &fetched.tiles {
        let stem = tile
            .id()
            .map(|id| id.file_stem())
            .unwrap_or_else(|| tile.label());
        save_tile(tile, tile_dir.join(format!("{}.png", stem)))?;
    }
    if !fetched.failures.is_empty() {
        tracing::warn!("{} point(s) could not be fetched", fetched.failures.len());
    }
    if fetched.tiles.is_empty() {
        tracing::warn!("No tiles fetched for {}", coordinates.display());
        return Ok(());
    }

    segment_and_report(fetched.tiles, strategy, seed, out_dir)
}

fn segment_and_report(
    tiles: Vec<Tile>,
    strategy: Strategy,
    seed: Option<u64>,
    out_dir: &Path,
) -> Result<()> {
    let mut sink = PngReportSink::new(out_dir)?;
    let failed = match strategy {
        Strategy::Cluster => {
            let params = ClusteringParams {
                seed,
                ..ClusteringParams::default()
            };
            let report = run_batch(&ClusteringSegmenter::new(params.clone()), tiles);
            let recorded = RunParams::Cluster(params);
            for (tile, outcome) in &report.completed {
                sink.write_clustering(tile, outcome)?;
                sink.write_params(tile, &recorded)?;
            }
            report.failures.len()
        }
        Strategy::Contour => {
            let segmenter = ContourSegmenter::default();
            let report = run_batch(&segmenter, tiles);
            let recorded = RunParams::Contour(segmenter.params.clone());
            for (tile, contours) in &report.completed {
                sink.write_contours(tile, contours)?;
                sink.write_params(tile, &recorded)?;
            }
            report.failures.len()
        }
    };

    if failed > 0 {
        tracing::warn!("{} tile(s) failed", failed);
    }
    Ok(())
}

fn run_fetch(request: &TileRequest, api_key: String, out_dir: &Path) -> Result<()> {
    let client = ReqwestClient::new()?;
    let source = StaticMapsSource::new(client, api_key)?;
    tracing::info!("Fetching {} from {}", request.id(), source.name());

    let tile = source
        .fetch_tile(request)
        .with_context(|| format!("Failed to fetch {}", request.id()))?;
    let path = out_dir.join(format!("{}.png", request.id().file_stem()));
    save_tile(&tile, &path)?;

    let metadata = request.metadata();
    tracing::info!(
        "Saved {} ({:.3} m/px, {:.0}m x {:.0}m)",
        path.display(),
        metadata.meters_per_pixel,
        metadata.width_meters,
        metadata.height_meters
    );
    Ok(())
}
