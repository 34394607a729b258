use crate::segmentation::{SegmentError, Segmenter};
use crate::tile::{Tile, TileId};
use rayon::prelude::*;
use std::time::Instant;

/// One tile that could not be segmented
#[derive(Debug, Clone)]
pub struct TileFailure {
    pub tile: TileId,
    pub error: SegmentError,
}

/// Results of segmenting many tiles; failures never abort the rest
pub struct BatchReport<T> {
    pub completed: Vec<(Tile, T)>,
    pub failures: Vec<TileFailure>,
}

/// Segment every tile on the rayon pool
///
/// Tiles are independent, so ordering between them is not meaningful.
pub fn run_batch<S>(segmenter: &S, tiles: Vec<Tile>) -> BatchReport<S::Output>
where
    S: Segmenter + Sync,
{
    let total = tiles.len();
    tracing::info!("Segmenting {} tile(s) with {}", total, segmenter.name());
    let start = Instant::now();

    let results: Vec<_> = tiles
        .into_par_iter()
        .map(|tile| match segmenter.segment(&tile) {
            Ok(output) => Ok((tile, output)),
            Err(error) => {
                let id = tile
                    .id()
                    .cloned()
                    .unwrap_or_else(|| TileId::Label(tile.label()));
                tracing::warn!("Skipping tile {}: {}", id, error);
                Err(TileFailure { tile: id, error })
            }
        })
        .collect();

    let mut report = BatchReport {
        completed: Vec::with_capacity(total),
        failures: Vec::new(),
    };
    for result in results {
        match result {
            Ok(done) => report.completed.push(done),
            Err(failure) => report.failures.push(failure),
        }
    }

    tracing::info!(
        "Batch finished in {:.1}ms: {} ok, {} failed",
        start.elapsed().as_secs_f64() * 1000.0,
        report.completed.len(),
        report.failures.len()
    );
    report
}
