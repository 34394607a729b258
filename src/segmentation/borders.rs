//! Outer-border extraction from a binary edge map.
//!
//! Suzuki–Abe border following (1985) with the border hierarchy tracked so
//! only borders whose parent is the image frame are returned. Each border is
//! then run-length compressed: points in the middle of a straight
//! horizontal, vertical, or diagonal run are dropped.

use super::types::{Contour, ContourSet, EdgeMap, Point};

/// Neighbour offsets, clockwise on screen (y grows downwards), starting east
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Rings shorter than this after compression are degenerate (dots, straight strokes)
const MIN_RING_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BorderKind {
    Outer,
    Hole,
}

#[derive(Debug, Clone, Copy)]
struct Border {
    kind: BorderKind,
    parent: usize,
}

/// Labelled raster with a one-pixel zero frame around the edge map
struct Grid {
    cells: Vec<i32>,
    width: i32,
}

impl Grid {
    fn from_edges(edges: &EdgeMap) -> Self {
        let width = edges.width() as i32 + 2;
        let height = edges.height() as i32 + 2;
        let mut cells = vec![0; (width * height) as usize];
        for y in 0..edges.height() {
            for x in 0..edges.width() {
                if edges.is_edge(x, y) {
                    cells[((y as i32 + 1) * width + x as i32 + 1) as usize] = 1;
                }
            }
        }
        Self { cells, width }
    }

    fn height(&self) -> i32 {
        self.cells.len() as i32 / self.width
    }

    fn get(&self, (x, y): (i32, i32)) -> i32 {
        self.cells[(y * self.width + x) as usize]
    }

    fn set(&mut self, (x, y): (i32, i32), value: i32) {
        self.cells[(y * self.width + x) as usize] = value;
    }
}

fn step((x, y): (i32, i32), dir: usize) -> (i32, i32) {
    let (dx, dy) = DIRECTIONS[dir];
    (x + dx, y + dy)
}

fn direction(from: (i32, i32), to: (i32, i32)) -> usize {
    let delta = (to.0 - from.0, to.1 - from.1);
    DIRECTIONS
        .iter()
        .position(|&d| d == delta)
        .unwrap_or(0)
}

/// Trace every outermost border in raster-scan order of its first pixel
pub fn trace_external(edges: &EdgeMap) -> ContourSet {
    let _span = tracing::debug_span!("trace_contours").entered();

    let mut grid = Grid::from_edges(edges);
    // Index 0 is unused, index 1 is the frame.
    let mut borders = vec![
        Border {
            kind: BorderKind::Hole,
            parent: 0,
        },
        Border {
            kind: BorderKind::Hole,
            parent: 0,
        },
    ];
    let mut nbd: i32 = 1;
    let mut contours = Vec::new();

    for y in 1..grid.height() - 1 {
        let mut lnbd: i32 = 1;
        for x in 1..grid.width - 1 {
            let value = grid.get((x, y));
            if value == 0 {
                continue;
            }

            let start = if value == 1 && grid.get((x - 1, y)) == 0 {
                Some((BorderKind::Outer, (x - 1, y)))
            } else if value >= 1 && grid.get((x + 1, y)) == 0 {
                if value > 1 {
                    lnbd = value;
                }
                Some((BorderKind::Hole, (x + 1, y)))
            } else {
                None
            };

            if let Some((kind, from)) = start {
                nbd += 1;
                let previous = borders[lnbd as usize];
                let parent = if kind == previous.kind {
                    previous.parent
                } else {
                    lnbd as usize
                };
                borders.push(Border { kind, parent });

                let ring = follow_border(&mut grid, (x, y), from, nbd);
                if kind == BorderKind::Outer && parent == 1 {
                    let points = compress_runs(&ring);
                    if points.len() >= MIN_RING_POINTS {
                        contours.push(Contour::new(points));
                    }
                }
            }

            let value = grid.get((x, y));
            if value != 1 {
                lnbd = value.abs();
            }
        }
    }

    tracing::debug!("Traced {} border(s), kept {}", nbd - 1, contours.len());
    ContourSet { contours }
}

/// Follow one border starting at `start`, entered from the zero pixel `from`.
/// Returns the ring in padded coordinates and labels it with `nbd`.
fn follow_border(
    grid: &mut Grid,
    start: (i32, i32),
    from: (i32, i32),
    nbd: i32,
) -> Vec<(i32, i32)> {
    let mut ring = vec![start];

    // Clockwise search for the first non-zero neighbour.
    let d0 = direction(start, from);
    let first = (0..8)
        .map(|k| step(start, (d0 + k) % 8))
        .find(|&p| grid.get(p) != 0);
    let Some(first) = first else {
        grid.set(start, -nbd);
        return ring;
    };

    let mut prev = first;
    let mut current = start;
    loop {
        // Counter-clockwise search starting just past `prev`.
        let dp = direction(current, prev);
        let mut east_is_background = false;
        let mut next = prev;
        for k in 1..=8 {
            let d = (dp + 8 - k) % 8;
            let p = step(current, d);
            if grid.get(p) != 0 {
                next = p;
                break;
            }
            if d == 0 {
                east_is_background = true;
            }
        }

        if east_is_background {
            grid.set(current, -nbd);
        } else if grid.get(current) == 1 {
            grid.set(current, nbd);
        }

        if next == start && current == first {
            break;
        }
        prev = current;
        current = next;
        ring.push(current);
    }

    ring
}

/// Keep only points where the step direction changes; shifts out of the frame padding
fn compress_runs(ring: &[(i32, i32)]) -> Vec<Point> {
    let n = ring.len();
    let to_point = |(x, y): (i32, i32)| Point::new(x - 1, y - 1);
    if n < 3 {
        return ring.iter().copied().map(to_point).collect();
    }

    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let cur = ring[i];
            let next = ring[(i + 1) % n];
            (cur.0 - prev.0, cur.1 - prev.1) != (next.0 - cur.0, next.1 - cur.1)
        })
        .map(|i| to_point(ring[i]))
        .collect()
}
