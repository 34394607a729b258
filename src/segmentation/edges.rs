//! Canny edge detection over a smoothed intensity grid.
//!
//! Sobel gradients with L1 magnitude, non-maximum suppression along the
//! quantised gradient direction, then hysteresis: pixels above `high` seed
//! edges that grow through 8-connected pixels above `low`.

use super::preprocess::reflect101;
use super::types::EdgeMap;
use ndarray::Array2;

/// tan(22.5°) and tan(67.5°)
const TAN_22_5: f32 = 0.414_213_56;
const TAN_67_5: f32 = 2.414_213_6;

pub fn canny(intensity: &Array2<f32>, low: f32, high: f32) -> EdgeMap {
    let _span = tracing::debug_span!("canny").entered();

    let (gx, gy) = sobel(intensity);
    let magnitude = Array2::from_shape_fn(intensity.dim(), |idx| gx[idx].abs() + gy[idx].abs());
    let candidates = suppress_non_maxima(&magnitude, &gx, &gy, low);
    let edges = hysteresis(&magnitude, &candidates, high);

    EdgeMap { edges }
}

fn sobel(src: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (h, w) = src.dim();
    let at = |y: usize, dy: isize, x: usize, dx: isize| {
        src[[
            reflect101(y as isize + dy, h),
            reflect101(x as isize + dx, w),
        ]]
    };

    let gx = Array2::from_shape_fn((h, w), |(y, x)| {
        (at(y, -1, x, 1) + 2.0 * at(y, 0, x, 1) + at(y, 1, x, 1))
            - (at(y, -1, x, -1) + 2.0 * at(y, 0, x, -1) + at(y, 1, x, -1))
    });
    let gy = Array2::from_shape_fn((h, w), |(y, x)| {
        (at(y, 1, x, -1) + 2.0 * at(y, 1, x, 0) + at(y, 1, x, 1))
            - (at(y, -1, x, -1) + 2.0 * at(y, -1, x, 0) + at(y, -1, x, 1))
    });
    (gx, gy)
}

/// Local maxima across the gradient with magnitude above `low`
///
/// Ties along the gradient go to the first neighbour in scan order so a
/// plateau yields a single-pixel ridge.
fn suppress_non_maxima(
    mag: &Array2<f32>,
    gx: &Array2<f32>,
    gy: &Array2<f32>,
    low: f32,
) -> Array2<bool> {
    let (h, w) = mag.dim();
    let value = |y: isize, x: isize| -> f32 {
        if y < 0 || x < 0 || y >= h as isize || x >= w as isize {
            0.0
        } else {
            mag[[y as usize, x as usize]]
        }
    };

    Array2::from_shape_fn((h, w), |(y, x)| {
        let m = mag[[y, x]];
        if m <= low {
            return false;
        }
        let (ax, ay) = (gx[[y, x]].abs(), gy[[y, x]].abs());
        let same_sign = (gx[[y, x]] > 0.0) == (gy[[y, x]] > 0.0);
        let (y, x) = (y as isize, x as isize);

        let (before, after) = if ay <= ax * TAN_22_5 {
            (value(y, x - 1), value(y, x + 1))
        } else if ay >= ax * TAN_67_5 {
            (value(y - 1, x), value(y + 1, x))
        } else if same_sign {
            (value(y - 1, x - 1), value(y + 1, x + 1))
        } else {
            (value(y - 1, x + 1), value(y + 1, x - 1))
        };

        m > before && m >= after
    })
}

fn hysteresis(mag: &Array2<f32>, candidates: &Array2<bool>, high: f32) -> Array2<bool> {
    let (h, w) = mag.dim();
    let mut edges = Array2::from_elem((h, w), false);
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for ((y, x), &is_candidate) in candidates.indexed_iter() {
        if is_candidate && mag[[y, x]] > high {
            edges[[y, x]] = true;
            stack.push((y, x));
        }
    }

    while let Some((y, x)) = stack.pop() {
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let ny = y as isize + dy;
                let nx = x as isize + dx;
                if ny < 0 || nx < 0 || ny >= h as isize || nx >= w as isize {
                    continue;
                }
                let (ny, nx) = (ny as usize, nx as usize);
                if candidates[[ny, nx]] && !edges[[ny, nx]] {
                    edges[[ny, nx]] = true;
                    stack.push((ny, nx));
                }
            }
        }
    }

    edges
}
