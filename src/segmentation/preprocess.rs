use image::RgbImage;
use ndarray::Array2;

/// Preprocessor for converting RGB tiles to smoothed intensity grids
pub struct Preprocessor {
    kernel: Vec<f32>,
}

impl Preprocessor {
    /// `blur_kernel` must be odd; the caller validates it
    pub fn new(blur_kernel: usize) -> Self {
        Self {
            kernel: gaussian_kernel(blur_kernel),
        }
    }

    /// Preprocess an RGB tile into a smoothed intensity grid
    ///
    /// Steps:
    /// 1. Convert to luma (0.299 R + 0.587 G + 0.114 B), rounded to 8-bit levels
    /// 2. Separable Gaussian blur with reflect-101 borders
    ///
    /// Returns: Array2<f32> with shape [height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array2<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let gray = to_intensity(image);
        if self.kernel.len() == 1 {
            return gray;
        }

        let horizontal = convolve_rows(&gray, &self.kernel);
        convolve_cols(&horizontal, &self.kernel)
    }
}

pub fn to_intensity(image: &RgbImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        let p = image.get_pixel(x as u32, y as u32);
        (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round()
    })
}

/// Normalised 1-D Gaussian of odd length `size`
///
/// Small kernels use the fixed binomial tables; larger ones derive sigma
/// from the size as `0.3·((size−1)·0.5 − 1) + 0.8`.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    match size {
        0 | 1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
        _ => {
            let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
            let center = (size / 2) as f64;
            let raw: Vec<f64> = (0..size)
                .map(|i| {
                    let d = i as f64 - center;
                    (-(d * d) / (2.0 * sigma * sigma)).exp()
                })
                .collect();
            let sum: f64 = raw.iter().sum();
            raw.iter().map(|w| (w / sum) as f32).collect()
        }
    }
}

/// Reflect-101 index: `-1 → 1`, `n → n−2`
pub(crate) fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

fn convolve_rows(src: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (h, w) = src.dim();
    let radius = (kernel.len() / 2) as isize;
    Array2::from_shape_fn((h, w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, &wt)| wt * src[[y, reflect101(x as isize + k as isize - radius, w)]])
            .sum()
    })
}

fn convolve_cols(src: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (h, w) = src.dim();
    let radius = (kernel.len() / 2) as isize;
    Array2::from_shape_fn((h, w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, &wt)| wt * src[[reflect101(y as isize + k as isize - radius, h), x]])
            .sum()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn kernels_are_normalised_and_symmetric() {
        for size in [1, 3, 5, 7, 9, 15] {
            let k = gaussian_kernel(size);
            assert_eq!(k.len(), size);
            let sum: f32 = k.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "size {} sums to {}", size, sum);
            for i in 0..size / 2 {
                assert!((k[i] - k[size - 1 - i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn reflect101_mirrors_without_repeating_edge() {
        assert_eq!(reflect101(-1, 4), 1);
        assert_eq!(reflect101(-2, 4), 2);
        assert_eq!(reflect101(4, 4), 2);
        assert_eq!(reflect101(5, 4), 1);
        assert_eq!(reflect101(2, 4), 2);
        assert_eq!(reflect101(-7, 3), 1);
    }

    #[test]
    fn luma_weights_match_rec601() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(to_intensity(&img)[[0, 0]], 76.0);
        let img = RgbImage::from_pixel(1, 1, Rgb([0, 255, 0]));
        assert_eq!(to_intensity(&img)[[0, 0]], 150.0);
    }

    #[test]
    fn blur_preserves_constant_fields() {
        let img = RgbImage::from_pixel(6, 5, Rgb([40, 40, 40]));
        let out = Preprocessor::new(7).preprocess(&img);
        assert_eq!(out.dim(), (5, 6));
        assert!(out.iter().all(|&v| (v - 40.0).abs() < 1e-3));
    }
}
