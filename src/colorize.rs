use std::sync::Arc;

use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::prelude::*;
use tracing::warn;

use crate::palette::Palette;

/// Colorized label map plus the number of pixels that took the fallback path.
#[derive(Debug, Clone)]
pub struct Colorized {
    pub image: RgbImage,
    pub fallback_pixels: usize,
}

impl Colorized {
    pub const fn is_clean(&self) -> bool {
        self.fallback_pixels == 0
    }
}

/// ラベルマップをパレット色の RGB 画像へ変換する
#[derive(Debug, Clone)]
pub struct Colorizer {
    palette: Arc<Palette>,
    fallback: Rgb<u8>,
}

impl Colorizer {
    pub const fn new(palette: Arc<Palette>, fallback: Rgb<u8>) -> Self {
        Self { palette, fallback }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn colorize(&self, labels: ArrayView2<u32>) -> Colorized {
        colorize(labels, &self.palette, self.fallback)
    }
}

/// Map every label to its palette color, row-major, interleaved R, G, B.
///
/// Labels outside the palette are painted with `fallback` and counted. The decoder
/// never produces such labels, so a non-zero count means the palette and the score
/// tensor disagree on the number of classes.
pub fn colorize(labels: ArrayView2<u32>, palette: &Palette, fallback: Rgb<u8>) -> Colorized {
    let (height, width) = labels.dim();
    let mut fallback_pixels = 0;

    let image = ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        let label = labels[[y as usize, x as usize]];
        palette.get(label).unwrap_or_else(|| {
            fallback_pixels += 1;
            fallback
        })
    });

    if fallback_pixels > 0 {
        warn!(
            fallback_pixels,
            palette_size = palette.len(),
            "labels outside the palette were painted with the fallback color"
        );
    }

    Colorized {
        image,
        fallback_pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn test_colorize_uses_palette() {
        let palette = Palette::new(3);
        let labels = array![[1u32, 0], [0, 2]];
        let colorized = colorize(labels.view(), &palette, WHITE);

        assert!(colorized.is_clean());
        assert_eq!(colorized.image.dimensions(), (2, 2));
        assert_eq!(*colorized.image.get_pixel(0, 0), Rgb([128, 0, 0]));
        assert_eq!(*colorized.image.get_pixel(1, 0), Rgb([0, 0, 0]));
        assert_eq!(*colorized.image.get_pixel(0, 1), Rgb([0, 0, 0]));
        assert_eq!(*colorized.image.get_pixel(1, 1), Rgb([0, 128, 0]));
    }

    #[test]
    fn test_out_of_range_label_gets_fallback() {
        let palette = Palette::new(3);
        let labels = array![[0u32, 1, 2], [3, 2, 1]];
        let colorized = colorize(labels.view(), &palette, WHITE);

        assert_eq!(colorized.fallback_pixels, 1);
        assert_eq!(*colorized.image.get_pixel(0, 1), WHITE);
        for (x, y, pixel) in colorized.image.enumerate_pixels() {
            if (x, y) == (0, 1) {
                continue;
            }
            let label = labels[[y as usize, x as usize]];
            assert_eq!(Some(*pixel), palette.get(label));
        }
    }

    #[test]
    fn test_custom_fallback_color() {
        let colorizer = Colorizer::new(Arc::new(Palette::new(2)), Rgb([1, 2, 3]));
        let labels = array![[u32::MAX]];
        let colorized = colorizer.colorize(labels.view());
        assert_eq!(*colorized.image.get_pixel(0, 0), Rgb([1, 2, 3]));
        assert!(!colorized.is_clean());
    }

    #[test]
    fn test_non_square_shape() {
        let palette = Palette::new(21);
        let labels = Array2::<u32>::from_shape_fn((3, 5), |(y, x)| ((y * 5 + x) % 21) as u32);
        let colorized = colorize(labels.view(), &palette, WHITE);
        assert_eq!(colorized.image.dimensions(), (5, 3));
        assert_eq!(*colorized.image.get_pixel(4, 2), palette.get(14).unwrap());
    }
}
