//! Pixel-level photometric adjustments used by the random transforms.
//!
//! All functions operate on 8-bit RGB buffers and clamp their results to the
//! valid `[0, 255]` range.

use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use rand::Rng;

/// Scales every channel by `factor`
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();

    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = image.get_pixel(x, y);
        Rgb([
            (pixel[0] as f32 * factor).clamp(0.0, 255.0) as u8,
            (pixel[1] as f32 * factor).clamp(0.0, 255.0) as u8,
            (pixel[2] as f32 * factor).clamp(0.0, 255.0) as u8,
        ])
    })
}

/// Moves every pixel towards (factor < 1) or away from (factor > 1) the mean intensity
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let total_pixels = (width as f32 * height as f32).max(1.0);

    let sum: f32 = image
        .pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .sum();
    let mean = sum / total_pixels;

    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = image.get_pixel(x, y);
        Rgb([
            (mean + factor * (pixel[0] as f32 - mean)).clamp(0.0, 255.0) as u8,
            (mean + factor * (pixel[1] as f32 - mean)).clamp(0.0, 255.0) as u8,
            (mean + factor * (pixel[2] as f32 - mean)).clamp(0.0, 255.0) as u8,
        ])
    })
}

/// Interpolates between the luminance and the original color
pub fn adjust_saturation(image: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();

    ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = image.get_pixel(x, y);
        let gray = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;

        Rgb([
            (gray + factor * (pixel[0] as f32 - gray)).clamp(0.0, 255.0) as u8,
            (gray + factor * (pixel[1] as f32 - gray)).clamp(0.0, 255.0) as u8,
            (gray + factor * (pixel[2] as f32 - gray)).clamp(0.0, 255.0) as u8,
        ])
    })
}

/// Draws a multiplicative factor uniformly from `[max(0, 1 - strength), 1 + strength]`
pub fn jitter_factor<R: Rng + ?Sized>(rng: &mut R, strength: f32) -> f32 {
    if strength <= 0.0 {
        return 1.0;
    }
    let low = (1.0 - strength).max(0.0);
    rng.gen_range(low..=1.0 + strength)
}

/// Random brightness, contrast and saturation changes, applied in that order.
///
/// Single-channel images stay single-channel.
pub fn color_jitter<R: Rng + ?Sized>(
    image: &DynamicImage,
    brightness: f32,
    contrast: f32,
    saturation: f32,
    rng: &mut R,
) -> DynamicImage {
    let was_gray = matches!(image, DynamicImage::ImageLuma8(_));
    let mut rgb = image.to_rgb8();

    if brightness > 0.0 {
        rgb = adjust_brightness(&rgb, jitter_factor(rng, brightness));
    }
    if contrast > 0.0 {
        rgb = adjust_contrast(&rgb, jitter_factor(rng, contrast));
    }
    if saturation > 0.0 {
        rgb = adjust_saturation(&rgb, jitter_factor(rng, saturation));
    }

    let jittered = DynamicImage::ImageRgb8(rgb);
    if was_gray {
        DynamicImage::ImageLuma8(jittered.to_luma8())
    } else {
        jittered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn create_test_image() -> RgbImage {
        ImageBuffer::from_fn(8, 8, |x, y| {
            if x < 4 && y < 4 {
                Rgb([200u8, 40u8, 40u8])
            } else if y < 4 {
                Rgb([40u8, 200u8, 40u8])
            } else {
                Rgb([40u8, 40u8, 200u8])
            }
        })
    }

    #[test]
    fn test_brightness_scales_and_clamps() {
        let image = create_test_image();
        let brighter = adjust_brightness(&image, 2.0);

        assert_eq!(brighter.dimensions(), image.dimensions());
        assert_eq!(brighter.get_pixel(0, 0), &Rgb([255, 80, 80]));
    }

    #[test]
    fn test_zero_contrast_collapses_to_mean() {
        let image = create_test_image();
        let flat = adjust_contrast(&image, 0.0);

        let first = *flat.get_pixel(0, 0);
        assert!(flat.pixels().all(|p| *p == first));
    }

    #[test]
    fn test_zero_saturation_is_gray() {
        let image = create_test_image();
        let gray = adjust_saturation(&image, 0.0);

        for pixel in gray.pixels() {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn test_jitter_factor_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let f = jitter_factor(&mut rng, 0.4);
            assert!((0.6..=1.4).contains(&f));
        }
        assert_eq!(jitter_factor(&mut rng, 0.0), 1.0);
    }

    #[test]
    fn test_color_jitter_keeps_gray_images_gray() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let gray = DynamicImage::ImageRgb8(create_test_image()).grayscale();
        let gray = DynamicImage::ImageLuma8(gray.to_luma8());

        let jittered = color_jitter(&gray, 0.5, 0.5, 0.5, &mut rng);
        assert!(matches!(jittered, DynamicImage::ImageLuma8(_)));
        assert_eq!(jittered.width(), 8);
    }
}
