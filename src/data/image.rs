// ============================================================
// Layer 4 — Image Transform
// ============================================================
// Turns an X-ray file on disk into the flat CHW float buffer the
// encoder consumes.
//
// Pipeline (same order as the training-time transform):
//   1. Decode with the image crate, convert to 8-bit RGB
//      (grayscale X-rays are replicated across the 3 channels)
//   2. Resize so the SHORT edge equals `size` (aspect kept)
//   3. Centre-crop to size × size
//   4. Scale to [0, 1] and normalise per channel:
//        x = (x - mean[c]) / std[c]
//   5. Emit channel-major layout: [R plane][G plane][B plane]
//
// Reference: image crate documentation (imageops)

use anyhow::{Context, Result};
use image::{imageops, imageops::FilterType, ImageReader, RgbImage};
use std::path::{Path, PathBuf};

/// ImageNet channel statistics
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

/// File extensions tried, in order, when resolving a uid to a file
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone)]
pub struct ImageTransform {
    pub size: usize,
    pub mean: [f32; 3],
    pub std:  [f32; 3],
}

impl ImageTransform {
    pub fn new(size: usize) -> Self {
        Self { size, mean: IMAGENET_MEAN, std: IMAGENET_STD }
    }

    /// Number of f32 values produced per image (3 × size × size)
    pub fn output_len(&self) -> usize {
        3 * self.size * self.size
    }

    /// Decode and transform the image at `path`.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let img = open_reader(path)?
            .decode()
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
        Ok(self.apply(&img.to_rgb8()))
    }

    /// Apply resize → centre-crop → normalise to an RGB image.
    pub fn apply(&self, img: &RgbImage) -> Vec<f32> {
        let size = self.size as u32;
        let (w, h) = img.dimensions();

        // Short edge → size; long edge keeps the aspect ratio
        let (new_w, new_h) = if w <= h {
            (size, ((h as f64) * (size as f64) / (w.max(1) as f64)).round().max(size as f64) as u32)
        } else {
            (((w as f64) * (size as f64) / (h.max(1) as f64)).round().max(size as f64) as u32, size)
        };
        let resized = imageops::resize(img, new_w, new_h, FilterType::Triangle);

        let left = (new_w - size) / 2;
        let top  = (new_h - size) / 2;
        let cropped = imageops::crop_imm(&resized, left, top, size, size).to_image();

        let plane = self.size * self.size;
        let mut out = vec![0.0f32; self.output_len()];
        for (x, y, pixel) in cropped.enumerate_pixels() {
            let offset = y as usize * self.size + x as usize;
            for c in 0..3 {
                let v = pixel.0[c] as f32 / 255.0;
                out[c * plane + offset] = (v - self.mean[c]) / self.std[c];
            }
        }
        out
    }
}

/// Width and height from the file header, without decoding pixels.
pub fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    open_reader(path)?
        .into_dimensions()
        .with_context(|| format!("Unreadable image header '{}'", path.display()))
}

/// Format is sniffed from the content; the extension is only a fallback.
fn open_reader(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>> {
    ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .with_context(|| format!("Cannot open image '{}'", path.display()))
}

/// Find the image file for `uid` inside `dir`, trying each known extension.
pub fn resolve_image(dir: &Path, uid: &str) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{uid}.{ext}")))
        .find(|p| p.is_file())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_output_shape_for_non_square_input() {
        let t   = ImageTransform::new(8);
        let img = RgbImage::from_pixel(20, 10, Rgb([128, 128, 128]));
        let out = t.apply(&img);
        assert_eq!(out.len(), 3 * 8 * 8);
    }

    #[test]
    fn test_normalisation_per_channel() {
        let t   = ImageTransform::new(4);
        let img = RgbImage::from_pixel(4, 4, Rgb([255, 0, 255]));
        let out = t.apply(&img);
        let plane = 16;
        let r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((out[0] - r).abs() < 1e-5);
        assert!((out[plane] - g).abs() < 1e-5);
    }

    #[test]
    fn test_centre_crop_keeps_middle() {
        // Left half black, right half white, 2:1 aspect → crop is the middle
        // square, so both colours survive in equal measure
        let t = ImageTransform::new(4);
        let img = RgbImage::from_fn(8, 4, |x, _| if x < 4 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let out = t.apply(&img);
        let red = &out[..16];
        let dark  = red.iter().filter(|&&v| v < 0.0).count();
        let light = red.iter().filter(|&&v| v > 0.0).count();
        assert_eq!(dark, light);
    }

    #[test]
    fn test_load_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CXR1.png");
        image::GrayImage::from_pixel(6, 6, image::Luma([200])).save(&path).unwrap();

        assert_eq!(resolve_image(dir.path(), "CXR1"), Some(path.clone()));
        assert_eq!(resolve_image(dir.path(), "CXR2"), None);

        let t = ImageTransform::new(3);
        let out = t.load(&path).unwrap();
        assert_eq!(out.len(), 27);
    }

    #[test]
    fn test_read_dimensions_rejects_junk() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.png");
        let junk = dir.path().join("b.png");
        image::GrayImage::from_pixel(7, 5, image::Luma([10])).save(&good).unwrap();
        std::fs::write(&junk, b"definitely not a png").unwrap();

        assert_eq!(read_dimensions(&good).unwrap(), (7, 5));
        assert!(read_dimensions(&junk).is_err());
        assert!(ImageTransform::new(3).load(&junk).is_err());
    }
}
