use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::shared::face_image::FaceImage;
use crate::video::domain::image_writer::ImageWriter;

/// Writes face crops to image files using the `image` crate.
///
/// Accepts grayscale, RGB and RGBA crops; the format follows the file
/// extension.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_dynamic(image: &FaceImage) -> Result<DynamicImage, Box<dyn std::error::Error>> {
    let (w, h, data) = (image.width(), image.height(), image.data().to_vec());
    let dynamic = match image.channels() {
        1 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
        n => return Err(format!("Unsupported channel count: {n}").into()),
    };
    dynamic.ok_or_else(|| "Failed to create image from face data".into())
}

impl ImageWriter for ImageFileWriter {
    fn write(
        &self,
        path: &Path,
        image: &FaceImage,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if image.is_empty() {
            return Err("Cannot write an empty face image".into());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let img = to_dynamic(image)?;
        let img = match size {
            Some((w, h)) => img.resize_exact(w, h, image::imageops::FilterType::Triangle),
            None => img,
        };

        img.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, pixel: &[u8]) -> FaceImage {
        let data = pixel.repeat((width * height) as usize);
        FaceImage::new(data, width, height, pixel.len() as u8).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_rgb_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        ImageFileWriter::new()
            .write(&path, &solid(20, 10, &[50, 100, 200]), None)
            .unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!((img.width(), img.height()), (20, 10));
        assert_eq!(img.get_pixel(0, 0).0, [50, 100, 200]);
    }

    #[test]
    fn test_writes_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        ImageFileWriter::new()
            .write(&path, &solid(8, 8, &[77]), None)
            .unwrap();
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.get_pixel(3, 3).0, [77]);
    }

    #[test]
    fn test_write_with_resize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumb.png");
        ImageFileWriter::new()
            .write(&path, &solid(100, 60, &[128, 128, 128]), Some((32, 32)))
            .unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (32, 32));
    }

    #[test]
    fn test_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/face.png");
        ImageFileWriter::new()
            .write(&path, &solid(4, 4, &[1, 2, 3]), None)
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        assert!(ImageFileWriter::new()
            .write(&path, &FaceImage::empty(3), None)
            .is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_unsupported_channel_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let image = FaceImage::new(vec![0; 8], 2, 2, 2).unwrap();
        assert!(ImageFileWriter::new()
            .write(&dir.path().join("x.png"), &image, None)
            .is_err());
    }
}
