use std::path::Path;

use crate::shared::face_image::FaceImage;

/// Writes a face crop to an image file.
pub trait ImageWriter: Send {
    /// Writes `image` to `path`, optionally resizing to `size`.
    fn write(
        &self,
        path: &Path,
        image: &FaceImage,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
