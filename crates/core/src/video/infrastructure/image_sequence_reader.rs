use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

/// Adapts a directory of still images, or a single image file, to the
/// [`VideoReader`] interface.
///
/// Directory entries with an image extension are ordered by file name, so
/// zero-padded names (`frame_0001.png`, ...) play back in sequence. Frames
/// are decoded lazily and converted to RGB.
pub struct ImageSequenceReader {
    paths: Option<Vec<PathBuf>>,
}

impl ImageSequenceReader {
    pub fn new() -> Self {
        Self { paths: None }
    }
}

impl Default for ImageSequenceReader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn decode_frame(path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)
        .map_err(|e| format!("Failed to decode {}: {e}", path.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, index))
}

impl VideoReader for ImageSequenceReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let paths = if path.is_dir() {
            list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(format!("Input not found: {}", path.display()).into());
        };

        let first = paths
            .first()
            .ok_or_else(|| format!("No images found in {}", path.display()))?;
        let (width, height) = image::image_dimensions(first)?;

        log::debug!("Opened {} frame(s) from {}", paths.len(), path.display());
        let metadata = VideoMetadata {
            width,
            height,
            total_frames: paths.len(),
            source_path: Some(path.to_path_buf()),
        };
        self.paths = Some(paths);
        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        match &self.paths {
            Some(paths) => Box::new(
                paths
                    .iter()
                    .enumerate()
                    .map(|(index, path)| decode_frame(path, index)),
            ),
            None => Box::new(std::iter::once(Err(
                "ImageSequenceReader: not opened".into()
            ))),
        }
    }

    fn close(&mut self) {
        self.paths = None;
    }
}
