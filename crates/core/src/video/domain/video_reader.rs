use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Reads frames from an image source.
///
/// Implementations handle decoding while the pipeline works with the
/// abstract `Frame` and `VideoMetadata` types.
pub trait VideoReader: Send {
    /// Opens a source and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in sequence order. A frame that fails
    /// to decode is yielded as an error; the caller decides whether to stop.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    /// Releases any resources held by the reader. Safe to call twice.
    fn close(&mut self);
}
