use std::path::PathBuf;

/// Shape of an opened frame source.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub total_frames: usize,
    pub source_path: Option<PathBuf>,
}
