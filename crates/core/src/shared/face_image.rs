use super::bounding_box::BoundingBox;
use super::frame::Frame;

/// Raw pixel crop of a face, stored alongside its shape.
///
/// Pixels are row-major with interleaved channels, the same layout as
/// [`Frame`]. An empty image (zero width or height) is valid and is what a
/// box lying entirely outside the frame produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaceImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl FaceImage {
    /// Returns `None` when `data` does not match the declared shape.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * (channels as usize);
        if data.len() != expected {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Copies the pixels under `bbox`, clamped to the frame bounds.
    pub fn crop(frame: &Frame, bbox: &BoundingBox) -> Self {
        let fw = frame.width() as i64;
        let fh = frame.height() as i64;
        let channels = frame.channels();

        let x1 = (bbox.x.floor() as i64).clamp(0, fw);
        let y1 = (bbox.y.floor() as i64).clamp(0, fh);
        let x2 = (bbox.right().ceil() as i64).clamp(x1, fw);
        let y2 = (bbox.bottom().ceil() as i64).clamp(y1, fh);

        let crop_w = (x2 - x1) as usize;
        let crop_h = (y2 - y1) as usize;
        let mut data = Vec::with_capacity(crop_w * crop_h * channels as usize);

        if let Some(src) = frame.as_ndarray() {
            for row in y1 as usize..y2 as usize {
                for col in x1 as usize..x2 as usize {
                    for c in 0..channels as usize {
                        data.push(src[[row, col, c]]);
                    }
                }
            }
        } else {
            return Self::empty(channels);
        }

        Self {
            data,
            width: crop_w as u32,
            height: crop_h as u32,
            channels,
        }
    }

    pub fn empty(channels: u8) -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
