use ndarray::ArrayView3;

/// One decoded frame of the input sequence: row-major interleaved pixels.
///
/// The tracker never interprets pixel values; frames only feed the
/// detector and the crop extraction for persistence.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
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

    /// Position of the frame in its source sequence, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `(height, width, channels)` view over the pixel buffer.
    pub fn as_ndarray(&self) -> Option<ArrayView3<'_, u8>> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels as usize,
            ),
            &self.data,
        )
        .ok()
    }
}
