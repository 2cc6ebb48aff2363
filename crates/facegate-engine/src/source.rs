use facegate_core::{DecodeError, Frame};

/// An image as handed to the engine, decoded on the engine thread.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Encoded file contents (JPEG, PNG, ...).
    Encoded(Vec<u8>),
    /// Base64 text, optionally with a `data:image/...;base64,` prefix.
    Base64(String),
    /// Already-decoded RGB8 pixels.
    Frame(Frame),
}

impl ImageSource {
    pub fn into_frame(self) -> Result<Frame, DecodeError> {
        match self {
            ImageSource::Encoded(bytes) => Frame::decode(&bytes),
            ImageSource::Base64(text) => Frame::decode_base64(&text),
            ImageSource::Frame(frame) => Ok(frame),
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Encoded(bytes)
    }
}

impl From<Frame> for ImageSource {
    fn from(frame: Frame) -> Self {
        ImageSource::Frame(frame)
    }
}
