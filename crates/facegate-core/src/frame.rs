//! Decoded image type and the pixel helpers shared by the models.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,
    #[error("image has zero width or height")]
    ZeroSized,
    #[error("invalid RGB buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{0}")]
    Image(#[from] image::ImageError),
}

/// A decoded RGB8 image (row-major, 3 bytes per pixel).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap an interleaved RGB8 buffer.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::ZeroSized);
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(DecodeError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Decode an encoded image (JPEG, PNG, ...) into RGB8.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        Self::from_image(rgb)
    }

    /// Decode a base64 payload, with or without a `data:image/...;base64,` prefix.
    pub fn decode_base64(payload: &str) -> Result<Self, DecodeError> {
        let payload = payload.trim();
        let encoded = match payload.strip_prefix("data:image") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(""),
            None => payload,
        };
        if encoded.is_empty() {
            return Err(DecodeError::Empty);
        }
        let bytes = BASE64.decode(encoded)?;
        Self::decode(&bytes)
    }

    pub fn from_image(image: RgbImage) -> Result<Self, DecodeError> {
        let (width, height) = image.dimensions();
        Self::from_rgb(width, height, image.into_raw())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Luma conversion with BT.601 weights, rounded to the nearest integer.
    pub fn to_grayscale(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Bilinearly sample channel `c` at sub-pixel position (`x`, `y`).
    ///
    /// Samples outside the image read as 0 (black).
    pub fn sample(&self, x: f32, y: f32, c: usize) -> f32 {
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let px = |x: i32, y: i32| -> f32 {
            if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
                self.data[(y as usize * self.width as usize + x as usize) * 3 + c] as f32
            } else {
                0.0
            }
        };

        px(x0, y0) * (1.0 - fx) * (1.0 - fy)
            + px(x0 + 1, y0) * fx * (1.0 - fy)
            + px(x0, y0 + 1) * (1.0 - fx) * fy
            + px(x0 + 1, y0 + 1) * fx * fy
    }

    /// Bilinear resize, edge-clamped, into a packed RGB8 buffer.
    pub fn resize(&self, new_w: usize, new_h: usize) -> Vec<u8> {
        let width = self.width as usize;
        let height = self.height as usize;
        let scale_x = width as f32 / new_w as f32;
        let scale_y = height as f32 / new_h as f32;

        let mut out = vec![0u8; new_w * new_h * 3];
        for y in 0..new_h {
            let src_y = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (height - 1) as f32);
            for x in 0..new_w {
                let src_x = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (width - 1) as f32);
                for c in 0..3 {
                    let val = self.sample(src_x, src_y, c);
                    out[(y * new_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        out
    }
}
