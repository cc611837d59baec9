//! Drawn signature images
//!
//! Signature pads hand over PNG bytes, usually wrapped in a
//! `data:image/png;base64,` URL. The image is decoded once into separate
//! colour and alpha planes, which is the layout a PDF image XObject with an
//! `SMask` expects.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::ValidationError;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Decoded signature bitmap, 8 bits per component.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureImage {
    pub width: u32,
    pub height: u32,
    /// RGB triplets, row-major
    pub rgb: Vec<u8>,
    /// One alpha byte per pixel when the source had transparency
    pub alpha: Option<Vec<u8>>,
}

impl SignatureImage {
    /// Decode PNG bytes or a base64 `data:` URL carrying PNG bytes.
    pub fn decode(input: &[u8]) -> Result<Self, ValidationError> {
        if input.is_empty() {
            return Err(ValidationError::EmptySignature);
        }
        if input.starts_with(b"data:") {
            let url = std::str::from_utf8(input)
                .map_err(|_| ValidationError::InvalidImage("data URL is not UTF-8".into()))?;
            return Self::from_data_url(url);
        }
        Self::from_png(input)
    }

    pub fn from_data_url(url: &str) -> Result<Self, ValidationError> {
        let (header, payload) = url
            .split_once(',')
            .ok_or_else(|| ValidationError::InvalidImage("malformed data URL".into()))?;
        if !header.ends_with(";base64") {
            return Err(ValidationError::InvalidImage(
                "data URL must be base64 encoded".into(),
            ));
        }
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| ValidationError::InvalidImage(format!("bad base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(ValidationError::EmptySignature);
        }
        Self::from_png(&bytes)
    }

    pub fn from_png(bytes: &[u8]) -> Result<Self, ValidationError> {
        if !bytes.starts_with(&PNG_MAGIC) {
            return Err(ValidationError::InvalidImage("Invalid PNG magic bytes".into()));
        }

        let mut decoder = png::Decoder::new(Cursor::new(bytes));
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|e| ValidationError::InvalidImage(e.to_string()))?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| ValidationError::InvalidImage(e.to_string()))?;
        buf.truncate(info.buffer_size());
        let (color_type, _) = reader.output_color_type();

        let pixels = (info.width as usize) * (info.height as usize);
        let mut rgb = Vec::with_capacity(pixels * 3);
        let mut alpha = None;

        match color_type {
            png::ColorType::Rgb => rgb = buf,
            png::ColorType::Rgba => {
                let mut a = Vec::with_capacity(pixels);
                for px in buf.chunks_exact(4) {
                    rgb.extend_from_slice(&px[..3]);
                    a.push(px[3]);
                }
                alpha = Some(a);
            }
            png::ColorType::Grayscale => {
                for &g in &buf {
                    rgb.extend_from_slice(&[g, g, g]);
                }
            }
            png::ColorType::GrayscaleAlpha => {
                let mut a = Vec::with_capacity(pixels);
                for px in buf.chunks_exact(2) {
                    rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                    a.push(px[1]);
                }
                alpha = Some(a);
            }
            png::ColorType::Indexed => {
                return Err(ValidationError::InvalidImage(
                    "indexed PNG was not expanded".into(),
                ))
            }
        }

        if info.width == 0 || info.height == 0 {
            return Err(ValidationError::EmptySignature);
        }

        Ok(Self {
            width: info.width,
            height: info.height,
            rgb,
            alpha,
        })
    }

    /// A fully transparent canvas carries no strokes.
    pub fn is_blank(&self) -> bool {
        match &self.alpha {
            Some(alpha) => alpha.iter().all(|&a| a == 0),
            None => false,
        }
    }

    /// Largest size with this image's aspect ratio that fits in the box.
    pub fn scale_to_fit(&self, max_width: f64, max_height: f64) -> (f64, f64) {
        scale_to_fit(
            self.width as f64,
            self.height as f64,
            max_width,
            max_height,
        )
    }
}

pub fn scale_to_fit(width: f64, height: f64, max_width: f64, max_height: f64) -> (f64, f64) {
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    let ratio = (max_width / width).min(max_height / height);
    (width * ratio, height * ratio)
}
