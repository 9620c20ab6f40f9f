//! QR code rendering for registered resources.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageOutputFormat, Rgb};
use qrcode::QrCode;
use sharelock_gateway::{CodeEncoder, CodeImage, EncodeError};
use std::io::Cursor;

const DARK: Rgb<u8> = Rgb([0x1E, 0x3A, 0x8A]);
const LIGHT: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

/// Renders payloads as PNG QR codes, dark blue on white.
#[derive(Debug, Clone, Copy)]
pub struct QrCodeEncoder {
    min_dimension: u32,
}

impl QrCodeEncoder {
    pub fn new(min_dimension: u32) -> Self {
        Self { min_dimension }
    }
}

impl Default for QrCodeEncoder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl CodeEncoder for QrCodeEncoder {
    fn encode(&self, payload: &str) -> Result<CodeImage, EncodeError> {
        let code = QrCode::new(payload.as_bytes()).map_err(|e| EncodeError(e.to_string()))?;
        let pixels = code
            .render::<Rgb<u8>>()
            .dark_color(DARK)
            .light_color(LIGHT)
            .min_dimensions(self.min_dimension, self.min_dimension)
            .build();

        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(pixels)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .map_err(|e| EncodeError(e.to_string()))?;

        Ok(CodeImage {
            content_type: "image/png".to_string(),
            bytes,
        })
    }
}

/// `data:` URL embedding a rendered code, for clients that display it inline.
pub fn data_url(image: &CodeImage) -> String {
    format!(
        "data:{};base64,{}",
        image.content_type,
        STANDARD.encode(&image.bytes)
    )
}
