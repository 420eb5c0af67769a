//! Page image encoding

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::{RasterBuffer, RasterError};

/// Compressed page image ready for display
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    /// `data:` URL for embedding straight into an `<img>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.data))
    }
}

/// Encode an RGBA buffer as JPEG.
///
/// JPEG has no alpha channel, so pixels are flattened over white (the paper
/// color of a PDF page).
pub fn encode_jpeg(buffer: &RasterBuffer, quality: u8) -> Result<EncodedImage, RasterError> {
    let expected = buffer.width as usize * buffer.height as usize * 4;
    if buffer.pixels.len() != expected {
        return Err(RasterError::Image(format!(
            "buffer holds {} bytes, expected {} for {}x{}",
            buffer.pixels.len(),
            expected,
            buffer.width,
            buffer.height
        )));
    }

    let mut rgb = Vec::with_capacity(buffer.width as usize * buffer.height as usize * 3);
    for px in buffer.pixels.chunks_exact(4) {
        let alpha = px[3] as u32;
        for &channel in &px[..3] {
            let blended = (channel as u32 * alpha + 255 * (255 - alpha)) / 255;
            rgb.push(blended as u8);
        }
    }

    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut output), quality.clamp(1, 100))
        .write_image(&rgb, buffer.width, buffer.height, ExtendedColorType::Rgb8)
        .map_err(|e| RasterError::Image(e.to_string()))?;

    Ok(EncodedImage {
        data: output,
        mime: "image/jpeg",
        width: buffer.width,
        height: buffer.height,
    })
}
