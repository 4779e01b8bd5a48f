//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! Every input, JPEG photos included, is re-encoded as PNG. Box outlines and
//! arrowheads are thin high-contrast strokes; JPEG ringing around them makes
//! a diamond look like a rectangle and a short arrow vanish.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode the flowchart image for a multimodal request.
///
/// `detail: "high"` lets tile-based models see small connector labels; with
/// the low-detail single tile, "Yes"/"No" captions are routinely lost.
pub fn encode_image(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&png);
    debug!(
        "Encoded {}x{} image → {} bytes PNG, {} bytes base64",
        img.width(),
        img.height(),
        png.len(),
        b64.len()
    );
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn encodes_png_that_decodes_to_same_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 12, Rgb([10, 20, 30])));
        let data = encode_image(&img).unwrap();
        assert_eq!(data.mime_type, "image/png");

        let bytes = STANDARD.decode(&data.data).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (24, 12));
    }
}
