//! Image encoding: trimmed fragment → PNG bytes for embedding in a package.
//!
//! PNG keeps the rendered text and table rules sharp; the fragments are
//! mostly flat white with thin dark strokes, which PNG compresses well.

use image::RgbImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a fragment as PNG.
pub fn encode_fragment(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} fragment → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encode_small_image() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
        let data = encode_fragment(&img).expect("encode should succeed");
        assert_eq!(&data[1..4], b"PNG");
        let back = image::load_from_memory(&data).expect("valid png");
        assert_eq!((back.width(), back.height()), (10, 10));
    }
}
