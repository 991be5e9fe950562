//! QR decoding over still images.

use anyhow::{Context, Result};
use courier_core::CodeDecoder;
use tracing::debug;

/// Decodes every QR symbol found in a JPEG, PNG, BMP, TIFF, or GIF image.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl CodeDecoder for QrDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let image = image::load_from_memory(bytes).context("image could not be decoded")?;
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();
        let width = usize::try_from(width).context("image width out of range")?;
        let height = usize::try_from(height).context("image height out of range")?;
        let pixels = luma.as_raw();

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            pixels.get(y * width + x).copied().unwrap_or(0)
        });

        let mut codes = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, content)) => codes.push(content),
                Err(err) => debug!(error = %err, "skipping unreadable qr grid"),
            }
        }
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, ImageFormat, Luma, imageops};
    use std::io::Cursor;

    const SMALL_CODE: &[u8] = include_bytes!("../tests/fixtures/rqrr.gif");
    const URL_CODE: &[u8] = include_bytes!("../tests/fixtures/github.gif");
    const MARGIN: u32 = 24;

    fn png(image: &GrayImage) -> Result<Vec<u8>> {
        let mut encoded = Cursor::new(Vec::new());
        image.write_to(&mut encoded, ImageFormat::Png)?;
        Ok(encoded.into_inner())
    }

    #[test]
    fn single_code_yields_its_text() -> Result<()> {
        assert_eq!(QrDecoder.decode(SMALL_CODE)?, vec!["rqrr".to_string()]);
        Ok(())
    }

    #[test]
    fn stacked_codes_are_returned_top_to_bottom() -> Result<()> {
        let top = image::load_from_memory(SMALL_CODE)?.to_luma8();
        let bottom = image::load_from_memory(URL_CODE)?.to_luma8();
        let width = top.width().max(bottom.width()) + 2 * MARGIN;
        let height = top.height() + bottom.height() + 3 * MARGIN;
        let mut sheet: GrayImage = ImageBuffer::from_pixel(width, height, Luma([255]));
        imageops::replace(&mut sheet, &top, i64::from(MARGIN), i64::from(MARGIN));
        imageops::replace(
            &mut sheet,
            &bottom,
            i64::from(MARGIN),
            i64::from(top.height() + 2 * MARGIN),
        );

        assert_eq!(
            QrDecoder.decode(&png(&sheet)?)?,
            vec![
                "rqrr".to_string(),
                "https://github.com/WanzenBug/rqrr".to_string()
            ]
        );
        Ok(())
    }

    #[test]
    fn blank_image_has_no_codes() -> Result<()> {
        let blank: GrayImage = ImageBuffer::from_pixel(64, 48, Luma([255]));
        assert!(QrDecoder.decode(&png(&blank)?)?.is_empty());
        Ok(())
    }

    #[test]
    fn non_image_bytes_fail_to_decode() {
        assert!(QrDecoder.decode(b"definitely not an image").is_err());
    }
}
