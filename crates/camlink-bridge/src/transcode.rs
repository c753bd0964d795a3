//! Frame transcoding — decode, rotate, re-encode.
//!
//! Sensors are mounted sideways relative to the display, so every frame is
//! decoded to pixels, rotated (90° clockwise by default), and re-encoded
//! in its original format before leaving the device.

use bytes::Bytes;
use camlink_core::{CamLinkError, Rotation};
use image::codecs::jpeg::JpegEncoder;

/// Decode an encoded frame, apply `rotation`, and re-encode as JPEG at
/// `quality` (1–100).
///
/// For 90°/270° the output's pixel dimensions are the input's height ×
/// width. A decode or encode failure is returned as
/// [`CamLinkError::Transcode`]; the pipeline logs it and skips the frame —
/// one bad frame never stops the stream.
pub fn transcode(frame: &[u8], rotation: Rotation, quality: u8) -> Result<Bytes, CamLinkError> {
    let decoded = image::load_from_memory(frame).map_err(|e| CamLinkError::Transcode {
        reason: format!("decode: {e}"),
    })?;

    let rotated = match rotation {
        Rotation::None => decoded,
        Rotation::Cw90 => decoded.rotate90(),
        Rotation::Cw180 => decoded.rotate180(),
        Rotation::Cw270 => decoded.rotate270(),
    };

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rotated
        .write_with_encoder(encoder)
        .map_err(|e| CamLinkError::Transcode {
            reason: format!("encode: {e}"),
        })?;

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    /// Encode a gradient test image so quality comparisons have real
    /// content to work with.
    fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut jpeg = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 90))
            .unwrap();
        jpeg
    }

    #[test]
    fn ninety_degrees_swaps_dimensions() {
        let input = jpeg_fixture(40, 30);
        let output = transcode(&input, Rotation::Cw90, 100).unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 40));
    }

    #[test]
    fn two_seventy_degrees_swaps_dimensions() {
        let input = jpeg_fixture(40, 30);
        let output = transcode(&input, Rotation::Cw270, 100).unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 40));
    }

    #[test]
    fn one_eighty_preserves_dimensions() {
        let input = jpeg_fixture(40, 30);
        let output = transcode(&input, Rotation::Cw180, 100).unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn output_is_jpeg_even_for_identity_rotation() {
        let input = jpeg_fixture(16, 16);
        let output = transcode(&input, Rotation::None, 100).unwrap();
        // Re-encoded, not passed through: still starts with the SOI marker.
        assert_eq!(&output[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn garbage_input_is_a_transcode_error() {
        let err = transcode(&[0xDE, 0xAD, 0xBE, 0xEF], Rotation::Cw90, 100).unwrap_err();
        assert!(matches!(err, CamLinkError::Transcode { .. }));
    }

    #[test]
    fn truncated_jpeg_is_a_transcode_error() {
        let mut input = jpeg_fixture(40, 30);
        input.truncate(input.len() / 2);
        assert!(transcode(&input, Rotation::Cw90, 100).is_err());
    }

    #[test]
    fn lower_quality_produces_smaller_output() {
        let input = jpeg_fixture(160, 120);
        let high = transcode(&input, Rotation::Cw90, 100).unwrap();
        let low = transcode(&input, Rotation::Cw90, 40).unwrap();
        assert!(
            low.len() < high.len(),
            "quality 40 ({}) should be smaller than quality 100 ({})",
            low.len(),
            high.len()
        );
    }
}
