//! Asset Helpers (spec §4.I): decode image bytes read through the Archive
//! Reader into a plain RGBA8 CPU surface, ready for a GPU Session texture
//! upload. This crate owns no archive or GPU state of its own; it is a pure
//! decode step between the two.

use wallpaperd_error::WdError;

/// A decoded RGBA8 surface with no padding between rows: `pitch` is always
/// `width * 4`. Surfaces whose decoded pitch doesn't match that (some exotic
/// source formats pad rows) are rejected rather than silently re-packed,
/// per spec §4.I ("reject non-matching pitches as unsupported").
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub rgba8: Vec<u8>,
}

/// Decode `bytes` (the contents of an archive entry) into an RGBA8 surface.
/// The codec is selected by sniffing the bytes, not by file extension, since
/// archive entries carry scene-chosen names with no guaranteed extension.
pub fn decode_image_to_rgba8(bytes: &[u8]) -> Result<DecodedImage, WdError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| WdError::ArchiveIo(format!("image decode failed: {e}")))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pitch = width * 4;
    let raw = rgba.into_raw();
    if raw.len() as u64 != u64::from(pitch) * u64::from(height) {
        return Err(WdError::ArchiveIo(format!(
            "decoded image pitch does not match width*4 (width={width}, height={height}): unsupported"
        )));
    }
    Ok(DecodedImage { width, height, pitch, rgba8: raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_1x1_png() -> Vec<u8> {
        let mut img = image::RgbaImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decodes_a_minimal_png() {
        let bytes = encode_1x1_png();
        let decoded = decode_image_to_rgba8(&bytes).unwrap();
        assert_eq!(decoded.width, 1);
        assert_eq!(decoded.height, 1);
        assert_eq!(decoded.pitch, 4);
        assert_eq!(decoded.rgba8, vec![10, 20, 30, 255]);
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = decode_image_to_rgba8(&[0u8, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, WdError::ArchiveIo(_)));
    }
}
