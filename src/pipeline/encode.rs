//! Image loading: file bytes → base64 payload with a media type.
//!
//! The completion service takes images inline as base64 text. The media
//! type is sniffed from the bytes with the `image` crate rather than trusted
//! from the file extension; anything unrecognised is sent as `image/png`,
//! which is what flowchart exports normally are.

use crate::error::FlowError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// An image ready to be embedded in a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub media_type: &'static str,
    pub data: String,
}

/// Media type for the image formats the completion service accepts.
pub fn sniff_media_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "image/png",
    }
}

/// Encode raw image bytes.
pub fn encode_bytes(bytes: &[u8]) -> EncodedImage {
    let data = STANDARD.encode(bytes);
    let media_type = sniff_media_type(bytes);
    debug!("Encoded {} image → {} bytes base64", media_type, data.len());
    EncodedImage { media_type, data }
}

/// Read and encode the image at `path`.
pub async fn load_image(path: &Path) -> Result<EncodedImage, FlowError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlowError::input_not_found(path, "flowchart image"),
        std::io::ErrorKind::PermissionDenied => FlowError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FlowError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;
    Ok(encode_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn encodes_png_with_media_type() {
        let bytes = png_bytes();
        let encoded = encode_bytes(&bytes);
        assert_eq!(encoded.media_type, "image/png");
        assert_eq!(STANDARD.decode(&encoded.data).unwrap(), bytes);
    }

    #[test]
    fn sniffs_jpeg_magic() {
        assert_eq!(sniff_media_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), "image/jpeg");
    }

    #[test]
    fn unknown_bytes_default_to_png() {
        assert_eq!(sniff_media_type(b"not an image"), "image/png");
    }

    #[tokio::test]
    async fn missing_file_is_input_not_found() {
        let err = load_image(Path::new("/definitely/not/here/flowchart.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InputNotFound { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        std::fs::write(&path, png_bytes()).unwrap();
        let encoded = load_image(&path).await.unwrap();
        assert_eq!(encoded.media_type, "image/png");
        assert!(!encoded.data.is_empty());
    }
}
