use image::ImageFormat;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Image is required")]
    Missing,
    #[error("Only image uploads are supported")]
    NotAnImage { content_type: Option<String> },
    #[error("Uploaded file is not a recognizable image")]
    Unrecognized,
}

/// Accepts an upload only when the client declared an `image/*` type and the
/// leading bytes match a known image container.
pub fn accept_image(content_type: Option<&str>, bytes: &[u8]) -> Result<ImageFormat, UploadError> {
    let declared = content_type.map(|value| value.trim().to_ascii_lowercase());
    if !declared
        .as_deref()
        .map(|value| value.starts_with("image/"))
        .unwrap_or(false)
    {
        return Err(UploadError::NotAnImage {
            content_type: declared,
        });
    }
    if bytes.is_empty() {
        return Err(UploadError::Missing);
    }
    image::guess_format(bytes).map_err(|_| UploadError::Unrecognized)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageOutputFormat, RgbImage};

    use super::*;

    fn png_bytes() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        RgbImage::new(4, 4)
            .write_to(&mut buffer, ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn accepts_png() {
        assert_eq!(
            accept_image(Some("image/png"), &png_bytes()),
            Ok(ImageFormat::Png)
        );
    }

    #[test]
    fn rejects_non_image_content_type() {
        assert_eq!(
            accept_image(Some("text/plain"), b"hello"),
            Err(UploadError::NotAnImage {
                content_type: Some("text/plain".into())
            })
        );
        assert!(matches!(
            accept_image(None, &png_bytes()),
            Err(UploadError::NotAnImage { content_type: None })
        ));
    }

    #[test]
    fn rejects_mislabelled_payload() {
        assert_eq!(
            accept_image(Some("image/png"), b"#!/bin/sh\nrm -rf /\n"),
            Err(UploadError::Unrecognized)
        );
        assert_eq!(accept_image(Some("image/png"), b""), Err(UploadError::Missing));
    }
}
