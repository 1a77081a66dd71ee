use std::io::Cursor;

use image::{ImageFormat, ImageReader};

/// Largest accepted upload.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Smallest accepted width and height, in pixels.
pub const MIN_RESOLUTION: u32 = 300;

/// Check a photo before it is uploaded for a try-on.
///
/// Only JPEG is accepted, at most [`MAX_IMAGE_BYTES`], and at least
/// [`MIN_RESOLUTION`] pixels on each side. Returns the image dimensions.
pub fn validate_image(bytes: &[u8]) -> Result<(u32, u32), ImageValidationError> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ImageValidationError::TooLarge(bytes.len()));
    }

    let format = image::guess_format(bytes).map_err(|_| ImageValidationError::UnknownFormat)?;
    if format != ImageFormat::Jpeg {
        return Err(ImageValidationError::NotJpeg(format));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Jpeg)
        .into_dimensions()
        .map_err(ImageValidationError::Decode)?;

    if width < MIN_RESOLUTION || height < MIN_RESOLUTION {
        return Err(ImageValidationError::TooSmall { width, height });
    }

    Ok((width, height))
}

#[derive(Debug, thiserror::Error)]
pub enum ImageValidationError {
    #[error("Image is {0} bytes, over the 10MB limit")]
    TooLarge(usize),

    #[error("Unrecognised image format")]
    UnknownFormat,

    #[error("Only JPG or JPEG images are accepted, got {0:?}")]
    NotJpeg(ImageFormat),

    #[error("Image is {width}x{height}px, minimum is 300x300px")]
    TooSmall { width: u32, height: u32 },

    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}
