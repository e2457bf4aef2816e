use crate::error::{DecodeError, InferenceError};
use crate::model::InputSize;
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;

/// Either side of the decode step can be fed to [`to_tensor`].
pub enum ImageInput<'a> {
    Bytes(&'a [u8]),
    Decoded(&'a RgbImage),
}

/// Decodes an uploaded buffer into an RGB pixel grid. The format is guessed
/// from the content.
pub fn decode(buffer: &[u8]) -> Result<RgbImage, DecodeError> {
    if buffer.is_empty() {
        return Err(DecodeError::Empty);
    }
    let img = image::load_from_memory(buffer)?;
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::NoPixels { width, height });
    }
    Ok(img.to_rgb8())
}

/// Resizes to `size` with bilinear filtering (aspect ratio is not preserved)
/// and scales channels to [0, 1].
/// Returns a tensor of shape [1, H, W, 3].
pub fn to_tensor(input: ImageInput<'_>, size: InputSize) -> Result<Array4<f32>, InferenceError> {
    match input {
        ImageInput::Bytes(buffer) => {
            let rgb =
                decode(buffer).map_err(|e| InferenceError::PreprocessingError(e.to_string()))?;
            rgb_to_tensor(&rgb, size)
        }
        ImageInput::Decoded(rgb) => rgb_to_tensor(rgb, size),
    }
}

pub fn rgb_to_tensor(rgb: &RgbImage, size: InputSize) -> Result<Array4<f32>, InferenceError> {
    if size.width == 0 || size.height == 0 {
        return Err(InferenceError::PreprocessingError(format!(
            "target size must be non-zero, got {}x{}",
            size.width, size.height
        )));
    }

    let resized = image::imageops::resize(rgb, size.width, size.height, FilterType::Triangle);

    // Row-major RGB bytes are already in [H, W, C] order.
    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    let array = Array4::from_shape_vec(
        (1, size.height as usize, size.width as usize, 3),
        data,
    )?;

    Ok(array)
}
