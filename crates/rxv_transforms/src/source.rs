//! Image sources and decoding to raw 8-bit pixels.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use ndarray::Array3;
use rxv_core::{CoreError, Result};

/// Resampling filter used for every resize.
///
/// Bicubic (Catmull-Rom) interpolation. Training and serving must resize with
/// the same filter or accuracy silently degrades.
pub const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// An image in any of the admissible input forms.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Path to an encoded image file.
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, BMP).
    Bytes(Vec<u8>),
    /// Decoded 8-bit pixels laid out as `(H, W, C)`.
    Pixels(Array3<u8>),
    /// An already decoded image.
    Image(DynamicImage),
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Array3<u8>> for ImageSource {
    fn from(pixels: Array3<u8>) -> Self {
        Self::Pixels(pixels)
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        Self::Image(image)
    }
}

/// Row-major 8-bit pixels, channels interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPixels {
    /// Height in pixels.
    pub height: u32,
    /// Width in pixels.
    pub width: u32,
    /// Channels per pixel.
    pub channels: usize,
    /// `height * width * channels` values.
    pub data: Vec<u8>,
}

impl RawPixels {
    /// Decode any source into raw pixels.
    ///
    /// # Errors
    ///
    /// [`CoreError::ImageDecode`] when a file or byte buffer cannot be
    /// decoded, [`CoreError::Shape`] for a malformed pixel array or an image
    /// with a zero dimension.
    pub fn decode(source: ImageSource) -> Result<Self> {
        match source {
            ImageSource::Path(path) => {
                let image = image::open(&path).map_err(|e| {
                    CoreError::ImageDecode(format!("{}: {e}", path.display()))
                })?;
                Self::from_image(image)
            }
            ImageSource::Bytes(bytes) => {
                let image = image::load_from_memory(&bytes)
                    .map_err(|e| CoreError::ImageDecode(e.to_string()))?;
                Self::from_image(image)
            }
            ImageSource::Pixels(pixels) => Self::from_array(&pixels),
            ImageSource::Image(image) => Self::from_image(image),
        }
    }

    /// Flatten a decoded image, keeping its native channel count.
    ///
    /// Images with more than 8 bits per sample are scaled down to 8 bits.
    ///
    /// # Errors
    ///
    /// [`CoreError::Shape`] if the image has no pixels.
    pub fn from_image(image: DynamicImage) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        let channels = usize::from(image.color().channel_count());
        if height == 0 || width == 0 {
            return Err(CoreError::shape(
                "non-empty image",
                format!("({height}, {width}, {channels})"),
            ));
        }
        let data = match channels {
            1 => image.into_luma8().into_raw(),
            2 => image.into_luma_alpha8().into_raw(),
            4 => image.into_rgba8().into_raw(),
            _ => image.into_rgb8().into_raw(),
        };
        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    /// Copy an `(H, W, C)` array in logical order.
    pub fn from_array(pixels: &Array3<u8>) -> Result<Self> {
        let (height, width, channels) = pixels.dim();
        if height == 0 || width == 0 || channels == 0 {
            return Err(CoreError::shape(
                "non-empty (H, W, C) pixel array",
                format!("({height}, {width}, {channels})"),
            ));
        }
        let height = u32::try_from(height)
            .map_err(|_| CoreError::shape("height within u32", height))?;
        let width =
            u32::try_from(width).map_err(|_| CoreError::shape("width within u32", width))?;
        Ok(Self {
            height,
            width,
            channels,
            data: pixels.iter().copied().collect(),
        })
    }

    /// Resize to `(height, width)` with [`RESAMPLE_FILTER`].
    ///
    /// An image already at the target size is returned untouched.
    pub fn resize(self, height: u32, width: u32) -> Result<Self> {
        if self.height == height && self.width == width {
            return Ok(self);
        }
        let data = match self.channels {
            1 => resize_buffer::<Luma<u8>>(&self, height, width)?,
            2 => resize_buffer::<LumaA<u8>>(&self, height, width)?,
            3 => resize_buffer::<Rgb<u8>>(&self, height, width)?,
            4 => resize_buffer::<Rgba<u8>>(&self, height, width)?,
            other => return Err(CoreError::shape("1 to 4 channels", other)),
        };
        Ok(Self {
            height,
            width,
            channels: self.channels,
            data,
        })
    }
}

fn resize_buffer<P>(pixels: &RawPixels, height: u32, width: u32) -> Result<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let buffer = ImageBuffer::<P, &[u8]>::from_raw(pixels.width, pixels.height, &pixels.data[..])
        .ok_or_else(|| {
            CoreError::shape(
                format!("{} values", pixels.height as usize * pixels.width as usize * pixels.channels),
                pixels.data.len(),
            )
        })?;
    Ok(imageops::resize(&buffer, width, height, RESAMPLE_FILTER).into_raw())
}
