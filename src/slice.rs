//! Extraction of a single slice as a raster image.
//!
//! Native extraction keeps the stored sample type and values (no modality
//! rescale, no windowing). Thumbnail extraction min/max rescales the
//! intensities to `0..=255`, optionally shrinking the image to fit a
//! maximum edge length.

use crate::{enums::SampleType, interpolator::Interpolator, record::FileRecord};

use dicom::{
    object::{OpenFileOptions, open_file},
    pixeldata::{ConvertOptions, DecodedPixelData, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use ndarray::{Array3, Axis, s};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Could not open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: dicom::object::ReadError,
    },

    #[error("Could not decode pixel data: {0}")]
    Decode(#[source] DecodeError),

    #[error("Unsupported {bits_allocated}-bit samples (representation {pixel_representation})")]
    UnsupportedSampleType {
        bits_allocated: u16,
        pixel_representation: u16,
    },

    #[error("Cannot encode {sample_type:?} samples with {channels} channels")]
    UnsupportedImage {
        sample_type: SampleType,
        channels: u16,
    },

    #[error("Invalid image buffer")]
    InvalidBuffer,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Why the pixel data of a readable header could not be turned into samples.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The pixel data element itself is malformed or cut short.
    #[error("{0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("{0}")]
    Pixel(#[from] dicom::pixeldata::Error),
}

impl From<dicom::pixeldata::Error> for ExtractError {
    fn from(error: dicom::pixeldata::Error) -> Self {
        ExtractError::Decode(DecodeError::Pixel(error))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Largest thumbnail edge in pixels.
    pub thumbnail_max_size: Option<u32>,
}

/// Interleaved samples, row by row.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
}

impl Samples {
    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::U8(_) => SampleType::U8,
            Samples::I8(_) => SampleType::I8,
            Samples::U16(_) => SampleType::U16,
            Samples::I16(_) => SampleType::I16,
            Samples::U32(_) => SampleType::U32,
            Samples::I32(_) => SampleType::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::I8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::I16(v) => v.len(),
            Samples::U32(v) => v.len(),
            Samples::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub channels: u16,
    pub samples: Samples,
}

impl RasterImage {
    pub fn sample_type(&self) -> SampleType {
        self.samples.sample_type()
    }

    /// Convert into an [`image`] buffer, for 8 and 16 bit unsigned samples.
    pub fn to_dynamic_image(&self) -> Result<DynamicImage, ExtractError> {
        let (width, height) = (self.width, self.height);
        let image = match (&self.samples, self.channels) {
            (Samples::U8(data), 1) => DynamicImage::ImageLuma8(
                ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.clone())
                    .ok_or(ExtractError::InvalidBuffer)?,
            ),
            (Samples::U8(data), 3) => DynamicImage::ImageRgb8(
                ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data.clone())
                    .ok_or(ExtractError::InvalidBuffer)?,
            ),
            (Samples::U16(data), 1) => DynamicImage::ImageLuma16(
                ImageBuffer::<Luma<u16>, _>::from_raw(width, height, data.clone())
                    .ok_or(ExtractError::InvalidBuffer)?,
            ),
            (Samples::U16(data), 3) => DynamicImage::ImageRgb16(
                ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, data.clone())
                    .ok_or(ExtractError::InvalidBuffer)?,
            ),
            (samples, channels) => {
                return Err(ExtractError::UnsupportedImage {
                    sample_type: samples.sample_type(),
                    channels,
                });
            }
        };
        Ok(image)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ExtractError> {
        self.to_dynamic_image()?.save(path)?;
        Ok(())
    }
}

/// Extract the slice stored in `record`'s file.
pub fn extract(
    record: &FileRecord,
    thumbnail: bool,
    options: &ExtractOptions,
) -> Result<RasterImage, ExtractError> {
    extract_path(record.path(), thumbnail, options)
}

/// Extract the first frame of the DICOM file at `path`.
pub fn extract_path(
    path: &Path,
    thumbnail: bool,
    options: &ExtractOptions,
) -> Result<RasterImage, ExtractError> {
    let object = open_file(path).map_err(|source| classify_read_error(path, source))?;
    let pixel = object.decode_pixel_data()?;
    let width = pixel.columns();
    let height = pixel.rows();
    let channels = pixel.samples_per_pixel();
    debug!(
        "{}: {width}x{height}x{channels}, {} bits allocated",
        path.display(),
        pixel.bits_allocated()
    );

    if thumbnail {
        let convert_options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        let frame = pixel
            .to_ndarray_with_options::<f32>(&convert_options)?
            .slice_move(s![0, .., .., ..]);
        return Ok(thumbnail_from_frame(frame, options.thumbnail_max_size));
    }

    let pixel_representation = object
        .element(tags::PIXEL_REPRESENTATION)
        .ok()
        .and_then(|element| element.to_int::<u16>().ok())
        .unwrap_or(0);
    let bits_allocated = pixel.bits_allocated();
    let sample_type = SampleType::from_bits(bits_allocated, pixel_representation).ok_or(
        ExtractError::UnsupportedSampleType {
            bits_allocated,
            pixel_representation,
        },
    )?;

    Ok(RasterImage {
        width,
        height,
        channels,
        samples: native_samples(&pixel, sample_type)?,
    })
}

/// A failed full read is a decode failure when the header up to the pixel
/// data still parses, and an open failure otherwise.
fn classify_read_error(path: &Path, source: dicom::object::ReadError) -> ExtractError {
    let header = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path);
    match header {
        Ok(_) => ExtractError::Decode(DecodeError::Read(source)),
        Err(_) => ExtractError::Open {
            path: path.to_path_buf(),
            source,
        },
    }
}

fn native_samples(
    pixel: &DecodedPixelData<'_>,
    sample_type: SampleType,
) -> Result<Samples, ExtractError> {
    let options = ConvertOptions::new()
        .with_modality_lut(ModalityLutOption::None)
        .with_voi_lut(VoiLutOption::Identity);

    macro_rules! first_frame {
        ($ty:ty, $variant:ident) => {
            Samples::$variant(
                pixel
                    .to_ndarray_with_options::<$ty>(&options)?
                    .slice_move(s![0, .., .., ..])
                    .iter()
                    .copied()
                    .collect(),
            )
        };
    }

    Ok(match sample_type {
        SampleType::U8 => first_frame!(u8, U8),
        SampleType::I8 => first_frame!(i8, I8),
        SampleType::U16 => first_frame!(u16, U16),
        SampleType::I16 => first_frame!(i16, I16),
        SampleType::U32 => first_frame!(u32, U32),
        SampleType::I32 => first_frame!(i32, I32),
    })
}

/// Rescale a `(rows, columns, samples)` frame into an 8-bit thumbnail.
fn thumbnail_from_frame(frame: Array3<f32>, max_size: Option<u32>) -> RasterImage {
    let (rows, columns, channels) = frame.dim();
    let (width, height) = max_size.map_or((columns as u32, rows as u32), |max_size| {
        Interpolator::fit_within(columns as u32, rows as u32, max_size)
    });

    let frame = if (width as usize, height as usize) == (columns, rows) {
        frame
    } else {
        let mut resized = Array3::<f32>::zeros((height as usize, width as usize, channels));
        for (channel, mut target) in resized.axis_iter_mut(Axis(2)).enumerate() {
            let plane = frame.index_axis(Axis(2), channel);
            target.assign(&Interpolator::resize(&plane, width, height));
        }
        resized
    };

    let values: Vec<f32> = frame.iter().copied().collect();
    RasterImage {
        width,
        height,
        channels: channels as u16,
        samples: Samples::U8(rescale_to_u8(&values)),
    }
}

/// Linearly map `values` onto `0..=255`: the minimum becomes 0, the maximum 255.
///
/// A constant input maps entirely to 0.
pub fn rescale_to_u8(values: &[f32]) -> Vec<u8> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        });
    let range = max - min;
    values
        .par_iter()
        .map(|&v| {
            if range > 0.0 {
                ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect()
}
