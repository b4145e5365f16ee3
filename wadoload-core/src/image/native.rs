use async_trait::async_trait;
use bytes::Bytes;

use super::{DecodedImage, ImageFactory, LoadOptions};
use crate::{
    dataset::{DataSet, Tag, tags, transfer_syntax},
    error::ConstructionError,
};

const NATIVE_SYNTAXES: [&str; 2] = [
    transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN,
    transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN,
];

/// Builds images from native (uncompressed little endian) pixel data.
///
/// Compressed transfer syntaxes are refused; plug in a decoding
/// [`ImageFactory`] to handle them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeImageFactory;

#[async_trait]
impl ImageFactory for NativeImageFactory {
    async fn create_image(
        &self,
        image_id: &str,
        pixel_data: Bytes,
        transfer_syntax: Option<&str>,
        _options: &LoadOptions,
        data_set: &DataSet,
    ) -> Result<DecodedImage, ConstructionError> {
        let syntax =
            transfer_syntax.unwrap_or(transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN);
        if !NATIVE_SYNTAXES.contains(&syntax) {
            return Err(ConstructionError::UnsupportedTransferSyntax(
                syntax.to_owned(),
            ));
        }

        let rows = required(data_set, tags::ROWS)?;
        let columns = required(data_set, tags::COLUMNS)?;
        let bits_allocated = required(data_set, tags::BITS_ALLOCATED)?;
        let samples_per_pixel = data_set.uint16(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        let pixel_representation =
            data_set.uint16(tags::PIXEL_REPRESENTATION).unwrap_or(0);

        // 1-bit frames arrive unpacked, one byte per pixel.
        let bytes_per_sample = usize::from(bits_allocated.max(8) / 8);
        let expected = usize::from(rows)
            * usize::from(columns)
            * usize::from(samples_per_pixel)
            * bytes_per_sample;
        if pixel_data.len() != expected {
            return Err(ConstructionError::PixelDataLength {
                expected,
                actual: pixel_data.len(),
            });
        }

        let (min_pixel_value, max_pixel_value) = if samples_per_pixel == 1 {
            pixel_range(&pixel_data, bits_allocated.max(8), pixel_representation == 1)
                .unzip()
        } else {
            (None, None)
        };

        Ok(DecodedImage {
            image_id: image_id.to_owned(),
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            pixel_representation,
            photometric_interpretation: data_set
                .string(tags::PHOTOMETRIC_INTERPRETATION),
            transfer_syntax: transfer_syntax.map(str::to_owned),
            slope: data_set.float_string(tags::RESCALE_SLOPE).unwrap_or(1.0),
            intercept: data_set
                .float_string(tags::RESCALE_INTERCEPT)
                .unwrap_or(0.0),
            window_center: data_set.float_string(tags::WINDOW_CENTER),
            window_width: data_set.float_string(tags::WINDOW_WIDTH),
            min_pixel_value,
            max_pixel_value,
            pixel_data,
        })
    }
}

fn required(data_set: &DataSet, tag: Tag) -> Result<u16, ConstructionError> {
    data_set
        .uint16(tag)
        .ok_or(ConstructionError::MissingAttribute(tag))
}

fn pixel_range(bytes: &[u8], bits: u16, signed: bool) -> Option<(i32, i32)> {
    let values: Box<dyn Iterator<Item = i32> + '_> = match (bits, signed) {
        (8, false) => Box::new(bytes.iter().map(|&b| i32::from(b))),
        (8, true) => Box::new(bytes.iter().map(|&b| i32::from(b as i8))),
        (16, false) => Box::new(
            bytes
                .chunks_exact(2)
                .map(|c| i32::from(u16::from_le_bytes([c[0], c[1]]))),
        ),
        (16, true) => Box::new(
            bytes
                .chunks_exact(2)
                .map(|c| i32::from(i16::from_le_bytes([c[0], c[1]]))),
        ),
        _ => return None,
    };

    values.fold(None, |range, value| match range {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })
}
