//! Frame extraction.
//!
//! The pixel data element decides the path: encapsulated pixel data is cut
//! along fragment boundaries, native pixel data is sliced at a fixed stride.
//! Each path reports its own error variants; neither is translated into the
//! other's.

mod encapsulated;
mod uncompressed;

use bytes::Bytes;

use crate::{
    dataset::{DataSet, tags},
    error::ExtractionError,
};

/// Which extraction path a data set takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelDataLayout {
    Encapsulated,
    Uncompressed,
}

/// Inspect the pixel data element and report which path
/// [`extract_frame`] will take.
pub fn pixel_data_layout(
    data_set: &DataSet,
) -> Result<PixelDataLayout, ExtractionError> {
    let pixel_data = data_set
        .element(tags::PIXEL_DATA)
        .ok_or(ExtractionError::MissingPixelData)?;

    Ok(if pixel_data.encapsulated_pixel_data {
        PixelDataLayout::Encapsulated
    } else {
        PixelDataLayout::Uncompressed
    })
}

/// Extract the raw bytes of one frame.
///
/// Contiguous frames are returned as views into the data set buffer; frames
/// spread over several fragments are copied into one buffer.
pub fn extract_frame(
    data_set: &DataSet,
    frame_index: usize,
) -> Result<Bytes, ExtractionError> {
    let pixel_data = data_set
        .element(tags::PIXEL_DATA)
        .ok_or(ExtractionError::MissingPixelData)?;

    if pixel_data.encapsulated_pixel_data {
        encapsulated::frame(data_set, pixel_data, frame_index)
    } else {
        uncompressed::frame(data_set, pixel_data, frame_index)
    }
}
