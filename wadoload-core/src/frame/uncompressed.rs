use bytes::Bytes;

use crate::{
    dataset::{DataSet, Element, Tag, tags},
    error::ExtractionError,
};

pub(super) fn frame(
    data_set: &DataSet,
    pixel_data: &Element,
    frame_index: usize,
) -> Result<Bytes, ExtractionError> {
    let rows = required(data_set, tags::ROWS)?;
    let columns = required(data_set, tags::COLUMNS)?;
    let samples_per_pixel = data_set.uint16(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
    let bits_allocated = required(data_set, tags::BITS_ALLOCATED)?;

    let pixels_per_frame =
        usize::from(rows) * usize::from(columns) * usize::from(samples_per_pixel);
    if pixels_per_frame == 0 {
        return Err(ExtractionError::InvalidGeometry {
            rows,
            columns,
            samples_per_pixel,
        });
    }

    let payload = data_set.element_bytes(pixel_data).ok_or(
        ExtractionError::TruncatedPixelData {
            offset: pixel_data.data_offset,
            length: pixel_data.length,
            available: data_set.byte_len(),
        },
    )?;

    match bits_allocated {
        1 => unpack_binary_frame(&payload, pixels_per_frame, frame_index),
        8 | 16 | 32 => {
            let frame_len = pixels_per_frame * usize::from(bits_allocated / 8);
            let out_of_bounds = || ExtractionError::FrameOutOfBounds {
                frame: frame_index,
                frame_len,
                frame_count: payload.len() / frame_len,
            };
            let start = frame_index
                .checked_mul(frame_len)
                .ok_or_else(out_of_bounds)?;
            let end = start
                .checked_add(frame_len)
                .filter(|end| *end <= payload.len())
                .ok_or_else(out_of_bounds)?;
            Ok(payload.slice(start..end))
        }
        other => Err(ExtractionError::UnsupportedBitsAllocated(other)),
    }
}

fn required(data_set: &DataSet, tag: Tag) -> Result<u16, ExtractionError> {
    data_set
        .uint16(tag)
        .ok_or(ExtractionError::MissingAttribute(tag))
}

/// Bit-packed frames do not start on byte boundaries, so they are expanded to
/// one byte per pixel.
fn unpack_binary_frame(
    payload: &[u8],
    pixels_per_frame: usize,
    frame_index: usize,
) -> Result<Bytes, ExtractionError> {
    let out_of_bounds = || ExtractionError::FrameOutOfBounds {
        frame: frame_index,
        frame_len: pixels_per_frame.div_ceil(8),
        frame_count: payload.len() * 8 / pixels_per_frame,
    };
    let first_bit = frame_index
        .checked_mul(pixels_per_frame)
        .ok_or_else(out_of_bounds)?;
    let end_bit = first_bit
        .checked_add(pixels_per_frame)
        .filter(|end_bit| end_bit.div_ceil(8) <= payload.len())
        .ok_or_else(out_of_bounds)?;

    let unpacked: Vec<u8> = (first_bit..end_bit)
        .map(|bit| (payload[bit / 8] >> (bit % 8)) & 1)
        .collect();
    Ok(Bytes::from(unpacked))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native_data_set(
        rows: u16,
        columns: u16,
        bits_allocated: u16,
        payload: &[u8],
    ) -> DataSet {
        let mut buffer = Vec::new();
        let mut elements = Vec::new();
        for (tag, value) in [
            (tags::ROWS, rows),
            (tags::COLUMNS, columns),
            (tags::BITS_ALLOCATED, bits_allocated),
        ] {
            elements.push(Element::new(tag, buffer.len(), 2));
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        elements.push(Element::new(tags::PIXEL_DATA, buffer.len(), payload.len()));
        buffer.extend_from_slice(payload);
        DataSet::new(Bytes::from(buffer), elements)
    }

    fn extract(ds: &DataSet, frame: usize) -> Result<Bytes, ExtractionError> {
        let element = ds.element(tags::PIXEL_DATA).unwrap();
        super::frame(ds, element, frame)
    }

    #[test]
    fn slices_each_frame_at_a_fixed_stride() {
        let payload: Vec<u8> = (0..=255).cycle().take(2 * 3 * 2 * 4).collect();
        let ds = native_data_set(2, 3, 16, &payload);
        let frame_len = 2 * 3 * 2;

        for frame in 0..4 {
            let bytes = extract(&ds, frame).unwrap();
            assert_eq!(
                bytes.as_ref(),
                &payload[frame * frame_len..(frame + 1) * frame_len]
            );
        }
    }

    #[test]
    fn frame_past_the_end_is_out_of_bounds() {
        let ds = native_data_set(2, 2, 8, &[0; 8]);
        assert_eq!(
            extract(&ds, 2),
            Err(ExtractionError::FrameOutOfBounds {
                frame: 2,
                frame_len: 4,
                frame_count: 2,
            })
        );
    }

    #[test]
    fn one_bit_frames_are_unpacked() {
        // 2x4 pixels per frame, two frames packed into two bytes.
        let ds = native_data_set(2, 4, 1, &[0b1010_0101, 0b0000_1111]);
        assert_eq!(extract(&ds, 0).unwrap().as_ref(), &[1, 0, 1, 0, 0, 1, 0, 1]);
        assert_eq!(extract(&ds, 1).unwrap().as_ref(), &[1, 1, 1, 1, 0, 0, 0, 0]);
        assert!(matches!(
            extract(&ds, 2),
            Err(ExtractionError::FrameOutOfBounds { frame: 2, .. })
        ));
    }

    #[test]
    fn huge_frame_index_is_out_of_bounds() {
        let ds = native_data_set(1, 1, 8, &[7, 9]);
        assert_eq!(
            extract(&ds, usize::MAX),
            Err(ExtractionError::FrameOutOfBounds {
                frame: usize::MAX,
                frame_len: 1,
                frame_count: 2,
            })
        );

        let ds = native_data_set(1, 1, 16, &[0; 4]);
        assert!(matches!(
            extract(&ds, usize::MAX / 2),
            Err(ExtractionError::FrameOutOfBounds { frame_len: 2, .. })
        ));
    }

    #[test]
    fn huge_one_bit_frame_index_is_out_of_bounds() {
        let ds = native_data_set(1, 1, 1, &[0b0000_0011]);
        assert_eq!(
            extract(&ds, usize::MAX),
            Err(ExtractionError::FrameOutOfBounds {
                frame: usize::MAX,
                frame_len: 1,
                frame_count: 8,
            })
        );
    }

    #[test]
    fn missing_geometry_is_reported_by_tag() {
        let ds = DataSet::new(
            Bytes::from_static(&[0; 4]),
            [Element::new(tags::PIXEL_DATA, 0, 4)],
        );
        assert_eq!(
            extract(&ds, 0),
            Err(ExtractionError::MissingAttribute(tags::ROWS))
        );
    }

    #[test]
    fn unsupported_bit_depth_is_rejected() {
        let ds = native_data_set(1, 1, 12, &[0; 2]);
        assert_eq!(
            extract(&ds, 0),
            Err(ExtractionError::UnsupportedBitsAllocated(12))
        );
    }
}
