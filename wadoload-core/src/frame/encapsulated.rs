use bytes::{Bytes, BytesMut};

use crate::{
    dataset::{DataSet, Element, Fragment},
    error::ExtractionError,
};

pub(super) fn frame(
    data_set: &DataSet,
    pixel_data: &Element,
    frame_index: usize,
) -> Result<Bytes, ExtractionError> {
    let fragments = &pixel_data.fragments;

    if !pixel_data.basic_offset_table.is_empty() {
        return read_with_offset_table(
            data_set,
            fragments,
            &pixel_data.basic_offset_table,
            frame_index,
        );
    }

    let frame_count = data_set.number_of_frames();
    if frame_count == 1 {
        if frame_index != 0 {
            return Err(ExtractionError::FrameOutsideOffsetTable {
                frame: frame_index,
                entries: 1,
            });
        }
        return concat(data_set, fragments);
    }

    if frame_count != fragments.len() {
        let table = jpeg_offset_table(data_set, fragments, frame_count)?;
        return read_with_offset_table(data_set, fragments, &table, frame_index);
    }

    let fragment = fragments.get(frame_index).ok_or(
        ExtractionError::FrameOutsideOffsetTable {
            frame: frame_index,
            entries: fragments.len(),
        },
    )?;
    fragment_bytes(data_set, fragment)
}

fn read_with_offset_table(
    data_set: &DataSet,
    fragments: &[Fragment],
    table: &[u32],
    frame_index: usize,
) -> Result<Bytes, ExtractionError> {
    let start = *table.get(frame_index).ok_or(
        ExtractionError::FrameOutsideOffsetTable {
            frame: frame_index,
            entries: table.len(),
        },
    )?;

    let fragment_at = |offset: u32| {
        fragments
            .iter()
            .position(|fragment| fragment.offset == offset as usize)
            .ok_or_else(|| {
                ExtractionError::CorruptFragmentTable(format!(
                    "no fragment starts at offset {offset} (frame {frame_index})"
                ))
            })
    };

    let first = fragment_at(start)?;
    let last = match table.get(frame_index + 1) {
        Some(&next) => fragment_at(next)?,
        None => fragments.len(),
    };
    if last <= first {
        return Err(ExtractionError::CorruptFragmentTable(format!(
            "offset table entries for frame {frame_index} are not increasing"
        )));
    }

    concat(data_set, &fragments[first..last])
}

/// Without a basic offset table, JPEG frames that span several fragments are
/// found by their end-of-image marker.
fn jpeg_offset_table(
    data_set: &DataSet,
    fragments: &[Fragment],
    frame_count: usize,
) -> Result<Vec<u32>, ExtractionError> {
    let mut table = Vec::with_capacity(frame_count);
    let mut starts_frame = true;

    for fragment in fragments {
        if starts_frame {
            let offset = u32::try_from(fragment.offset).map_err(|_| {
                ExtractionError::CorruptFragmentTable(format!(
                    "fragment offset {} does not fit an offset table",
                    fragment.offset
                ))
            })?;
            table.push(offset);
        }
        starts_frame = ends_with_eoi(&fragment_bytes(data_set, fragment)?);
    }

    if table.len() != frame_count {
        return Err(ExtractionError::CorruptFragmentTable(format!(
            "found {} JPEG frames across {} fragments, expected {frame_count}",
            table.len(),
            fragments.len()
        )));
    }
    Ok(table)
}

fn ends_with_eoi(fragment: &[u8]) -> bool {
    matches!(fragment, [.., 0xFF, 0xD9] | [.., 0xFF, 0xD9, 0x00])
}

fn fragment_bytes(
    data_set: &DataSet,
    fragment: &Fragment,
) -> Result<Bytes, ExtractionError> {
    let end = fragment
        .position
        .checked_add(fragment.length)
        .filter(|end| *end <= data_set.byte_len())
        .ok_or_else(|| {
            ExtractionError::CorruptFragmentTable(format!(
                "fragment at offset {} runs past the end of the data set",
                fragment.offset
            ))
        })?;
    Ok(data_set.byte_array().slice(fragment.position..end))
}

fn concat(
    data_set: &DataSet,
    fragments: &[Fragment],
) -> Result<Bytes, ExtractionError> {
    match fragments {
        [] => Err(ExtractionError::CorruptFragmentTable(
            "pixel data has no fragments".to_owned(),
        )),
        [single] => fragment_bytes(data_set, single),
        many => {
            let total = many.iter().map(|fragment| fragment.length).sum();
            let mut buffer = BytesMut::with_capacity(total);
            for fragment in many {
                buffer.extend_from_slice(&fragment_bytes(data_set, fragment)?);
            }
            Ok(buffer.freeze())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tags;

    /// Lays fragments out the way a parser would: each payload preceded by
    /// an 8 byte item header, offsets relative to the first item.
    fn encapsulated_data_set(
        number_of_frames: Option<&str>,
        basic_offset_table: Vec<u32>,
        payloads: &[&[u8]],
    ) -> DataSet {
        let mut buffer = Vec::new();
        let mut elements = Vec::new();
        if let Some(frames) = number_of_frames {
            elements.push(Element::new(tags::NUMBER_OF_FRAMES, 0, frames.len()));
            buffer.extend_from_slice(frames.as_bytes());
        }

        let base = buffer.len();
        let mut fragments = Vec::new();
        for payload in payloads {
            let offset = buffer.len() - base;
            buffer.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
            buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            fragments.push(Fragment {
                offset,
                position: buffer.len(),
                length: payload.len(),
            });
            buffer.extend_from_slice(payload);
        }
        elements.push(Element::encapsulated(
            tags::PIXEL_DATA,
            base,
            buffer.len() - base,
            basic_offset_table,
            fragments,
        ));
        DataSet::new(Bytes::from(buffer), elements)
    }

    fn extract(ds: &DataSet, frame: usize) -> Result<Bytes, ExtractionError> {
        let element = ds.element(tags::PIXEL_DATA).unwrap();
        super::frame(ds, element, frame)
    }

    #[test]
    fn basic_offset_table_groups_fragments_into_frames() {
        // Frame 0 = fragments 0 and 1, frame 1 = fragment 2.
        let ds = encapsulated_data_set(
            Some("2"),
            vec![0, 24],
            &[&[1, 2, 3, 4], &[5, 6, 7, 8], &[9, 10]],
        );
        assert_eq!(extract(&ds, 0).unwrap().as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(extract(&ds, 1).unwrap().as_ref(), &[9, 10]);
        assert_eq!(
            extract(&ds, 2),
            Err(ExtractionError::FrameOutsideOffsetTable {
                frame: 2,
                entries: 2
            })
        );
    }

    #[test]
    fn offset_table_pointing_between_fragments_is_corrupt() {
        let ds = encapsulated_data_set(Some("2"), vec![0, 6], &[&[1, 2], &[3, 4]]);
        assert!(matches!(
            extract(&ds, 0),
            Err(ExtractionError::CorruptFragmentTable(_))
        ));
    }

    #[test]
    fn one_fragment_per_frame_without_offset_table() {
        let ds = encapsulated_data_set(Some("3"), Vec::new(), &[&[1], &[2], &[3]]);
        assert_eq!(extract(&ds, 2).unwrap().as_ref(), &[3]);
    }

    #[test]
    fn jpeg_markers_split_fragmented_frames() {
        let ds = encapsulated_data_set(
            Some("2"),
            Vec::new(),
            &[
                &[0xFF, 0xD8, 0x01, 0x02],
                &[0x03, 0xFF, 0xD9, 0x00],
                &[0xFF, 0xD8, 0xFF, 0xD9],
            ],
        );
        assert_eq!(
            extract(&ds, 0).unwrap().as_ref(),
            &[0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9, 0x00]
        );
        assert_eq!(extract(&ds, 1).unwrap().as_ref(), &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn jpeg_frame_count_mismatch_is_corrupt() {
        let ds = encapsulated_data_set(
            Some("3"),
            Vec::new(),
            &[&[0xFF, 0xD8, 0xFF, 0xD9], &[0xFF, 0xD8, 0xFF, 0xD9]],
        );
        assert!(matches!(
            extract(&ds, 0),
            Err(ExtractionError::CorruptFragmentTable(_))
        ));
    }

    #[test]
    fn huge_frame_index_is_outside_every_table() {
        let with_table = encapsulated_data_set(Some("2"), vec![0, 9], &[&[1], &[2]]);
        let per_fragment = encapsulated_data_set(Some("2"), Vec::new(), &[&[1], &[2]]);
        for ds in [&with_table, &per_fragment] {
            assert_eq!(
                extract(ds, usize::MAX),
                Err(ExtractionError::FrameOutsideOffsetTable {
                    frame: usize::MAX,
                    entries: 2,
                })
            );
        }
    }

    #[test]
    fn fragment_running_past_the_buffer_is_corrupt() {
        let ds = DataSet::new(
            Bytes::from_static(&[0xFE, 0xFF, 0x00, 0xE0, 2, 0, 0, 0, 1, 2]),
            [Element::encapsulated(
                tags::PIXEL_DATA,
                0,
                10,
                Vec::new(),
                vec![Fragment {
                    offset: 0,
                    position: 8,
                    length: usize::MAX,
                }],
            )],
        );
        assert!(matches!(
            extract(&ds, 0),
            Err(ExtractionError::CorruptFragmentTable(_))
        ));
    }

    #[test]
    fn single_frame_joins_every_fragment() {
        let ds = encapsulated_data_set(None, Vec::new(), &[&[1, 2], &[3, 4]]);
        assert_eq!(extract(&ds, 0).unwrap().as_ref(), &[1, 2, 3, 4]);
        assert!(extract(&ds, 1).is_err());
    }
}
