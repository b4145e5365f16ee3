//! Parsed data set model.
//!
//! A [`DataSet`] owns the fetched byte buffer and a flat index of its
//! top-level elements. Values are read lazily from the buffer through the
//! typed accessors; nothing is decoded up front.

pub mod parser;

pub use parser::{DataSetParser, Part10Parser};

use std::{collections::BTreeMap, fmt, ops::Range};

use bytes::Bytes;

/// A (group, element) attribute tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag{self}")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

/// Well-known tags read by the loader.
pub mod tags {
    use super::Tag;

    pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);
    pub const SAMPLES_PER_PIXEL: Tag = Tag::new(0x0028, 0x0002);
    pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag::new(0x0028, 0x0004);
    pub const PLANAR_CONFIGURATION: Tag = Tag::new(0x0028, 0x0006);
    pub const NUMBER_OF_FRAMES: Tag = Tag::new(0x0028, 0x0008);
    pub const ROWS: Tag = Tag::new(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag::new(0x0028, 0x0011);
    pub const BITS_ALLOCATED: Tag = Tag::new(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag::new(0x0028, 0x0101);
    pub const PIXEL_REPRESENTATION: Tag = Tag::new(0x0028, 0x0103);
    pub const WINDOW_CENTER: Tag = Tag::new(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag::new(0x0028, 0x1051);
    pub const RESCALE_INTERCEPT: Tag = Tag::new(0x0028, 0x1052);
    pub const RESCALE_SLOPE: Tag = Tag::new(0x0028, 0x1053);
    pub const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);

    pub const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE0DD);
}

/// Transfer syntax UIDs the parser and the native image factory care about.
pub mod transfer_syntax {
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
    pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
    pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
}

/// One item of encapsulated pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Offset of the fragment's item tag relative to the first fragment item,
    /// which is the unit the basic offset table is expressed in.
    pub offset: usize,
    /// Absolute position of the fragment payload in the data set buffer.
    pub position: usize,
    pub length: usize,
}

/// Location of one element's value within the data set buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub vr: Option<[u8; 2]>,
    pub data_offset: usize,
    pub length: usize,
    pub encapsulated_pixel_data: bool,
    pub basic_offset_table: Vec<u32>,
    pub fragments: Vec<Fragment>,
}

impl Element {
    pub fn new(tag: Tag, data_offset: usize, length: usize) -> Self {
        Self {
            tag,
            vr: None,
            data_offset,
            length,
            encapsulated_pixel_data: false,
            basic_offset_table: Vec::new(),
            fragments: Vec::new(),
        }
    }

    pub fn encapsulated(
        tag: Tag,
        data_offset: usize,
        length: usize,
        basic_offset_table: Vec<u32>,
        fragments: Vec<Fragment>,
    ) -> Self {
        Self {
            encapsulated_pixel_data: true,
            basic_offset_table,
            fragments,
            ..Self::new(tag, data_offset, length)
        }
    }

    pub fn with_vr(mut self, vr: [u8; 2]) -> Self {
        self.vr = Some(vr);
        self
    }

    pub fn vr_str(&self) -> Option<&str> {
        self.vr.as_ref().and_then(|vr| std::str::from_utf8(vr).ok())
    }

    fn value_range(&self) -> Range<usize> {
        self.data_offset..self.data_offset.saturating_add(self.length)
    }
}

/// A parsed data set: the raw buffer plus an index of its top-level elements.
#[derive(Clone)]
pub struct DataSet {
    byte_array: Bytes,
    elements: BTreeMap<Tag, Element>,
}

impl fmt::Debug for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("byte_len", &self.byte_array.len())
            .field("elements", &self.elements.len())
            .finish()
    }
}

impl DataSet {
    pub fn new(
        byte_array: Bytes,
        elements: impl IntoIterator<Item = Element>,
    ) -> Self {
        let elements = elements
            .into_iter()
            .map(|element| (element.tag, element))
            .collect();
        Self {
            byte_array,
            elements,
        }
    }

    pub fn byte_array(&self) -> &Bytes {
        &self.byte_array
    }

    /// Size of the backing buffer, used for cache accounting.
    pub fn byte_len(&self) -> usize {
        self.byte_array.len()
    }

    pub fn element(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Zero-copy view of an element's value, or `None` when the element
    /// points outside the buffer.
    pub fn element_bytes(&self, element: &Element) -> Option<Bytes> {
        let range = element.value_range();
        (range.end <= self.byte_array.len())
            .then(|| self.byte_array.slice(range))
    }

    fn value(&self, tag: Tag) -> Option<&[u8]> {
        let element = self.elements.get(&tag)?;
        self.byte_array.get(element.value_range())
    }

    /// Full string value with trailing padding removed. Empty values read as
    /// `None`.
    pub fn string(&self, tag: Tag) -> Option<String> {
        let raw = self.value(tag)?;
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim_end_matches(['\0', ' ']).trim_start();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }

    /// One value of a backslash-separated multi-valued string.
    pub fn string_value(&self, tag: Tag, index: usize) -> Option<String> {
        let value = self.string(tag)?;
        value
            .split('\\')
            .nth(index)
            .map(|part| part.trim().to_owned())
            .filter(|part| !part.is_empty())
    }

    pub fn uint16(&self, tag: Tag) -> Option<u16> {
        match self.value(tag)? {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// First value of an integer string (IS) element.
    pub fn int_string(&self, tag: Tag) -> Option<i64> {
        self.string_value(tag, 0)?.parse().ok()
    }

    /// First value of a decimal string (DS) element.
    pub fn float_string(&self, tag: Tag) -> Option<f64> {
        self.string_value(tag, 0)?.parse().ok()
    }

    /// Number of frames in the pixel data; single-frame objects omit the
    /// attribute.
    pub fn number_of_frames(&self) -> usize {
        self.int_string(tags::NUMBER_OF_FRAMES)
            .and_then(|frames| usize::try_from(frames).ok())
            .filter(|frames| *frames > 0)
            .unwrap_or(1)
    }
}
