use bytes::Bytes;
use tracing::trace;

use super::{DataSet, Element, Fragment, Tag, tags, transfer_syntax};
use crate::error::ParseError;

const PREAMBLE_LEN: usize = 128;
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
const MAX_SEQUENCE_DEPTH: usize = 64;

/// Turns fetched bytes into a [`DataSet`].
pub trait DataSetParser: Send + Sync {
    fn parse(&self, bytes: Bytes) -> Result<DataSet, ParseError>;
}

/// Parser for Part 10 files: 128 byte preamble, `DICM` marker, explicit VR
/// little endian meta group, then the body in the announced transfer syntax.
///
/// Only top-level elements are indexed. Sequences are walked to find their
/// end and otherwise skipped. Undefined-length pixel data is split into its
/// basic offset table and fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct Part10Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    ImplicitLittle,
    ExplicitLittle,
}

impl DataSetParser for Part10Parser {
    fn parse(&self, bytes: Bytes) -> Result<DataSet, ParseError> {
        if bytes.get(PREAMBLE_LEN..PREAMBLE_LEN + 4) != Some(b"DICM".as_slice())
        {
            return Err(ParseError::MissingPreamble);
        }

        let mut elements = Vec::new();
        let mut cursor = Cursor::new(&bytes, PREAMBLE_LEN + 4);

        while cursor.remaining() >= 2 && cursor.peek_u16()? == 0x0002 {
            elements.push(read_element(&mut cursor, Syntax::ExplicitLittle, 0)?);
        }

        let syntax = body_syntax(&bytes, &elements)?;
        trace!(?syntax, meta_elements = elements.len(), "parsed file meta group");

        while cursor.remaining() > 0 {
            elements.push(read_element(&mut cursor, syntax, 0)?);
        }

        Ok(DataSet::new(bytes, elements))
    }
}

fn body_syntax(bytes: &[u8], meta: &[Element]) -> Result<Syntax, ParseError> {
    let uid = meta
        .iter()
        .find(|element| element.tag == tags::TRANSFER_SYNTAX_UID)
        .and_then(|element| {
            bytes.get(element.data_offset..element.data_offset + element.length)
        })
        .map(|raw| {
            String::from_utf8_lossy(raw)
                .trim_end_matches(['\0', ' '])
                .to_owned()
        });

    // A meta group without a transfer syntax is read as the default syntax.
    match uid.as_deref() {
        None | Some(transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN) => {
            Ok(Syntax::ImplicitLittle)
        }
        Some(
            uid @ (transfer_syntax::EXPLICIT_VR_BIG_ENDIAN
            | transfer_syntax::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN),
        ) => Err(ParseError::UnsupportedTransferSyntax(uid.to_owned())),
        Some(_) => Ok(Syntax::ExplicitLittle),
    }
}

fn has_long_length(vr: [u8; 2]) -> bool {
    matches!(
        &vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC"
            | b"UN" | b"UR" | b"UT" | b"UV"
    )
}

fn read_element(
    cursor: &mut Cursor<'_>,
    syntax: Syntax,
    depth: usize,
) -> Result<Element, ParseError> {
    let header_offset = cursor.position;
    let tag = cursor.tag()?;
    if tag.group == 0xFFFE {
        return Err(ParseError::Malformed {
            tag,
            offset: header_offset,
            reason: "delimiter outside of a sequence".to_owned(),
        });
    }

    let (vr, length) = match syntax {
        Syntax::ImplicitLittle => (None, cursor.u32()?),
        Syntax::ExplicitLittle => {
            let vr = cursor.vr()?;
            if has_long_length(vr) {
                cursor.skip(2)?;
                (Some(vr), cursor.u32()?)
            } else {
                (Some(vr), u32::from(cursor.u16()?))
            }
        }
    };

    if length != UNDEFINED_LENGTH {
        let data_offset = cursor.position;
        cursor.skip(length as usize)?;
        let element = Element::new(tag, data_offset, length as usize);
        return Ok(match vr {
            Some(vr) => element.with_vr(vr),
            None => element,
        });
    }

    if tag == tags::PIXEL_DATA {
        let element = read_encapsulated_pixel_data(cursor, tag)?;
        return Ok(match vr {
            Some(vr) => element.with_vr(vr),
            None => element,
        });
    }

    // Undefined-length UN content is always implicit VR little endian.
    let item_syntax = match vr {
        Some(vr) if &vr == b"UN" => Syntax::ImplicitLittle,
        _ => syntax,
    };
    let data_offset = cursor.position;
    skip_sequence(cursor, item_syntax, depth + 1)?;
    let element =
        Element::new(tag, data_offset, cursor.position - data_offset - 8);
    Ok(match vr {
        Some(vr) => element.with_vr(vr),
        None => element,
    })
}

fn skip_sequence(
    cursor: &mut Cursor<'_>,
    syntax: Syntax,
    depth: usize,
) -> Result<(), ParseError> {
    if depth > MAX_SEQUENCE_DEPTH {
        return Err(ParseError::Malformed {
            tag: tags::ITEM,
            offset: cursor.position,
            reason: format!("sequences nested deeper than {MAX_SEQUENCE_DEPTH}"),
        });
    }

    loop {
        let offset = cursor.position;
        let tag = cursor.tag()?;
        let length = cursor.u32()?;
        match tag {
            tags::SEQUENCE_DELIMITATION => return Ok(()),
            tags::ITEM if length == UNDEFINED_LENGTH => loop {
                if cursor.peek_tag()? == tags::ITEM_DELIMITATION {
                    cursor.skip(8)?;
                    break;
                }
                read_element(cursor, syntax, depth)?;
            },
            tags::ITEM => cursor.skip(length as usize)?,
            other => {
                return Err(ParseError::Malformed {
                    tag: other,
                    offset,
                    reason: "expected an item inside the sequence".to_owned(),
                });
            }
        }
    }
}

fn read_encapsulated_pixel_data(
    cursor: &mut Cursor<'_>,
    tag: Tag,
) -> Result<Element, ParseError> {
    let data_offset = cursor.position;
    let malformed = |offset: usize, reason: &str| ParseError::Malformed {
        tag,
        offset,
        reason: reason.to_owned(),
    };

    if cursor.tag()? != tags::ITEM {
        return Err(malformed(
            data_offset,
            "encapsulated pixel data must start with the basic offset table item",
        ));
    }
    let table_len = cursor.u32()?;
    if table_len == UNDEFINED_LENGTH || table_len % 4 != 0 {
        return Err(malformed(data_offset, "basic offset table length is invalid"));
    }
    let basic_offset_table = (0..table_len / 4)
        .map(|_| cursor.u32())
        .collect::<Result<Vec<_>, _>>()?;

    let base = cursor.position;
    let mut fragments = Vec::new();
    loop {
        let item_offset = cursor.position;
        let item = cursor.tag()?;
        let length = cursor.u32()?;
        match item {
            tags::SEQUENCE_DELIMITATION => break,
            tags::ITEM if length == UNDEFINED_LENGTH => {
                return Err(malformed(
                    item_offset,
                    "pixel data fragment has undefined length",
                ));
            }
            tags::ITEM => {
                fragments.push(Fragment {
                    offset: item_offset - base,
                    position: cursor.position,
                    length: length as usize,
                });
                cursor.skip(length as usize)?;
            }
            _ => {
                return Err(malformed(
                    item_offset,
                    "expected a fragment item inside pixel data",
                ));
            }
        }
    }

    Ok(Element::encapsulated(
        tag,
        data_offset,
        cursor.position - data_offset,
        basic_offset_table,
        fragments,
    ))
}

struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.position.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.position..end];
                self.position = end;
                Ok(slice)
            }
            None => Err(ParseError::Truncated {
                offset: self.position,
                needed: len - self.remaining(),
            }),
        }
    }

    fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.take(len).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn vr(&mut self) -> Result<[u8; 2], ParseError> {
        let raw = self.take(2)?;
        Ok([raw[0], raw[1]])
    }

    fn tag(&mut self) -> Result<Tag, ParseError> {
        let group = self.u16()?;
        let element = self.u16()?;
        Ok(Tag::new(group, element))
    }

    fn peek_u16(&self) -> Result<u16, ParseError> {
        let mut probe = Cursor::new(self.data, self.position);
        probe.u16()
    }

    fn peek_tag(&self) -> Result<Tag, ParseError> {
        let mut probe = Cursor::new(self.data, self.position);
        probe.tag()
    }
}
