#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use wadoload_core::{
    ConstructionError, DataSet, DataSetCache, DecodedImage, FetchError,
    FetchStrategy, FetchedBytes, ImageFactory, ImageLoader, LoadOptions,
    NativeImageFactory, SchemeRouter, Tag, TransportMetadata,
    dataset::{tags, transfer_syntax},
};

const LONG_LENGTH_VRS: [&[u8; 2]; 4] = [b"OB", b"OW", b"SQ", b"UN"];

/// Builds Part 10 files in memory, one element at a time.
pub struct Part10Builder {
    syntax: &'static str,
    body: Vec<u8>,
}

impl Part10Builder {
    pub fn new(syntax: &'static str) -> Self {
        Self {
            syntax,
            body: Vec::new(),
        }
    }

    pub fn explicit() -> Self {
        Self::new(transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN)
    }

    pub fn implicit() -> Self {
        Self::new(transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN)
    }

    pub fn element(mut self, tag: Tag, vr: &[u8; 2], value: &[u8]) -> Self {
        let padded = pad(value, vr);
        if self.syntax == transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN {
            write_tag(&mut self.body, tag);
            self.body.extend_from_slice(&(padded.len() as u32).to_le_bytes());
        } else {
            write_explicit_header(&mut self.body, tag, vr, padded.len() as u32);
        }
        self.body.extend_from_slice(&padded);
        self
    }

    pub fn us(self, tag: Tag, value: u16) -> Self {
        self.element(tag, b"US", &value.to_le_bytes())
    }

    pub fn text(self, tag: Tag, vr: &[u8; 2], value: &str) -> Self {
        self.element(tag, vr, value.as_bytes())
    }

    pub fn geometry(self, rows: u16, columns: u16, bits_allocated: u16) -> Self {
        self.us(tags::SAMPLES_PER_PIXEL, 1)
            .text(tags::PHOTOMETRIC_INTERPRETATION, b"CS", "MONOCHROME2")
            .us(tags::ROWS, rows)
            .us(tags::COLUMNS, columns)
            .us(tags::BITS_ALLOCATED, bits_allocated)
            .us(tags::BITS_STORED, bits_allocated)
            .us(tags::PIXEL_REPRESENTATION, 0)
    }

    pub fn pixel_data(self, payload: &[u8]) -> Self {
        self.element(tags::PIXEL_DATA, b"OW", payload)
    }

    /// Undefined-length pixel data: offset table item, one item per fragment,
    /// sequence delimiter. Always written with an explicit `OB` header.
    pub fn encapsulated(mut self, offset_table: &[u32], fragments: &[&[u8]]) -> Self {
        write_explicit_header(&mut self.body, tags::PIXEL_DATA, b"OB", u32::MAX);

        write_tag(&mut self.body, tags::ITEM);
        self.body
            .extend_from_slice(&((offset_table.len() * 4) as u32).to_le_bytes());
        for offset in offset_table {
            self.body.extend_from_slice(&offset.to_le_bytes());
        }

        for fragment in fragments {
            write_tag(&mut self.body, tags::ITEM);
            self.body
                .extend_from_slice(&(fragment.len() as u32).to_le_bytes());
            self.body.extend_from_slice(fragment);
        }

        write_tag(&mut self.body, tags::SEQUENCE_DELIMITATION);
        self.body.extend_from_slice(&0u32.to_le_bytes());
        self
    }

    pub fn build(self) -> Bytes {
        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        write_explicit_header(
            &mut out,
            tags::TRANSFER_SYNTAX_UID,
            b"UI",
            pad(self.syntax.as_bytes(), b"UI").len() as u32,
        );
        out.extend_from_slice(&pad(self.syntax.as_bytes(), b"UI"));
        out.extend_from_slice(&self.body);
        Bytes::from(out)
    }
}

fn pad(value: &[u8], vr: &[u8; 2]) -> Vec<u8> {
    let mut padded = value.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(if vr == b"UI" || vr == b"OB" { 0 } else { b' ' });
    }
    padded
}

fn write_tag(out: &mut Vec<u8>, tag: Tag) {
    out.extend_from_slice(&tag.group.to_le_bytes());
    out.extend_from_slice(&tag.element.to_le_bytes());
}

fn write_explicit_header(out: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], length: u32) {
    write_tag(out, tag);
    out.extend_from_slice(vr);
    if LONG_LENGTH_VRS.contains(&vr) {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&length.to_le_bytes());
    } else {
        out.extend_from_slice(&(length as u16).to_le_bytes());
    }
}

/// An 8-bit multiframe file whose frame `i` is filled with byte `i`.
///
/// Returns the file and its raw pixel payload.
pub fn multiframe(rows: u16, columns: u16, frames: usize) -> (Bytes, Vec<u8>) {
    let frame_len = usize::from(rows) * usize::from(columns);
    let payload: Vec<u8> = (0..frames)
        .flat_map(|frame| std::iter::repeat_n(frame as u8, frame_len))
        .collect();

    let file = Part10Builder::explicit()
        .geometry(rows, columns, 8)
        .text(tags::NUMBER_OF_FRAMES, b"IS", &frames.to_string())
        .pixel_data(&payload)
        .build();
    (file, payload)
}

/// Fetch strategy serving canned resources and counting its calls.
#[derive(Default)]
pub struct StubFetcher {
    resources: HashMap<String, Bytes>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    failure: Option<FetchError>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, bytes: Bytes) -> Self {
        self.resources.insert(url.to_owned(), bytes);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, failure: FetchError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchStrategy for StubFetcher {
    async fn fetch(
        &self,
        url: &str,
        _image_id: &str,
    ) -> Result<FetchedBytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let bytes = self.resources.get(url).cloned().ok_or_else(|| {
            FetchError::Status {
                url: url.to_owned(),
                status: 404,
            }
        })?;
        Ok(FetchedBytes {
            metadata: TransportMetadata {
                source: url.to_owned(),
                content_type: Some("application/dicom".to_owned()),
                content_length: Some(bytes.len() as u64),
            },
            bytes,
        })
    }
}

/// Image factory that always fails.
pub struct FailingFactory;

#[async_trait]
impl ImageFactory for FailingFactory {
    async fn create_image(
        &self,
        _image_id: &str,
        _pixel_data: Bytes,
        _transfer_syntax: Option<&str>,
        _options: &LoadOptions,
        _data_set: &DataSet,
    ) -> Result<DecodedImage, ConstructionError> {
        Err(ConstructionError::Failed("decoder unavailable".to_owned()))
    }
}

/// Image factory that wraps any frame without validating it.
pub struct EchoFactory;

#[async_trait]
impl ImageFactory for EchoFactory {
    async fn create_image(
        &self,
        image_id: &str,
        pixel_data: Bytes,
        transfer_syntax: Option<&str>,
        _options: &LoadOptions,
        data_set: &DataSet,
    ) -> Result<DecodedImage, ConstructionError> {
        let mut image = DecodedImage::new(
            image_id,
            data_set.uint16(tags::ROWS).unwrap_or_default(),
            data_set.uint16(tags::COLUMNS).unwrap_or_default(),
            data_set.uint16(tags::BITS_ALLOCATED).unwrap_or(8),
            pixel_data,
        );
        image.transfer_syntax = transfer_syntax.map(str::to_owned);
        Ok(image)
    }
}

/// Loader whose network and file schemes are both served by `fetcher`.
pub fn loader_with(fetcher: Arc<StubFetcher>) -> ImageLoader {
    loader_with_factory(fetcher, Arc::new(NativeImageFactory))
}

pub fn loader_with_factory(
    fetcher: Arc<StubFetcher>,
    factory: Arc<dyn ImageFactory>,
) -> ImageLoader {
    let router = SchemeRouter::new(fetcher.clone(), fetcher);
    ImageLoader::new(router, DataSetCache::default(), factory)
}
