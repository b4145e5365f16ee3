use std::{io, path::PathBuf};

use thiserror::Error;

use crate::dataset::Tag;

/// Failure reported by a fetch strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error(
        "size mismatch fetching {url}: got {actual} bytes, expected {expected}"
    )]
    LengthMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("I/O error reading {}: {message}", .path.display())]
    Io {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("invalid fetch configuration: {0}")]
    InvalidConfig(String),

    #[error("fetch strategy panicked fetching {url}: {message}")]
    Panicked { url: String, message: String },
}

/// Fetched bytes could not be read as a data set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing DICM prefix after the 128 byte preamble")]
    MissingPreamble,

    #[error("data set truncated at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("unsupported transfer syntax {0}")]
    UnsupportedTransferSyntax(String),

    #[error("malformed element {tag} at offset {offset}: {reason}")]
    Malformed {
        tag: Tag,
        offset: usize,
        reason: String,
    },

    #[error("data set parser panicked: {0}")]
    Panicked(String),
}

/// The requested frame could not be cut out of the pixel data element.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("data set has no pixel data element")]
    MissingPixelData,

    #[error("data set is missing required attribute {0}")]
    MissingAttribute(Tag),

    #[error(
        "invalid image geometry: {rows} rows x {columns} columns x {samples_per_pixel} samples"
    )]
    InvalidGeometry {
        rows: u16,
        columns: u16,
        samples_per_pixel: u16,
    },

    #[error("unsupported bits allocated: {0}")]
    UnsupportedBitsAllocated(u16),

    #[error(
        "pixel data element claims {length} bytes at offset {offset} but the data set holds {available}"
    )]
    TruncatedPixelData {
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error(
        "frame {frame} exceeds the pixel data ({frame_count} frames of {frame_len} bytes available)"
    )]
    FrameOutOfBounds {
        frame: usize,
        frame_len: usize,
        frame_count: usize,
    },

    #[error("frame {frame} is not covered by the offset table ({entries} entries)")]
    FrameOutsideOffsetTable { frame: usize, entries: usize },

    #[error("corrupt fragment table: {0}")]
    CorruptFragmentTable(String),
}

/// Failure reported by an image factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("unsupported transfer syntax {0}")]
    UnsupportedTransferSyntax(String),

    #[error("data set is missing required attribute {0}")]
    MissingAttribute(Tag),

    #[error("pixel data holds {actual} bytes, expected {expected}")]
    PixelDataLength { expected: usize, actual: usize },

    #[error("image construction failed: {0}")]
    Failed(String),
}

/// Error surfaced by an image load. Each variant names the stage that failed
/// and carries that stage's error unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("invalid image id '{image_id}': {reason}")]
    InvalidImageId { image_id: String, reason: String },

    #[error("no image loader registered for scheme '{0}'")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

impl LoadError {
    /// Short label for the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            LoadError::InvalidImageId { .. } => "parse_image_id",
            LoadError::UnsupportedScheme(_) => "resolve_scheme",
            LoadError::Fetch(_) => "fetch",
            LoadError::Parse(_) => "parse_data_set",
            LoadError::Extraction(_) => "extract_frame",
            LoadError::Construction(_) => "construct_image",
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
