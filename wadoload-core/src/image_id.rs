//! Decomposition of image ids of the form `scheme:url[?frame=N]`.

use crate::error::{LoadError, Result};

const FRAME_PARAM: &str = "frame=";

/// An image id split into the scheme, the resource url and the frame index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedImageId {
    pub scheme: String,
    pub url: String,
    /// Zero-based frame, when the id names one.
    pub frame: Option<usize>,
}

impl ParsedImageId {
    /// Split `image_id` at its first `:`.
    ///
    /// A `frame=N` parameter selects the frame and is cut from the url along
    /// with the separator before it, so every frame of one resource shares a
    /// url.
    pub fn parse(image_id: &str) -> Result<Self> {
        let (scheme, rest) = image_id.split_once(':').ok_or_else(|| {
            invalid(image_id, "missing ':' between scheme and url")
        })?;

        let (url, frame) = match rest.find(FRAME_PARAM) {
            None => (rest, None),
            Some(param) => {
                let value = &rest[param + FRAME_PARAM.len()..];
                let value = value.split('&').next().unwrap_or_default();
                let frame = value.parse::<usize>().map_err(|_| {
                    invalid(image_id, &format!("frame '{value}' is not a frame index"))
                })?;

                // Drop the `?` or `&` that introduced the parameter.
                let url_end = rest[..param]
                    .char_indices()
                    .next_back()
                    .map_or(0, |(idx, _)| idx);
                (&rest[..url_end], Some(frame))
            }
        };

        if url.is_empty() {
            return Err(invalid(image_id, "empty url"));
        }

        Ok(Self {
            scheme: scheme.to_owned(),
            url: url.to_owned(),
            frame,
        })
    }

    /// The frame to extract; ids without a frame address frame 0.
    pub fn frame_index(&self) -> usize {
        self.frame.unwrap_or(0)
    }

    /// Re-derive the resource url of `image_id`.
    pub fn url_of(image_id: &str) -> Result<String> {
        Self::parse(image_id).map(|parsed| parsed.url)
    }
}

fn invalid(image_id: &str, reason: &str) -> LoadError {
    LoadError::InvalidImageId {
        image_id: image_id.to_owned(),
        reason: reason.to_owned(),
    }
}
