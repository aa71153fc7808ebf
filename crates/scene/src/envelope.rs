//! Transport envelopes: chunked submissions, the deflate wrapper, the
//! multi-viewport envelope, and data-URL helpers.
//!
//! The broker only chunks/unchunks and decompresses; it never rewrites
//! semantic schema fields. Everything here treats the schema as opaque
//! JSON text.

use crate::error::Error;
use crate::schema::SceneSchema;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read as _, Write as _};

/// One message of a chunked submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMessage {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub data: String,
}

/// Deflate-compressed submission wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedEnvelope {
    pub compressed: bool,
    /// base64(deflate(json)).
    pub data: String,
}

/// Multi-viewport capture envelope: one schema per requested viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiViewportEnvelope {
    pub multi_viewport: bool,
    pub captures: Vec<CaptureEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEntry {
    pub data: SceneSchema,
}

/// Split serialized JSON into `chunk_count` contiguous pieces. Chunk
/// boundaries respect UTF-8 character boundaries; the concatenation of
/// all `data` fields equals the input byte-for-byte.
#[must_use]
pub fn split_into_chunks(payload: &str, chunk_count: usize) -> Vec<ChunkMessage> {
    let total = chunk_count.max(1);
    let target = payload.len().div_ceil(total);
    let mut chunks = Vec::with_capacity(total);
    let mut rest = payload;
    for index in 0..total {
        let take = if index + 1 == total {
            rest.len()
        } else {
            let mut boundary = target.min(rest.len());
            while boundary < rest.len() && !rest.is_char_boundary(boundary) {
                boundary += 1;
            }
            boundary
        };
        let (head, tail) = rest.split_at(take);
        chunks.push(ChunkMessage {
            chunk_index: index,
            total_chunks: total,
            data: head.to_owned(),
        });
        rest = tail;
    }
    chunks
}

/// Incremental reassembly of a chunked submission, strictly by index.
/// Shared by the broker and by the extension-side message channel.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    total: Option<usize>,
    parts: Vec<Option<String>>,
    received: usize,
}

impl ChunkAssembler {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True once at least one chunk has arrived.
    #[inline]
    #[must_use]
    pub const fn in_progress(&self) -> bool {
        self.total.is_some()
    }

    /// Accept one chunk. Returns the reassembled payload once every
    /// index has arrived (in any order).
    ///
    /// # Errors
    /// `IncompleteTransfer` on index out of range, disagreeing
    /// `total_chunks`, or duplicate indices with different content.
    pub fn accept(&mut self, chunk: ChunkMessage) -> Result<Option<String>, Error> {
        if chunk.total_chunks == 0 {
            return Err(Error::IncompleteTransfer(
                "totalChunks must be at least 1".to_owned(),
            ));
        }
        match self.total {
            None => {
                self.total = Some(chunk.total_chunks);
                self.parts = vec![None; chunk.total_chunks];
            }
            Some(total) if total != chunk.total_chunks => {
                return Err(Error::IncompleteTransfer(format!(
                    "totalChunks changed mid-transfer: {total} then {}",
                    chunk.total_chunks
                )));
            }
            Some(_) => {}
        }
        let slot = self.parts.get_mut(chunk.chunk_index).ok_or_else(|| {
            Error::IncompleteTransfer(format!(
                "chunkIndex {} out of range for {} chunks",
                chunk.chunk_index, chunk.total_chunks
            ))
        })?;
        if slot.is_none() {
            *slot = Some(chunk.data);
            self.received += 1;
        }
        if self.received == self.parts.len() {
            let mut payload = String::new();
            for part in self.parts.drain(..) {
                // All slots are filled at this point.
                if let Some(data) = part {
                    payload.push_str(&data);
                }
            }
            self.total = None;
            self.received = 0;
            Ok(Some(payload))
        } else {
            Ok(None)
        }
    }
}

/// Wrap serialized JSON in the deflate envelope.
///
/// # Errors
/// `IncompleteTransfer` if the encoder fails, which only happens on
/// allocation failure.
pub fn compress(payload: &str) -> Result<CompressedEnvelope, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload.as_bytes())
        .and_then(|()| encoder.finish())
        .map(|bytes| CompressedEnvelope {
            compressed: true,
            data: BASE64_STANDARD.encode(bytes),
        })
        .map_err(|err| Error::IncompleteTransfer(format!("deflate failed: {err}")))
}

/// Unwrap the deflate envelope back to JSON text.
///
/// # Errors
/// `IncompleteTransfer` on bad base64, bad deflate, or non-UTF-8
/// output.
pub fn decompress(envelope: &CompressedEnvelope) -> Result<String, Error> {
    let bytes = BASE64_STANDARD
        .decode(&envelope.data)
        .map_err(|err| Error::IncompleteTransfer(format!("bad base64: {err}")))?;
    let mut decoder = DeflateDecoder::new(bytes.as_slice());
    let mut payload = String::new();
    decoder
        .read_to_string(&mut payload)
        .map_err(|err| Error::IncompleteTransfer(format!("bad deflate stream: {err}")))?;
    Ok(payload)
}

/// Parse a delivered job payload into its schemas: either one schema
/// or a multi-viewport envelope.
///
/// # Errors
/// `IncompatibleSchema` when the payload parses as neither shape.
pub fn parse_delivered(payload: &str) -> Result<Vec<SceneSchema>, Error> {
    if let Ok(envelope) = serde_json::from_str::<MultiViewportEnvelope>(payload)
        && envelope.multi_viewport
    {
        return Ok(envelope.captures.into_iter().map(|entry| entry.data).collect());
    }
    serde_json::from_str::<SceneSchema>(payload)
        .map(|schema| vec![schema])
        .map_err(|err| Error::IncompatibleSchema {
            found: format!("unparseable payload: {err}"),
            supported: crate::schema::SCHEMA_VERSION.to_owned(),
        })
}

/// Parse a `data:` URL into its MIME type and decoded bytes.
#[must_use]
pub fn parse_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (header, body) = rest.split_once(',')?;
    let (mime, is_base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let bytes = if is_base64 {
        BASE64_STANDARD.decode(body).ok()?
    } else {
        // Percent-decoding is not needed for the image payloads we
        // produce; treat the body as literal bytes.
        body.as_bytes().to_vec()
    };
    let mime = if mime.is_empty() {
        "text/plain".to_owned()
    } else {
        mime.to_owned()
    };
    Some((mime, bytes))
}

/// Encode bytes as a base64 `data:` URL.
#[must_use]
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64_STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_round_trip_for_any_count() {
        let payload = "{\"version\":\"1.0.0\",\"text\":\"héllo wörld\"}";
        for count in 1..=7 {
            let chunks = split_into_chunks(payload, count);
            assert_eq!(chunks.len(), count);
            let mut assembler = ChunkAssembler::new();
            let mut result = None;
            // Feed out of order: reverse.
            for chunk in chunks.into_iter().rev() {
                result = assembler.accept(chunk).unwrap();
            }
            assert_eq!(result.as_deref(), Some(payload));
        }
    }

    #[test]
    fn assembler_rejects_disagreeing_totals() {
        let mut assembler = ChunkAssembler::new();
        assembler
            .accept(ChunkMessage {
                chunk_index: 0,
                total_chunks: 3,
                data: "a".into(),
            })
            .unwrap();
        let err = assembler
            .accept(ChunkMessage {
                chunk_index: 1,
                total_chunks: 4,
                data: "b".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), "IncompleteTransfer");
    }

    #[test]
    fn compression_round_trips() {
        let payload = "{\"root\":{\"id\":\"n1\"}}";
        let envelope = compress(payload).unwrap();
        assert!(envelope.compressed);
        assert_eq!(decompress(&envelope).unwrap(), payload);
    }

    #[test]
    fn data_url_round_trips() {
        let url = encode_data_url("image/png", &[1, 2, 3, 255]);
        let (mime, bytes) = parse_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![1, 2, 3, 255]);
        assert!(parse_data_url("http://not-a-data-url").is_none());
    }
}
