//! Messages between the injected capture script and the extension
//! service worker. Large schemas are chunked below the host's
//! per-message size limit; progress messages are advisory only.

use crate::config::ProgressEvent;
use scene::envelope::{ChunkAssembler, ChunkMessage, split_into_chunks};
use serde::{Deserialize, Serialize};

/// Default chunk threshold: stay comfortably under the host's
/// per-message limit.
pub const DEFAULT_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// One posted message on the agent → service-worker channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentMessage {
    #[serde(rename = "EXTRACTION_COMPLETE")]
    Complete { data: Box<serde_json::Value> },
    #[serde(rename = "EXTRACTION_CHUNK")]
    Chunk(ChunkMessage),
    #[serde(rename = "EXTRACTION_COMPLETE_META")]
    CompleteMeta { total_chunks: usize },
    #[serde(rename = "EXTRACTION_PROGRESS")]
    Progress(ProgressEvent),
}

/// Package a serialized schema for the channel: one `Complete`
/// message when it fits, otherwise chunks followed by the completion
/// marker.
#[must_use]
pub fn package_payload(payload_json: &str, chunk_bytes: usize) -> Vec<AgentMessage> {
    let limit = chunk_bytes.max(1);
    if payload_json.len() <= limit {
        let data = serde_json::from_str(payload_json)
            .unwrap_or_else(|_| serde_json::Value::String(payload_json.to_owned()));
        return vec![AgentMessage::Complete {
            data: Box::new(data),
        }];
    }
    let chunk_count = payload_json.len().div_ceil(limit);
    let mut messages: Vec<AgentMessage> = split_into_chunks(payload_json, chunk_count)
        .into_iter()
        .map(AgentMessage::Chunk)
        .collect();
    messages.push(AgentMessage::CompleteMeta {
        total_chunks: chunk_count,
    });
    messages
}

/// Service-worker side reassembly of a chunked extraction.
#[derive(Debug, Default)]
pub struct ExtractionCollector {
    assembler: ChunkAssembler,
    complete: Option<String>,
}

impl ExtractionCollector {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one message; returns the full payload once available.
    ///
    /// # Errors
    /// `IncompleteTransfer` on malformed chunk sequences.
    pub fn accept(&mut self, message: AgentMessage) -> scene::Result<Option<String>> {
        match message {
            AgentMessage::Complete { data } => {
                let payload = serde_json::to_string(&data).map_err(|err| {
                    scene::Error::IncompleteTransfer(format!("unserializable payload: {err}"))
                })?;
                self.complete = Some(payload.clone());
                Ok(Some(payload))
            }
            AgentMessage::Chunk(chunk) => {
                let assembled = self.assembler.accept(chunk)?;
                if let Some(payload) = &assembled {
                    self.complete = Some(payload.clone());
                }
                Ok(assembled)
            }
            AgentMessage::CompleteMeta { total_chunks } => {
                if self.complete.is_none() {
                    return Err(scene::Error::IncompleteTransfer(format!(
                        "completion marker arrived before all {total_chunks} chunks"
                    )));
                }
                Ok(self.complete.clone())
            }
            AgentMessage::Progress(_) => Ok(None),
        }
    }
}
