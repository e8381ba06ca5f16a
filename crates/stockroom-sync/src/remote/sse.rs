//! # Server-Sent Events
//!
//! Incremental parser for the `text/event-stream` change feed.
//!
//! ## Wire Format
//! ```text
//! event: put
//! data: {"path":"/","data":{"1":{"name":"Rice",...}}}
//!                                                   ◄── blank line ends a frame
//! event: patch
//! data: {"path":"/1","data":{"quantity":7}}
//!
//! event: keep-alive
//! data: null
//! ```
//!
//! Network chunks split frames (and UTF-8 sequences) anywhere, so bytes are
//! buffered until a full line is available.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::remote::{ChangeEvent, EventKind};

/// One dispatched frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Line-buffering frame parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[derive(Deserialize)]
struct Payload {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Converts a frame into a change event.
///
/// `keep-alive` and unknown frames yield `Ok(None)`. A `put` / `patch`
/// whose payload does not parse is `InvalidEvent`, which the stream passes
/// on and then keeps reading. `cancel` and `auth_revoked` end the stream.
pub fn decode_frame(frame: &SseFrame) -> SyncResult<Option<ChangeEvent>> {
    let kind = match frame.event.as_str() {
        "put" => EventKind::Put,
        "patch" => EventKind::Patch,
        "keep-alive" => return Ok(None),
        "cancel" => return Err(SyncError::StreamCancelled(frame.data.clone())),
        "auth_revoked" => return Err(SyncError::AuthRevoked),
        other => {
            debug!(event = other, "Ignoring unknown stream event");
            return Ok(None);
        }
    };

    let payload: Payload = serde_json::from_str(&frame.data)
        .map_err(|e| SyncError::InvalidEvent(format!("{}: {e}", frame.event)))?;

    Ok(Some(ChangeEvent {
        kind,
        path: payload.path,
        data: payload.data,
    }))
}
