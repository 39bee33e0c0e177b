//! Incremental decoder for the Docker `/events` stream.
//!
//! The stream is a sequence of concatenated JSON objects delivered in
//! arbitrary chunks; an object may be split across chunks. Bytes are buffered
//! until a complete object is available.

use serde::Deserialize;

use berth_core::{ContainerId, EventKind, LifecycleEvent};

use crate::error::{RuntimeError, RuntimeResult};

/// Wire shape of one event.
///
/// Older engines send `status`/`id`; newer ones add `Type`/`Action`/`Actor`.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "Type", default)]
    object_type: Option<String>,
    #[serde(rename = "Action", default)]
    action: Option<String>,
    #[serde(rename = "Actor", default)]
    actor: Option<RawActor>,
}

#[derive(Debug, Deserialize)]
struct RawActor {
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

impl From<RawEvent> for LifecycleEvent {
    fn from(raw: RawEvent) -> Self {
        let container_id = raw
            .actor
            .and_then(|a| a.id)
            .or(raw.id)
            .map(ContainerId::new)
            .unwrap_or_else(|| ContainerId::new(""));
        let action = raw.action.or(raw.status).unwrap_or_default();

        let kind = match raw.object_type.as_deref() {
            Some("container") | None if !container_id.is_empty() => {
                EventKind::from_action(&action)
            }
            _ => EventKind::Other(action),
        };

        LifecycleEvent { container_id, kind }
    }
}

/// Largest incomplete event kept while waiting for more bytes.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Buffers raw bytes and yields complete events.
#[derive(Debug)]
pub struct EventDecoder {
    buf: Vec<u8>,
    max_pending: usize,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that gives up once an unfinished event exceeds `max_pending` bytes.
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_pending,
        }
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Decode the next complete event, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn next_event(&mut self) -> RuntimeResult<Option<LifecycleEvent>> {
        let (decoded, consumed) = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buf).into_iter::<RawEvent>();
            match stream.next() {
                // Only whitespace left.
                None => (None, self.buf.len()),
                Some(Ok(raw)) => (Some(raw), stream.byte_offset()),
                Some(Err(e)) if e.is_eof() => {
                    if self.buf.len() > self.max_pending {
                        return Err(RuntimeError::Decode(format!(
                            "event exceeds {} bytes without terminating",
                            self.max_pending
                        )));
                    }
                    (None, 0)
                }
                Some(Err(e)) => return Err(RuntimeError::Decode(e.to_string())),
            }
        };
        self.buf.drain(..consumed);
        Ok(decoded.map(LifecycleEvent::from))
    }

    /// Called at end of stream; leftover bytes mean a truncated event.
    pub fn finish(&self) -> RuntimeResult<()> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(RuntimeError::Decode(format!(
                "stream ended inside an event ({} bytes pending)",
                self.buf.len()
            )))
        }
    }
}
