//! Request-scoped capture of upstream payloads
//!
//! When request logging is enabled, the translated request and each
//! upstream response chunk are recorded into a per-request handle the host
//! server can drain after the call.

use std::sync::Mutex;

/// Per-request capture of upstream request and response bytes
#[derive(Debug, Default)]
pub struct RequestCapture {
    request: Mutex<Option<Vec<u8>>>,
    response: Mutex<Vec<u8>>,
}

impl RequestCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the upstream request payload
    pub fn record_request(&self, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        let mut slot = self.request.lock().expect("capture lock poisoned");
        *slot = Some(payload.to_vec());
    }

    /// Append an upstream response chunk, separated by a blank line
    pub fn append_response_chunk(&self, chunk: &[u8]) {
        let trimmed = trim_ascii(chunk);
        if trimmed.is_empty() {
            return;
        }
        let mut buf = self.response.lock().expect("capture lock poisoned");
        if !buf.is_empty() {
            buf.extend_from_slice(b"\n\n");
        }
        buf.extend_from_slice(trimmed);
    }

    /// The captured request payload, if any
    pub fn request(&self) -> Option<Vec<u8>> {
        self.request.lock().expect("capture lock poisoned").clone()
    }

    /// The accumulated response bytes
    pub fn response(&self) -> Vec<u8> {
        self.response.lock().expect("capture lock poisoned").clone()
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
