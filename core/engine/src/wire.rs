//! Wire protocol for the backend control channel.
//!
//! Every frame is a `Content-Length: N\r\n\r\n` header followed by `N` bytes
//! of JSON. The JSON payload is a `type`-tagged message. Statements travel
//! as `request` frames and come back as exactly one `response` frame with
//! positional rows; `notice` frames may arrive at any point, including
//! between a request and its response.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single positional result row.
pub type Row = Vec<serde_json::Value>;

/// Statement-level failure classes reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The statement text was rejected. Recovered locally.
    SyntaxError,
    /// The backend lost its own downstream connection. Recovered locally.
    ConnectionLost,
    /// The named object does not exist. Fatal during extension bootstrap.
    UndefinedObject,
    /// The statement was cancelled mid-flight.
    Cancelled,
    /// Anything else the backend chose to report.
    Internal,
}

/// Error payload attached to a failed `response` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementError {
    pub class: ErrorClass,
    pub message: String,
}

/// A protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Sent by the backend exactly once, immediately after connect.
    Greeting { pid: u32 },
    /// A tabular statement, e.g. `attach_to_port(5433)` or a literal call
    /// expression such as `f(2)`.
    Request { seq: u64, statement: String },
    /// The single reply to a request, echoing its `seq`.
    Response {
        seq: u64,
        #[serde(default)]
        rows: Vec<Row>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<StatementError>,
    },
    /// Out-of-band diagnostic text produced while a statement executes.
    Notice { text: String },
}

/// Encodes a frame with its `Content-Length` header.
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(frame)?;
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    Ok(out)
}

/// Incremental frame decoder.
///
/// Bytes are fed in as they arrive off the socket; `next` yields a frame as
/// soon as a complete header and body are buffered. Partial input is kept
/// for the following call, which is what the non-blocking poll loop relies
/// on.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes read from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Decodes the next complete frame, if one is buffered.
    pub fn next(&mut self) -> Result<Option<Frame>> {
        let Some(header_end) = find_subsequence(&self.buf, b"\r\n\r\n") else {
            return Ok(None);
        };

        let header = std::str::from_utf8(&self.buf[..header_end])
            .map_err(|_| Error::Protocol("frame header is not valid UTF-8".into()))?;
        let content_length: usize = header
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length:"))
            .and_then(|value| value.trim().parse().ok())
            .ok_or_else(|| Error::Protocol(format!("missing Content-Length in `{header}`")))?;

        let body_start = header_end + 4;
        if self.buf.len() < body_start + content_length {
            return Ok(None);
        }

        let frame = serde_json::from_slice(&self.buf[body_start..body_start + content_length])?;
        self.buf.drain(..body_start + content_length);
        Ok(Some(frame))
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
