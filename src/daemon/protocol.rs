//! Wire protocol for the daemon's local IPC endpoint.
//!
//! Framing is newline-delimited UTF-8 JSON: one value per line, no
//! escaping needed because JSON string scalars never contain a literal
//! LF. Binary payloads (session output, keystrokes) ride as base64 in
//! the `Data` field for the same reason.
//!
//! Three shapes share the stream:
//! - [`Request`] (client → daemon)
//! - [`Response`] (daemon → client) — carries `Success`, the
//!   discriminator that separates responses from events on the client
//! - [`Event`] (daemon → client, unsolicited)
//!
//! All field names are PascalCase on the wire; on-disk JSON elsewhere in
//! the engine is camelCase. Neither boundary ever switches.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Request verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    SessionCreate,
    SessionWrite,
    SessionResize,
    SessionClose,
    SessionList,
    SessionSnapshot,
    SessionRestore,
    SessionTranscript,
    Ping,
}

/// A client request. Unused fields stay `None` and are omitted on the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    #[serde(rename = "Type")]
    pub request_type: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Base64 bytes for `SESSION_WRITE`; a camelCase-JSON
    /// [`ScreenSnapshot`](crate::term::ScreenSnapshot) for
    /// `SESSION_RESTORE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Capture reason for `SESSION_TRANSCRIPT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Request {
    /// A bare request carrying only the verb.
    #[must_use]
    pub fn new(request_type: RequestType) -> Self {
        Self {
            request_type,
            pane_id: None,
            cols: None,
            rows: None,
            working_directory: None,
            command: None,
            data: None,
            surface_id: None,
            workspace_id: None,
            reason: None,
        }
    }

    /// A request addressing one pane.
    #[must_use]
    pub fn for_pane(request_type: RequestType, pane_id: &str) -> Self {
        let mut req = Self::new(request_type);
        req.pane_id = Some(pane_id.to_string());
        req
    }
}

/// Daemon reply to exactly one request. The presence of the `Success`
/// key is what lets clients tell replies from events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    #[must_use]
    pub fn ok_with_data(data: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data.into()),
        }
    }

    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: None,
        }
    }
}

/// Unsolicited event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Output,
    Exited,
    TitleChanged,
    CwdChanged,
    Bell,
}

/// A broadcast event. `Data` is base64 VT bytes for `OUTPUT`, the
/// stringified exit code for `EXITED`, the literal string for title and
/// cwd changes, and absent for `BELL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    #[serde(rename = "Type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, pane_id: &str, data: Option<String>) -> Self {
        Self {
            event_type,
            pane_id: Some(pane_id.to_string()),
            data,
        }
    }
}

// ── Framing ─────────────────────────────────────────────────────────────────

/// Serialize a message as one LF-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message).context("serialize IPC message")?;
    line.push('\n');
    Ok(line)
}

/// Base64-encode binary payload bytes.
#[must_use]
pub fn encode_bytes(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode a base64 `Data` field.
pub fn decode_bytes(data: &str) -> Result<Vec<u8>> {
    BASE64.decode(data).context("invalid base64 payload")
}

// ─── Tests ──────────────────────────────────────────────────────────────────
