//! Application-wide constants for the cmux engine.
//!
//! This module centralizes magic numbers so they are discoverable and
//! documented in one place. Constants are grouped by domain.

use std::time::Duration;

// ============================================================================
// IPC endpoint
// ============================================================================

/// Well-known name of the daemon's local IPC endpoint.
///
/// Clients resolve this to a named pipe on Windows and a Unix domain
/// socket elsewhere. Tests use private names to avoid colliding with a
/// running daemon.
pub const DAEMON_ENDPOINT: &str = "cmux-daemon";

// ============================================================================
// Timeouts & retries
// ============================================================================

/// How long a client waits for the response to a pending request.
///
/// On timeout the request resolves to `None` and the next request may
/// proceed; the connection itself stays up.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-attempt connect timeout during daemon auto-start.
pub const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay between connect attempts during daemon auto-start.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Maximum connect attempts before auto-start gives up.
pub const CONNECT_MAX_ATTEMPTS: u32 = 20;

// ============================================================================
// Buffers
// ============================================================================

/// Read-chunk size for the per-session PTY read loop.
pub const PTY_READ_CHUNK: usize = 4096;

/// Default scrollback line limit per session.
///
/// 10 000 lines keeps per-pane memory bounded (~1 MB of text at 80
/// columns) while covering a long interactive session.
pub const DEFAULT_SCROLLBACK_LINES: usize = 10_000;

/// Maximum in-memory command-log entries before oldest are evicted.
pub const COMMAND_LOG_MEMORY_CAP: usize = 5_000;

/// Commands longer than this are truncated before storage.
pub const COMMAND_MAX_LEN: usize = 4096;

// ============================================================================
// Retention
// ============================================================================

/// Retention applied when a negative day count is configured.
pub const RETENTION_FALLBACK_DAYS: i64 = 90;

/// Upper clamp for configured retention, in days.
pub const RETENTION_MAX_DAYS: i64 = 3650;
