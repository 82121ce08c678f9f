//! IPC daemon: the long-lived owner of every pseudo-console.
//!
//! # Architecture
//!
//! ```text
//! client ──connect──► endpoint (named pipe / UDS)
//!                        │ accept loop thread
//!                        ▼
//!                 per-client handler thread   (reads requests, replies)
//!                 per-client writer thread    (drains one FIFO queue)
//!                        ▲
//!   SessionManager ──────┘ event pump thread  (fans events to all queues)
//! ```
//!
//! Every byte written to a client — responses and events alike — flows
//! through that client's single queue, so concurrent payloads can never
//! interleave on the wire and a response always follows the events that
//! were enqueued before it. A slow client only backs up its own queue.
//!
//! The UI process does not need the daemon to outlive it, but the
//! daemon deliberately survives client disconnects: on reconnect a
//! client re-issues `SESSION_CREATE` with its old pane ids and gets
//! `IsExisting: true` back instead of a fresh shell.

pub mod client;
pub mod protocol;
pub mod server;

use std::io;

use interprocess::local_socket::{
    GenericFilePath, GenericNamespaced, Name, NameType as _, ToFsName as _, ToNsName as _,
};

pub use client::DaemonClient;
pub use server::Daemon;

/// Resolve a well-known endpoint name for this platform.
///
/// Namespaced names (named pipes on Windows, the abstract namespace on
/// Linux) are preferred; platforms without one fall back to a socket
/// file in the temp directory.
pub fn endpoint_name(base: &str) -> io::Result<Name<'static>> {
    if GenericNamespaced::is_supported() {
        format!("{base}.sock").to_ns_name::<GenericNamespaced>()
    } else {
        std::env::temp_dir()
            .join(format!("{base}.sock"))
            .to_fs_name::<GenericFilePath>()
    }
}
