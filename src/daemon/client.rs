//! Daemon client: request/reply with event callbacks.
//!
//! The client keeps **at most one request pending**: a gate mutex
//! serialises callers, and the reader thread resolves the pending slot
//! when a line carrying the `Success` key arrives. Every other line is
//! an unsolicited [`Event`] handed to the registered callback. A request
//! unanswered after [`REQUEST_TIMEOUT`](crate::constants::REQUEST_TIMEOUT)
//! resolves to `None` and the connection stays usable.

use std::io::{BufRead, BufReader, Write as _};
use std::process::{Child, Command};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use interprocess::local_socket::{traits::Stream as _, Stream};

use super::endpoint_name;
use super::protocol::{encode_bytes, encode_line, Event, Request, RequestType, Response};
use crate::constants::{
    CONNECT_ATTEMPT_TIMEOUT, CONNECT_MAX_ATTEMPTS, CONNECT_RETRY_DELAY, REQUEST_TIMEOUT,
};
use crate::session::manager::SessionInfo;
use crate::term::ScreenSnapshot;

/// Callback invoked on the reader thread for every unsolicited event.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Debug)]
enum PendingState {
    /// No request in flight.
    Idle,
    /// A request was sent; the reader will fill in the response.
    Waiting,
    /// Response arrived, waiting for the requester to take it.
    Ready(Response),
    /// The connection died; all requests fail fast.
    Closed,
}

#[derive(Debug)]
struct Pending {
    state: Mutex<PendingState>,
    cond: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            state: Mutex::new(PendingState::Idle),
            cond: Condvar::new(),
        }
    }

    /// Reader-side: hand a response to the waiting requester. A late
    /// response after a timeout finds the slot idle and is dropped.
    fn deliver(&self, response: Response) {
        let mut state = self.state.lock().expect("pending lock poisoned");
        if matches!(*state, PendingState::Waiting) {
            *state = PendingState::Ready(response);
            self.cond.notify_all();
        }
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("pending lock poisoned");
        *state = PendingState::Closed;
        self.cond.notify_all();
    }
}

/// A connection to the daemon.
pub struct DaemonClient {
    send: Mutex<interprocess::local_socket::SendHalf>,
    pending: Arc<Pending>,
    /// Held for the duration of each request — the "one pending
    /// request" semaphore.
    request_gate: Mutex<()>,
}

impl std::fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonClient").finish_non_exhaustive()
    }
}

impl DaemonClient {
    /// Connect to an endpoint by well-known base name.
    pub fn connect(endpoint: &str, on_event: EventHandler) -> Result<Self> {
        Self::from_stream(connect_stream(endpoint)?, on_event)
    }

    /// Wire the reader thread and pending slot over an open stream.
    fn from_stream(stream: Stream, on_event: EventHandler) -> Result<Self> {
        let (recv_half, send_half) = stream.split();

        let pending = Arc::new(Pending::new());

        // Reader thread: discriminate responses from events by the
        // presence of the `Success` key.
        {
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("daemon-client-read".into())
                .spawn(move || {
                    let reader = BufReader::new(recv_half);
                    for line in reader.lines() {
                        let Ok(line) = line else { break };
                        if line.trim().is_empty() {
                            continue;
                        }
                        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                            log::warn!("[client] unparsable line from daemon");
                            continue;
                        };
                        if value.get("Success").is_some() {
                            match serde_json::from_value::<Response>(value) {
                                Ok(response) => pending.deliver(response),
                                Err(e) => log::warn!("[client] bad response: {e}"),
                            }
                        } else {
                            match serde_json::from_value::<Event>(value) {
                                Ok(event) => on_event(event),
                                Err(e) => log::warn!("[client] bad event: {e}"),
                            }
                        }
                    }
                    pending.close();
                })
                .context("spawn client reader thread")?;
        }

        Ok(Self {
            send: Mutex::new(send_half),
            pending,
            request_gate: Mutex::new(()),
        })
    }

    /// Connect, spawning `daemon_program` and retrying when the first
    /// attempt finds no endpoint. Each retry's connect is bounded by
    /// [`CONNECT_ATTEMPT_TIMEOUT`] so a wedged endpoint cannot stall
    /// the loop. Gives up after [`CONNECT_MAX_ATTEMPTS`] retries or as
    /// soon as the spawned process exits.
    pub fn connect_or_spawn(
        endpoint: &str,
        daemon_program: &str,
        on_event: EventHandler,
    ) -> Result<Self> {
        match connect_stream_with_timeout(endpoint, CONNECT_ATTEMPT_TIMEOUT) {
            Ok(stream) => return Self::from_stream(stream, on_event),
            Err(e) => log::info!("[client] initial connect failed ({e:#}); starting daemon"),
        }

        let mut child = Command::new(daemon_program)
            .spawn()
            .with_context(|| format!("spawn daemon process {daemon_program}"))?;

        for attempt in 1..=CONNECT_MAX_ATTEMPTS {
            if let Some(status) = daemon_exited(&mut child) {
                bail!("daemon process exited during startup: {status}");
            }
            thread::sleep(CONNECT_RETRY_DELAY);
            match connect_stream_with_timeout(endpoint, CONNECT_ATTEMPT_TIMEOUT) {
                Ok(stream) => return Self::from_stream(stream, on_event),
                Err(e) => log::debug!("[client] connect attempt {attempt} failed: {e:#}"),
            }
        }
        bail!("daemon did not come up after {CONNECT_MAX_ATTEMPTS} attempts")
    }

    /// Send one request and wait for its response.
    ///
    /// Returns `None` on timeout or a dead connection. Timed-out
    /// requests leave the line clean: a late response is discarded by
    /// the reader, and the next request may proceed immediately.
    pub fn request(&self, request: &Request) -> Option<Response> {
        let _gate = self.request_gate.lock().expect("request gate poisoned");

        {
            let mut state = self.pending.state.lock().expect("pending lock poisoned");
            if matches!(*state, PendingState::Closed) {
                return None;
            }
            *state = PendingState::Waiting;
        }

        let line = match encode_line(request) {
            Ok(line) => line,
            Err(_) => {
                self.reset_pending();
                return None;
            }
        };
        {
            let mut send = self.send.lock().expect("send lock poisoned");
            if send.write_all(line.as_bytes()).is_err() {
                self.reset_pending();
                return None;
            }
        }

        let deadline = Instant::now() + REQUEST_TIMEOUT;
        let mut state = self.pending.state.lock().expect("pending lock poisoned");
        loop {
            match &*state {
                PendingState::Ready(_) => {
                    let PendingState::Ready(response) =
                        std::mem::replace(&mut *state, PendingState::Idle)
                    else {
                        unreachable!("checked Ready above");
                    };
                    return Some(response);
                }
                PendingState::Closed => return None,
                _ => {}
            }
            let now = Instant::now();
            if now >= deadline {
                *state = PendingState::Idle;
                return None;
            }
            let (next, _timeout) = self
                .pending
                .cond
                .wait_timeout(state, deadline - now)
                .expect("pending lock poisoned");
            state = next;
        }
    }

    fn reset_pending(&self) {
        let mut state = self.pending.state.lock().expect("pending lock poisoned");
        if matches!(*state, PendingState::Waiting) {
            *state = PendingState::Idle;
        }
    }

    // ── Typed helpers ─────────────────────────────────────────────────────

    /// True when the daemon answers `PING` with `pong`.
    pub fn ping(&self) -> bool {
        self.request(&Request::new(RequestType::Ping))
            .is_some_and(|r| r.success && r.data.as_deref() == Some("pong"))
    }

    /// Create (or re-attach to) a pane.
    pub fn create_session(
        &self,
        pane_id: &str,
        cols: u16,
        rows: u16,
        working_directory: Option<&str>,
        command: Option<&str>,
    ) -> Option<SessionInfo> {
        let mut req = Request::for_pane(RequestType::SessionCreate, pane_id);
        req.cols = Some(cols);
        req.rows = Some(rows);
        req.working_directory = working_directory.map(str::to_string);
        req.command = command.map(str::to_string);
        let response = self.request(&req)?;
        if !response.success {
            log::warn!("[client] create {pane_id} failed: {:?}", response.error);
            return None;
        }
        serde_json::from_str(response.data.as_deref()?).ok()
    }

    /// Write keystrokes to a pane.
    pub fn write_bytes(&self, pane_id: &str, data: &[u8]) -> bool {
        let mut req = Request::for_pane(RequestType::SessionWrite, pane_id);
        req.data = Some(encode_bytes(data));
        self.request(&req).is_some_and(|r| r.success)
    }

    /// Resize a pane.
    pub fn resize(&self, pane_id: &str, cols: u16, rows: u16) -> bool {
        let mut req = Request::for_pane(RequestType::SessionResize, pane_id);
        req.cols = Some(cols);
        req.rows = Some(rows);
        self.request(&req).is_some_and(|r| r.success)
    }

    /// Close a pane.
    pub fn close_session(&self, pane_id: &str) -> bool {
        self.request(&Request::for_pane(RequestType::SessionClose, pane_id))
            .is_some_and(|r| r.success)
    }

    /// List every pane the daemon knows.
    pub fn list_sessions(&self) -> Option<Vec<SessionInfo>> {
        let response = self.request(&Request::new(RequestType::SessionList))?;
        if !response.success {
            return None;
        }
        serde_json::from_str(response.data.as_deref()?).ok()
    }

    /// Plain-text snapshot of a pane.
    pub fn snapshot(&self, pane_id: &str) -> Option<String> {
        let response = self.request(&Request::for_pane(RequestType::SessionSnapshot, pane_id))?;
        if !response.success {
            return None;
        }
        response.data
    }

    /// Rehydrate a pane's screen from a persisted snapshot.
    pub fn restore_snapshot(&self, pane_id: &str, snapshot: &ScreenSnapshot) -> bool {
        let Ok(data) = serde_json::to_string(snapshot) else {
            return false;
        };
        let mut req = Request::for_pane(RequestType::SessionRestore, pane_id);
        req.data = Some(data);
        self.request(&req).is_some_and(|r| r.success)
    }
}

/// Blocking connect to a well-known endpoint.
fn connect_stream(endpoint: &str) -> Result<Stream> {
    let name = endpoint_name(endpoint).context("resolve endpoint name")?;
    Stream::connect(name).context("connect to daemon endpoint")
}

/// Connect with a deadline. The underlying connect is blocking, so it
/// runs on a throwaway thread; on timeout the thread is abandoned and
/// its eventual result dropped with the channel.
fn connect_stream_with_timeout(endpoint: &str, timeout: Duration) -> Result<Stream> {
    let endpoint = endpoint.to_string();
    let (tx, rx) = channel();
    thread::Builder::new()
        .name("daemon-connect".into())
        .spawn(move || {
            let _ = tx.send(connect_stream(&endpoint));
        })
        .context("spawn connect thread")?;
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            bail!("connect timed out after {} ms", timeout.as_millis())
        }
        Err(RecvTimeoutError::Disconnected) => bail!("connect thread died"),
    }
}

fn daemon_exited(child: &mut Child) -> Option<std::process::ExitStatus> {
    child.try_wait().ok().flatten()
}
