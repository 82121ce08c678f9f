//! Daemon server: accept loop, per-client threads, event broadcast.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write as _};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use interprocess::local_socket::traits::{Listener as _, Stream as _};
use interprocess::local_socket::{
    Listener, ListenerNonblockingMode, ListenerOptions, Name, Stream,
};

use super::protocol::{
    decode_bytes, encode_bytes, encode_line, Event, EventType, Request, RequestType, Response,
};
use crate::history::transcript::TranscriptStore;
use crate::history::CommandLog;
use crate::session::manager::SessionManager;
use crate::session::SessionEvent;
use crate::term::ScreenSnapshot;

/// Poll interval for the nonblocking accept loop and the event pump's
/// shutdown check.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-client write queues, keyed by connection id. Dropping a sender
/// lets that client's writer thread drain and exit.
type ClientMap = Arc<Mutex<HashMap<u64, Sender<String>>>>;

/// A running daemon. Dropping the handle does not stop the threads;
/// call [`Daemon::shutdown`] then [`Daemon::join`].
pub struct Daemon {
    clients: ClientMap,
    shutdown: Arc<AtomicBool>,
    manager: Arc<SessionManager>,
    accept_handle: Option<thread::JoinHandle<()>>,
    pump_handle: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clients = self.clients.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("Daemon")
            .field("clients", &clients)
            .field("shutdown", &self.shutdown.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Bind the endpoint and start the accept loop and event pump.
    ///
    /// Failing to create the listener is the one fatal error in the
    /// daemon: without an endpoint there is nothing to serve.
    pub fn start(
        name: Name<'static>,
        manager: Arc<SessionManager>,
        events_rx: Receiver<SessionEvent>,
        command_log: Arc<CommandLog>,
        transcripts: Arc<TranscriptStore>,
    ) -> Result<Self> {
        let listener = ListenerOptions::new()
            .name(name)
            .create_sync()
            .context("create daemon endpoint")?;
        listener
            .set_nonblocking(ListenerNonblockingMode::Accept)
            .context("set endpoint nonblocking")?;

        let clients: ClientMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_handle = {
            let clients = Arc::clone(&clients);
            let shutdown = Arc::clone(&shutdown);
            let manager = Arc::clone(&manager);
            let command_log = Arc::clone(&command_log);
            let transcripts = Arc::clone(&transcripts);
            thread::Builder::new()
                .name("daemon-accept".into())
                .spawn(move || {
                    accept_loop(
                        &listener,
                        &clients,
                        &shutdown,
                        &manager,
                        &command_log,
                        &transcripts,
                    );
                })
                .context("spawn accept loop")?
        };

        let pump_handle = {
            let clients = Arc::clone(&clients);
            let shutdown = Arc::clone(&shutdown);
            let manager = Arc::clone(&manager);
            let command_log = Arc::clone(&command_log);
            thread::Builder::new()
                .name("daemon-events".into())
                .spawn(move || {
                    event_pump(&events_rx, &clients, &shutdown, &manager, &command_log);
                })
                .context("spawn event pump")?
        };

        log::info!("[daemon] listening");
        Ok(Self {
            clients,
            shutdown,
            manager,
            accept_handle: Some(accept_handle),
            pump_handle: Some(pump_handle),
        })
    }

    /// Queue an event to every connected client.
    ///
    /// The normal source of events is the session manager; this entry
    /// point exists for daemon-originated announcements and tests.
    pub fn broadcast_event(&self, event: &Event) {
        if let Ok(line) = encode_line(event) {
            broadcast_line(&self.clients, &line);
        }
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("client map lock poisoned").len()
    }

    /// Stop accepting, drop every client queue, and kill all sessions.
    pub fn shutdown(&self) {
        log::info!("[daemon] shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        self.clients
            .lock()
            .expect("client map lock poisoned")
            .clear();
        self.manager.close_all();
    }

    /// Wait for the accept loop and event pump to finish.
    pub fn join(mut self) {
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.pump_handle.take() {
            let _ = handle.join();
        }
    }
}

// ── Accept loop ─────────────────────────────────────────────────────────────

fn accept_loop(
    listener: &Listener,
    clients: &ClientMap,
    shutdown: &Arc<AtomicBool>,
    manager: &Arc<SessionManager>,
    command_log: &Arc<CommandLog>,
    transcripts: &Arc<TranscriptStore>,
) {
    static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(stream) => {
                let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
                log::info!("[daemon] client {id} connected");
                spawn_client(
                    id,
                    stream,
                    Arc::clone(clients),
                    Arc::clone(manager),
                    Arc::clone(command_log),
                    Arc::clone(transcripts),
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                log::warn!("[daemon] accept error: {e}");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    log::debug!("[daemon] accept loop ended");
}

/// Wire up one connection: a writer thread draining the client's queue
/// and a handler thread dispatching its requests.
fn spawn_client(
    id: u64,
    stream: Stream,
    clients: ClientMap,
    manager: Arc<SessionManager>,
    command_log: Arc<CommandLog>,
    transcripts: Arc<TranscriptStore>,
) {
    let (recv_half, send_half) = stream.split();
    let (queue_tx, queue_rx) = channel::<String>();

    clients
        .lock()
        .expect("client map lock poisoned")
        .insert(id, queue_tx.clone());

    // Writer: the only thread that touches this client's send half.
    // Exits when every queue sender is gone (disconnect or shutdown).
    let writer = thread::Builder::new().name(format!("client-{id}-write"));
    let _ = writer.spawn(move || {
        let mut send_half = send_half;
        for line in queue_rx {
            if send_half.write_all(line.as_bytes()).is_err() {
                break;
            }
        }
        log::debug!("[daemon] client {id} writer ended");
    });

    // Handler: reads newline-delimited requests and replies inline
    // through the queue.
    let handler = thread::Builder::new().name(format!("client-{id}-read"));
    let _ = handler.spawn(move || {
        let reader = BufReader::new(recv_half);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => handle_request(&request, &manager, &command_log, &transcripts),
                Err(e) => Response::err(format!("malformed request: {e}")),
            };
            let Ok(encoded) = encode_line(&response) else { break };
            if queue_tx.send(encoded).is_err() {
                break;
            }
        }
        // Transport gone: drop this client, keep the daemon running.
        clients
            .lock()
            .expect("client map lock poisoned")
            .remove(&id);
        log::info!("[daemon] client {id} disconnected");
    });
}

// ── Request dispatch ────────────────────────────────────────────────────────

fn handle_request(
    request: &Request,
    manager: &SessionManager,
    command_log: &CommandLog,
    transcripts: &TranscriptStore,
) -> Response {
    match request.request_type {
        RequestType::Ping => Response::ok_with_data("pong"),

        RequestType::SessionCreate => {
            let Some(pane_id) = request.pane_id.as_deref() else {
                return Response::err("missing PaneId");
            };
            let cols = request.cols.unwrap_or(80);
            let rows = request.rows.unwrap_or(24);
            if request.surface_id.is_some() || request.workspace_id.is_some() {
                command_log.set_pane_context(
                    pane_id,
                    request.surface_id.clone(),
                    request.workspace_id.clone(),
                );
            }
            match manager.create_session(
                pane_id,
                cols,
                rows,
                request.working_directory.as_deref(),
                request.command.as_deref(),
            ) {
                Ok(info) => match serde_json::to_string(&info) {
                    Ok(json) => Response::ok_with_data(json),
                    Err(e) => Response::err(format!("serialize session info: {e}")),
                },
                Err(e) => Response::err(format!("create session: {e:#}")),
            }
        }

        RequestType::SessionWrite => {
            let Some(pane_id) = request.pane_id.as_deref() else {
                return Response::err("missing PaneId");
            };
            let Some(data) = request.data.as_deref() else {
                return Response::err("missing Data");
            };
            let bytes = match decode_bytes(data) {
                Ok(bytes) => bytes,
                Err(e) => return Response::err(format!("{e:#}")),
            };
            match manager.write_to_session(pane_id, &bytes) {
                Ok(()) => Response::ok(),
                Err(e) => Response::err(format!("{e:#}")),
            }
        }

        RequestType::SessionResize => {
            let Some(pane_id) = request.pane_id.as_deref() else {
                return Response::err("missing PaneId");
            };
            let (Some(cols), Some(rows)) = (request.cols, request.rows) else {
                return Response::err("missing Cols/Rows");
            };
            match manager.resize_session(pane_id, cols, rows) {
                Ok(()) => Response::ok(),
                Err(e) => Response::err(format!("{e:#}")),
            }
        }

        RequestType::SessionClose => {
            let Some(pane_id) = request.pane_id.as_deref() else {
                return Response::err("missing PaneId");
            };
            match manager.close_session(pane_id) {
                Ok(()) => Response::ok(),
                Err(e) => Response::err(format!("{e:#}")),
            }
        }

        RequestType::SessionList => match serde_json::to_string(&manager.list_sessions()) {
            Ok(json) => Response::ok_with_data(json),
            Err(e) => Response::err(format!("serialize session list: {e}")),
        },

        RequestType::SessionSnapshot => {
            let Some(pane_id) = request.pane_id.as_deref() else {
                return Response::err("missing PaneId");
            };
            match manager.snapshot(pane_id) {
                Ok(text) => Response::ok_with_data(text),
                Err(e) => Response::err(format!("{e:#}")),
            }
        }

        RequestType::SessionRestore => {
            let Some(pane_id) = request.pane_id.as_deref() else {
                return Response::err("missing PaneId");
            };
            let Some(data) = request.data.as_deref() else {
                return Response::err("missing Data");
            };
            let snapshot = match serde_json::from_str::<ScreenSnapshot>(data) {
                Ok(snapshot) => snapshot,
                Err(e) => return Response::err(format!("invalid snapshot: {e}")),
            };
            match manager.restore_into(pane_id, &snapshot) {
                Ok(()) => Response::ok(),
                Err(e) => Response::err(format!("{e:#}")),
            }
        }

        RequestType::SessionTranscript => {
            let Some(pane_id) = request.pane_id.as_deref() else {
                return Response::err("missing PaneId");
            };
            let reason = request.reason.as_deref().unwrap_or("manual");
            let text = match manager.snapshot(pane_id) {
                Ok(text) => text,
                Err(e) => return Response::err(format!("{e:#}")),
            };
            let session = manager.get(pane_id).ok();
            let cwd = session.and_then(|s| s.working_directory());
            match transcripts.save(
                pane_id,
                request.surface_id.as_deref(),
                request.workspace_id.as_deref(),
                reason,
                cwd.as_deref(),
                &text,
            ) {
                Ok(path) => Response::ok_with_data(path.display().to_string()),
                Err(e) => Response::err(format!("save transcript: {e:#}")),
            }
        }
    }
}

// ── Event pump ──────────────────────────────────────────────────────────────

/// Drain manager events: prompt markers feed the command log, the rest
/// fan out to every client queue. Enqueue only — a slow client must
/// never stall this thread.
fn event_pump(
    events_rx: &Receiver<SessionEvent>,
    clients: &ClientMap,
    shutdown: &Arc<AtomicBool>,
    manager: &Arc<SessionManager>,
    command_log: &Arc<CommandLog>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let event = match events_rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let wire_event = match event {
            SessionEvent::Output { pane_id, data } => {
                Some(Event::new(EventType::Output, &pane_id, Some(encode_bytes(&data))))
            }
            SessionEvent::Exited { pane_id, exit_code } => {
                // The session is terminal; forget it so a reconnecting
                // client gets a fresh shell under the same pane id.
                let _ = manager.reap_exited();
                Some(Event::new(
                    EventType::Exited,
                    &pane_id,
                    Some(exit_code.unwrap_or(-1).to_string()),
                ))
            }
            SessionEvent::TitleChanged { pane_id, title } => {
                Some(Event::new(EventType::TitleChanged, &pane_id, Some(title)))
            }
            SessionEvent::WorkingDirectoryChanged { pane_id, path } => {
                Some(Event::new(EventType::CwdChanged, &pane_id, Some(path)))
            }
            SessionEvent::Bell { pane_id } => Some(Event::new(EventType::Bell, &pane_id, None)),
            SessionEvent::PromptMarker {
                pane_id,
                kind,
                payload,
                working_directory,
            } => {
                command_log.handle_marker(
                    &pane_id,
                    kind,
                    payload.as_deref(),
                    working_directory.as_deref(),
                );
                None
            }
            SessionEvent::Notification { pane_id, title, body, .. } => {
                // Toasts are a UI concern; the daemon only records them.
                log::info!(
                    "[daemon] notification from {pane_id}: {} {}",
                    title.unwrap_or_default(),
                    body.unwrap_or_default()
                );
                None
            }
        };

        if let Some(wire_event) = wire_event {
            if let Ok(line) = encode_line(&wire_event) {
                broadcast_line(clients, &line);
            }
        }
    }
    log::debug!("[daemon] event pump ended");
}

/// Enqueue one line to every client. Senders that fail (client gone)
/// are cleaned up by their handler threads; failures here are ignored.
fn broadcast_line(clients: &ClientMap, line: &str) {
    let clients = clients.lock().expect("client map lock poisoned");
    for sender in clients.values() {
        let _ = sender.send(line.to_string());
    }
}
