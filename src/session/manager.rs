//! Session manager: the pane registry.
//!
//! Maps `pane_id → Session` behind a single lock held only around map
//! lookup/insert/remove (session creation included, so concurrent
//! creates for the same pane cannot race). Session operations themselves
//! run on a cloned `Arc` after the lock is released.
//!
//! All session events arrive tagged with their pane id on one shared
//! channel whose receiver the daemon drains for broadcast.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{Session, SessionEvent};
use crate::constants::DEFAULT_SCROLLBACK_LINES;
use crate::term::ScreenSnapshot;

/// Pane summary returned by `SESSION_CREATE` and `SESSION_LIST`.
/// PascalCase on the wire, like every IPC payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionInfo {
    pub pane_id: String,
    pub cols: u16,
    pub rows: u16,
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_running: bool,
    /// True when `SESSION_CREATE` matched a live pane instead of
    /// spawning a new shell — the reattach path.
    pub is_existing: bool,
}

/// Owner of every live [`Session`].
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    events_tx: Sender<SessionEvent>,
    scrollback_lines: usize,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.sessions.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("SessionManager")
            .field("sessions", &count)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager and the receiving end of its event channel.
    #[must_use]
    pub fn new(scrollback_lines: usize) -> (Self, Receiver<SessionEvent>) {
        let (events_tx, events_rx) = channel();
        (
            Self {
                sessions: Mutex::new(HashMap::new()),
                events_tx,
                scrollback_lines,
            },
            events_rx,
        )
    }

    /// Manager with the default scrollback depth.
    #[must_use]
    pub fn with_default_scrollback() -> (Self, Receiver<SessionEvent>) {
        Self::new(DEFAULT_SCROLLBACK_LINES)
    }

    /// Create a session for `pane_id`, or re-attach to a live one.
    ///
    /// Idempotent: if the pane already has a running session, its info
    /// is returned with `is_existing: true` and no new shell spawns. A
    /// dead session under the same id is replaced.
    pub fn create_session(
        &self,
        pane_id: &str,
        cols: u16,
        rows: u16,
        working_directory: Option<&str>,
        command: Option<&str>,
    ) -> Result<SessionInfo> {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");

        if let Some(existing) = sessions.get(pane_id) {
            if existing.is_alive() {
                log::info!("[manager] re-attach to live pane {pane_id}");
                return Ok(Self::info_for(existing, true));
            }
            log::info!("[manager] replacing dead pane {pane_id}");
            sessions.remove(pane_id);
        }

        let session = Arc::new(Session::spawn(
            pane_id,
            cols,
            rows,
            working_directory,
            command,
            self.scrollback_lines,
            self.events_tx.clone(),
        )?);
        let info = Self::info_for(&session, false);
        sessions.insert(pane_id.to_string(), session);
        log::info!("[manager] created pane {pane_id} ({cols}x{rows})");
        Ok(info)
    }

    /// Write input bytes to a pane.
    pub fn write_to_session(&self, pane_id: &str, data: &[u8]) -> Result<()> {
        self.get(pane_id)?.write(data)
    }

    /// Resize a pane's screen and pseudo-console.
    pub fn resize_session(&self, pane_id: &str, cols: u16, rows: u16) -> Result<()> {
        self.get(pane_id)?.resize(cols, rows)
    }

    /// Kill a pane's child and forget the session.
    pub fn close_session(&self, pane_id: &str) -> Result<()> {
        let session = {
            let mut sessions = self.sessions.lock().expect("session map lock poisoned");
            sessions
                .remove(pane_id)
                .ok_or_else(|| anyhow!("no session for pane {pane_id}"))?
        };
        session.kill();
        Ok(())
    }

    /// Summaries of every registered pane.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().expect("session map lock poisoned");
        let mut infos: Vec<SessionInfo> = sessions
            .values()
            .map(|s| Self::info_for(s, true))
            .collect();
        infos.sort_by(|a, b| a.pane_id.cmp(&b.pane_id));
        infos
    }

    /// Plain-text snapshot of a pane's screen and scrollback.
    pub fn snapshot(&self, pane_id: &str) -> Result<String> {
        let session = self.get(pane_id)?;
        Ok(session.plain_text(usize::MAX))
    }

    /// Rehydrate a pane's screen from a restart snapshot.
    pub fn restore_into(&self, pane_id: &str, snapshot: &ScreenSnapshot) -> Result<()> {
        self.get(pane_id)?.restore_snapshot(snapshot);
        Ok(())
    }

    /// Look up a pane, cloning the `Arc` out of the map lock.
    pub fn get(&self, pane_id: &str) -> Result<Arc<Session>> {
        let sessions = self.sessions.lock().expect("session map lock poisoned");
        sessions
            .get(pane_id)
            .cloned()
            .ok_or_else(|| anyhow!("no session for pane {pane_id}"))
    }

    /// Drop sessions whose child has exited. Returns the removed ids.
    pub fn reap_exited(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        let dead: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| !s.is_alive())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dead {
            sessions.remove(id);
        }
        dead
    }

    /// Kill every session. Used at daemon shutdown.
    pub fn close_all(&self) {
        let sessions = {
            let mut map = self.sessions.lock().expect("session map lock poisoned");
            std::mem::take(&mut *map)
        };
        for (pane_id, session) in sessions {
            log::info!("[manager] shutting down pane {pane_id}");
            session.kill();
        }
    }

    fn info_for(session: &Session, is_existing: bool) -> SessionInfo {
        let (cols, rows) = session.size();
        let title = session.title();
        SessionInfo {
            pane_id: session.pane_id().to_string(),
            cols,
            rows,
            working_directory: session.working_directory(),
            title: if title.is_empty() { None } else { Some(title) },
            is_running: session.is_alive(),
            is_existing,
        }
    }
}
