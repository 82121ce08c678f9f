//! Pseudo-console sessions.
//!
//! A [`Session`] owns one pseudo-console and the child shell running in
//! it, plus the [`Emulator`] that models the child's screen. A dedicated
//! read thread pulls output from the pseudo-console, feeds the emulator
//! under the session lock, and publishes [`SessionEvent`]s; a second
//! thread waits on the child and reports its exit.
//!
//! ```text
//! Session
//! ├── master: MasterPty          (resize)
//! ├── writer: Write              (keystrokes in)
//! ├── emulator: Mutex<Emulator>  (screen + parser; THE session lock)
//! ├── reader thread              (4096-byte loop → emulator → events)
//! └── waiter thread              (child.wait() → Exited event)
//! ```
//!
//! The session stays valid across client reconnects — clients hold only
//! the `pane_id`; the manager owns the session itself.

pub mod manager;
pub mod shell;

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};

use crate::constants::PTY_READ_CHUNK;
use crate::term::osc::MarkerKind;
use crate::term::{Emulator, ScreenSnapshot, SideEvent};

/// Events a session publishes to the manager's shared channel, already
/// tagged with the originating pane.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Raw VT bytes from the child, in production order.
    Output { pane_id: String, data: Vec<u8> },
    /// The child exited; the session is now terminal.
    Exited {
        pane_id: String,
        exit_code: Option<i32>,
    },
    /// OSC 0/2 title change.
    TitleChanged { pane_id: String, title: String },
    /// OSC 7 working-directory change (also emitted once at start).
    WorkingDirectoryChanged { pane_id: String, path: String },
    /// BEL.
    Bell { pane_id: String },
    /// OSC 133 shell-integration marker, with the directory the pane
    /// was in when it fired.
    PromptMarker {
        pane_id: String,
        kind: MarkerKind,
        payload: Option<String>,
        working_directory: Option<String>,
    },
    /// OSC 9/99/777 desktop notification.
    Notification {
        pane_id: String,
        title: Option<String>,
        subtitle: Option<String>,
        body: Option<String>,
    },
}

/// One pseudo-console plus its child process and screen model.
pub struct Session {
    pane_id: String,
    emulator: Arc<Mutex<Emulator>>,
    master: Mutex<Box<dyn portable_pty::MasterPty + Send>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    alive: Arc<AtomicBool>,
    child_pid: Option<u32>,
    initial_cwd: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pane_id", &self.pane_id)
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .field("child_pid", &self.child_pid)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create the pseudo-console, spawn the shell, and start the read
    /// and wait threads.
    ///
    /// `command`, when given, replaces the default shell; it is split on
    /// whitespace into program and arguments. The effective working
    /// directory is announced immediately as a
    /// [`SessionEvent::WorkingDirectoryChanged`].
    pub fn spawn(
        pane_id: &str,
        cols: u16,
        rows: u16,
        working_directory: Option<&str>,
        command: Option<&str>,
        scrollback_lines: usize,
        events: Sender<SessionEvent>,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("open pseudo-console")?;

        let mut cmd = match command.filter(|c| !c.trim().is_empty()) {
            Some(line) => {
                let mut parts = line.split_whitespace();
                let program = parts.next().unwrap_or_default();
                let mut builder = CommandBuilder::new(program);
                builder.args(parts);
                builder
            }
            None => CommandBuilder::new(shell::default_shell()),
        };
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        if let Some(dir) = working_directory {
            cmd.cwd(dir);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .context("spawn shell in pseudo-console")?;
        // Drop the slave side so the reader sees EOF when the child exits.
        drop(pair.slave);

        let child_pid = child.process_id();
        let killer = child.clone_killer();
        let writer = pair.master.take_writer().context("take PTY writer")?;
        let reader = pair.master.try_clone_reader().context("clone PTY reader")?;

        let initial_cwd = working_directory.map(str::to_string).or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        });

        let emulator = Arc::new(Mutex::new(Emulator::new(
            cols as usize,
            rows as usize,
            scrollback_lines,
        )));
        let writer = Arc::new(Mutex::new(writer));
        let alive = Arc::new(AtomicBool::new(true));

        if let Some(ref cwd) = initial_cwd {
            let _ = events.send(SessionEvent::WorkingDirectoryChanged {
                pane_id: pane_id.to_string(),
                path: cwd.clone(),
            });
        }

        // Reader thread: blocking read loop for the session's lifetime.
        {
            let pane_id = pane_id.to_string();
            let emulator = Arc::clone(&emulator);
            let writer = Arc::clone(&writer);
            let events = events.clone();
            let initial_cwd = initial_cwd.clone();
            thread::Builder::new()
                .name(format!("pty-read-{pane_id}"))
                .spawn(move || {
                    read_loop(&pane_id, reader, &emulator, &writer, &events, initial_cwd);
                })
                .context("spawn PTY reader thread")?;
        }

        // Waiter thread: reports the child's exit exactly once.
        {
            let pane_id = pane_id.to_string();
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name(format!("pty-wait-{pane_id}"))
                .spawn(move || {
                    let exit_code = child.wait().ok().map(|status| status.exit_code() as i32);
                    alive.store(false, Ordering::SeqCst);
                    log::info!("[session {pane_id}] child exited with {exit_code:?}");
                    let _ = events.send(SessionEvent::Exited { pane_id, exit_code });
                })
                .context("spawn child wait thread")?;
        }

        Ok(Self {
            pane_id: pane_id.to_string(),
            emulator,
            master: Mutex::new(pair.master),
            writer,
            killer: Mutex::new(killer),
            alive,
            child_pid,
            initial_cwd,
        })
    }

    pub fn pane_id(&self) -> &str {
        &self.pane_id
    }

    /// OS process id of the child, when the platform exposes one.
    pub fn child_pid(&self) -> Option<u32> {
        self.child_pid
    }

    /// True until the child exits.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Write raw bytes (keystrokes) to the child's input.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().expect("writer lock poisoned");
        writer.write_all(data).context("write to pseudo-console")?;
        writer.flush().context("flush pseudo-console input")?;
        Ok(())
    }

    /// UTF-8 encode and write text.
    pub fn write_str(&self, text: &str) -> Result<()> {
        self.write(text.as_bytes())
    }

    /// Resize the screen model and then the pseudo-console, atomically
    /// with respect to output processing.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let mut emulator = self.emulator.lock().expect("session lock poisoned");
        emulator.resize(cols as usize, rows as usize);
        self.master
            .lock()
            .expect("master lock poisoned")
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("resize pseudo-console")
    }

    /// Screen dimensions as (cols, rows).
    pub fn size(&self) -> (u16, u16) {
        let emulator = self.emulator.lock().expect("session lock poisoned");
        let screen = emulator.screen();
        (screen.cols() as u16, screen.rows() as u16)
    }

    /// Current title (empty until the child sets one).
    pub fn title(&self) -> String {
        self.emulator
            .lock()
            .expect("session lock poisoned")
            .title()
            .to_string()
    }

    /// Effective working directory: the latest OSC 7 hint, else the
    /// directory the session started in.
    pub fn working_directory(&self) -> Option<String> {
        let emulator = self.emulator.lock().expect("session lock poisoned");
        emulator
            .working_directory()
            .map(str::to_string)
            .or_else(|| self.initial_cwd.clone())
    }

    /// Plain-text export of the screen and scrollback.
    pub fn plain_text(&self, max_scrollback: usize) -> String {
        self.emulator
            .lock()
            .expect("session lock poisoned")
            .plain_text(max_scrollback)
    }

    /// Restart-safe snapshot of the screen.
    pub fn snapshot(&self, max_scrollback: usize) -> ScreenSnapshot {
        self.emulator
            .lock()
            .expect("session lock poisoned")
            .snapshot(max_scrollback)
    }

    /// Rehydrate the screen from a snapshot.
    pub fn restore_snapshot(&self, snapshot: &ScreenSnapshot) {
        self.emulator
            .lock()
            .expect("session lock poisoned")
            .restore_snapshot(snapshot);
    }

    /// Kill the child process. The read thread unblocks via EOF and the
    /// waiter reports the exit.
    pub fn kill(&self) {
        log::info!("[session {}] killing child", self.pane_id);
        let mut killer = self.killer.lock().expect("killer lock poisoned");
        if let Err(e) = killer.kill() {
            log::warn!("[session {}] kill failed: {e}", self.pane_id);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_alive() {
            self.kill();
        }
    }
}

/// Blocking read loop, one per session.
///
/// Feeds bytes into the emulator under the session lock, writes DSR/DA
/// replies back to the child, then forwards the raw bytes and drained
/// side events through the manager channel. The `Output` event carries
/// exactly the bytes read, in order — clients replay them into their own
/// renderers.
fn read_loop(
    pane_id: &str,
    mut reader: Box<dyn Read + Send>,
    emulator: &Mutex<Emulator>,
    writer: &Mutex<Box<dyn Write + Send>>,
    events: &Sender<SessionEvent>,
    initial_cwd: Option<String>,
) {
    let mut buf = [0u8; PTY_READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let data = &buf[..n];
                let (side_events, cwd) = {
                    let mut emu = emulator.lock().expect("session lock poisoned");
                    emu.process(data);
                    let responses = emu.take_responses();
                    if !responses.is_empty() {
                        let mut w = writer.lock().expect("writer lock poisoned");
                        let _ = w.write_all(&responses);
                        let _ = w.flush();
                    }
                    let cwd = emu
                        .working_directory()
                        .map(str::to_string)
                        .or_else(|| initial_cwd.clone());
                    (emu.take_events(), cwd)
                };

                let _ = events.send(SessionEvent::Output {
                    pane_id: pane_id.to_string(),
                    data: data.to_vec(),
                });

                for event in side_events {
                    let event = match event {
                        SideEvent::Bell => SessionEvent::Bell {
                            pane_id: pane_id.to_string(),
                        },
                        SideEvent::Title(title) => SessionEvent::TitleChanged {
                            pane_id: pane_id.to_string(),
                            title,
                        },
                        SideEvent::WorkingDirectory(path) => {
                            SessionEvent::WorkingDirectoryChanged {
                                pane_id: pane_id.to_string(),
                                path,
                            }
                        }
                        SideEvent::PromptMarker { kind, payload } => {
                            SessionEvent::PromptMarker {
                                pane_id: pane_id.to_string(),
                                kind,
                                payload,
                                working_directory: cwd.clone(),
                            }
                        }
                        SideEvent::Notification {
                            title,
                            subtitle,
                            body,
                        } => SessionEvent::Notification {
                            pane_id: pane_id.to_string(),
                            title,
                            subtitle,
                            body,
                        },
                    };
                    let _ = events.send(event);
                }
            }
        }
    }
    log::debug!("[session {pane_id}] read loop ended");
}
