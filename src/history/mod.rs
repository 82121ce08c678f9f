//! Command history: the OSC 133-driven command log.
//!
//! Shells with prompt integration bracket every command with OSC 133
//! markers (`A` prompt, `B` command text, `C` output, `D` exit code).
//! The log turns those markers into [`CommandLogEntry`] records: at most
//! one *active* (uncompleted) entry per pane, completed entries appended
//! to a daily `YYYY-MM-DD.jsonl` file and kept in a bounded in-memory
//! list. For shells without integration the UI calls
//! [`CommandLog::record_manual_submission`] instead.
//!
//! Commands are scrubbed by [`sanitize`] on ingest and again when files
//! are loaded, so widening the rule set retroactively quarantines old
//! records. Persistence is best effort: disk failures are logged and the
//! terminal path never sees them.

pub mod sanitize;
pub mod transcript;

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    COMMAND_LOG_MEMORY_CAP, RETENTION_FALLBACK_DAYS, RETENTION_MAX_DAYS,
};
use crate::term::osc::MarkerKind;

/// One executed (or executing) command.
///
/// camelCase on disk, one JSON object per line in the daily file. An
/// entry is *active* while `completed_at` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLogEntry {
    pub id: Uuid,
    pub pane_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    pub command: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

/// Normalise a configured retention value.
///
/// 0 keeps everything forever; negative values fall back to
/// [`RETENTION_FALLBACK_DAYS`]; positive values clamp to
/// `1..=`[`RETENTION_MAX_DAYS`].
#[must_use]
pub fn normalize_retention_days(days: i64) -> i64 {
    if days == 0 {
        0
    } else if days < 0 {
        RETENTION_FALLBACK_DAYS
    } else {
        days.min(RETENTION_MAX_DAYS)
    }
}

/// UI-side identity of a pane (workspace / surface), attached to
/// entries so the palette can group history by split.
#[derive(Debug, Clone, Default)]
struct PaneContext {
    surface_id: Option<String>,
    workspace_id: Option<String>,
}

#[derive(Debug, Default)]
struct LogState {
    /// Completed entries, oldest first, capped at
    /// [`COMMAND_LOG_MEMORY_CAP`].
    entries: VecDeque<CommandLogEntry>,
    /// The single active entry per pane, if any.
    active: HashMap<String, CommandLogEntry>,
    contexts: HashMap<String, PaneContext>,
    /// Date of the last retention sweep.
    last_sweep: Option<NaiveDate>,
}

/// The command log service.
#[derive(Debug)]
pub struct CommandLog {
    log_dir: PathBuf,
    retention_days: i64,
    state: Mutex<LogState>,
}

impl CommandLog {
    /// Open (and create) the log directory, loading today's file into
    /// memory with sanitisation re-applied.
    pub fn new(log_dir: impl Into<PathBuf>, retention_days: i64) -> Self {
        let log_dir = log_dir.into();
        if let Err(e) = fs::create_dir_all(&log_dir) {
            log::warn!("[cmdlog] cannot create {}: {e}", log_dir.display());
        }
        let log = Self {
            log_dir,
            retention_days: normalize_retention_days(retention_days),
            state: Mutex::new(LogState::default()),
        };
        log.load_today();
        log
    }

    /// Attach workspace/surface identity to a pane for future entries.
    pub fn set_pane_context(
        &self,
        pane_id: &str,
        surface_id: Option<String>,
        workspace_id: Option<String>,
    ) {
        let mut state = self.state.lock().expect("command log lock poisoned");
        state.contexts.insert(
            pane_id.to_string(),
            PaneContext {
                surface_id,
                workspace_id,
            },
        );
    }

    /// Feed one OSC 133 marker for a pane.
    pub fn handle_marker(
        &self,
        pane_id: &str,
        kind: MarkerKind,
        payload: Option<&str>,
        working_directory: Option<&str>,
    ) {
        let mut state = self.state.lock().expect("command log lock poisoned");
        match kind {
            MarkerKind::PromptStart => {
                self.complete_active(&mut state, pane_id, None);
            }
            MarkerKind::CommandStart => {
                self.complete_active(&mut state, pane_id, None);
                let command = sanitize::sanitize_command(payload.unwrap_or(""));
                if command.trim().is_empty() {
                    return;
                }
                let context = state.contexts.get(pane_id).cloned().unwrap_or_default();
                state.active.insert(
                    pane_id.to_string(),
                    CommandLogEntry {
                        id: Uuid::new_v4(),
                        pane_id: pane_id.to_string(),
                        surface_id: context.surface_id,
                        workspace_id: context.workspace_id,
                        command,
                        started_at: Utc::now(),
                        completed_at: None,
                        exit_code: None,
                        working_directory: working_directory.map(str::to_string),
                    },
                );
            }
            MarkerKind::OutputStart => {} // informational only
            MarkerKind::CommandFinished => {
                let exit_code = payload.and_then(parse_exit_code);
                self.complete_active(&mut state, pane_id, exit_code);
            }
        }
        self.maybe_sweep(&mut state);
    }

    /// Record a command the UI submitted directly (shells without
    /// OSC 133). Bare-secret-looking submissions are dropped.
    pub fn record_manual_submission(
        &self,
        pane_id: &str,
        command: &str,
        working_directory: Option<&str>,
    ) {
        let Some(command) = sanitize::sanitize_manual(command) else {
            return;
        };
        let mut state = self.state.lock().expect("command log lock poisoned");
        self.complete_active(&mut state, pane_id, None);
        let context = state.contexts.get(pane_id).cloned().unwrap_or_default();
        state.active.insert(
            pane_id.to_string(),
            CommandLogEntry {
                id: Uuid::new_v4(),
                pane_id: pane_id.to_string(),
                surface_id: context.surface_id,
                workspace_id: context.workspace_id,
                command,
                started_at: Utc::now(),
                completed_at: None,
                exit_code: None,
                working_directory: working_directory.map(str::to_string),
            },
        );
        self.maybe_sweep(&mut state);
    }

    /// Completed entries currently held in memory, oldest first.
    pub fn entries(&self) -> Vec<CommandLogEntry> {
        let state = self.state.lock().expect("command log lock poisoned");
        state.entries.iter().cloned().collect()
    }

    /// The active (running) command for a pane, if any.
    pub fn active_entry(&self, pane_id: &str) -> Option<CommandLogEntry> {
        let state = self.state.lock().expect("command log lock poisoned");
        state.active.get(pane_id).cloned()
    }

    /// Number of panes with an active command.
    pub fn active_count(&self) -> usize {
        let state = self.state.lock().expect("command log lock poisoned");
        state.active.len()
    }

    /// Path of the daily file for `date`.
    #[must_use]
    pub fn daily_file(&self, date: NaiveDate) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Delete files and in-memory entries older than the retention
    /// window. A no-op when retention is 0 (keep forever).
    pub fn sweep_retention(&self) {
        let mut state = self.state.lock().expect("command log lock poisoned");
        self.sweep_locked(&mut state);
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn complete_active(
        &self,
        state: &mut LogState,
        pane_id: &str,
        exit_code: Option<i32>,
    ) {
        let Some(mut entry) = state.active.remove(pane_id) else {
            return;
        };
        entry.completed_at = Some(Utc::now());
        entry.exit_code = exit_code;
        self.persist(&entry);
        state.entries.push_back(entry);
        while state.entries.len() > COMMAND_LOG_MEMORY_CAP {
            state.entries.pop_front();
        }
    }

    /// Append one completed entry to today's file. Best effort.
    fn persist(&self, entry: &CommandLogEntry) {
        let path = self.daily_file(Local::now().date_naive());
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("[cmdlog] serialize failed: {e}");
                return;
            }
        };
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            log::warn!("[cmdlog] append to {} failed: {e}", path.display());
        }
    }

    /// Load today's daily file, re-sanitising every command.
    fn load_today(&self) {
        let path = self.daily_file(Local::now().date_naive());
        let Ok(content) = fs::read_to_string(&path) else {
            return;
        };
        let mut state = self.state.lock().expect("command log lock poisoned");
        for line in content.lines() {
            let Ok(mut entry) = serde_json::from_str::<CommandLogEntry>(line) else {
                log::debug!("[cmdlog] skipping malformed line in {}", path.display());
                continue;
            };
            entry.command = sanitize::sanitize_command(&entry.command);
            state.entries.push_back(entry);
            while state.entries.len() > COMMAND_LOG_MEMORY_CAP {
                state.entries.pop_front();
            }
        }
    }

    /// Run the retention sweep at most once per day.
    fn maybe_sweep(&self, state: &mut LogState) {
        let today = Local::now().date_naive();
        if state.last_sweep == Some(today) {
            return;
        }
        state.last_sweep = Some(today);
        self.sweep_locked(state);
    }

    fn sweep_locked(&self, state: &mut LogState) {
        if self.retention_days == 0 {
            return;
        }
        let cutoff = Local::now().date_naive() - Duration::days(self.retention_days - 1);

        let Ok(dir) = fs::read_dir(&self.log_dir) else {
            return;
        };
        for dent in dir.flatten() {
            let name = dent.file_name();
            let Some(date) = parse_daily_file_name(&name.to_string_lossy()) else {
                continue;
            };
            if date < cutoff {
                if let Err(e) = fs::remove_file(dent.path()) {
                    log::warn!("[cmdlog] cannot delete {:?}: {e}", dent.path());
                }
            }
        }

        let cutoff_utc = Utc::now() - Duration::days(self.retention_days - 1);
        state
            .entries
            .retain(|entry| entry.started_at >= cutoff_utc);
    }
}

/// Parse `YYYY-MM-DD.jsonl` into its date.
fn parse_daily_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(".jsonl")?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

/// OSC 133;D payload: a bare integer, or the part after the last `;`.
fn parse_exit_code(payload: &str) -> Option<i32> {
    let tail = payload.rsplit(';').next().unwrap_or(payload);
    tail.trim().parse().ok()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(retention: i64) -> (CommandLog, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let log = CommandLog::new(dir.path(), retention);
        (log, dir)
    }

    // ── Marker lifecycle ──────────────────────────────────────────────────

    #[test]
    fn test_marker_round_trip_records_command() {
        // Spec scenario S5: A, B;git status, D;0 → one persisted entry.
        let (log, dir) = temp_log(0);
        log.handle_marker("p1", MarkerKind::PromptStart, None, None);
        log.handle_marker("p1", MarkerKind::CommandStart, Some("git status"), Some("/src"));
        log.handle_marker("p1", MarkerKind::CommandFinished, Some("0"), None);

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "git status");
        assert_eq!(entries[0].exit_code, Some(0));
        assert_eq!(entries[0].working_directory.as_deref(), Some("/src"));
        assert!(entries[0].completed_at.is_some());

        // Persisted to today's daily file as one camelCase JSON line.
        let path = log.daily_file(Local::now().date_naive());
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("\"paneId\":\"p1\""));
        assert!(content.contains("\"command\":\"git status\""));
        drop(dir);
    }

    #[test]
    fn test_at_most_one_active_per_pane() {
        // Invariant 7.
        let (log, _dir) = temp_log(0);
        log.handle_marker("p1", MarkerKind::CommandStart, Some("first"), None);
        assert_eq!(log.active_count(), 1);
        // A second B completes the first and replaces it.
        log.handle_marker("p1", MarkerKind::CommandStart, Some("second"), None);
        assert_eq!(log.active_count(), 1);
        assert_eq!(log.active_entry("p1").unwrap().command, "second");
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "first");
        assert_eq!(entries[0].exit_code, None);
    }

    #[test]
    fn test_prompt_start_completes_without_exit_code() {
        let (log, _dir) = temp_log(0);
        log.handle_marker("p1", MarkerKind::CommandStart, Some("sleep 1"), None);
        log.handle_marker("p1", MarkerKind::PromptStart, None, None);
        assert_eq!(log.active_count(), 0);
        assert_eq!(log.entries()[0].exit_code, None);
    }

    #[test]
    fn test_output_marker_is_informational() {
        let (log, _dir) = temp_log(0);
        log.handle_marker("p1", MarkerKind::CommandStart, Some("make"), None);
        log.handle_marker("p1", MarkerKind::OutputStart, None, None);
        assert_eq!(log.active_count(), 1);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_empty_command_start_ignored() {
        let (log, _dir) = temp_log(0);
        log.handle_marker("p1", MarkerKind::CommandStart, Some("   "), None);
        assert_eq!(log.active_count(), 0);
    }

    #[test]
    fn test_finish_without_active_is_noop() {
        let (log, _dir) = temp_log(0);
        log.handle_marker("p1", MarkerKind::CommandFinished, Some("1"), None);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_panes_are_independent() {
        let (log, _dir) = temp_log(0);
        log.handle_marker("p1", MarkerKind::CommandStart, Some("one"), None);
        log.handle_marker("p2", MarkerKind::CommandStart, Some("two"), None);
        assert_eq!(log.active_count(), 2);
        log.handle_marker("p1", MarkerKind::CommandFinished, Some("0"), None);
        assert_eq!(log.active_count(), 1);
        assert_eq!(log.active_entry("p2").unwrap().command, "two");
    }

    // ── Exit code parsing ─────────────────────────────────────────────────

    #[test]
    fn test_exit_code_forms() {
        assert_eq!(parse_exit_code("0"), Some(0));
        assert_eq!(parse_exit_code("127"), Some(127));
        assert_eq!(parse_exit_code("-1"), Some(-1));
        assert_eq!(parse_exit_code("err=1;130"), Some(130));
        assert_eq!(parse_exit_code("abc"), None);
        assert_eq!(parse_exit_code(""), None);
    }

    // ── Sanitisation on ingest ────────────────────────────────────────────

    #[test]
    fn test_commands_scrubbed_before_storage() {
        let (log, _dir) = temp_log(0);
        log.handle_marker(
            "p1",
            MarkerKind::CommandStart,
            Some("mysql --password=hunter2"),
            None,
        );
        log.handle_marker("p1", MarkerKind::CommandFinished, Some("0"), None);
        let entries = log.entries();
        assert!(!entries[0].command.contains("hunter2"));
        assert!(entries[0].command.contains(sanitize::REDACTED));
    }

    #[test]
    fn test_manual_submission_lifecycle() {
        let (log, _dir) = temp_log(0);
        log.record_manual_submission("p1", "git pull", Some("/repo"));
        assert_eq!(log.active_entry("p1").unwrap().command, "git pull");
        // Next submission completes the previous one.
        log.record_manual_submission("p1", "git push", None);
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].command, "git pull");
    }

    #[test]
    fn test_manual_bare_secret_dropped() {
        let (log, _dir) = temp_log(0);
        log.record_manual_submission("p1", "ghp_16C7e42F292c", None);
        assert_eq!(log.active_count(), 0);
        assert!(log.entries().is_empty());
    }

    // ── Context ───────────────────────────────────────────────────────────

    #[test]
    fn test_pane_context_attached_to_entries() {
        let (log, _dir) = temp_log(0);
        log.set_pane_context("p1", Some("sf-1".into()), Some("ws-1".into()));
        log.handle_marker("p1", MarkerKind::CommandStart, Some("ls"), None);
        log.handle_marker("p1", MarkerKind::CommandFinished, Some("0"), None);
        let entry = &log.entries()[0];
        assert_eq!(entry.surface_id.as_deref(), Some("sf-1"));
        assert_eq!(entry.workspace_id.as_deref(), Some("ws-1"));
    }

    // ── Load & quarantine ─────────────────────────────────────────────────

    #[test]
    fn test_load_resanitises_old_files() {
        let dir = tempfile::TempDir::new().unwrap();
        // A file written by an older build with a now-scrubbed secret.
        let today = Local::now().date_naive().format("%Y-%m-%d");
        let entry = serde_json::json!({
            "id": Uuid::new_v4(),
            "paneId": "p1",
            "command": "run --token=oldsecret",
            "startedAt": Utc::now(),
            "completedAt": Utc::now(),
        });
        std::fs::write(
            dir.path().join(format!("{today}.jsonl")),
            format!("{entry}\nnot-json\n"),
        )
        .unwrap();

        let log = CommandLog::new(dir.path(), 0);
        let entries = log.entries();
        assert_eq!(entries.len(), 1); // malformed line skipped
        assert!(!entries[0].command.contains("oldsecret"));
        assert!(entries[0].command.contains(sanitize::REDACTED));
    }

    // ── Memory cap ────────────────────────────────────────────────────────

    #[test]
    fn test_memory_cap_evicts_oldest() {
        let (log, _dir) = temp_log(0);
        for i in 0..COMMAND_LOG_MEMORY_CAP + 5 {
            log.handle_marker("p1", MarkerKind::CommandStart, Some(&format!("cmd {i}")), None);
            log.handle_marker("p1", MarkerKind::CommandFinished, Some("0"), None);
        }
        let entries = log.entries();
        assert_eq!(entries.len(), COMMAND_LOG_MEMORY_CAP);
        assert_eq!(entries[0].command, "cmd 5");
    }

    // ── Retention ─────────────────────────────────────────────────────────

    #[test]
    fn test_retention_normalization() {
        assert_eq!(normalize_retention_days(0), 0);
        assert_eq!(normalize_retention_days(-5), RETENTION_FALLBACK_DAYS);
        assert_eq!(normalize_retention_days(30), 30);
        assert_eq!(normalize_retention_days(100_000), RETENTION_MAX_DAYS);
    }

    #[test]
    fn test_sweep_deletes_old_daily_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = dir.path().join("2001-01-01.jsonl");
        std::fs::write(&old, "{}\n").unwrap();
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&unrelated, "keep me").unwrap();

        let log = CommandLog::new(dir.path(), 7);
        log.sweep_retention();
        assert!(!old.exists(), "old daily file should be swept");
        assert!(unrelated.exists(), "non-log files are untouched");
    }

    #[test]
    fn test_retention_zero_keeps_everything() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = dir.path().join("2001-01-01.jsonl");
        std::fs::write(&old, "{}\n").unwrap();
        let log = CommandLog::new(dir.path(), 0);
        log.sweep_retention();
        assert!(old.exists());
    }

    #[test]
    fn test_daily_file_name_parsing() {
        assert!(parse_daily_file_name("2026-08-01.jsonl").is_some());
        assert!(parse_daily_file_name("2026-08-01.log").is_none());
        assert!(parse_daily_file_name("garbage.jsonl").is_none());
    }
}
