//! Transcript store: dated plain-text captures of pane screens.
//!
//! On request, a pane's plain-text export is written under
//! `{data}/logs/terminal/YYYY-MM-DD/` as
//! `HHmmss_{reason}_{ws8}_{sf8}_{pn8}.log`, prefixed with a
//! machine-readable `#` header. Bodies are scrubbed with the transcript
//! rule set before touching disk. Retention mirrors the command log:
//! dated directories older than the cutoff are removed, along with any
//! directories the sweep leaves empty.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};

use super::normalize_retention_days;
use super::sanitize::sanitize_transcript;

/// Writes and retires transcript files.
#[derive(Debug)]
pub struct TranscriptStore {
    root: PathBuf,
    retention_days: i64,
}

impl TranscriptStore {
    /// `data_dir` is the application data directory; transcripts live
    /// under its `logs/terminal` subtree.
    pub fn new(data_dir: impl AsRef<Path>, retention_days: i64) -> Self {
        Self {
            root: data_dir.as_ref().join("logs").join("terminal"),
            retention_days: normalize_retention_days(retention_days),
        }
    }

    /// Directory transcripts are written under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one transcript. Returns the path of the created file.
    pub fn save(
        &self,
        pane_id: &str,
        surface_id: Option<&str>,
        workspace_id: Option<&str>,
        reason: &str,
        working_directory: Option<&str>,
        body: &str,
    ) -> Result<PathBuf> {
        let now = Local::now();
        let day_dir = self.root.join(now.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&day_dir)
            .with_context(|| format!("create transcript dir {}", day_dir.display()))?;

        let file_name = format!(
            "{}_{}_{}_{}_{}.log",
            now.format("%H%M%S"),
            slug(reason),
            id_prefix(workspace_id),
            id_prefix(surface_id),
            id_prefix(Some(pane_id)),
        );
        let path = day_dir.join(file_name);

        let mut content = String::new();
        content.push_str(&format!("# capturedAt: {}\n", now.to_rfc3339()));
        content.push_str(&format!(
            "# workspace: {}\n",
            workspace_id.unwrap_or("unknown")
        ));
        content.push_str(&format!("# surface: {}\n", surface_id.unwrap_or("unknown")));
        content.push_str(&format!("# pane: {pane_id}\n"));
        content.push_str(&format!("# reason: {}\n", slug(reason)));
        content.push_str(&format!(
            "# workingDirectory: {}\n",
            working_directory.unwrap_or("unknown")
        ));
        content.push('\n');
        content.push_str(&sanitize_transcript(body));

        fs::write(&path, content)
            .with_context(|| format!("write transcript {}", path.display()))?;
        Ok(path)
    }

    /// Remove dated directories older than the retention cutoff, plus
    /// any directories left empty. Failures are logged and skipped.
    pub fn sweep_retention(&self) {
        if self.retention_days == 0 {
            return;
        }
        let cutoff = Local::now().date_naive() - Duration::days(self.retention_days - 1);
        let Ok(dir) = fs::read_dir(&self.root) else {
            return;
        };
        for dent in dir.flatten() {
            let name = dent.file_name();
            let Some(date) =
                NaiveDate::parse_from_str(&name.to_string_lossy(), "%Y-%m-%d").ok()
            else {
                continue;
            };
            let path = dent.path();
            if date < cutoff {
                if let Err(e) = fs::remove_dir_all(&path) {
                    log::warn!("[transcript] cannot delete {}: {e}", path.display());
                }
            } else if is_empty_dir(&path) {
                let _ = fs::remove_dir(&path);
            }
        }
    }
}

/// First 8 characters of an id, or `unknown` when absent.
fn id_prefix(id: Option<&str>) -> String {
    match id.filter(|s| !s.is_empty()) {
        Some(id) => id.chars().take(8).collect(),
        None => "unknown".to_string(),
    }
}

/// Restrict a reason string to filename-safe characters.
fn slug(reason: &str) -> String {
    let cleaned: String = reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "manual".to_string()
    } else {
        cleaned
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut d| d.next().is_none())
        .unwrap_or(false)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
