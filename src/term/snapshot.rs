//! Restart-safe screen snapshots.
//!
//! A [`ScreenSnapshot`] captures the visible text and scrollback of a
//! screen as plain strings — attributes are deliberately discarded so
//! the format stays small and stable across versions. Snapshots are
//! serialized as camelCase JSON, the casing used for all on-disk state.

use serde::{Deserialize, Serialize};

/// Immutable plain-text export of a screen, used for restart
/// persistence and the `SESSION_SNAPSHOT` IPC request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenSnapshot {
    pub cols: u16,
    pub rows: u16,
    pub cursor_row: u16,
    pub cursor_col: u16,
    /// History lines, oldest first.
    pub scrollback_lines: Vec<String>,
    /// Visible rows, top to bottom.
    pub screen_lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Screen;

    #[test]
    fn test_snapshot_round_trips_visible_text() {
        // Invariant 4: restore(snapshot(S)) reproduces S's visible text.
        let mut screen = Screen::new(10, 3, 100);
        for ch in "hello".chars() {
            screen.write_char(ch);
        }
        screen.carriage_return();
        screen.line_feed();
        for ch in "world".chars() {
            screen.write_char(ch);
        }

        let snap = screen.snapshot(100);
        let mut fresh = Screen::new(10, 3, 100);
        fresh.restore(&snap);

        assert_eq!(fresh.row_text(0), "hello");
        assert_eq!(fresh.row_text(1), "world");
        assert_eq!(fresh.cursor(), screen.cursor());
    }

    #[test]
    fn test_snapshot_carries_scrollback_tail() {
        let mut screen = Screen::new(5, 2, 100);
        for line in ["a", "b", "c", "d", "e"] {
            for ch in line.chars() {
                screen.write_char(ch);
            }
            screen.carriage_return();
            screen.line_feed();
        }
        // 4 lines spilled; cap the export at 2.
        let snap = screen.snapshot(2);
        assert_eq!(snap.scrollback_lines, vec!["c", "d"]);
    }

    #[test]
    fn test_restore_clamps_oversized_snapshot() {
        let snap = ScreenSnapshot {
            cols: 100,
            rows: 50,
            cursor_row: 49,
            cursor_col: 99,
            scrollback_lines: vec!["history".into()],
            screen_lines: (0..50).map(|i| format!("line{i}")).collect(),
        };
        let mut screen = Screen::new(4, 2, 100);
        screen.restore(&snap);
        let (row, col) = screen.cursor();
        assert!(row < 2 && col < 4);
        assert_eq!(screen.row_text(0), "line");
        assert_eq!(screen.scrollback().len(), 1);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let snap = ScreenSnapshot {
            cols: 2,
            rows: 1,
            cursor_row: 0,
            cursor_col: 1,
            scrollback_lines: vec![],
            screen_lines: vec!["ok".into()],
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"cursorRow\""));
        assert!(json.contains("\"scrollbackLines\""));
        let back: ScreenSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
