//! Terminal screen buffer.
//!
//! Owns the visible cell grid, cursor, scroll margins, alternate screen,
//! and the scrollback ring. All mutation happens through the typed
//! operations here; the VT parser never touches cells directly.
//!
//! # Invariants
//!
//! - The cursor is clamped to the grid after every mutation, including
//!   resize.
//! - `0 <= scroll_top <= scroll_bottom <= rows - 1` (inclusive margins).
//! - Only the main screen accumulates scrollback; the alternate screen
//!   suppresses it until switch-back restores the saved ring.
//! - With auto-wrap on, the cursor may sit on the last column with
//!   `wrap_pending` set; the next printable wraps first.

use super::cell::{blank_line, line_text, Attribute, Cell, Line};
use super::ring::ScrollbackRing;
use super::snapshot::ScreenSnapshot;

/// Terminal mode flags toggled by SM/RM and DECSET/DECRST.
#[derive(Debug, Clone, Copy)]
pub struct Modes {
    /// DECAWM — wrap at the right margin instead of overwriting.
    pub auto_wrap: bool,
    /// DECOM — cursor addressing relative to the scroll region.
    pub origin_mode: bool,
    /// IRM — printed characters shift the rest of the row right.
    pub insert_mode: bool,
    /// DECTCEM — cursor visibility.
    pub cursor_visible: bool,
    /// DECCKM — arrow keys send SS3 sequences.
    pub app_cursor_keys: bool,
    /// Bracketed paste (DECSET 2004).
    pub bracketed_paste: bool,
    /// X10 mouse reporting (DECSET 9).
    pub mouse_x10: bool,
    /// Click tracking (DECSET 1000).
    pub mouse_click: bool,
    /// Cell-motion tracking (DECSET 1002).
    pub mouse_cell_motion: bool,
    /// All-motion tracking (DECSET 1003).
    pub mouse_all_motion: bool,
    /// SGR extended mouse encoding (DECSET 1006).
    pub sgr_mouse: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            auto_wrap: true,
            origin_mode: false,
            insert_mode: false,
            cursor_visible: true,
            app_cursor_keys: false,
            bracketed_paste: false,
            mouse_x10: false,
            mouse_click: false,
            mouse_cell_motion: false,
            mouse_all_motion: false,
            sgr_mouse: false,
        }
    }
}

/// Main-screen state parked while the alternate screen is active.
#[derive(Debug, Clone)]
struct SavedMain {
    grid: Vec<Line>,
    scrollback: ScrollbackRing<Line>,
    cursor_row: usize,
    cursor_col: usize,
    attr: Attribute,
}

/// The screen buffer for one session.
#[derive(Debug)]
pub struct Screen {
    cols: usize,
    rows: usize,
    grid: Vec<Line>,
    cursor_row: usize,
    cursor_col: usize,
    wrap_pending: bool,
    /// Inclusive scroll margins.
    scroll_top: usize,
    scroll_bottom: usize,
    /// Attribute applied to newly written cells.
    attr: Attribute,
    /// DECSC/DECRC storage: (row, col, attribute).
    saved_cursor: Option<(usize, usize, Attribute)>,
    /// Mode flags. Public: the emulator flips these directly.
    pub modes: Modes,
    alt_active: bool,
    saved_main: Option<SavedMain>,
    scrollback: ScrollbackRing<Line>,
    /// Content-changed flag for the renderer; best effort, coalesced.
    changed: bool,
}

impl Screen {
    /// Create a screen of `cols`×`rows` with the given scrollback
    /// capacity in lines.
    #[must_use]
    pub fn new(cols: usize, rows: usize, scrollback_lines: usize) -> Self {
        let grid = (0..rows).map(|_| blank_line(cols)).collect();
        Self {
            cols,
            rows,
            grid,
            cursor_row: 0,
            cursor_col: 0,
            wrap_pending: false,
            scroll_top: 0,
            scroll_bottom: rows.saturating_sub(1),
            attr: Attribute::default(),
            saved_cursor: None,
            modes: Modes::default(),
            alt_active: false,
            saved_main: None,
            scrollback: ScrollbackRing::new(scrollback_lines),
            changed: true,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Cursor position as (row, col).
    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_col)
    }

    pub fn wrap_pending(&self) -> bool {
        self.wrap_pending
    }

    /// Scroll margins as (top, bottom), inclusive.
    pub fn scroll_region(&self) -> (usize, usize) {
        (self.scroll_top, self.scroll_bottom)
    }

    pub fn attr(&self) -> Attribute {
        self.attr
    }

    pub fn set_attr(&mut self, attr: Attribute) {
        self.attr = attr;
    }

    pub fn in_alternate_screen(&self) -> bool {
        self.alt_active
    }

    /// Cell at (row, col), or `None` when out of range.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.grid.get(row).and_then(|line| line.get(col))
    }

    pub fn scrollback(&self) -> &ScrollbackRing<Line> {
        &self.scrollback
    }

    /// Text of a visible row, trailing blanks trimmed.
    pub fn row_text(&self, row: usize) -> String {
        self.grid.get(row).map(|l| line_text(l)).unwrap_or_default()
    }

    /// Return and clear the content-changed flag.
    ///
    /// Best effort: the renderer coalesces; a missed notification only
    /// delays a repaint until the next one.
    pub fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }

    // ── Printing ──────────────────────────────────────────────────────────

    /// Write a printable character at the cursor.
    ///
    /// Honors deferred wrap, insert mode, and the writing attribute.
    pub fn write_char(&mut self, ch: char) {
        if self.cols == 0 || self.rows == 0 {
            return;
        }

        if self.wrap_pending && self.modes.auto_wrap {
            self.carriage_return();
            self.line_feed();
        }
        self.wrap_pending = false;

        let row = self.cursor_row.min(self.rows - 1);
        let col = self.cursor_col.min(self.cols - 1);

        if self.modes.insert_mode && col + 1 < self.cols {
            let line = &mut self.grid[row];
            line.copy_within(col..self.cols - 1, col + 1);
        }

        self.grid[row][col] = Cell {
            ch,
            attr: self.attr,
            width: 1,
            dirty: true,
        };

        if col + 1 < self.cols {
            self.cursor_col = col + 1;
        } else if self.modes.auto_wrap {
            self.cursor_col = col;
            self.wrap_pending = true;
        } else {
            self.cursor_col = col;
        }
        self.changed = true;
    }

    /// Move the cursor to column 0.
    pub fn carriage_return(&mut self) {
        self.cursor_col = 0;
        self.wrap_pending = false;
    }

    /// Move down one row, scrolling when at the bottom margin.
    pub fn line_feed(&mut self) {
        self.wrap_pending = false;
        if self.cursor_row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor_row + 1 < self.rows {
            self.cursor_row += 1;
        }
    }

    /// Move up one row, scrolling down when at the top margin (RI).
    pub fn reverse_line_feed(&mut self) {
        self.wrap_pending = false;
        if self.cursor_row == self.scroll_top {
            self.scroll_down(1);
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
        }
    }

    /// CR followed by LF (NEL).
    pub fn new_line(&mut self) {
        self.carriage_return();
        self.line_feed();
    }

    /// Jump to the next multiple-of-8 column, clamped to the last column.
    pub fn tab(&mut self) {
        if self.cols == 0 {
            return;
        }
        let next = (self.cursor_col / 8 + 1) * 8;
        self.cursor_col = next.min(self.cols - 1);
        self.wrap_pending = false;
    }

    /// Move one column left, stopping at column 0.
    pub fn backspace(&mut self) {
        self.cursor_col = self.cursor_col.saturating_sub(1);
        self.wrap_pending = false;
    }

    // ── Scrolling ─────────────────────────────────────────────────────────

    /// Scroll the region up by `n` lines.
    ///
    /// Lines evicted from the top spill into scrollback only when the
    /// region starts at row 0 on the main screen — a region pinned below
    /// the top is an app-managed viewport, not history.
    pub fn scroll_up(&mut self, n: usize) {
        if self.rows == 0 {
            return;
        }
        let region_len = self.scroll_bottom - self.scroll_top + 1;
        let n = n.min(region_len);
        for _ in 0..n {
            let evicted = self.grid.remove(self.scroll_top);
            if self.scroll_top == 0 && !self.alt_active {
                self.scrollback.push(evicted);
            }
            self.grid.insert(self.scroll_bottom, blank_line(self.cols));
        }
        if n > 0 {
            self.changed = true;
        }
    }

    /// Scroll the region down by `n` lines. Never touches scrollback.
    pub fn scroll_down(&mut self, n: usize) {
        if self.rows == 0 {
            return;
        }
        let region_len = self.scroll_bottom - self.scroll_top + 1;
        let n = n.min(region_len);
        for _ in 0..n {
            self.grid.remove(self.scroll_bottom);
            self.grid.insert(self.scroll_top, blank_line(self.cols));
        }
        if n > 0 {
            self.changed = true;
        }
    }

    // ── Erasing ───────────────────────────────────────────────────────────

    /// ED — erase in display. 0: cursor→end, 1: start→cursor, 2: all,
    /// 3: all plus scrollback.
    pub fn erase_in_display(&mut self, mode: u16) {
        if self.rows == 0 || self.cols == 0 {
            if mode == 3 {
                self.scrollback.clear();
            }
            return;
        }
        self.clamp_cursor();
        match mode {
            0 => {
                self.erase_in_line(0);
                for row in self.cursor_row + 1..self.rows {
                    self.blank_row(row);
                }
            }
            1 => {
                for row in 0..self.cursor_row {
                    self.blank_row(row);
                }
                self.erase_in_line(1);
            }
            2 => {
                for row in 0..self.rows {
                    self.blank_row(row);
                }
            }
            3 => {
                for row in 0..self.rows {
                    self.blank_row(row);
                }
                self.scrollback.clear();
            }
            _ => {}
        }
        self.changed = true;
    }

    /// EL — erase in line. 0: cursor→end, 1: start→cursor, 2: whole row.
    pub fn erase_in_line(&mut self, mode: u16) {
        if self.rows == 0 || self.cols == 0 {
            return;
        }
        self.clamp_cursor();
        let attr = self.attr;
        let row = &mut self.grid[self.cursor_row];
        let range = match mode {
            0 => self.cursor_col..self.cols,
            1 => 0..self.cursor_col + 1,
            2 => 0..self.cols,
            _ => return,
        };
        for cell in &mut row[range] {
            cell.clear(attr);
        }
        self.changed = true;
    }

    /// ECH — blank `n` cells from the cursor without shifting.
    pub fn erase_chars(&mut self, n: usize) {
        if self.rows == 0 || self.cols == 0 {
            return;
        }
        self.clamp_cursor();
        let attr = self.attr;
        let end = (self.cursor_col + n).min(self.cols);
        for cell in &mut self.grid[self.cursor_row][self.cursor_col..end] {
            cell.clear(attr);
        }
        self.changed = true;
    }

    /// ICH — insert `n` blanks at the cursor, shifting the rest right.
    pub fn insert_chars(&mut self, n: usize) {
        if self.rows == 0 || self.cols == 0 {
            return;
        }
        self.clamp_cursor();
        let attr = self.attr;
        let col = self.cursor_col;
        let n = n.min(self.cols - col);
        let line = &mut self.grid[self.cursor_row];
        line.copy_within(col..self.cols - n, col + n);
        for cell in &mut line[col..col + n] {
            cell.clear(attr);
        }
        self.changed = true;
    }

    /// DCH — delete `n` cells at the cursor, shifting the rest left.
    pub fn delete_chars(&mut self, n: usize) {
        if self.rows == 0 || self.cols == 0 {
            return;
        }
        self.clamp_cursor();
        let attr = self.attr;
        let col = self.cursor_col;
        let n = n.min(self.cols - col);
        let line = &mut self.grid[self.cursor_row];
        line.copy_within(col + n..self.cols, col);
        for cell in &mut line[self.cols - n..self.cols] {
            cell.clear(attr);
        }
        self.changed = true;
    }

    /// IL — insert `n` blank lines at the cursor, pushing lines toward
    /// the bottom margin. No-op outside the scroll region.
    pub fn insert_lines(&mut self, n: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.cursor_row + 1);
        for _ in 0..n {
            self.grid.remove(self.scroll_bottom);
            self.grid.insert(self.cursor_row, blank_line(self.cols));
        }
        self.cursor_col = 0;
        self.wrap_pending = false;
        self.changed = true;
    }

    /// DL — delete `n` lines at the cursor, pulling lines up from the
    /// bottom margin. No-op outside the scroll region.
    pub fn delete_lines(&mut self, n: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.cursor_row + 1);
        for _ in 0..n {
            self.grid.remove(self.cursor_row);
            self.grid.insert(self.scroll_bottom, blank_line(self.cols));
        }
        self.cursor_col = 0;
        self.wrap_pending = false;
        self.changed = true;
    }

    // ── Scroll region ─────────────────────────────────────────────────────

    /// DECSTBM — set inclusive scroll margins, clamping to the grid and
    /// swapping if inverted.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        if self.rows == 0 {
            return;
        }
        let max = self.rows - 1;
        let (mut top, mut bottom) = (top.min(max), bottom.min(max));
        if top > bottom {
            std::mem::swap(&mut top, &mut bottom);
        }
        self.scroll_top = top;
        self.scroll_bottom = bottom;
    }

    /// Restore full-screen margins.
    pub fn reset_scroll_region(&mut self) {
        self.scroll_top = 0;
        self.scroll_bottom = self.rows.saturating_sub(1);
    }

    // ── Cursor save / restore ─────────────────────────────────────────────

    /// DECSC — save cursor position and writing attribute.
    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some((self.cursor_row, self.cursor_col, self.attr));
    }

    /// DECRC — restore the saved cursor, clamped to the current grid.
    /// Without a prior save this homes the cursor.
    pub fn restore_cursor(&mut self) {
        let (row, col, attr) = self.saved_cursor.unwrap_or((0, 0, Attribute::default()));
        self.cursor_row = row.min(self.rows.saturating_sub(1));
        self.cursor_col = col.min(self.cols.saturating_sub(1));
        self.attr = attr;
        self.wrap_pending = false;
    }

    // ── Alternate screen ──────────────────────────────────────────────────

    /// Switch to the alternate screen. Idempotent.
    ///
    /// The alternate screen starts blank with full-screen margins,
    /// default attribute, and the cursor at the origin. Scrollback is
    /// parked with the main grid and suppressed until switch-back.
    pub fn enter_alternate_screen(&mut self) {
        if self.alt_active {
            return;
        }
        let blank: Vec<Line> = (0..self.rows).map(|_| blank_line(self.cols)).collect();
        let grid = std::mem::replace(&mut self.grid, blank);
        let empty_ring = ScrollbackRing::new(self.scrollback.capacity());
        let scrollback = std::mem::replace(&mut self.scrollback, empty_ring);
        self.saved_main = Some(SavedMain {
            grid,
            scrollback,
            cursor_row: self.cursor_row,
            cursor_col: self.cursor_col,
            attr: self.attr,
        });
        self.alt_active = true;
        self.cursor_row = 0;
        self.cursor_col = 0;
        self.wrap_pending = false;
        self.attr = Attribute::default();
        self.reset_scroll_region();
        self.changed = true;
    }

    /// Switch back to the main screen. Idempotent.
    ///
    /// Restores the parked grid, scrollback, cursor, and attribute.
    /// Alternate-screen content is discarded; a later re-entry starts
    /// from a blank alternate screen again.
    pub fn leave_alternate_screen(&mut self) {
        if !self.alt_active {
            return;
        }
        if let Some(saved) = self.saved_main.take() {
            self.grid = saved.grid;
            self.scrollback = saved.scrollback;
            self.cursor_row = saved.cursor_row.min(self.rows.saturating_sub(1));
            self.cursor_col = saved.cursor_col.min(self.cols.saturating_sub(1));
            self.attr = saved.attr;
        }
        self.alt_active = false;
        self.wrap_pending = false;
        self.reset_scroll_region();
        self.changed = true;
    }

    // ── Cursor movement ───────────────────────────────────────────────────

    /// Absolute move. Under origin mode the row is relative to the top
    /// margin and clamped inside the region.
    pub fn move_cursor_to(&mut self, row: usize, col: usize) {
        if self.modes.origin_mode {
            self.cursor_row = (self.scroll_top + row).min(self.scroll_bottom);
        } else {
            self.cursor_row = row.min(self.rows.saturating_sub(1));
        }
        self.cursor_col = col.min(self.cols.saturating_sub(1));
        self.wrap_pending = false;
    }

    /// CHA — absolute column, row unchanged.
    pub fn move_to_col(&mut self, col: usize) {
        self.cursor_col = col.min(self.cols.saturating_sub(1));
        self.wrap_pending = false;
    }

    /// VPA — absolute row, column unchanged. Origin-aware like
    /// [`move_cursor_to`](Self::move_cursor_to).
    pub fn move_to_row(&mut self, row: usize) {
        if self.modes.origin_mode {
            self.cursor_row = (self.scroll_top + row).min(self.scroll_bottom);
        } else {
            self.cursor_row = row.min(self.rows.saturating_sub(1));
        }
        self.wrap_pending = false;
    }

    /// CUU — up `n`, stopping at the top margin.
    pub fn move_cursor_up(&mut self, n: usize) {
        self.cursor_row = self.cursor_row.saturating_sub(n).max(
            if self.cursor_row >= self.scroll_top {
                self.scroll_top
            } else {
                0
            },
        );
        self.wrap_pending = false;
    }

    /// CUD — down `n`, stopping at the bottom margin.
    pub fn move_cursor_down(&mut self, n: usize) {
        let limit = if self.cursor_row <= self.scroll_bottom {
            self.scroll_bottom
        } else {
            self.rows.saturating_sub(1)
        };
        self.cursor_row = (self.cursor_row + n).min(limit);
        self.wrap_pending = false;
    }

    /// CUF — right `n`, stopping at the last column.
    pub fn move_cursor_forward(&mut self, n: usize) {
        self.cursor_col = (self.cursor_col + n).min(self.cols.saturating_sub(1));
        self.wrap_pending = false;
    }

    /// CUB — left `n`, stopping at column 0.
    pub fn move_cursor_backward(&mut self, n: usize) {
        self.cursor_col = self.cursor_col.saturating_sub(n);
        self.wrap_pending = false;
    }

    // ── Resize ────────────────────────────────────────────────────────────

    /// Resize the grid, preserving the top-left `min×min` rectangle.
    ///
    /// New cells are blanks. Margins reset to full screen, the cursor is
    /// clamped, and no cells migrate into scrollback.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        if cols == self.cols && rows == self.rows {
            return;
        }
        Self::resize_grid(&mut self.grid, cols, rows);
        if let Some(saved) = self.saved_main.as_mut() {
            Self::resize_grid(&mut saved.grid, cols, rows);
            saved.cursor_row = saved.cursor_row.min(rows.saturating_sub(1));
            saved.cursor_col = saved.cursor_col.min(cols.saturating_sub(1));
        }
        self.cols = cols;
        self.rows = rows;
        self.reset_scroll_region();
        self.clamp_cursor();
        self.wrap_pending = false;
        self.changed = true;
    }

    fn resize_grid(grid: &mut Vec<Line>, cols: usize, rows: usize) {
        grid.truncate(rows);
        while grid.len() < rows {
            grid.push(blank_line(cols));
        }
        for line in grid.iter_mut() {
            line.truncate(cols);
            while line.len() < cols {
                line.push(Cell::default());
            }
        }
    }

    // ── Full reset ────────────────────────────────────────────────────────

    /// RIS — hard reset. Returns to the main screen, blanks the grid,
    /// restores default modes and attribute. Dimensions and scrollback
    /// survive.
    pub fn full_reset(&mut self) {
        self.leave_alternate_screen();
        self.attr = Attribute::default();
        for row in 0..self.rows {
            self.blank_row(row);
        }
        self.cursor_row = 0;
        self.cursor_col = 0;
        self.wrap_pending = false;
        self.saved_cursor = None;
        self.modes = Modes::default();
        self.reset_scroll_region();
        self.changed = true;
    }

    // ── Persistence ───────────────────────────────────────────────────────

    /// Plain-text export: up to `max_scrollback` history lines followed
    /// by the visible rows, newline-joined. Attributes are discarded.
    pub fn export_plain_text(&self, max_scrollback: usize) -> String {
        let mut out = Vec::new();
        let skip = self.scrollback.len().saturating_sub(max_scrollback);
        for line in self.scrollback.iter().skip(skip) {
            out.push(line_text(line));
        }
        for row in 0..self.rows {
            out.push(self.row_text(row));
        }
        out.join("\n")
    }

    /// Build a restart-safe snapshot of the visible text and scrollback.
    pub fn snapshot(&self, max_scrollback: usize) -> ScreenSnapshot {
        let skip = self.scrollback.len().saturating_sub(max_scrollback);
        ScreenSnapshot {
            cols: self.cols as u16,
            rows: self.rows as u16,
            cursor_row: self.cursor_row as u16,
            cursor_col: self.cursor_col as u16,
            scrollback_lines: self
                .scrollback
                .iter()
                .skip(skip)
                .map(|l| line_text(l))
                .collect(),
            screen_lines: (0..self.rows).map(|r| self.row_text(r)).collect(),
        }
    }

    /// Rehydrate from a snapshot: grid cleared, visible text and
    /// scrollback restored with default attributes, cursor clamped,
    /// margins reset, everything marked dirty.
    pub fn restore(&mut self, snapshot: &ScreenSnapshot) {
        for row in 0..self.rows {
            self.blank_row(row);
        }
        self.scrollback.clear();
        for text in &snapshot.scrollback_lines {
            let mut line = blank_line(self.cols);
            for (i, ch) in text.chars().take(self.cols).enumerate() {
                line[i].ch = ch;
                line[i].dirty = true;
            }
            self.scrollback.push(line);
        }
        for (row, text) in snapshot.screen_lines.iter().take(self.rows).enumerate() {
            for (col, ch) in text.chars().take(self.cols).enumerate() {
                self.grid[row][col] = Cell {
                    ch,
                    attr: Attribute::default(),
                    width: 1,
                    dirty: true,
                };
            }
        }
        self.cursor_row = (snapshot.cursor_row as usize).min(self.rows.saturating_sub(1));
        self.cursor_col = (snapshot.cursor_col as usize).min(self.cols.saturating_sub(1));
        self.wrap_pending = false;
        self.reset_scroll_region();
        self.changed = true;
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn blank_row(&mut self, row: usize) {
        let attr = self.attr;
        for cell in &mut self.grid[row] {
            cell.clear(attr);
        }
    }

    fn clamp_cursor(&mut self) {
        self.cursor_row = self.cursor_row.min(self.rows.saturating_sub(1));
        self.cursor_col = self.cursor_col.min(self.cols.saturating_sub(1));
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::cell::Color;

    fn write_str(screen: &mut Screen, s: &str) {
        for ch in s.chars() {
            match ch {
                '\n' => {
                    screen.carriage_return();
                    screen.line_feed();
                }
                '\r' => screen.carriage_return(),
                _ => screen.write_char(ch),
            }
        }
    }

    // ── Printing & wrap ───────────────────────────────────────────────────

    #[test]
    fn test_write_advances_cursor() {
        let mut screen = Screen::new(80, 24, 100);
        write_str(&mut screen, "Hi");
        assert_eq!(screen.cell(0, 0).unwrap().ch, 'H');
        assert_eq!(screen.cell(0, 1).unwrap().ch, 'i');
        assert_eq!(screen.cursor(), (0, 2));
    }

    #[test]
    fn test_wrap_is_deferred_until_next_printable() {
        let mut screen = Screen::new(4, 2, 100);
        write_str(&mut screen, "abcd");
        // Cursor parks on the last column with wrap pending.
        assert_eq!(screen.cursor(), (0, 3));
        assert!(screen.wrap_pending());

        screen.write_char('e');
        assert_eq!(screen.cursor(), (1, 1));
        assert_eq!(screen.cell(1, 0).unwrap().ch, 'e');
        assert!(!screen.wrap_pending());
    }

    #[test]
    fn test_no_wrap_when_autowrap_off() {
        let mut screen = Screen::new(4, 2, 100);
        screen.modes.auto_wrap = false;
        write_str(&mut screen, "abcdef");
        // Everything past the margin overwrites the last column.
        assert_eq!(screen.cursor(), (0, 3));
        assert_eq!(screen.cell(0, 3).unwrap().ch, 'f');
        assert_eq!(screen.row_text(1), "");
    }

    #[test]
    fn test_cursor_motion_clears_wrap_pending() {
        let mut screen = Screen::new(4, 2, 100);
        write_str(&mut screen, "abcd");
        assert!(screen.wrap_pending());
        screen.move_cursor_backward(1);
        assert!(!screen.wrap_pending());
        screen.write_char('X');
        assert_eq!(screen.cell(0, 2).unwrap().ch, 'X');
    }

    #[test]
    fn test_insert_mode_shifts_row_right() {
        let mut screen = Screen::new(8, 2, 100);
        write_str(&mut screen, "world");
        screen.move_cursor_to(0, 0);
        screen.modes.insert_mode = true;
        write_str(&mut screen, "he");
        assert_eq!(screen.row_text(0), "heworld");
    }

    #[test]
    fn test_write_char_on_zero_size_grid_is_noop() {
        let mut screen = Screen::new(0, 0, 100);
        screen.write_char('x');
        screen.erase_in_display(2);
        screen.tab();
        assert_eq!(screen.cursor(), (0, 0));
    }

    #[test]
    fn test_tab_jumps_to_next_multiple_of_eight() {
        let mut screen = Screen::new(20, 2, 100);
        screen.write_char('a');
        screen.tab();
        assert_eq!(screen.cursor(), (0, 8));
        screen.tab();
        assert_eq!(screen.cursor(), (0, 16));
        screen.tab();
        // Clamped to the last column.
        assert_eq!(screen.cursor(), (0, 19));
    }

    #[test]
    fn test_cursor_stays_in_bounds_under_mixed_input() {
        // Invariant 1: cursor coordinates stay within the grid for any
        // sequence of write/CR/LF.
        let mut screen = Screen::new(5, 3, 10);
        for i in 0..500 {
            match i % 7 {
                0 => screen.carriage_return(),
                1 | 2 => screen.line_feed(),
                _ => screen.write_char(char::from(b'a' + (i % 26) as u8)),
            }
            let (row, col) = screen.cursor();
            assert!(row < 3, "row {row} out of bounds at step {i}");
            assert!(col < 5, "col {col} out of bounds at step {i}");
        }
    }

    // ── Scrolling & scrollback ────────────────────────────────────────────

    #[test]
    fn test_natural_scroll_spills_to_scrollback() {
        // Spec scenario S3.
        let mut screen = Screen::new(80, 3, 100);
        write_str(&mut screen, "L1\nL2\nL3\nL4");
        assert_eq!(screen.scrollback().len(), 1);
        assert_eq!(line_text(&screen.scrollback()[0]), "L1");
        assert_eq!(screen.row_text(0), "L2");
        assert_eq!(screen.row_text(1), "L3");
        assert_eq!(screen.row_text(2), "L4");
    }

    #[test]
    fn test_region_scroll_does_not_spill() {
        // Spec scenario S4: a region pinned below row 0 never feeds
        // scrollback.
        let mut screen = Screen::new(10, 5, 100);
        write_str(&mut screen, "top");
        screen.set_scroll_region(1, 3);
        screen.move_cursor_to(3, 0);
        screen.write_char('X');
        screen.line_feed();
        assert_eq!(screen.row_text(0), "top");
        assert_eq!(screen.scrollback().len(), 0);
        // Row 3's "X" moved up to row 2.
        assert_eq!(screen.cell(2, 0).unwrap().ch, 'X');
        assert_eq!(screen.row_text(3), "");
    }

    #[test]
    fn test_scroll_down_inserts_blank_at_top_margin() {
        let mut screen = Screen::new(10, 3, 100);
        write_str(&mut screen, "one\ntwo\nthree");
        screen.scroll_down(1);
        assert_eq!(screen.row_text(0), "");
        assert_eq!(screen.row_text(1), "one");
        assert_eq!(screen.row_text(2), "two");
        assert_eq!(screen.scrollback().len(), 0);
    }

    #[test]
    fn test_scroll_up_larger_than_region_clears_it() {
        let mut screen = Screen::new(10, 3, 100);
        write_str(&mut screen, "a\nb\nc");
        screen.scroll_up(10);
        for row in 0..3 {
            assert_eq!(screen.row_text(row), "");
        }
        // All three lines went to history.
        assert_eq!(screen.scrollback().len(), 3);
    }

    // ── Erase / insert / delete ───────────────────────────────────────────

    #[test]
    fn test_erase_in_line_modes() {
        let mut screen = Screen::new(8, 2, 100);
        write_str(&mut screen, "abcdefgh");
        screen.move_cursor_to(0, 3);
        screen.erase_in_line(0);
        assert_eq!(screen.row_text(0), "abc");

        write_str(&mut screen, ""); // no-op, keep cursor
        screen.move_cursor_to(0, 1);
        screen.erase_in_line(1);
        assert_eq!(screen.row_text(0), "  c");

        screen.erase_in_line(2);
        assert_eq!(screen.row_text(0), "");
    }

    #[test]
    fn test_erase_in_display_below_and_above() {
        let mut screen = Screen::new(5, 3, 100);
        write_str(&mut screen, "aaaaa\nbbbbb\nccccc");
        screen.move_cursor_to(1, 2);
        screen.erase_in_display(0);
        assert_eq!(screen.row_text(0), "aaaaa");
        assert_eq!(screen.row_text(1), "bb");
        assert_eq!(screen.row_text(2), "");

        write_str(&mut screen, ""); // keep state
        screen.move_cursor_to(1, 2);
        screen.erase_in_display(1);
        assert_eq!(screen.row_text(0), "");
        assert_eq!(screen.row_text(1), "");
    }

    #[test]
    fn test_erase_all_with_scrollback_clear() {
        let mut screen = Screen::new(5, 2, 100);
        write_str(&mut screen, "a\nb\nc\nd");
        assert!(screen.scrollback().len() > 0);
        screen.erase_in_display(3);
        assert_eq!(screen.scrollback().len(), 0);
        assert_eq!(screen.row_text(0), "");
    }

    #[test]
    fn test_erase_clamps_cursor_first() {
        let mut screen = Screen::new(5, 5, 100);
        write_str(&mut screen, "hello");
        screen.resize(5, 2); // cursor row may now exceed the grid
        screen.erase_in_display(0); // must not panic
    }

    #[test]
    fn test_insert_and_delete_chars() {
        let mut screen = Screen::new(8, 1, 100);
        write_str(&mut screen, "abcdef");
        screen.move_cursor_to(0, 2);
        screen.insert_chars(2);
        assert_eq!(screen.row_text(0), "ab  cdef");
        screen.delete_chars(2);
        assert_eq!(screen.row_text(0), "abcdef");
    }

    #[test]
    fn test_erase_chars_blanks_without_shift() {
        let mut screen = Screen::new(8, 1, 100);
        write_str(&mut screen, "abcdef");
        screen.move_cursor_to(0, 1);
        screen.erase_chars(3);
        assert_eq!(screen.row_text(0), "a   ef");
    }

    #[test]
    fn test_insert_delete_lines_respect_region() {
        let mut screen = Screen::new(5, 4, 100);
        write_str(&mut screen, "r0\nr1\nr2\nr3");
        screen.set_scroll_region(1, 2);
        // Cursor outside the region: no-op.
        screen.move_cursor_to(3, 0);
        screen.insert_lines(1);
        assert_eq!(screen.row_text(3), "r3");

        screen.move_cursor_to(1, 0);
        screen.insert_lines(1);
        assert_eq!(screen.row_text(0), "r0");
        assert_eq!(screen.row_text(1), "");
        assert_eq!(screen.row_text(2), "r1");
        assert_eq!(screen.row_text(3), "r3");

        screen.delete_lines(1);
        assert_eq!(screen.row_text(1), "r1");
        assert_eq!(screen.row_text(2), "");
    }

    // ── Scroll region bounds ──────────────────────────────────────────────

    #[test]
    fn test_set_scroll_region_clamps_and_swaps() {
        let mut screen = Screen::new(10, 5, 100);
        screen.set_scroll_region(8, 2);
        assert_eq!(screen.scroll_region(), (2, 4));
        screen.reset_scroll_region();
        assert_eq!(screen.scroll_region(), (0, 4));
    }

    // ── Save / restore cursor ─────────────────────────────────────────────

    #[test]
    fn test_save_restore_cursor_and_attr() {
        let mut screen = Screen::new(10, 5, 100);
        let mut attr = Attribute::default();
        attr.bold = true;
        screen.set_attr(attr);
        screen.move_cursor_to(2, 3);
        screen.save_cursor();

        screen.move_cursor_to(4, 9);
        screen.set_attr(Attribute::default());
        screen.restore_cursor();
        assert_eq!(screen.cursor(), (2, 3));
        assert!(screen.attr().bold);
    }

    #[test]
    fn test_restore_without_save_homes_cursor() {
        let mut screen = Screen::new(10, 5, 100);
        screen.move_cursor_to(3, 3);
        screen.restore_cursor();
        assert_eq!(screen.cursor(), (0, 0));
    }

    // ── Alternate screen ──────────────────────────────────────────────────

    #[test]
    fn test_alternate_screen_round_trip() {
        let mut screen = Screen::new(10, 3, 100);
        write_str(&mut screen, "main");
        screen.enter_alternate_screen();
        assert!(screen.in_alternate_screen());
        assert_eq!(screen.row_text(0), "");

        write_str(&mut screen, "alt");
        screen.leave_alternate_screen();
        assert!(!screen.in_alternate_screen());
        assert_eq!(screen.row_text(0), "main");
        assert_eq!(screen.cursor(), (0, 4));
    }

    #[test]
    fn test_alternate_screen_idempotent_and_not_preserved() {
        // Invariant 5: double enter stays alt; re-entry starts blank.
        let mut screen = Screen::new(10, 3, 100);
        screen.enter_alternate_screen();
        write_str(&mut screen, "alt1");
        screen.enter_alternate_screen();
        assert_eq!(screen.row_text(0), "alt1"); // second call is a no-op

        screen.leave_alternate_screen();
        screen.leave_alternate_screen(); // idempotent
        screen.enter_alternate_screen();
        assert_eq!(screen.row_text(0), ""); // alt content was not kept
    }

    #[test]
    fn test_alternate_screen_suppresses_scrollback() {
        let mut screen = Screen::new(5, 2, 100);
        write_str(&mut screen, "m1\nm2\nm3"); // one line spilled
        assert_eq!(screen.scrollback().len(), 1);

        screen.enter_alternate_screen();
        assert_eq!(screen.scrollback().len(), 0);
        write_str(&mut screen, "a\nb\nc\nd\ne");
        assert_eq!(screen.scrollback().len(), 0);

        screen.leave_alternate_screen();
        assert_eq!(screen.scrollback().len(), 1);
        assert_eq!(line_text(&screen.scrollback()[0]), "m1");
    }

    // ── Movement clamping ─────────────────────────────────────────────────

    #[test]
    fn test_vertical_moves_clamp_to_margins() {
        let mut screen = Screen::new(10, 6, 100);
        screen.set_scroll_region(2, 4);
        screen.move_cursor_to(3, 0);
        screen.move_cursor_up(10);
        assert_eq!(screen.cursor().0, 2);
        screen.move_cursor_down(10);
        assert_eq!(screen.cursor().0, 4);
    }

    #[test]
    fn test_moves_outside_region_clamp_to_grid() {
        let mut screen = Screen::new(10, 6, 100);
        screen.set_scroll_region(2, 3);
        // Cursor above the region moves freely up to row 0.
        screen.move_cursor_to(1, 0);
        screen.move_cursor_up(5);
        assert_eq!(screen.cursor().0, 0);
        // Cursor below the region moves freely down to the last row.
        screen.move_cursor_to(5, 0);
        screen.move_cursor_down(5);
        assert_eq!(screen.cursor().0, 5);
    }

    #[test]
    fn test_origin_mode_offsets_absolute_moves() {
        let mut screen = Screen::new(10, 6, 100);
        screen.set_scroll_region(2, 4);
        screen.modes.origin_mode = true;
        screen.move_cursor_to(0, 0);
        assert_eq!(screen.cursor(), (2, 0));
        screen.move_cursor_to(10, 0);
        assert_eq!(screen.cursor().0, 4);
    }

    // ── Resize ────────────────────────────────────────────────────────────

    #[test]
    fn test_resize_preserves_top_left() {
        let mut screen = Screen::new(6, 3, 100);
        write_str(&mut screen, "abcdef\nghijkl");
        screen.resize(4, 2);
        assert_eq!(screen.row_text(0), "abcd");
        assert_eq!(screen.row_text(1), "ghij");
        assert_eq!(screen.scroll_region(), (0, 1));
        assert_eq!(screen.scrollback().len(), 0);
    }

    #[test]
    fn test_resize_grows_with_blanks_and_clamps_cursor() {
        let mut screen = Screen::new(4, 2, 100);
        write_str(&mut screen, "abcd");
        screen.resize(8, 4);
        assert_eq!(screen.row_text(0), "abcd");
        assert_eq!(screen.row_text(3), "");
        let (row, col) = screen.cursor();
        assert!(row < 4 && col < 8);

        screen.resize(2, 1);
        let (row, col) = screen.cursor();
        assert!(row < 1 && col < 2);
    }

    // ── SGR attribute plumbing ────────────────────────────────────────────

    #[test]
    fn test_written_cells_capture_current_attr() {
        let mut screen = Screen::new(10, 2, 100);
        let mut attr = Attribute::default();
        attr.fg = Color::Rgb(18, 52, 86);
        screen.set_attr(attr);
        screen.write_char('A');
        screen.set_attr(Attribute::default());
        screen.write_char('B');
        assert_eq!(screen.cell(0, 0).unwrap().attr.fg, Color::Rgb(18, 52, 86));
        assert_eq!(screen.cell(0, 1).unwrap().attr.fg, Color::Default);
    }

    // ── Full reset ────────────────────────────────────────────────────────

    #[test]
    fn test_full_reset_restores_defaults() {
        let mut screen = Screen::new(10, 4, 100);
        write_str(&mut screen, "data");
        screen.modes.auto_wrap = false;
        screen.set_scroll_region(1, 2);
        screen.enter_alternate_screen();
        screen.full_reset();
        assert!(!screen.in_alternate_screen());
        assert_eq!(screen.row_text(0), "");
        assert_eq!(screen.cursor(), (0, 0));
        assert!(screen.modes.auto_wrap);
        assert_eq!(screen.scroll_region(), (0, 3));
    }

    // ── Changed flag ──────────────────────────────────────────────────────

    #[test]
    fn test_take_changed_clears_flag() {
        let mut screen = Screen::new(4, 2, 100);
        assert!(screen.take_changed()); // construction marks changed
        assert!(!screen.take_changed());
        screen.write_char('x');
        assert!(screen.take_changed());
    }
}
