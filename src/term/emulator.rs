//! Terminal emulator: parser and screen bundled behind one interface.
//!
//! [`Emulator`] wires the VT [`Parser`] to a [`Screen`] through an
//! internal [`Perform`] implementation and presents a simple
//! `process(bytes)` / `resize(cols, rows)` surface to the session. Side
//! effects that do not belong on the screen — bell, title, working
//! directory, notifications, prompt markers — are collected as
//! [`SideEvent`]s and drained by the caller after each feed, as are
//! write-back responses (DSR, DA) destined for the child's input.
//!
//! # Thread safety
//!
//! `Emulator` is `Send` but not `Sync`; shared access goes through the
//! session's `Mutex`, which also serialises the parser and screen as a
//! single critical section.

use super::cell::{Attribute, Color};
use super::osc::{parse_osc, MarkerKind, OscEvent};
use super::parser::{Parser, Perform};
use super::screen::Screen;
use super::snapshot::ScreenSnapshot;

/// Out-of-band events produced while processing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEvent {
    /// BEL received outside an OSC string.
    Bell,
    /// OSC 0/2 title change.
    Title(String),
    /// OSC 7 working-directory hint.
    WorkingDirectory(String),
    /// OSC 9/99/777 desktop notification.
    Notification {
        title: Option<String>,
        subtitle: Option<String>,
        body: Option<String>,
    },
    /// OSC 133 shell-integration marker.
    PromptMarker {
        kind: MarkerKind,
        payload: Option<String>,
    },
}

/// The `Perform` half: owns the screen and accumulates side effects.
#[derive(Debug)]
struct Interpreter {
    screen: Screen,
    /// Bytes to write back to the child (DSR/DA replies).
    responses: Vec<u8>,
    events: Vec<SideEvent>,
    title: String,
    cwd: Option<String>,
}

/// Parser + screen for one session.
#[derive(Debug)]
pub struct Emulator {
    parser: Parser,
    inner: Interpreter,
}

impl Emulator {
    /// Create an emulator of `cols`×`rows` with the given scrollback
    /// line capacity.
    #[must_use]
    pub fn new(cols: usize, rows: usize, scrollback_lines: usize) -> Self {
        Self {
            parser: Parser::new(),
            inner: Interpreter {
                screen: Screen::new(cols, rows, scrollback_lines),
                responses: Vec::new(),
                events: Vec::new(),
                title: String::new(),
                cwd: None,
            },
        }
    }

    /// Feed raw child output. Hot path — called from the session read
    /// loop for every chunk.
    pub fn process(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.inner, bytes);
    }

    /// Resize the screen. The pseudo-console is resized separately by
    /// the session.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.inner.screen.resize(cols, rows);
    }

    pub fn screen(&self) -> &Screen {
        &self.inner.screen
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.inner.screen
    }

    /// Most recent window title, empty until the child sets one.
    pub fn title(&self) -> &str {
        &self.inner.title
    }

    /// Most recent OSC 7 working directory, if any.
    pub fn working_directory(&self) -> Option<&str> {
        self.inner.cwd.as_deref()
    }

    /// Drain pending write-back bytes (DSR/DA replies).
    pub fn take_responses(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.inner.responses)
    }

    /// Drain side events collected since the last call.
    pub fn take_events(&mut self) -> Vec<SideEvent> {
        std::mem::take(&mut self.inner.events)
    }

    /// Reset the parser to Ground, dropping any in-flight sequence.
    pub fn reset_parser(&mut self) {
        self.parser.reset();
    }

    /// Convenience: plain-text export of the screen.
    pub fn plain_text(&self, max_scrollback: usize) -> String {
        self.inner.screen.export_plain_text(max_scrollback)
    }

    pub fn snapshot(&self, max_scrollback: usize) -> ScreenSnapshot {
        self.inner.screen.snapshot(max_scrollback)
    }

    pub fn restore_snapshot(&mut self, snapshot: &ScreenSnapshot) {
        self.inner.screen.restore(snapshot);
    }
}

/// i-th parameter with zero-and-missing mapped to `default`.
///
/// The parser hands through explicit zeros; for motion and count
/// parameters zero means "default", which is almost always 1.
fn param_or(params: &[u16], i: usize, default: u16) -> u16 {
    match params.get(i) {
        Some(&v) if v != 0 => v,
        _ => default,
    }
}

impl Perform for Interpreter {
    fn print(&mut self, ch: char) {
        self.screen.write_char(ch);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.events.push(SideEvent::Bell),
            0x08 => self.screen.backspace(),
            0x09 => self.screen.tab(),
            0x0A | 0x0B | 0x0C => self.screen.line_feed(),
            0x0D => self.screen.carriage_return(),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &[u16], qualifier: &str, final_byte: u8) {
        let private = qualifier.contains('?');
        let screen = &mut self.screen;
        match final_byte {
            b'A' => screen.move_cursor_up(param_or(params, 0, 1) as usize),
            b'B' => screen.move_cursor_down(param_or(params, 0, 1) as usize),
            b'C' => screen.move_cursor_forward(param_or(params, 0, 1) as usize),
            b'D' => screen.move_cursor_backward(param_or(params, 0, 1) as usize),
            b'E' => {
                screen.carriage_return();
                screen.move_cursor_down(param_or(params, 0, 1) as usize);
            }
            b'F' => {
                screen.carriage_return();
                screen.move_cursor_up(param_or(params, 0, 1) as usize);
            }
            b'G' => screen.move_to_col(param_or(params, 0, 1) as usize - 1),
            b'H' | b'f' => screen.move_cursor_to(
                param_or(params, 0, 1) as usize - 1,
                param_or(params, 1, 1) as usize - 1,
            ),
            b'd' => screen.move_to_row(param_or(params, 0, 1) as usize - 1),
            b'J' => screen.erase_in_display(params.first().copied().unwrap_or(0)),
            b'K' => screen.erase_in_line(params.first().copied().unwrap_or(0)),
            b'X' => screen.erase_chars(param_or(params, 0, 1) as usize),
            b'L' => screen.insert_lines(param_or(params, 0, 1) as usize),
            b'M' => screen.delete_lines(param_or(params, 0, 1) as usize),
            b'@' => screen.insert_chars(param_or(params, 0, 1) as usize),
            b'P' => screen.delete_chars(param_or(params, 0, 1) as usize),
            b'S' => screen.scroll_up(param_or(params, 0, 1) as usize),
            b'T' => screen.scroll_down(param_or(params, 0, 1) as usize),
            b'r' => {
                if params.iter().all(|&p| p == 0) {
                    screen.reset_scroll_region();
                } else {
                    let rows = screen.rows().max(1) as u16;
                    screen.set_scroll_region(
                        param_or(params, 0, 1) as usize - 1,
                        param_or(params, 1, rows) as usize - 1,
                    );
                }
                screen.move_cursor_to(0, 0);
            }
            b'm' => self.sgr(params),
            b'h' => self.set_modes(params, private, true),
            b'l' => self.set_modes(params, private, false),
            b's' if !private => screen.save_cursor(),
            b'u' if !private => screen.restore_cursor(),
            b'n' if !private => {
                // DSR 6 — cursor position report, 1-based.
                if param_or(params, 0, 0) == 6 {
                    let (row, col) = screen.cursor();
                    self.responses
                        .extend_from_slice(format!("\x1b[{};{}R", row + 1, col + 1).as_bytes());
                }
            }
            b'c' if qualifier.is_empty() => {
                // DA — identify as a VT101-class terminal.
                self.responses.extend_from_slice(b"\x1b[?1;0c");
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, byte: u8) {
        match byte {
            b'7' => self.screen.save_cursor(),
            b'8' => self.screen.restore_cursor(),
            b'M' => self.screen.reverse_line_feed(),
            b'D' => self.screen.line_feed(),
            b'E' => self.screen.new_line(),
            b'c' => {
                self.screen.full_reset();
                self.title.clear();
            }
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, payload: &str) {
        match parse_osc(payload) {
            Some(OscEvent::TitleChanged(title)) => {
                self.title = title.clone();
                self.events.push(SideEvent::Title(title));
            }
            Some(OscEvent::WorkingDirectoryChanged(path)) => {
                self.cwd = Some(path.clone());
                self.events.push(SideEvent::WorkingDirectory(path));
            }
            Some(OscEvent::NotificationReceived {
                title,
                subtitle,
                body,
            }) => self.events.push(SideEvent::Notification {
                title,
                subtitle,
                body,
            }),
            Some(OscEvent::ShellPromptMarker { kind, payload }) => {
                self.events.push(SideEvent::PromptMarker { kind, payload });
            }
            None => {}
        }
    }
}

impl Interpreter {
    /// SGR — fold parameters left to right into the writing attribute.
    fn sgr(&mut self, params: &[u16]) {
        let mut attr = self.screen.attr();
        if params.is_empty() {
            attr = Attribute::default();
        }
        let mut i = 0;
        while i < params.len() {
            match params[i] {
                0 => attr = Attribute::default(),
                1 => attr.bold = true,
                2 => attr.dim = true,
                3 => attr.italic = true,
                4 => attr.underline = true,
                5 | 6 => attr.blink = true,
                7 => attr.inverse = true,
                8 => attr.hidden = true,
                9 => attr.strikethrough = true,
                21 | 22 => {
                    attr.bold = false;
                    attr.dim = false;
                }
                23 => attr.italic = false,
                24 => attr.underline = false,
                25 | 26 => attr.blink = false,
                27 => attr.inverse = false,
                28 => attr.hidden = false,
                29 => attr.strikethrough = false,
                30..=37 => attr.fg = Color::from_ansi((params[i] - 30) as u8),
                38 => {
                    let (color, consumed) = Self::extended_color(&params[i + 1..]);
                    if let Some(color) = color {
                        attr.fg = color;
                    }
                    i += consumed;
                }
                39 => attr.fg = Color::Default,
                40..=47 => attr.bg = Color::from_ansi((params[i] - 40) as u8),
                48 => {
                    let (color, consumed) = Self::extended_color(&params[i + 1..]);
                    if let Some(color) = color {
                        attr.bg = color;
                    }
                    i += consumed;
                }
                49 => attr.bg = Color::Default,
                90..=97 => attr.fg = Color::from_ansi((params[i] - 90 + 8) as u8),
                100..=107 => attr.bg = Color::from_ansi((params[i] - 100 + 8) as u8),
                _ => {}
            }
            i += 1;
        }
        self.screen.set_attr(attr);
    }

    /// Parse the tail of an SGR 38/48: `5;index` or `2;r;g;b`.
    /// Returns the color and how many parameters were consumed.
    fn extended_color(rest: &[u16]) -> (Option<Color>, usize) {
        match rest.first() {
            Some(5) => {
                let idx = rest.get(1).copied().unwrap_or(0).min(255) as u8;
                (Some(Color::from_index(idx)), 2)
            }
            Some(2) => {
                let channel = |i: usize| rest.get(i).copied().unwrap_or(0).min(255) as u8;
                (Some(Color::Rgb(channel(1), channel(2), channel(3))), 4)
            }
            // Unknown color space: consume just the selector.
            Some(_) => (None, 1),
            None => (None, 0),
        }
    }

    /// SM/RM and DECSET/DECRST.
    fn set_modes(&mut self, params: &[u16], private: bool, on: bool) {
        for &mode in params {
            if private {
                match mode {
                    1 => self.screen.modes.app_cursor_keys = on,
                    6 => self.screen.modes.origin_mode = on,
                    7 => self.screen.modes.auto_wrap = on,
                    9 => self.screen.modes.mouse_x10 = on,
                    25 => self.screen.modes.cursor_visible = on,
                    47 | 1047 => {
                        if on {
                            self.screen.enter_alternate_screen();
                        } else {
                            self.screen.leave_alternate_screen();
                        }
                    }
                    1049 => {
                        // Save/restore the cursor around the switch.
                        if on {
                            self.screen.save_cursor();
                            self.screen.enter_alternate_screen();
                        } else {
                            self.screen.leave_alternate_screen();
                            self.screen.restore_cursor();
                        }
                    }
                    1000 => self.screen.modes.mouse_click = on,
                    1002 => self.screen.modes.mouse_cell_motion = on,
                    1003 => self.screen.modes.mouse_all_motion = on,
                    1006 => self.screen.modes.sgr_mouse = on,
                    2004 => self.screen.modes.bracketed_paste = on,
                    _ => {}
                }
            } else if mode == 4 {
                self.screen.modes.insert_mode = on;
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
